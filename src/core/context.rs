// Core Layer: Execution context
//
// Per-call execution settings: thread budget and chunk size for the work
// partitioner, JIT control, the kernel cache and kernel source to use, and an
// optional dedicated worker pool. The default context shares one process-wide
// kernel cache; tests inject a fresh cache through `with_kernel_cache`.

use crate::compiler::backend::KernelSource;
use crate::compiler::cache::KernelCache;
use crate::compiler::cranelift_backend::CraneliftSource;
use crate::core::error::{GraphBlasError, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Environment variable selecting the JIT control (`off`, `pause`, `run`, `load`, `on`)
pub const JIT_CONTROL_ENV: &str = "SPARSE_ALGEBRA_JIT_CONTROL";

/// Environment variable overriding the on-disk kernel cache root
pub const CACHE_PATH_ENV: &str = "SPARSE_ALGEBRA_CACHE_PATH";

/// Default amount of work per thread
pub const DEFAULT_CHUNK: f64 = 65536.0;

/// How far the JIT may go to obtain a kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JitControl {
    /// No JIT kernels
    Off,
    /// No JIT kernels; cached ones are kept
    Pause,
    /// Only kernels already in memory
    Run,
    /// Kernels in memory or on disk
    Load,
    /// Kernels may also be built
    On,
}

impl JitControl {
    pub fn allows_lookup(self) -> bool {
        self >= JitControl::Run
    }

    pub fn allows_disk(self) -> bool {
        self >= JitControl::Load
    }

    pub fn allows_build(self) -> bool {
        self == JitControl::On
    }
}

impl FromStr for JitControl {
    type Err = GraphBlasError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(JitControl::Off),
            "pause" => Ok(JitControl::Pause),
            "run" => Ok(JitControl::Run),
            "load" => Ok(JitControl::Load),
            "on" => Ok(JitControl::On),
            _ => Err(GraphBlasError::InvalidValue),
        }
    }
}

/// JIT settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitConfig {
    pub control: JitControl,
    /// Fall back to factory kernels when a kernel cannot be built
    pub fail_soft: bool,
}

impl Default for JitConfig {
    fn default() -> Self {
        let control = match std::env::var(JIT_CONTROL_ENV) {
            Ok(value) => value.parse().unwrap_or_else(|_| {
                log::warn!("ignoring {}={:?}", JIT_CONTROL_ENV, value);
                JitControl::On
            }),
            Err(_) => JitControl::On,
        };
        Self {
            control,
            fail_soft: true,
        }
    }
}

/// Root of the on-disk kernel cache: the environment override, else
/// `$HOME/.cache/sparse-algebra`, else none (memory only)
pub fn default_cache_root() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CACHE_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache").join("sparse-algebra"))
}

lazy_static! {
    static ref GLOBAL_KERNEL_CACHE: Arc<KernelCache> = Arc::new(KernelCache::new(default_cache_root()));
}

/// Execution settings passed to every operation
#[derive(Clone)]
pub struct Context {
    nthreads_max: usize,
    chunk: f64,
    jit: JitConfig,
    cache: Arc<KernelCache>,
    source: Arc<dyn KernelSource>,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl Context {
    /// Context using the global worker pool and the process-wide kernel cache
    pub fn new() -> Self {
        Self {
            nthreads_max: rayon::current_num_threads().max(1),
            chunk: DEFAULT_CHUNK,
            jit: JitConfig::default(),
            cache: Arc::clone(&GLOBAL_KERNEL_CACHE),
            source: Arc::new(CraneliftSource::new()),
            pool: None,
        }
    }

    /// Run on a dedicated pool of `nthreads` workers
    pub fn with_nthreads(mut self, nthreads: usize) -> Result<Self> {
        if nthreads == 0 {
            return Err(GraphBlasError::InvalidValue);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(nthreads)
            .thread_name(|k| format!("sparse-algebra-{}", k))
            .build()
            .map_err(|e| GraphBlasError::Panic(e.to_string()))?;
        self.nthreads_max = nthreads;
        self.pool = Some(Arc::new(pool));
        Ok(self)
    }

    /// Amount of work per thread used by the partitioner
    pub fn with_chunk(mut self, chunk: f64) -> Result<Self> {
        if !(chunk.is_finite() && chunk >= 1.0) {
            return Err(GraphBlasError::InvalidValue);
        }
        self.chunk = chunk;
        Ok(self)
    }

    pub fn with_jit(mut self, jit: JitConfig) -> Self {
        self.jit = jit;
        self
    }

    pub fn with_jit_control(mut self, control: JitControl) -> Self {
        self.jit.control = control;
        self
    }

    pub fn with_kernel_cache(mut self, cache: Arc<KernelCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_kernel_source(mut self, source: Arc<dyn KernelSource>) -> Self {
        self.source = source;
        self
    }

    pub fn nthreads_max(&self) -> usize {
        self.nthreads_max
    }

    pub fn chunk(&self) -> f64 {
        self.chunk
    }

    pub fn jit(&self) -> JitConfig {
        self.jit
    }

    pub fn kernel_cache(&self) -> &Arc<KernelCache> {
        &self.cache
    }

    pub fn kernel_source(&self) -> &dyn KernelSource {
        self.source.as_ref()
    }

    /// Threads worth using for `work` units of work
    pub fn nthreads(&self, work: f64) -> usize {
        crate::slice::nthreads(work, self.chunk, self.nthreads_max)
    }

    /// Run `f` inside this context's worker pool
    pub fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("nthreads_max", &self.nthreads_max)
            .field("chunk", &self.chunk)
            .field("jit", &self.jit)
            .field("source", &self.source.name())
            .field("dedicated_pool", &self.pool.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jit_control_parse() {
        assert_eq!("load".parse::<JitControl>().unwrap(), JitControl::Load);
        assert_eq!(" ON ".parse::<JitControl>().unwrap(), JitControl::On);
        assert!("sometimes".parse::<JitControl>().is_err());
    }

    #[test]
    fn test_jit_control_levels() {
        assert!(!JitControl::Pause.allows_lookup());
        assert!(JitControl::Run.allows_lookup());
        assert!(!JitControl::Run.allows_disk());
        assert!(JitControl::Load.allows_disk());
        assert!(!JitControl::Load.allows_build());
        assert!(JitControl::On.allows_build());
    }

    #[test]
    fn test_builder() {
        let ctx = Context::new()
            .with_nthreads(2)
            .unwrap()
            .with_chunk(16.0)
            .unwrap()
            .with_jit_control(JitControl::Off);
        assert_eq!(ctx.nthreads_max(), 2);
        assert_eq!(ctx.jit().control, JitControl::Off);
        assert_eq!(ctx.nthreads(1.0), 1);
        assert_eq!(ctx.nthreads(1000.0), 2);
        assert_eq!(ctx.install(rayon::current_num_threads), 2);
        assert!(Context::new().with_nthreads(0).is_err());
        assert!(Context::new().with_chunk(0.0).is_err());
    }
}
