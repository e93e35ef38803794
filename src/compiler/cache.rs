// Kernel Cache: Cache compiled kernels to avoid recompilation
//
// In-memory table keyed by the kernel hash, backed by an optional on-disk
// cache. A cached kernel is reused only when its code, suffix and definition
// text all match the request. Lookups take the read lock; a miss takes a
// per-key build lock (never the table lock) while loading or building, so
// unrelated kernels are built concurrently and one key is built once.

use crate::compiler::backend::{CompiledKernel, KernelSource};
use crate::compiler::disk::{self, DiskLookup};
use crate::compiler::encode::{KernelKey, KernelRequest};
use crate::core::context::JitConfig;
use crate::core::error::{GraphBlasError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// A kernel registered in the cache
#[derive(Debug)]
pub struct LoadedKernel {
    pub key: KernelKey,
    pub definitions: String,
    pub kernel: CompiledKernel,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub lookups: u64,
    pub hits: u64,
    /// Kernels re-lowered from a validated on-disk manifest
    pub disk_loads: u64,
    pub builds: u64,
    pub failures: u64,
    pub definition_mismatches: u64,
}

#[derive(Debug, Default)]
struct Counters {
    lookups: AtomicU64,
    hits: AtomicU64,
    disk_loads: AtomicU64,
    builds: AtomicU64,
    failures: AtomicU64,
    definition_mismatches: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Process- or test-wide table of kernels
#[derive(Debug, Default)]
pub struct KernelCache {
    table: RwLock<HashMap<u64, Vec<Arc<LoadedKernel>>>>,
    build_locks: Mutex<HashMap<KernelKey, Arc<Mutex<()>>>>,
    root: Option<PathBuf>,
    counters: Counters,
}

impl KernelCache {
    /// Cache persisting kernels under `root`, or memory only
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::new(None)
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Number of kernels in memory
    pub fn len(&self) -> usize {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            entries: self.len(),
            lookups: c.lookups.load(Ordering::Relaxed),
            hits: c.hits.load(Ordering::Relaxed),
            disk_loads: c.disk_loads.load(Ordering::Relaxed),
            builds: c.builds.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            definition_mismatches: c.definition_mismatches.load(Ordering::Relaxed),
        }
    }

    /// Drop every kernel held in memory; disk artifacts stay
    pub fn clear(&self) {
        self.table.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.build_locks.lock().unwrap_or_else(PoisonError::into_inner).clear();
        log::debug!("kernel cache cleared");
    }

    /// In-memory kernel matching the request, definitions included
    fn find(&self, request: &KernelRequest) -> Option<Arc<LoadedKernel>> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        let bucket = table.get(&request.key.hash)?;
        let entry = bucket.iter().find(|k| k.key == request.key)?;
        if entry.definitions == request.definitions {
            Some(Arc::clone(entry))
        } else {
            bump(&self.counters.definition_mismatches);
            log::debug!("kernel {} cached with other definitions", request.key.name());
            None
        }
    }

    /// Register a kernel, replacing any entry with the same key
    fn insert(&self, request: &KernelRequest, kernel: CompiledKernel) -> Arc<LoadedKernel> {
        let loaded = Arc::new(LoadedKernel {
            key: request.key.clone(),
            definitions: request.definitions.clone(),
            kernel,
        });
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let bucket = table.entry(request.key.hash).or_default();
        bucket.retain(|k| k.key != request.key);
        bucket.push(Arc::clone(&loaded));
        loaded
    }

    fn build_lock(&self, key: &KernelKey) -> Arc<Mutex<()>> {
        let mut locks = self.build_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Find, load or build the kernel for `request`
    ///
    /// `Ok(None)` means no kernel: JIT disabled at this level, combination
    /// not supported by the source, or a failed build under fail-soft.
    pub fn get_or_build(
        &self,
        request: &KernelRequest,
        source: &dyn KernelSource,
        jit: JitConfig,
    ) -> Result<Option<Arc<LoadedKernel>>> {
        if !jit.control.allows_lookup() {
            return Ok(None);
        }
        bump(&self.counters.lookups);
        if let Some(found) = self.find(request) {
            bump(&self.counters.hits);
            return Ok(Some(found));
        }
        if !jit.control.allows_disk() {
            return Ok(None);
        }

        let lock = self.build_lock(&request.key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        // another caller may have finished while we waited
        if let Some(found) = self.find(request) {
            bump(&self.counters.hits);
            return Ok(Some(found));
        }

        if let Some(root) = &self.root {
            match disk::load(root, request, source) {
                Ok(DiskLookup::Loaded(kernel)) => {
                    bump(&self.counters.disk_loads);
                    return Ok(Some(self.insert(request, kernel)));
                }
                Ok(DiskLookup::Mismatch) => bump(&self.counters.definition_mismatches),
                Ok(DiskLookup::Missing) => {}
                Err(GraphBlasError::NotImplemented) => return Ok(None),
                Err(e) => log::warn!("cannot load kernel {}: {}", request.key.name(), e),
            }
        }
        if !jit.control.allows_build() {
            return Ok(None);
        }

        match source.build(&request.spec) {
            Ok(kernel) => {
                bump(&self.counters.builds);
                log::info!("built kernel {} ({})", request.key.name(), source.name());
                if let Some(root) = &self.root {
                    if let Err(e) = disk::store(root, request) {
                        log::warn!("cannot store kernel {}: {}", request.key.name(), e);
                    }
                }
                Ok(Some(self.insert(request, kernel)))
            }
            Err(GraphBlasError::NotImplemented) => {
                log::trace!("no {} kernel for {}", source.name(), request.key.name());
                Ok(None)
            }
            Err(e) => {
                bump(&self.counters.failures);
                if jit.fail_soft {
                    log::warn!("kernel {} failed, using factory kernel: {}", request.key.name(), e);
                    Ok(None)
                } else {
                    Err(match e {
                        GraphBlasError::JitError(msg) => GraphBlasError::JitError(msg),
                        other => GraphBlasError::JitError(other.to_string()),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::encode::{encodify, CellKernelSpec, CellKind, MaskMode};
    use crate::compiler::interpreter::InterpretedSource;
    use crate::core::binary_op::BinaryOp;
    use crate::core::context::JitControl;
    use crate::types::TypeCode;

    fn request(op: &BinaryOp<i64>) -> KernelRequest {
        let spec = CellKernelSpec {
            kind: CellKind::Add,
            opcode: op.opcode(),
            type_code: TypeCode::Int64,
            a_full: false,
            a_iso: false,
            b_full: false,
            b_iso: false,
            mask: MaskMode::None,
            clear_masked_out: true,
        };
        encodify(spec, op)
    }

    fn jit(control: JitControl) -> JitConfig {
        JitConfig {
            control,
            fail_soft: true,
        }
    }

    /// Source that always fails
    struct Broken;

    impl KernelSource for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn build(&self, _spec: &CellKernelSpec) -> Result<CompiledKernel> {
            Err(GraphBlasError::JitError("no compiler".to_string()))
        }
    }

    #[test]
    fn test_build_then_hit() {
        let cache = KernelCache::in_memory();
        let r = request(&BinaryOp::plus());
        let first = cache.get_or_build(&r, &InterpretedSource, jit(JitControl::On)).unwrap();
        assert!(first.is_some());
        let second = cache.get_or_build(&r, &InterpretedSource, jit(JitControl::On)).unwrap();
        assert!(second.is_some());
        let stats = cache.stats();
        assert_eq!((stats.builds, stats.hits, stats.entries), (1, 1, 1));
    }

    #[test]
    fn test_control_levels() {
        let cache = KernelCache::in_memory();
        let r = request(&BinaryOp::plus());
        assert!(cache.get_or_build(&r, &InterpretedSource, jit(JitControl::Off)).unwrap().is_none());
        assert!(cache.get_or_build(&r, &InterpretedSource, jit(JitControl::Run)).unwrap().is_none());
        assert!(cache.get_or_build(&r, &InterpretedSource, jit(JitControl::Load)).unwrap().is_none());
        assert_eq!(cache.stats().builds, 0);
    }

    #[test]
    fn test_definition_mismatch_rebuilds() {
        let cache = KernelCache::in_memory();
        let v1 = BinaryOp::<i64>::user("f", "z = x + y", |x, y| x + y).unwrap();
        let v2 = BinaryOp::<i64>::user("f", "z = x - y", |x, y| x - y).unwrap();
        let (r1, r2) = (request(&v1), request(&v2));
        assert_eq!(r1.key, r2.key);

        cache.get_or_build(&r1, &InterpretedSource, jit(JitControl::On)).unwrap();
        let k2 = cache.get_or_build(&r2, &InterpretedSource, jit(JitControl::On)).unwrap().unwrap();
        assert_eq!(k2.definitions, "z = x - y");
        let stats = cache.stats();
        assert_eq!(stats.builds, 2);
        assert_eq!(stats.definition_mismatches, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_fail_soft_and_hard() {
        let cache = KernelCache::in_memory();
        let r = request(&BinaryOp::plus());
        assert!(cache.get_or_build(&r, &Broken, jit(JitControl::On)).unwrap().is_none());
        let hard = JitConfig {
            control: JitControl::On,
            fail_soft: false,
        };
        let err = cache.get_or_build(&r, &Broken, hard).unwrap_err();
        assert_eq!(err, GraphBlasError::JitError("no compiler".to_string()));
        assert_eq!(cache.stats().failures, 2);
    }

    /// Interpreted source counting its builds
    #[derive(Default)]
    struct Counting(std::sync::atomic::AtomicUsize);

    impl KernelSource for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn build(&self, spec: &CellKernelSpec) -> Result<CompiledKernel> {
            self.0.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            InterpretedSource.build(spec)
        }
    }

    #[test]
    fn test_concurrent_requests_build_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = KernelCache::new(Some(dir.path().to_path_buf()));
        let source = Counting::default();
        let r = request(&BinaryOp::plus());
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let got = cache.get_or_build(&r, &source, jit(JitControl::On)).unwrap();
                    assert!(got.is_some());
                });
            }
        });
        assert_eq!(source.0.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!((stats.builds, stats.hits, stats.entries), (1, 7, 1));

        let names: Vec<String> = std::fs::read_dir(disk::version_dir(dir.path()))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2, "{:?}", names);
        assert!(names.iter().any(|n| n.ends_with(".kmod")));
        assert!(names.iter().any(|n| n.ends_with(".src")));
        assert!(!names.iter().any(|n| n.contains(".tmp")));
    }

    #[test]
    fn test_clear() {
        let cache = KernelCache::in_memory();
        let r = request(&BinaryOp::plus());
        cache.get_or_build(&r, &InterpretedSource, jit(JitControl::On)).unwrap();
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
    }
}
