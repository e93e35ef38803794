// Compiler Module: JIT kernel specialization and caching

pub mod backend;
pub mod cache;
pub mod cranelift_backend;
pub mod disk;
pub mod encode;
pub mod interpreter;

// Re-exports
pub use backend::{CompiledKernel, KernelArgs, KernelSource};
pub use cache::{CacheStats, KernelCache, LoadedKernel};
pub use cranelift_backend::CraneliftSource;
pub use encode::{encodify, CellKernelSpec, CellKind, KernelKey, KernelRequest, MaskMode};
pub use interpreter::InterpretedSource;
