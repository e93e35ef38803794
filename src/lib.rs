// sparse-algebra: masked sparse matrix algebra with a JIT kernel cache
//
// Architecture:
// - types: element types and their runtime type codes
// - core: the matrix object (hypersparse, sparse, bitmap, full) with zombies
//   and pending tuples, operators, masks and the execution context
// - slice: work partitioning into balanced parallel tasks
// - compiler: kernel encoding, the memory/disk kernel cache and the backends
//   that build kernels (Cranelift JIT, interpreter)
// - ops: element-wise operations, masked assignment, reduction and selection

#[macro_use]
extern crate lazy_static;

pub mod compiler;
pub mod core;
pub mod ops;
pub mod slice;
pub mod types;

// Re-export commonly used items for convenience
pub use crate::core::{
    sparsity_control, BinaryOp, BinaryOpcode, Context, GraphBlasError, IndexList, IndexUnaryOp, Info,
    JitConfig, JitControl, MaskSource, Matrix, Monoid, Result, Sparsity,
};
pub use crate::ops::{
    assign, assign_scalar, col_subassign, ewise_add, ewise_mult, ewise_union, reduce_to_scalar, row_subassign,
    select, subassign, subassign_scalar, Descriptor, DescriptorField, DescriptorValue,
};
pub use types::{GraphBLASType, TypeCode};
