// Core Layer: Matrix, operators and execution context
//
// The matrix object in its four layouts with zombies and pending tuples, the
// operators applied to its entries, masks, index lists, and the context that
// carries threading and JIT settings into every operation.

pub mod binary_op;
pub mod context;
pub mod convert;
pub mod error;
pub mod index_list;
pub mod index_unary_op;
pub mod mask;
pub mod matrix;
pub mod monoid;
pub mod pending;
pub mod view;
pub mod wait;

// Re-export commonly used types
pub use binary_op::{BinaryOp, BinaryOpcode};
pub use context::{Context, JitConfig, JitControl};
pub use error::{GraphBlasError, Info, Result};
pub use index_list::IndexList;
pub use index_unary_op::IndexUnaryOp;
pub use mask::MaskSource;
pub use matrix::{sparsity_control, Matrix, Sparsity};
pub use monoid::Monoid;
