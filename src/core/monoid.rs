// Core Layer: Monoid implementation

use crate::core::binary_op::{BinaryOp, BinaryOpcode};
use crate::types::GraphBLASType;

/// Monoid: Associative binary operation with identity element
///
/// A monoid consists of:
/// - Binary operation that is associative: (a ⊕ b) ⊕ c = a ⊕ (b ⊕ c)
/// - Identity element: a ⊕ identity = identity ⊕ a = a
#[derive(Debug, Clone)]
pub struct Monoid<T: GraphBLASType> {
    op: BinaryOp<T>,
    identity: T,
}

impl<T: GraphBLASType> Monoid<T> {
    /// Create a new monoid from an operator and its identity
    pub fn new(op: BinaryOp<T>, identity: T) -> Self {
        Self { op, identity }
    }

    pub fn plus() -> Self {
        Self::new(BinaryOp::plus(), T::default())
    }

    pub fn times() -> Self {
        Self::new(BinaryOp::times(), T::one())
    }

    pub fn min() -> Self {
        Self::new(BinaryOp::min(), T::highest())
    }

    pub fn max() -> Self {
        Self::new(BinaryOp::max(), T::lowest())
    }

    pub fn any() -> Self {
        Self::new(BinaryOp::builtin(BinaryOpcode::Any), T::default())
    }

    pub fn lor() -> Self {
        Self::new(BinaryOp::builtin(BinaryOpcode::LOr), T::from_bool(false))
    }

    pub fn land() -> Self {
        Self::new(BinaryOp::builtin(BinaryOpcode::LAnd), T::from_bool(true))
    }

    /// Apply the monoid operation
    #[inline]
    pub fn apply(&self, a: T, b: T) -> T {
        self.op.apply(a, b)
    }

    /// Get identity element
    pub fn identity(&self) -> T {
        self.identity
    }

    pub fn op(&self) -> &BinaryOp<T> {
        &self.op
    }

    /// Get monoid name
    pub fn name(&self) -> &str {
        self.op.name()
    }
}
