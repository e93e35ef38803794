// Factory kernels: operator-specialized instances of the generic loops
//
// A loop that applies a binary operator implements `OpKernel`. For a built-in
// operator `factory` instantiates the loop with a closure the compiler inlines;
// for a user operator it hands the loop back and `dispatch` runs the generic
// instance that calls the operator through its function pointer.

use crate::core::binary_op::{BinaryOp, BinaryOpcode};
use crate::types::GraphBLASType;

/// A loop parameterized by the binary operator it applies
pub(crate) trait OpKernel<T> {
    type Output;

    fn run<F>(self, f: F) -> Self::Output
    where
        F: Fn(T, T) -> T + Send + Sync + Copy;
}

/// Run `k` with the built-in operator `opcode` inlined
///
/// Gives `k` back when there is no factory instance (user operators).
pub(crate) fn factory<T, K>(opcode: Option<BinaryOpcode>, k: K) -> Result<K::Output, K>
where
    T: GraphBLASType,
    K: OpKernel<T>,
{
    let code = match opcode {
        Some(code) => code,
        None => return Err(k),
    };
    Ok(match code {
        BinaryOpcode::First => k.run(|x: T, _y: T| x),
        BinaryOpcode::Second => k.run(|_x: T, y: T| y),
        BinaryOpcode::Any => k.run(|_x: T, y: T| y),
        BinaryOpcode::Pair => k.run(|_x: T, _y: T| T::one()),
        BinaryOpcode::Min => k.run(|x: T, y: T| x.min_of(y)),
        BinaryOpcode::Max => k.run(|x: T, y: T| x.max_of(y)),
        BinaryOpcode::Plus => k.run(|x: T, y: T| x.plus(y)),
        BinaryOpcode::Minus => k.run(|x: T, y: T| x.minus(y)),
        BinaryOpcode::Times => k.run(|x: T, y: T| x.times(y)),
        BinaryOpcode::Div => k.run(|x: T, y: T| x.div(y)),
        BinaryOpcode::LOr => k.run(|x: T, y: T| T::from_bool(x.to_bool() || y.to_bool())),
        BinaryOpcode::LAnd => k.run(|x: T, y: T| T::from_bool(x.to_bool() && y.to_bool())),
        BinaryOpcode::LXor => k.run(|x: T, y: T| T::from_bool(x.to_bool() != y.to_bool())),
        BinaryOpcode::IsEq => k.run(|x: T, y: T| T::from_bool(x == y)),
        BinaryOpcode::IsNe => k.run(|x: T, y: T| T::from_bool(x != y)),
        BinaryOpcode::IsGt => k.run(|x: T, y: T| T::from_bool(x > y)),
        BinaryOpcode::IsLt => k.run(|x: T, y: T| T::from_bool(x < y)),
        BinaryOpcode::IsGe => k.run(|x: T, y: T| T::from_bool(x >= y)),
        BinaryOpcode::IsLe => k.run(|x: T, y: T| T::from_bool(x <= y)),
    })
}

/// Run `k` with `op`: factory instance if there is one, generic otherwise
pub(crate) fn dispatch<T, K>(op: &BinaryOp<T>, k: K) -> K::Output
where
    T: GraphBLASType,
    K: OpKernel<T>,
{
    match factory(op.opcode(), k) {
        Ok(out) => out,
        Err(k) => {
            log::trace!("generic kernel for operator {}", op.name());
            k.run(op.function())
        }
    }
}
