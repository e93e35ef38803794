// Core Layer: BinaryOp implementation
//
// Built-in operators are identified by an opcode so kernels can inline them;
// user operators carry a name, their definition text and a content hash that
// participates in the kernel cache key.

use crate::core::error::{GraphBlasError, Result};
use crate::types::GraphBLASType;
use sha2::{Digest, Sha256};
use std::fmt;

/// Built-in binary operator codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOpcode {
    First,
    Second,
    Any,
    Pair,
    Min,
    Max,
    Plus,
    Minus,
    Times,
    Div,
    LOr,
    LAnd,
    LXor,
    /// Comparisons returning 1 or 0 in the operand type
    IsEq,
    IsNe,
    IsGt,
    IsLt,
    IsGe,
    IsLe,
}

const ALL_OPCODES: [BinaryOpcode; 19] = [
    BinaryOpcode::First,
    BinaryOpcode::Second,
    BinaryOpcode::Any,
    BinaryOpcode::Pair,
    BinaryOpcode::Min,
    BinaryOpcode::Max,
    BinaryOpcode::Plus,
    BinaryOpcode::Minus,
    BinaryOpcode::Times,
    BinaryOpcode::Div,
    BinaryOpcode::LOr,
    BinaryOpcode::LAnd,
    BinaryOpcode::LXor,
    BinaryOpcode::IsEq,
    BinaryOpcode::IsNe,
    BinaryOpcode::IsGt,
    BinaryOpcode::IsLt,
    BinaryOpcode::IsGe,
    BinaryOpcode::IsLe,
];

impl BinaryOpcode {
    /// Evaluate the operator on two scalars
    #[inline]
    pub fn apply<T: GraphBLASType>(self, x: T, y: T) -> T {
        match self {
            BinaryOpcode::First => x,
            BinaryOpcode::Second | BinaryOpcode::Any => y,
            BinaryOpcode::Pair => T::one(),
            BinaryOpcode::Min => x.min_of(y),
            BinaryOpcode::Max => x.max_of(y),
            BinaryOpcode::Plus => x.plus(y),
            BinaryOpcode::Minus => x.minus(y),
            BinaryOpcode::Times => x.times(y),
            BinaryOpcode::Div => x.div(y),
            BinaryOpcode::LOr => T::from_bool(x.to_bool() || y.to_bool()),
            BinaryOpcode::LAnd => T::from_bool(x.to_bool() && y.to_bool()),
            BinaryOpcode::LXor => T::from_bool(x.to_bool() != y.to_bool()),
            BinaryOpcode::IsEq => T::from_bool(x == y),
            BinaryOpcode::IsNe => T::from_bool(x != y),
            BinaryOpcode::IsGt => T::from_bool(x > y),
            BinaryOpcode::IsLt => T::from_bool(x < y),
            BinaryOpcode::IsGe => T::from_bool(x >= y),
            BinaryOpcode::IsLe => T::from_bool(x <= y),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BinaryOpcode::First => "first",
            BinaryOpcode::Second => "second",
            BinaryOpcode::Any => "any",
            BinaryOpcode::Pair => "pair",
            BinaryOpcode::Min => "min",
            BinaryOpcode::Max => "max",
            BinaryOpcode::Plus => "plus",
            BinaryOpcode::Minus => "minus",
            BinaryOpcode::Times => "times",
            BinaryOpcode::Div => "div",
            BinaryOpcode::LOr => "lor",
            BinaryOpcode::LAnd => "land",
            BinaryOpcode::LXor => "lxor",
            BinaryOpcode::IsEq => "iseq",
            BinaryOpcode::IsNe => "isne",
            BinaryOpcode::IsGt => "isgt",
            BinaryOpcode::IsLt => "islt",
            BinaryOpcode::IsGe => "isge",
            BinaryOpcode::IsLe => "isle",
        }
    }

    /// Stable 6-bit code used inside kernel keys (never 0, 0x3F is reserved)
    pub fn code(self) -> u64 {
        ALL_OPCODES
            .iter()
            .position(|&op| op == self)
            .map(|k| k as u64 + 1)
            .unwrap_or(0)
    }

    pub fn from_code(code: u64) -> Option<Self> {
        if code == 0 {
            return None;
        }
        ALL_OPCODES.get(code as usize - 1).copied()
    }
}

#[derive(Debug, Clone)]
enum OpKind {
    Builtin(BinaryOpcode),
    User {
        name: String,
        definition: String,
        hash: u64,
    },
}

/// Binary operator: z = f(x, y)
pub struct BinaryOp<T: GraphBLASType> {
    kind: OpKind,
    /// Function pointer: (x, y) -> z
    op: fn(T, T) -> T,
}

impl<T: GraphBLASType> Clone for BinaryOp<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            op: self.op,
        }
    }
}

impl<T: GraphBLASType> fmt::Debug for BinaryOp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BinaryOp({}_{})", self.name(), T::type_name())
    }
}

macro_rules! builtin_fn {
    ($code:expr) => {
        match $code {
            BinaryOpcode::First => |x: T, _y: T| x,
            BinaryOpcode::Second => |_x: T, y: T| y,
            BinaryOpcode::Any => |_x: T, y: T| y,
            BinaryOpcode::Pair => |_x: T, _y: T| T::one(),
            BinaryOpcode::Min => |x: T, y: T| x.min_of(y),
            BinaryOpcode::Max => |x: T, y: T| x.max_of(y),
            BinaryOpcode::Plus => |x: T, y: T| x.plus(y),
            BinaryOpcode::Minus => |x: T, y: T| x.minus(y),
            BinaryOpcode::Times => |x: T, y: T| x.times(y),
            BinaryOpcode::Div => |x: T, y: T| x.div(y),
            BinaryOpcode::LOr => |x: T, y: T| BinaryOpcode::LOr.apply(x, y),
            BinaryOpcode::LAnd => |x: T, y: T| BinaryOpcode::LAnd.apply(x, y),
            BinaryOpcode::LXor => |x: T, y: T| BinaryOpcode::LXor.apply(x, y),
            BinaryOpcode::IsEq => |x: T, y: T| BinaryOpcode::IsEq.apply(x, y),
            BinaryOpcode::IsNe => |x: T, y: T| BinaryOpcode::IsNe.apply(x, y),
            BinaryOpcode::IsGt => |x: T, y: T| BinaryOpcode::IsGt.apply(x, y),
            BinaryOpcode::IsLt => |x: T, y: T| BinaryOpcode::IsLt.apply(x, y),
            BinaryOpcode::IsGe => |x: T, y: T| BinaryOpcode::IsGe.apply(x, y),
            BinaryOpcode::IsLe => |x: T, y: T| BinaryOpcode::IsLe.apply(x, y),
        }
    };
}

impl<T: GraphBLASType> BinaryOp<T> {
    /// Create a built-in operator
    pub fn builtin(code: BinaryOpcode) -> Self {
        let op: fn(T, T) -> T = builtin_fn!(code);
        Self {
            kind: OpKind::Builtin(code),
            op,
        }
    }

    /// Create a user-defined operator
    ///
    /// `definition` is the operator's source text; two operators with the same
    /// name but different definitions never share a compiled kernel.
    pub fn user(name: &str, definition: &str, op: fn(T, T) -> T) -> Result<Self> {
        let name = sanitize_name(name);
        if name.is_empty() {
            return Err(GraphBlasError::InvalidValue);
        }
        let hash = name_hash(&name);
        Ok(Self {
            kind: OpKind::User {
                name,
                definition: definition.to_string(),
                hash,
            },
            op,
        })
    }

    pub fn plus() -> Self {
        Self::builtin(BinaryOpcode::Plus)
    }

    pub fn times() -> Self {
        Self::builtin(BinaryOpcode::Times)
    }

    pub fn min() -> Self {
        Self::builtin(BinaryOpcode::Min)
    }

    pub fn max() -> Self {
        Self::builtin(BinaryOpcode::Max)
    }

    pub fn first() -> Self {
        Self::builtin(BinaryOpcode::First)
    }

    pub fn second() -> Self {
        Self::builtin(BinaryOpcode::Second)
    }

    /// Apply the operation
    #[inline]
    pub fn apply(&self, x: T, y: T) -> T {
        (self.op)(x, y)
    }

    /// Function pointer for the generic (non-inlined) path
    pub fn function(&self) -> fn(T, T) -> T {
        self.op
    }

    /// Opcode of a built-in operator, `None` for user operators
    pub fn opcode(&self) -> Option<BinaryOpcode> {
        match &self.kind {
            OpKind::Builtin(code) => Some(*code),
            OpKind::User { .. } => None,
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.opcode().is_some()
    }

    /// Get operator name
    pub fn name(&self) -> &str {
        match &self.kind {
            OpKind::Builtin(code) => code.name(),
            OpKind::User { name, .. } => name,
        }
    }

    /// Definition text (empty for built-ins)
    pub fn definition(&self) -> &str {
        match &self.kind {
            OpKind::Builtin(_) => "",
            OpKind::User { definition, .. } => definition,
        }
    }

    /// Content hash of the operator; 0 for built-ins
    pub fn hash(&self) -> u64 {
        match &self.kind {
            OpKind::Builtin(_) => 0,
            OpKind::User { hash, .. } => *hash,
        }
    }
}

/// Keep `[A-Za-z0-9_]` so the name is usable inside kernel file names
pub(crate) fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn name_hash(name: &str) -> u64 {
    let digest = Sha256::digest(name.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    // 0 is reserved for built-in operators
    u64::from_le_bytes(bytes).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ops() {
        assert_eq!(BinaryOp::<i32>::plus().apply(3, 4), 7);
        assert_eq!(BinaryOp::<i32>::builtin(BinaryOpcode::Pair).apply(3, 4), 1);
        assert_eq!(BinaryOp::<f64>::min().apply(3.0, -4.0), -4.0);
        assert_eq!(BinaryOp::<u8>::builtin(BinaryOpcode::LXor).apply(3, 0), 1);
        assert_eq!(BinaryOp::<i32>::builtin(BinaryOpcode::IsLt).apply(-3, 4), 1);
        assert_eq!(BinaryOp::<u16>::builtin(BinaryOpcode::IsGe).apply(3, 4), 0);
        assert_eq!(BinaryOp::<f64>::builtin(BinaryOpcode::IsNe).apply(f64::NAN, f64::NAN), 1.0);
        assert_eq!(BinaryOp::<f64>::builtin(BinaryOpcode::IsEq).apply(2.5, 2.5), 1.0);
        assert!(BinaryOp::<bool>::builtin(BinaryOpcode::IsGt).apply(true, false));
        assert_eq!(BinaryOpcode::IsLe.name(), "isle");
        assert!(BinaryOp::<f32>::times().is_builtin());
        assert_eq!(BinaryOp::<f32>::times().hash(), 0);
    }

    #[test]
    fn test_opcode_codes_round_trip() {
        for op in ALL_OPCODES {
            let code = op.code();
            assert!(code > 0 && code < 0x3F);
            assert_eq!(BinaryOpcode::from_code(code), Some(op));
        }
    }

    #[test]
    fn test_user_op() {
        let op = BinaryOp::<i64>::user("my op!", "z = 2*x + y", |x, y| 2 * x + y).unwrap();
        assert_eq!(op.name(), "my_op_");
        assert_eq!(op.apply(3, 1), 7);
        assert_eq!(op.opcode(), None);
        assert_ne!(op.hash(), 0);
        assert_eq!(op.definition(), "z = 2*x + y");

        let same_name = BinaryOp::<i64>::user("my op!", "z = x", |x, _| x).unwrap();
        assert_eq!(op.hash(), same_name.hash());
    }

    #[test]
    fn test_empty_user_name_rejected() {
        let result = BinaryOp::<i32>::user("", "z = x", |x, _| x);
        assert_eq!(result.unwrap_err(), GraphBlasError::InvalidValue);
    }
}
