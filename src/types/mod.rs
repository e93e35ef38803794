// Type System: Bridge between runtime type codes and compile-time generic types
//
// Kernels are specialized per element type at runtime (the JIT key carries a
// type code) while the Rust API is generic. This module bridges the two:
// 1. TypeCode - Runtime enum representation, stable numbering for kernel keys
// 2. GraphBLASType trait - Compile-time type information and scalar semantics

use std::fmt;

/// Runtime type code enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    /// Boolean type
    Bool,
    /// Signed 8-bit integer
    Int8,
    /// Signed 16-bit integer
    Int16,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// Unsigned 8-bit integer
    Uint8,
    /// Unsigned 16-bit integer
    Uint16,
    /// Unsigned 32-bit integer
    Uint32,
    /// Unsigned 64-bit integer
    Uint64,
    /// 32-bit floating point
    Fp32,
    /// 64-bit floating point
    Fp64,
}

const ALL_TYPES: [TypeCode; 11] = [
    TypeCode::Bool,
    TypeCode::Int8,
    TypeCode::Int16,
    TypeCode::Int32,
    TypeCode::Int64,
    TypeCode::Uint8,
    TypeCode::Uint16,
    TypeCode::Uint32,
    TypeCode::Uint64,
    TypeCode::Fp32,
    TypeCode::Fp64,
];

impl TypeCode {
    /// Get the size in bytes for this type code
    pub fn size(&self) -> usize {
        match self {
            TypeCode::Bool => std::mem::size_of::<bool>(),
            TypeCode::Int8 => std::mem::size_of::<i8>(),
            TypeCode::Int16 => std::mem::size_of::<i16>(),
            TypeCode::Int32 => std::mem::size_of::<i32>(),
            TypeCode::Int64 => std::mem::size_of::<i64>(),
            TypeCode::Uint8 => std::mem::size_of::<u8>(),
            TypeCode::Uint16 => std::mem::size_of::<u16>(),
            TypeCode::Uint32 => std::mem::size_of::<u32>(),
            TypeCode::Uint64 => std::mem::size_of::<u64>(),
            TypeCode::Fp32 => std::mem::size_of::<f32>(),
            TypeCode::Fp64 => std::mem::size_of::<f64>(),
        }
    }

    /// Get human-readable name for this type code
    pub fn name(&self) -> &'static str {
        match self {
            TypeCode::Bool => "bool",
            TypeCode::Int8 => "int8",
            TypeCode::Int16 => "int16",
            TypeCode::Int32 => "int32",
            TypeCode::Int64 => "int64",
            TypeCode::Uint8 => "uint8",
            TypeCode::Uint16 => "uint16",
            TypeCode::Uint32 => "uint32",
            TypeCode::Uint64 => "uint64",
            TypeCode::Fp32 => "float32",
            TypeCode::Fp64 => "float64",
        }
    }

    /// Stable 4-bit code used inside kernel keys (never 0)
    pub fn code(&self) -> u64 {
        match self {
            TypeCode::Bool => 1,
            TypeCode::Int8 => 2,
            TypeCode::Int16 => 3,
            TypeCode::Int32 => 4,
            TypeCode::Int64 => 5,
            TypeCode::Uint8 => 6,
            TypeCode::Uint16 => 7,
            TypeCode::Uint32 => 8,
            TypeCode::Uint64 => 9,
            TypeCode::Fp32 => 10,
            TypeCode::Fp64 => 11,
        }
    }

    /// Inverse of [`TypeCode::code`]
    pub fn from_code(code: u64) -> Option<Self> {
        ALL_TYPES.iter().copied().find(|t| t.code() == code)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, TypeCode::Fp32 | TypeCode::Fp64)
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            TypeCode::Int8 | TypeCode::Int16 | TypeCode::Int32 | TypeCode::Int64
        )
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Trait for element types of matrices
///
/// Carries the runtime type code plus the scalar semantics of the built-in
/// operators. Integer arithmetic wraps; integer division by zero saturates
/// (0/0 is 0, x/0 is the type's max or min by the sign of x).
pub trait GraphBLASType:
    Copy + Send + Sync + PartialEq + PartialOrd + Default + fmt::Debug + 'static
{
    /// The runtime type code for this type
    const TYPE_CODE: TypeCode;

    /// Get human-readable type name
    fn type_name() -> &'static str {
        Self::TYPE_CODE.name()
    }

    /// Multiplicative identity; the value produced by the `Pair` operator
    fn one() -> Self;

    /// Lowest representable value (identity of `Max`)
    fn lowest() -> Self;

    /// Highest representable value (identity of `Min`)
    fn highest() -> Self;

    /// Value of the type cast to boolean (non-zero is true)
    fn to_bool(self) -> bool;

    /// Boolean cast to the type (0 or 1)
    fn from_bool(b: bool) -> Self;

    fn plus(self, y: Self) -> Self;
    fn minus(self, y: Self) -> Self;
    fn times(self, y: Self) -> Self;
    fn div(self, y: Self) -> Self;
    fn min_of(self, y: Self) -> Self;
    fn max_of(self, y: Self) -> Self;
}

macro_rules! impl_signed {
    ($($t:ty => $code:ident),*) => {$(
        impl GraphBLASType for $t {
            const TYPE_CODE: TypeCode = TypeCode::$code;
            fn one() -> Self { 1 }
            fn lowest() -> Self { <$t>::MIN }
            fn highest() -> Self { <$t>::MAX }
            fn to_bool(self) -> bool { self != 0 }
            fn from_bool(b: bool) -> Self { b as $t }
            fn plus(self, y: Self) -> Self { self.wrapping_add(y) }
            fn minus(self, y: Self) -> Self { self.wrapping_sub(y) }
            fn times(self, y: Self) -> Self { self.wrapping_mul(y) }
            fn div(self, y: Self) -> Self {
                if y == 0 {
                    if self == 0 { 0 } else if self > 0 { <$t>::MAX } else { <$t>::MIN }
                } else {
                    self.wrapping_div(y)
                }
            }
            fn min_of(self, y: Self) -> Self { std::cmp::min(self, y) }
            fn max_of(self, y: Self) -> Self { std::cmp::max(self, y) }
        }
    )*};
}

macro_rules! impl_unsigned {
    ($($t:ty => $code:ident),*) => {$(
        impl GraphBLASType for $t {
            const TYPE_CODE: TypeCode = TypeCode::$code;
            fn one() -> Self { 1 }
            fn lowest() -> Self { 0 }
            fn highest() -> Self { <$t>::MAX }
            fn to_bool(self) -> bool { self != 0 }
            fn from_bool(b: bool) -> Self { b as $t }
            fn plus(self, y: Self) -> Self { self.wrapping_add(y) }
            fn minus(self, y: Self) -> Self { self.wrapping_sub(y) }
            fn times(self, y: Self) -> Self { self.wrapping_mul(y) }
            fn div(self, y: Self) -> Self {
                if y == 0 {
                    if self == 0 { 0 } else { <$t>::MAX }
                } else {
                    self / y
                }
            }
            fn min_of(self, y: Self) -> Self { std::cmp::min(self, y) }
            fn max_of(self, y: Self) -> Self { std::cmp::max(self, y) }
        }
    )*};
}

macro_rules! impl_float {
    ($($t:ty => $code:ident),*) => {$(
        impl GraphBLASType for $t {
            const TYPE_CODE: TypeCode = TypeCode::$code;
            fn one() -> Self { 1.0 }
            fn lowest() -> Self { <$t>::NEG_INFINITY }
            fn highest() -> Self { <$t>::INFINITY }
            fn to_bool(self) -> bool { self != 0.0 }
            fn from_bool(b: bool) -> Self { if b { 1.0 } else { 0.0 } }
            fn plus(self, y: Self) -> Self { self + y }
            fn minus(self, y: Self) -> Self { self - y }
            fn times(self, y: Self) -> Self { self * y }
            fn div(self, y: Self) -> Self { self / y }
            // NaN is omitted, as fmin/fmax do
            fn min_of(self, y: Self) -> Self { self.min(y) }
            fn max_of(self, y: Self) -> Self { self.max(y) }
        }
    )*};
}

impl_signed!(i8 => Int8, i16 => Int16, i32 => Int32, i64 => Int64);
impl_unsigned!(u8 => Uint8, u16 => Uint16, u32 => Uint32, u64 => Uint64);
impl_float!(f32 => Fp32, f64 => Fp64);

// Boolean arithmetic follows the logical operators: plus is or, times is and,
// minus is xor, min is and, max is or, division returns the first operand.
impl GraphBLASType for bool {
    const TYPE_CODE: TypeCode = TypeCode::Bool;
    fn one() -> Self {
        true
    }
    fn lowest() -> Self {
        false
    }
    fn highest() -> Self {
        true
    }
    fn to_bool(self) -> bool {
        self
    }
    fn from_bool(b: bool) -> Self {
        b
    }
    fn plus(self, y: Self) -> Self {
        self | y
    }
    fn minus(self, y: Self) -> Self {
        self ^ y
    }
    fn times(self, y: Self) -> Self {
        self & y
    }
    fn div(self, _y: Self) -> Self {
        self
    }
    fn min_of(self, y: Self) -> Self {
        self & y
    }
    fn max_of(self, y: Self) -> Self {
        self | y
    }
}
