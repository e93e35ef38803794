// Core Layer: Rust Error Types
// Idiomatic Rust error handling plus the closed set of status codes

use std::collections::TryReserveError;
use std::fmt;

/// Status code of a completed operation
///
/// `Success` and `NoValue` are not errors; everything else mirrors a
/// [`GraphBlasError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Info {
    Success,
    NoValue,
    UninitializedObject,
    InvalidValue,
    InvalidIndex,
    DomainMismatch,
    DimensionMismatch,
    OutputNotEmpty,
    NotImplemented,
    OutOfMemory,
    InsufficientSpace,
    InvalidObject,
    IndexOutOfBounds,
    EmptyObject,
    JitError,
    Panic,
}

impl Info {
    /// Collapse an operation result into its status code
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Info::Success,
            Err(e) => e.to_info(),
        }
    }

    /// Status of an optional lookup: a missing value is `NoValue`
    pub fn from_option<T>(result: &Result<Option<T>>) -> Self {
        match result {
            Ok(Some(_)) => Info::Success,
            Ok(None) => Info::NoValue,
            Err(e) => e.to_info(),
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, Info::Success | Info::NoValue)
    }
}

/// Rust-native error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphBlasError {
    /// Object has not been initialized
    UninitializedObject,
    /// Invalid parameter value
    InvalidValue,
    /// Invalid index
    InvalidIndex,
    /// Type mismatch between operands
    DomainMismatch,
    /// Dimension mismatch between operands
    DimensionMismatch,
    /// Output object must be empty
    OutputNotEmpty,
    /// Method not implemented
    NotImplemented,
    /// Memory allocation failed
    OutOfMemory,
    /// Insufficient space in output
    InsufficientSpace,
    /// Object is invalid or corrupted
    InvalidObject,
    /// Index exceeds valid bounds
    IndexOutOfBounds,
    /// Object is empty
    EmptyObject,
    /// Kernel could not be built, loaded or stored
    JitError(String),
    /// Panic occurred
    Panic(String),
}

impl GraphBlasError {
    /// Map the error to its status code
    pub fn to_info(&self) -> Info {
        match self {
            Self::UninitializedObject => Info::UninitializedObject,
            Self::InvalidValue => Info::InvalidValue,
            Self::InvalidIndex => Info::InvalidIndex,
            Self::DomainMismatch => Info::DomainMismatch,
            Self::DimensionMismatch => Info::DimensionMismatch,
            Self::OutputNotEmpty => Info::OutputNotEmpty,
            Self::NotImplemented => Info::NotImplemented,
            Self::OutOfMemory => Info::OutOfMemory,
            Self::InsufficientSpace => Info::InsufficientSpace,
            Self::InvalidObject => Info::InvalidObject,
            Self::IndexOutOfBounds => Info::IndexOutOfBounds,
            Self::EmptyObject => Info::EmptyObject,
            Self::JitError(_) => Info::JitError,
            Self::Panic(_) => Info::Panic,
        }
    }

    /// Build an error from a status code; `Success` and `NoValue` yield `None`
    pub fn from_info(info: Info) -> Option<Self> {
        match info {
            Info::Success | Info::NoValue => None,
            Info::UninitializedObject => Some(Self::UninitializedObject),
            Info::InvalidValue => Some(Self::InvalidValue),
            Info::InvalidIndex => Some(Self::InvalidIndex),
            Info::DomainMismatch => Some(Self::DomainMismatch),
            Info::DimensionMismatch => Some(Self::DimensionMismatch),
            Info::OutputNotEmpty => Some(Self::OutputNotEmpty),
            Info::NotImplemented => Some(Self::NotImplemented),
            Info::OutOfMemory => Some(Self::OutOfMemory),
            Info::InsufficientSpace => Some(Self::InsufficientSpace),
            Info::InvalidObject => Some(Self::InvalidObject),
            Info::IndexOutOfBounds => Some(Self::IndexOutOfBounds),
            Info::EmptyObject => Some(Self::EmptyObject),
            Info::JitError => Some(Self::JitError("unknown kernel failure".to_string())),
            Info::Panic => Some(Self::Panic("Unknown panic".to_string())),
        }
    }
}

impl fmt::Display for GraphBlasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UninitializedObject => write!(f, "Object has not been initialized"),
            Self::InvalidValue => write!(f, "Invalid parameter value"),
            Self::InvalidIndex => write!(f, "Invalid index"),
            Self::DomainMismatch => write!(f, "Type mismatch between operands"),
            Self::DimensionMismatch => write!(f, "Dimension mismatch between operands"),
            Self::OutputNotEmpty => write!(f, "Output object must be empty"),
            Self::NotImplemented => write!(f, "Method not implemented"),
            Self::OutOfMemory => write!(f, "Memory allocation failed"),
            Self::InsufficientSpace => write!(f, "Insufficient space in output"),
            Self::InvalidObject => write!(f, "Object is invalid or corrupted"),
            Self::IndexOutOfBounds => write!(f, "Index exceeds valid bounds"),
            Self::EmptyObject => write!(f, "Object is empty"),
            Self::JitError(msg) => write!(f, "JIT failure: {}", msg),
            Self::Panic(msg) => write!(f, "Panic: {}", msg),
        }
    }
}

impl std::error::Error for GraphBlasError {}

impl From<TryReserveError> for GraphBlasError {
    fn from(_: TryReserveError) -> Self {
        GraphBlasError::OutOfMemory
    }
}

/// Result type for GraphBLAS operations
pub type Result<T> = std::result::Result<T, GraphBlasError>;

/// Allocate a vector of `n` copies of `value`, reporting exhaustion as an error
pub(crate) fn try_filled<T: Clone>(n: usize, value: T) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(n)?;
    v.resize(n, value);
    Ok(v)
}

/// Allocate an empty vector with room for `n` elements
pub(crate) fn try_with_capacity<T>(n: usize) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(n)?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_round_trip() {
        let err = GraphBlasError::IndexOutOfBounds;
        assert_eq!(err.to_info(), Info::IndexOutOfBounds);
        assert_eq!(GraphBlasError::from_info(Info::IndexOutOfBounds), Some(err));
        assert_eq!(GraphBlasError::from_info(Info::NoValue), None);
    }

    #[test]
    fn test_info_from_option() {
        let missing: Result<Option<i32>> = Ok(None);
        assert_eq!(Info::from_option(&missing), Info::NoValue);
        assert!(!Info::NoValue.is_error());
        let failed: Result<()> = Err(GraphBlasError::JitError("boom".into()));
        assert_eq!(Info::from_result(&failed), Info::JitError);
    }

    #[test]
    fn test_reserve_failure_is_out_of_memory() {
        let mut v: Vec<u64> = Vec::new();
        let err = v.try_reserve_exact(usize::MAX).unwrap_err();
        assert_eq!(GraphBlasError::from(err), GraphBlasError::OutOfMemory);
        assert_eq!(try_filled(usize::MAX, 0u64), Err(GraphBlasError::OutOfMemory));
    }
}
