// Core Layer: IndexUnaryOp implementation
//
// Predicates used by select. Positional predicates carry their diagonal or
// row/column offset, value predicates carry the value they compare against.

use crate::core::binary_op::sanitize_name;
use crate::core::error::{GraphBlasError, Result};
use crate::types::GraphBLASType;

/// Index-aware predicate: keep = f(x, i, j)
#[derive(Debug, Clone)]
pub enum IndexUnaryOp<T: GraphBLASType> {
    /// Keep entries on or below diagonal `k` (j <= i + k)
    Tril(i64),
    /// Keep entries on or above diagonal `k` (j >= i + k)
    Triu(i64),
    /// Keep entries on diagonal `k`
    Diag(i64),
    /// Keep entries off diagonal `k`
    OffDiag(i64),
    RowLe(i64),
    RowGt(i64),
    ColLe(i64),
    ColGt(i64),
    ValueEq(T),
    ValueNe(T),
    ValueGt(T),
    ValueGe(T),
    ValueLt(T),
    ValueLe(T),
    /// Keep entries whose value casts to true
    NonZero,
    User {
        name: String,
        op: fn(T, usize, usize) -> bool,
    },
}

impl<T: GraphBLASType> IndexUnaryOp<T> {
    /// Create a user-defined predicate
    pub fn user(name: &str, op: fn(T, usize, usize) -> bool) -> Result<Self> {
        let name = sanitize_name(name);
        if name.is_empty() {
            return Err(GraphBlasError::InvalidValue);
        }
        Ok(IndexUnaryOp::User { name, op })
    }

    /// Apply the predicate to entry `x` at row `i`, column `j`
    #[inline]
    pub fn apply(&self, x: T, i: usize, j: usize) -> bool {
        let (ii, jj) = (i as i64, j as i64);
        match self {
            IndexUnaryOp::Tril(k) => jj <= ii + k,
            IndexUnaryOp::Triu(k) => jj >= ii + k,
            IndexUnaryOp::Diag(k) => jj == ii + k,
            IndexUnaryOp::OffDiag(k) => jj != ii + k,
            IndexUnaryOp::RowLe(k) => ii <= *k,
            IndexUnaryOp::RowGt(k) => ii > *k,
            IndexUnaryOp::ColLe(k) => jj <= *k,
            IndexUnaryOp::ColGt(k) => jj > *k,
            IndexUnaryOp::ValueEq(y) => x == *y,
            IndexUnaryOp::ValueNe(y) => x != *y,
            IndexUnaryOp::ValueGt(y) => x > *y,
            IndexUnaryOp::ValueGe(y) => x >= *y,
            IndexUnaryOp::ValueLt(y) => x < *y,
            IndexUnaryOp::ValueLe(y) => x <= *y,
            IndexUnaryOp::NonZero => x.to_bool(),
            IndexUnaryOp::User { op, .. } => op(x, i, j),
        }
    }

    /// True when the predicate never looks at the value
    pub fn is_positional(&self) -> bool {
        matches!(
            self,
            IndexUnaryOp::Tril(_)
                | IndexUnaryOp::Triu(_)
                | IndexUnaryOp::Diag(_)
                | IndexUnaryOp::OffDiag(_)
                | IndexUnaryOp::RowLe(_)
                | IndexUnaryOp::RowGt(_)
                | IndexUnaryOp::ColLe(_)
                | IndexUnaryOp::ColGt(_)
        )
    }

    /// Get operator name
    pub fn name(&self) -> &str {
        match self {
            IndexUnaryOp::Tril(_) => "tril",
            IndexUnaryOp::Triu(_) => "triu",
            IndexUnaryOp::Diag(_) => "diag",
            IndexUnaryOp::OffDiag(_) => "offdiag",
            IndexUnaryOp::RowLe(_) => "rowle",
            IndexUnaryOp::RowGt(_) => "rowgt",
            IndexUnaryOp::ColLe(_) => "colle",
            IndexUnaryOp::ColGt(_) => "colgt",
            IndexUnaryOp::ValueEq(_) => "valueeq",
            IndexUnaryOp::ValueNe(_) => "valuene",
            IndexUnaryOp::ValueGt(_) => "valuegt",
            IndexUnaryOp::ValueGe(_) => "valuege",
            IndexUnaryOp::ValueLt(_) => "valuelt",
            IndexUnaryOp::ValueLe(_) => "valuele",
            IndexUnaryOp::NonZero => "nonzero",
            IndexUnaryOp::User { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional() {
        let tril = IndexUnaryOp::<f64>::Tril(0);
        assert!(tril.apply(1.0, 2, 1));
        assert!(tril.apply(1.0, 2, 2));
        assert!(!tril.apply(1.0, 1, 2));
        assert!(IndexUnaryOp::<f64>::Triu(1).apply(0.0, 0, 1));
        assert!(!IndexUnaryOp::<f64>::Triu(1).apply(0.0, 1, 1));
        assert!(IndexUnaryOp::<i32>::Diag(-1).apply(0, 3, 2));
        assert!(tril.is_positional());
    }

    #[test]
    fn test_value_and_user() {
        assert!(IndexUnaryOp::ValueGt(2i32).apply(3, 0, 0));
        assert!(!IndexUnaryOp::<i32>::NonZero.apply(0, 0, 0));
        let even_row = IndexUnaryOp::<i32>::user("even row", |_, i, _| i % 2 == 0).unwrap();
        assert_eq!(even_row.name(), "even_row");
        assert!(even_row.apply(7, 4, 1));
        assert!(!even_row.is_positional());
    }
}
