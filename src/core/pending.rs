// Core Layer: Pending tuples
//
// Insertions into a sparse or hypersparse matrix are buffered here and merged
// into the compressed structure when the matrix is finalized.

use crate::core::binary_op::BinaryOp;
use crate::core::error::{try_with_capacity, GraphBlasError, Result};
use crate::types::GraphBLASType;
use rayon::prelude::*;

// Below this many tuples the assembly sort stays on the calling thread
const PARALLEL_SORT_MIN: usize = 1 << 14;

/// How tuples with the same (row, col) are resolved
#[derive(Debug, Clone)]
pub(crate) enum Duplicates<T: GraphBLASType> {
    /// The tuple inserted last wins
    LastWins,
    /// Values are combined left to right in insertion order
    Combine(BinaryOp<T>),
    /// Duplicates are an error
    Reject,
}

impl<T: GraphBLASType> Duplicates<T> {
    /// Resolve an existing value with a newer one
    #[inline]
    pub(crate) fn resolve(&self, older: T, newer: T) -> T {
        match self {
            Duplicates::Combine(op) => op.apply(older, newer),
            Duplicates::LastWins | Duplicates::Reject => newer,
        }
    }
}

/// Append-only buffer of deferred insertions
#[derive(Debug, Clone)]
pub(crate) struct PendingTuples<T: GraphBLASType> {
    rows: Vec<usize>,
    cols: Vec<usize>,
    vals: Vec<T>,
    dup: Duplicates<T>,
}

impl<T: GraphBLASType> PendingTuples<T> {
    pub(crate) fn new() -> Self {
        Self {
            rows: Vec::new(),
            cols: Vec::new(),
            vals: Vec::new(),
            dup: Duplicates::LastWins,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub(crate) fn dup(&self) -> &Duplicates<T> {
        &self.dup
    }

    pub(crate) fn set_dup(&mut self, dup: Duplicates<T>) {
        self.dup = dup;
    }

    pub(crate) fn values(&self) -> &[T] {
        &self.vals
    }

    /// Reserve room for `additional` more tuples
    pub(crate) fn reserve(&mut self, additional: usize) -> Result<()> {
        self.rows.try_reserve(additional)?;
        self.cols.try_reserve(additional)?;
        self.vals.try_reserve(additional)?;
        Ok(())
    }

    pub(crate) fn push(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        self.reserve(1)?;
        self.rows.push(row);
        self.cols.push(col);
        self.vals.push(value);
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.rows.clear();
        self.cols.clear();
        self.vals.clear();
        self.dup = Duplicates::LastWins;
    }

    /// Sort by (col, row) and fold duplicates in insertion order
    ///
    /// Returns `(row, col, value)` triples with unique, column-major sorted keys.
    pub(crate) fn assemble(&self) -> Result<Vec<(usize, usize, T)>> {
        let n = self.len();
        let mut order: Vec<usize> = try_with_capacity(n)?;
        order.extend(0..n);
        // both sorts are stable, so equal keys keep insertion order
        if n >= PARALLEL_SORT_MIN {
            order.par_sort_by_key(|&k| (self.cols[k], self.rows[k]));
        } else {
            order.sort_by_key(|&k| (self.cols[k], self.rows[k]));
        }

        let mut out: Vec<(usize, usize, T)> = try_with_capacity(n)?;
        for k in order {
            let (i, j, x) = (self.rows[k], self.cols[k], self.vals[k]);
            match out.last_mut() {
                Some(last) if last.0 == i && last.1 == j => {
                    if matches!(self.dup, Duplicates::Reject) {
                        log::debug!("pending: duplicate entry ({}, {}) rejected", i, j);
                        return Err(GraphBlasError::InvalidValue);
                    }
                    last.2 = self.dup.resolve(last.2, x);
                }
                _ => out.push((i, j, x)),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_sorts_column_major() {
        let mut pending = PendingTuples::<i32>::new();
        pending.push(2, 1, 10).unwrap();
        pending.push(0, 1, 20).unwrap();
        pending.push(5, 0, 30).unwrap();
        let tuples = pending.assemble().unwrap();
        assert_eq!(tuples, vec![(5, 0, 30), (0, 1, 20), (2, 1, 10)]);
    }

    #[test]
    fn test_last_wins() {
        let mut pending = PendingTuples::<i32>::new();
        pending.push(1, 1, 1).unwrap();
        pending.push(1, 1, 2).unwrap();
        pending.push(1, 1, 3).unwrap();
        assert_eq!(pending.assemble().unwrap(), vec![(1, 1, 3)]);
    }

    #[test]
    fn test_combine_in_insertion_order() {
        let mut pending = PendingTuples::<i32>::new();
        pending.set_dup(Duplicates::Combine(BinaryOp::builtin(
            crate::core::binary_op::BinaryOpcode::Minus,
        )));
        pending.push(0, 0, 10).unwrap();
        pending.push(0, 0, 3).unwrap();
        pending.push(0, 0, 2).unwrap();
        // (10 - 3) - 2
        assert_eq!(pending.assemble().unwrap(), vec![(0, 0, 5)]);
    }

    #[test]
    fn test_reject_duplicates() {
        let mut pending = PendingTuples::<f64>::new();
        pending.set_dup(Duplicates::Reject);
        pending.push(0, 0, 1.0).unwrap();
        pending.push(0, 0, 1.0).unwrap();
        assert_eq!(pending.assemble().unwrap_err(), GraphBlasError::InvalidValue);
    }
}
