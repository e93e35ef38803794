// Core Layer: Index lists
//
// Row and column index sets for assignment: everything, a half-open range,
// a strided range, or an explicit list. Only explicit lists hold memory.

use crate::core::error::{GraphBlasError, Result};
use std::collections::HashMap;

/// A set of row or column indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexList {
    /// Every index `0..dim`
    All,
    /// `start..end`
    Range { start: usize, end: usize },
    /// `start, start+step, ...` below `end`
    Stride { start: usize, end: usize, step: usize },
    /// Explicit indices in the given order
    List(Vec<usize>),
}

impl IndexList {
    /// Check the list against a dimension
    pub(crate) fn resolve(&self, dim: usize) -> Result<Indices<'_>> {
        match self {
            IndexList::All => Ok(Indices::all(dim)),
            IndexList::Range { start, end } => {
                if start > end || *end > dim {
                    return Err(GraphBlasError::IndexOutOfBounds);
                }
                Ok(Indices::Stride {
                    start: *start,
                    step: 1,
                    len: end - start,
                })
            }
            IndexList::Stride { start, end, step } => {
                if *step == 0 {
                    return Err(GraphBlasError::InvalidValue);
                }
                if *end > dim || start > end {
                    return Err(GraphBlasError::IndexOutOfBounds);
                }
                Ok(Indices::Stride {
                    start: *start,
                    step: *step,
                    len: (end - start).div_ceil(*step),
                })
            }
            IndexList::List(list) => {
                let mut position = HashMap::with_capacity(list.len());
                for (k, &i) in list.iter().enumerate() {
                    if i >= dim {
                        return Err(GraphBlasError::IndexOutOfBounds);
                    }
                    if position.insert(i, k).is_some() {
                        return Err(GraphBlasError::InvalidIndex);
                    }
                }
                Ok(Indices::List { list, position })
            }
        }
    }
}

/// An index list checked against its dimension
#[derive(Debug, Clone)]
pub(crate) enum Indices<'a> {
    Stride { start: usize, step: usize, len: usize },
    List {
        list: &'a [usize],
        position: HashMap<usize, usize>,
    },
}

impl Indices<'static> {
    /// Every index `0..dim` in order
    pub fn all(dim: usize) -> Self {
        Indices::Stride {
            start: 0,
            step: 1,
            len: dim,
        }
    }
}

impl<'a> Indices<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Indices::Stride { len, .. } => *len,
            Indices::List { list, .. } => list.len(),
        }
    }

    /// The `k`-th index
    #[inline]
    pub fn get(&self, k: usize) -> usize {
        match self {
            Indices::Stride { start, step, .. } => start + k * step,
            Indices::List { list, .. } => list[k],
        }
    }

    /// Position `k` with `get(k) == i`, if `i` is in the set
    #[inline]
    pub fn position(&self, i: usize) -> Option<usize> {
        match self {
            Indices::Stride { start, step, len } => {
                if i < *start {
                    return None;
                }
                let offset = i - start;
                (offset % step == 0 && offset / step < *len).then(|| offset / step)
            }
            Indices::List { position, .. } => position.get(&i).copied(),
        }
    }

    /// Covers `0..dim` in order
    pub fn is_all(&self, dim: usize) -> bool {
        match self {
            Indices::Stride { start, step, len } => *start == 0 && *step == 1 && *len == dim,
            Indices::List { list, .. } => list.len() == dim && list.iter().enumerate().all(|(k, &i)| k == i),
        }
    }

    /// Indices increase with `k`
    pub fn is_monotone(&self) -> bool {
        match self {
            Indices::Stride { .. } => true,
            Indices::List { list, .. } => list.windows(2).all(|w| w[0] < w[1]),
        }
    }
}
