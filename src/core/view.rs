// Core Layer: Read-only view of a finalized matrix
//
// Switches on the storage layout once and exposes the four layouts through a
// single vector/position vocabulary: vector k is column `vector(k)`, its
// entries are positions `range(k)`, position `pos` has row `row(pos)`, is
// `present(pos)` and holds `value(pos)`. Sparse layouts list only present
// entries; bitmap and full layouts enumerate every cell of the column.

use crate::core::error::Result;
use crate::core::matrix::{Matrix, Sparsity, Storage};
use crate::types::GraphBLASType;
use std::borrow::Cow;
use std::ops::Range;

/// Borrowed slices of one matrix
#[derive(Debug, Clone, Copy)]
pub(crate) struct MatrixView<'a, T> {
    pub vlen: usize,
    pub vdim: usize,
    pub h: Option<&'a [usize]>,
    pub p: Option<&'a [usize]>,
    pub i: Option<&'a [usize]>,
    pub b: Option<&'a [u8]>,
    pub x: &'a [T],
    pub iso: bool,
    pub nvals: usize,
}

impl<T: GraphBLASType> Matrix<T> {
    /// View of the matrix; the matrix must be finalized
    pub(crate) fn view(&self) -> MatrixView<'_, T> {
        debug_assert!(!self.has_pending_work(), "view of a matrix with pending work");
        let (h, p, i, b, x): (
            Option<&[usize]>,
            Option<&[usize]>,
            Option<&[usize]>,
            Option<&[u8]>,
            &[T],
        ) = match &self.storage {
            Storage::Hypersparse { h, p, i, x } => (
                Some(h.as_slice()),
                Some(p.as_slice()),
                Some(i.as_slice()),
                None,
                x.as_slice(),
            ),
            Storage::Sparse { p, i, x } => {
                (None, Some(p.as_slice()), Some(i.as_slice()), None, x.as_slice())
            }
            Storage::Bitmap { b, x, .. } => (None, None, None, Some(b.as_slice()), x.as_slice()),
            Storage::Full { x } => (None, None, None, None, x.as_slice()),
        };
        MatrixView {
            vlen: self.nrows,
            vdim: self.ncols,
            h,
            p,
            i,
            b,
            x,
            iso: self.iso,
            nvals: self.live_nvals(),
        }
    }
}

impl<'a, T: GraphBLASType> MatrixView<'a, T> {
    pub fn sparsity(&self) -> Sparsity {
        match (self.h, self.p, self.b) {
            (Some(_), _, _) => Sparsity::Hypersparse,
            (None, Some(_), _) => Sparsity::Sparse,
            (None, None, Some(_)) => Sparsity::Bitmap,
            (None, None, None) => Sparsity::Full,
        }
    }

    #[inline]
    pub fn is_sparse(&self) -> bool {
        self.p.is_some()
    }

    /// Number of vectors in the view
    #[inline]
    pub fn nvec(&self) -> usize {
        match self.h {
            Some(h) => h.len(),
            None => self.vdim,
        }
    }

    /// Column index of vector `k`
    #[inline]
    pub fn vector(&self, k: usize) -> usize {
        match self.h {
            Some(h) => h[k],
            None => k,
        }
    }

    /// Vector holding column `j`, if any
    #[inline]
    pub fn find_vector(&self, j: usize) -> Option<usize> {
        match self.h {
            Some(h) => h.binary_search(&j).ok(),
            None => (j < self.vdim).then_some(j),
        }
    }

    /// Positions of vector `k`
    #[inline]
    pub fn range(&self, k: usize) -> Range<usize> {
        match self.p {
            Some(p) => p[k]..p[k + 1],
            None => k * self.vlen..(k + 1) * self.vlen,
        }
    }

    /// Entries of column `j` (present or not)
    pub fn column_range(&self, j: usize) -> Range<usize> {
        match self.find_vector(j) {
            Some(k) => self.range(k),
            None => 0..0,
        }
    }

    /// Positions of column `j` whose rows lie in `[ilo, ihi)`
    pub fn column_rows(&self, j: usize, ilo: usize, ihi: usize) -> Range<usize> {
        match self.i {
            Some(rows) => {
                let r = self.column_range(j);
                let col = &rows[r.clone()];
                let lo = col.partition_point(|&row| row < ilo);
                let hi = col.partition_point(|&row| row < ihi);
                r.start + lo..r.start + hi
            }
            None => j * self.vlen + ilo..j * self.vlen + ihi,
        }
    }

    #[inline]
    pub fn row(&self, pos: usize) -> usize {
        match self.i {
            Some(i) => i[pos],
            None => pos % self.vlen,
        }
    }

    #[inline]
    pub fn present(&self, pos: usize) -> bool {
        match self.b {
            Some(b) => b[pos] != 0,
            None => true,
        }
    }

    #[inline]
    pub fn value(&self, pos: usize) -> T {
        if self.iso {
            self.x[0]
        } else {
            self.x[pos]
        }
    }

    /// Look up entry (i, j)
    pub fn get(&self, i: usize, j: usize) -> Option<T> {
        match self.i {
            Some(rows) => {
                let r = self.column_range(j);
                rows[r.clone()]
                    .binary_search(&i)
                    .ok()
                    .map(|k| self.value(r.start + k))
            }
            None => {
                let pos = j * self.vlen + i;
                self.present(pos).then(|| self.value(pos))
            }
        }
    }

    /// Cell-wise form: one presence byte (or none when full) and one value per
    /// cell, scattering sparse layouts into fresh arrays
    pub fn to_cells(&self) -> Result<Cells<'a, T>> {
        if !self.is_sparse() {
            return Ok(Cells {
                b: self.b.map(Cow::Borrowed),
                x: Cow::Borrowed(self.x),
                iso: self.iso,
            });
        }
        let n = self.vlen * self.vdim;
        let mut b = crate::core::error::try_filled(n, 0u8)?;
        let mut x = if self.iso {
            vec![self.x.first().copied().unwrap_or_default()]
        } else {
            crate::core::error::try_filled(n, T::default())?
        };
        for k in 0..self.nvec() {
            let base = self.vector(k) * self.vlen;
            for pos in self.range(k) {
                let cell = base + self.row(pos);
                b[cell] = 1;
                if !self.iso {
                    x[cell] = self.x[pos];
                }
            }
        }
        Ok(Cells {
            b: Some(Cow::Owned(b)),
            x: Cow::Owned(x),
            iso: self.iso,
        })
    }
}

/// Dense cell arrays of a matrix, borrowed or scattered
#[derive(Debug, Clone)]
pub(crate) struct Cells<'a, T: Clone> {
    /// Presence bytes; `None` when every cell is present
    pub b: Option<Cow<'a, [u8]>>,
    pub x: Cow<'a, [T]>,
    pub iso: bool,
}

impl<'a, T: GraphBLASType> Cells<'a, T> {
    /// Iso full cells holding a single scalar
    pub fn scalar(value: T) -> Self {
        Cells {
            b: None,
            x: Cow::Owned(vec![value]),
            iso: true,
        }
    }

    #[inline]
    pub fn present(&self, cell: usize) -> bool {
        match &self.b {
            Some(b) => b[cell] != 0,
            None => true,
        }
    }

    #[inline]
    pub fn value(&self, cell: usize) -> T {
        if self.iso {
            self.x[0]
        } else {
            self.x[cell]
        }
    }

    pub fn is_full(&self) -> bool {
        self.b.is_none()
    }
}
