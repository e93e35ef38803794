// Core Layer: Matrix implementation
//
// Column-oriented sparse matrix held in one of four physical layouts
// (hypersparse, sparse, bitmap, full). A "vector" is a column: vlen = nrows,
// vdim = ncols. Sparse and hypersparse matrices may carry deferred work:
// zombies (entries deleted in place by flagging their row index) and pending
// tuples (buffered insertions). Every algorithm reads a finalized matrix.

use crate::core::binary_op::BinaryOp;
use crate::core::error::{GraphBlasError, Result};
use crate::core::pending::{Duplicates, PendingTuples};
use crate::types::{GraphBLASType, TypeCode};
use std::borrow::Cow;

/// Top bit of a row index marks a zombie
pub const ZOMBIE_FLAG: usize = 1 << (usize::BITS - 1);

/// Largest allowed row or column dimension
pub const MAX_DIMENSION: usize = 1 << 60;

pub const DEFAULT_HYPER_SWITCH: f64 = 0.0625;
pub const DEFAULT_BITMAP_SWITCH: f64 = 0.10;

#[inline]
pub(crate) fn flip(i: usize) -> usize {
    i ^ ZOMBIE_FLAG
}

#[inline]
pub(crate) fn is_zombie(i: usize) -> bool {
    i & ZOMBIE_FLAG != 0
}

#[inline]
pub(crate) fn unflip(i: usize) -> usize {
    i & !ZOMBIE_FLAG
}

fn check_dims(nrows: usize, ncols: usize) -> Result<()> {
    if nrows > MAX_DIMENSION || ncols > MAX_DIMENSION {
        return Err(GraphBlasError::InvalidValue);
    }
    Ok(())
}

/// Allowed layouts, combined as bit flags
pub mod sparsity_control {
    pub const HYPERSPARSE: u8 = 1;
    pub const SPARSE: u8 = 2;
    pub const BITMAP: u8 = 4;
    pub const FULL: u8 = 8;
    pub const AUTO: u8 = HYPERSPARSE | SPARSE | BITMAP | FULL;
}

/// Physical layout of a matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sparsity {
    Hypersparse,
    Sparse,
    Bitmap,
    Full,
}

impl Sparsity {
    /// The control bit that allows this layout
    pub fn control_bit(self) -> u8 {
        match self {
            Sparsity::Hypersparse => sparsity_control::HYPERSPARSE,
            Sparsity::Sparse => sparsity_control::SPARSE,
            Sparsity::Bitmap => sparsity_control::BITMAP,
            Sparsity::Full => sparsity_control::FULL,
        }
    }

    pub fn is_sparse_or_hyper(self) -> bool {
        matches!(self, Sparsity::Hypersparse | Sparsity::Sparse)
    }

    pub fn is_bitmap_or_full(self) -> bool {
        !self.is_sparse_or_hyper()
    }
}

/// Matrix storage
///
/// `x` holds one value per listed entry (sparse, hypersparse) or per cell
/// (bitmap, full); an iso matrix keeps a single value.
#[derive(Debug, Clone)]
pub enum Storage<T> {
    /// Columns listed in `h` (sorted), `p.len() == h.len() + 1`
    Hypersparse {
        h: Vec<usize>,
        p: Vec<usize>,
        i: Vec<usize>,
        x: Vec<T>,
    },
    /// Compressed columns, `p.len() == ncols + 1`
    Sparse {
        p: Vec<usize>,
        i: Vec<usize>,
        x: Vec<T>,
    },
    /// One presence byte per cell, column-major
    Bitmap { b: Vec<u8>, x: Vec<T>, nvals: usize },
    /// Every cell present
    Full { x: Vec<T> },
}

/// Sparse matrix in one of four layouts
#[derive(Debug, Clone)]
pub struct Matrix<T: GraphBLASType> {
    pub(crate) nrows: usize,
    pub(crate) ncols: usize,
    pub(crate) storage: Storage<T>,
    pub(crate) iso: bool,
    pub(crate) nzombies: usize,
    pub(crate) pending: PendingTuples<T>,
    pub(crate) jumbled: bool,
    pub(crate) sparsity_control: u8,
    pub(crate) hyper_switch: f64,
    pub(crate) bitmap_switch: f64,
}

impl<T: GraphBLASType> Matrix<T> {
    /// Create a new empty (hypersparse) matrix
    pub fn new(nrows: usize, ncols: usize) -> Result<Self> {
        check_dims(nrows, ncols)?;
        Ok(Self::with_storage(
            nrows,
            ncols,
            Storage::Hypersparse {
                h: Vec::new(),
                p: vec![0],
                i: Vec::new(),
                x: Vec::new(),
            },
        ))
    }

    pub(crate) fn with_storage(nrows: usize, ncols: usize, storage: Storage<T>) -> Self {
        Self {
            nrows,
            ncols,
            storage,
            iso: false,
            nzombies: 0,
            pending: PendingTuples::new(),
            jumbled: false,
            sparsity_control: sparsity_control::AUTO,
            hyper_switch: DEFAULT_HYPER_SWITCH,
            bitmap_switch: DEFAULT_BITMAP_SWITCH,
        }
    }

    /// Build a matrix from (row, col, value) tuples
    ///
    /// Duplicates are combined with `dup` in input order; without `dup` they
    /// are an error.
    pub fn from_tuples(
        nrows: usize,
        ncols: usize,
        rows: &[usize],
        cols: &[usize],
        values: &[T],
        dup: Option<&BinaryOp<T>>,
    ) -> Result<Self> {
        if rows.len() != cols.len() || rows.len() != values.len() {
            return Err(GraphBlasError::InvalidValue);
        }
        let mut m = Self::new(nrows, ncols)?;
        m.pending.reserve(rows.len())?;
        for ((&i, &j), &x) in rows.iter().zip(cols).zip(values) {
            if i >= nrows || j >= ncols {
                return Err(GraphBlasError::IndexOutOfBounds);
            }
            m.pending.push(i, j, x)?;
        }
        m.pending.set_dup(match dup {
            Some(op) => Duplicates::Combine(op.clone()),
            None => Duplicates::Reject,
        });
        m.wait()?;
        // the build policy never applies to later set_element calls
        m.pending.set_dup(Duplicates::LastWins);
        log::debug!(
            "build: {}x{} matrix from {} tuples as {:?}",
            nrows,
            ncols,
            rows.len(),
            m.sparsity()
        );
        Ok(m)
    }

    /// Build a full matrix from column-major values
    pub fn from_dense(nrows: usize, ncols: usize, values: Vec<T>) -> Result<Self> {
        let n = nrows.checked_mul(ncols).ok_or(GraphBlasError::InvalidValue)?;
        check_dims(nrows, ncols)?;
        if values.len() != n {
            return Err(GraphBlasError::InvalidValue);
        }
        Ok(Self::with_storage(nrows, ncols, Storage::Full { x: values }))
    }

    /// Full matrix with every entry equal to `value`, stored once
    pub fn iso_full(nrows: usize, ncols: usize, value: T) -> Result<Self> {
        check_dims(nrows, ncols)?;
        nrows.checked_mul(ncols).ok_or(GraphBlasError::InvalidValue)?;
        let mut m = Self::with_storage(nrows, ncols, Storage::Full { x: vec![value] });
        m.iso = true;
        Ok(m)
    }

    /// Get number of rows
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Get number of columns
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Get shape as (nrows, ncols)
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    /// Get type code
    pub fn type_code(&self) -> TypeCode {
        T::TYPE_CODE
    }

    /// Current physical layout
    pub fn sparsity(&self) -> Sparsity {
        match self.storage {
            Storage::Hypersparse { .. } => Sparsity::Hypersparse,
            Storage::Sparse { .. } => Sparsity::Sparse,
            Storage::Bitmap { .. } => Sparsity::Bitmap,
            Storage::Full { .. } => Sparsity::Full,
        }
    }

    pub fn is_iso(&self) -> bool {
        self.iso
    }

    pub fn nzombies(&self) -> usize {
        self.nzombies
    }

    pub fn npending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_jumbled(&self) -> bool {
        self.jumbled
    }

    /// True if the matrix must be finalized before algorithms can read it
    pub fn has_pending_work(&self) -> bool {
        self.nzombies > 0 || !self.pending.is_empty() || self.jumbled
    }

    /// Total number of cells, saturating for huge hypersparse shapes
    pub(crate) fn ncells(&self) -> usize {
        self.nrows.saturating_mul(self.ncols)
    }

    /// Entries of a finalized matrix (zombies and pending tuples excluded)
    pub(crate) fn live_nvals(&self) -> usize {
        match &self.storage {
            Storage::Hypersparse { p, .. } | Storage::Sparse { p, .. } => {
                p.last().copied().unwrap_or(0) - self.nzombies
            }
            Storage::Bitmap { nvals, .. } => *nvals,
            Storage::Full { .. } => self.ncells(),
        }
    }

    /// Number of stored entries; finalizes the matrix first
    pub fn nvals(&mut self) -> Result<usize> {
        self.wait()?;
        Ok(self.live_nvals())
    }

    /// Every logical cell holds an entry
    pub fn as_if_full(&self) -> bool {
        match &self.storage {
            Storage::Full { .. } => true,
            _ => self.pending.is_empty() && self.live_nvals() == self.ncells(),
        }
    }

    /// Remove all entries; keeps shape and layout controls
    pub fn clear(&mut self) {
        self.storage = Storage::Hypersparse {
            h: Vec::new(),
            p: vec![0],
            i: Vec::new(),
            x: Vec::new(),
        };
        self.iso = false;
        self.nzombies = 0;
        self.pending.clear();
        self.jumbled = false;
    }

    /// Materialize an iso value into one value per entry
    pub fn expand_iso(&mut self) -> Result<()> {
        if !self.iso {
            return Ok(());
        }
        let len = match &self.storage {
            Storage::Hypersparse { p, .. } | Storage::Sparse { p, .. } => {
                p.last().copied().unwrap_or(0)
            }
            Storage::Bitmap { b, .. } => b.len(),
            Storage::Full { .. } => self.ncells(),
        };
        let x = match &mut self.storage {
            Storage::Hypersparse { x, .. }
            | Storage::Sparse { x, .. }
            | Storage::Bitmap { x, .. }
            | Storage::Full { x } => x,
        };
        let value = x.first().copied().unwrap_or_default();
        let expanded = crate::core::error::try_filled(len, value)?;
        *x = expanded;
        self.iso = false;
        Ok(())
    }

    /// Range of listed entries of column `j` in a sparse or hypersparse matrix
    pub(crate) fn column_range(&self, j: usize) -> Option<(usize, usize)> {
        match &self.storage {
            Storage::Hypersparse { h, p, .. } => h.binary_search(&j).ok().map(|k| (p[k], p[k + 1])),
            Storage::Sparse { p, .. } => Some((p[j], p[j + 1])),
            _ => None,
        }
    }

    /// Position of (i, j) in the listed entries, zombies included
    fn find_listed(&self, i: usize, j: usize) -> Option<usize> {
        let (start, end) = self.column_range(j)?;
        let rows = match &self.storage {
            Storage::Hypersparse { i: rows, .. } | Storage::Sparse { i: rows, .. } => rows,
            _ => return None,
        };
        rows[start..end]
            .binary_search_by(|&r| unflip(r).cmp(&i))
            .ok()
            .map(|k| start + k)
    }

    fn check_index(&self, i: usize, j: usize) -> Result<()> {
        if i >= self.nrows || j >= self.ncols {
            return Err(GraphBlasError::InvalidIndex);
        }
        Ok(())
    }

    /// Make room for a non-iso value if `value` differs from the iso value
    fn prepare_write(&mut self, value: T) -> Result<()> {
        if self.iso {
            let iso_value = match &self.storage {
                Storage::Hypersparse { x, .. }
                | Storage::Sparse { x, .. }
                | Storage::Bitmap { x, .. }
                | Storage::Full { x } => x.first().copied(),
            };
            if iso_value != Some(value) {
                self.expand_iso()?;
            }
        }
        Ok(())
    }

    /// C(i,j) = value
    ///
    /// A live or zombie entry is updated in place (a zombie comes back to
    /// life); a new entry of a sparse matrix is appended as a pending tuple.
    pub fn set_element(&mut self, i: usize, j: usize, value: T) -> Result<()> {
        self.check_index(i, j)?;
        if self.jumbled {
            self.wait()?;
        }
        let nrows = self.nrows;
        match self.sparsity() {
            Sparsity::Bitmap | Sparsity::Full => {
                self.prepare_write(value)?;
                let iso = self.iso;
                let pos = j * nrows + i;
                match &mut self.storage {
                    Storage::Bitmap { b, x, nvals } => {
                        if b[pos] == 0 {
                            b[pos] = 1;
                            *nvals += 1;
                        }
                        if !iso {
                            x[pos] = value;
                        }
                    }
                    Storage::Full { x } => {
                        if !iso {
                            x[pos] = value;
                        }
                    }
                    _ => unreachable!("layout checked above"),
                }
                Ok(())
            }
            Sparsity::Sparse | Sparsity::Hypersparse => match self.find_listed(i, j) {
                Some(pos) => {
                    self.prepare_write(value)?;
                    let iso = self.iso;
                    if let Storage::Hypersparse { i: rows, x, .. } | Storage::Sparse { i: rows, x, .. } =
                        &mut self.storage
                    {
                        if is_zombie(rows[pos]) {
                            rows[pos] = i;
                            self.nzombies -= 1;
                        }
                        if !iso {
                            x[pos] = value;
                        }
                    }
                    Ok(())
                }
                None => self.pending.push(i, j, value),
            },
        }
    }

    /// Delete C(i,j) if present
    pub fn remove_element(&mut self, i: usize, j: usize) -> Result<()> {
        self.check_index(i, j)?;
        if self.sparsity() == Sparsity::Full {
            self.convert_to(Sparsity::Bitmap)?;
        }
        if !self.pending.is_empty() || self.jumbled {
            self.wait()?;
        }
        let nrows = self.nrows;
        match self.sparsity() {
            Sparsity::Bitmap => {
                if let Storage::Bitmap { b, nvals, .. } = &mut self.storage {
                    let pos = j * nrows + i;
                    if b[pos] != 0 {
                        b[pos] = 0;
                        *nvals -= 1;
                    }
                }
            }
            Sparsity::Full => {}
            Sparsity::Sparse | Sparsity::Hypersparse => {
                if let Some(pos) = self.find_listed(i, j) {
                    if let Storage::Hypersparse { i: rows, .. } | Storage::Sparse { i: rows, .. } =
                        &mut self.storage
                    {
                        if !is_zombie(rows[pos]) {
                            rows[pos] = flip(rows[pos]);
                            self.nzombies += 1;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Read C(i,j); `None` if the entry is not present
    pub fn extract_element(&mut self, i: usize, j: usize) -> Result<Option<T>> {
        self.check_index(i, j)?;
        if !self.pending.is_empty() || self.jumbled {
            self.wait()?;
        }
        let value_at = |x: &[T], pos: usize| if self.iso { x[0] } else { x[pos] };
        let pos = j * self.nrows + i;
        Ok(match &self.storage {
            Storage::Full { x } => Some(value_at(x, pos)),
            Storage::Bitmap { b, x, .. } => (b[pos] != 0).then(|| value_at(x, pos)),
            Storage::Hypersparse { i: rows, x, .. } | Storage::Sparse { i: rows, x, .. } => self
                .find_listed(i, j)
                .filter(|&k| !is_zombie(rows[k]))
                .map(|k| value_at(x, k)),
        })
    }

    /// All entries as (rows, cols, values), sorted by column then row
    pub fn extract_tuples(&mut self) -> Result<(Vec<usize>, Vec<usize>, Vec<T>)> {
        self.wait()?;
        let view = self.view();
        let n = self.live_nvals();
        let mut rows = crate::core::error::try_with_capacity(n)?;
        let mut cols = crate::core::error::try_with_capacity(n)?;
        let mut vals = crate::core::error::try_with_capacity(n)?;
        for k in 0..view.nvec() {
            let j = view.vector(k);
            for pos in view.range(k) {
                if view.present(pos) {
                    rows.push(view.row(pos));
                    cols.push(j);
                    vals.push(view.value(pos));
                }
            }
        }
        Ok((rows, cols, vals))
    }

    /// Finalized copy of the matrix, borrowed when there is no pending work
    pub(crate) fn finalized(&self) -> Result<Cow<'_, Matrix<T>>> {
        if !self.has_pending_work() {
            return Ok(Cow::Borrowed(self));
        }
        log::trace!("finalizing a copy of an input with pending work");
        let mut copy = self.clone();
        copy.wait()?;
        Ok(Cow::Owned(copy))
    }

    /// Take the content of `other`, keeping this matrix's layout controls
    pub(crate) fn replace_content(&mut self, other: Matrix<T>) -> Result<()> {
        debug_assert_eq!(self.shape(), other.shape());
        self.storage = other.storage;
        self.iso = other.iso;
        self.nzombies = other.nzombies;
        self.pending = other.pending;
        self.jumbled = other.jumbled;
        self.wait()?;
        self.conform_finalized()
    }
}
