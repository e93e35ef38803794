// Masked Assignment
//
// C<M,replace>(I,J) accum= A (assign, mask sized like C) and
// C(I,J)<M,replace> accum= A (subassign, mask sized like A), with a matrix or
// a scalar on the right. Every cell of IxJ resolves from the mask bit, the old
// entry of C and the new entry of A: without an accumulator A replaces C, with
// one they are combined; a masked-out cell keeps C unless replace is set.
//
// Method selection:
// - C bitmap or full: whole-matrix updates from a bitmap/full A or a scalar
//   run a cell kernel in place on C; everything else resolves cell by cell
//   over IxJ (and the rest of C for assign with replace and a mask).
// - C sparse or hypersparse: `C = A` copies A; whole-matrix dense updates move
//   C to bitmap when allowed; otherwise the actions against a snapshot of
//   C(I,J) are computed in parallel and applied as in-place updates, zombies
//   and pending tuples.

mod bitmap;
mod sparse;

use crate::compiler::encode::CellKind;
use crate::core::binary_op::BinaryOp;
use crate::core::context::Context;
use crate::core::error::{GraphBlasError, Result};
use crate::core::index_list::{IndexList, Indices};
use crate::core::mask::MaskSource;
use crate::core::matrix::{sparsity_control, Matrix, Sparsity};
use crate::core::view::MatrixView;
use crate::ops::descriptor::Descriptor;
use crate::ops::{op_mask, OpMask};
use crate::types::GraphBLASType;

/// Right-hand side of an assignment
pub(crate) enum Source<'a, T: GraphBLASType> {
    /// Finalized |I|x|J| matrix
    Matrix {
        matrix: &'a Matrix<T>,
        view: MatrixView<'a, T>,
    },
    Scalar(T),
}

impl<'a, T: GraphBLASType> Source<'a, T> {
    pub(crate) fn matrix(matrix: &'a Matrix<T>) -> Self {
        Source::Matrix {
            matrix,
            view: matrix.view(),
        }
    }

    /// Entry (ki, kj) of the right-hand side
    #[inline]
    pub(crate) fn get(&self, ki: usize, kj: usize) -> Option<T> {
        match self {
            Source::Matrix { view, .. } => view.get(ki, kj),
            Source::Scalar(value) => Some(*value),
        }
    }

    /// Every cell can be read without searching
    fn is_dense(&self) -> bool {
        match self {
            Source::Matrix { view, .. } => !view.is_sparse(),
            Source::Scalar(_) => true,
        }
    }
}

/// One assignment, arguments checked
pub(crate) struct AssignJob<'a, T: GraphBLASType> {
    pub rows: Indices<'a>,
    pub cols: Indices<'a>,
    pub mask: OpMask<'a>,
    /// Mask indexed by C's (i, j) (assign) instead of (ki, kj) (subassign)
    pub mask_on_c: bool,
    pub accum: Option<&'a BinaryOp<T>>,
    pub source: Source<'a, T>,
    pub replace: bool,
}

impl<'a, T: GraphBLASType> AssignJob<'a, T> {
    fn kind(&self) -> CellKind {
        if self.accum.is_some() {
            CellKind::Add
        } else {
            CellKind::Second
        }
    }

    /// Mask value for C(i,j), the target of A(ki,kj)
    #[inline]
    fn mask_at(&self, i: usize, j: usize, ki: usize, kj: usize) -> bool {
        if self.mask_on_c {
            self.mask.get(i, j)
        } else {
            self.mask.get(ki, kj)
        }
    }

    /// Assign with replace and a mask also deletes entries of C outside IxJ
    fn sweeps_outside(&self) -> bool {
        self.mask_on_c && self.replace && matches!(self.mask, OpMask::Mask(_))
    }

    fn is_whole(&self, nrows: usize, ncols: usize) -> bool {
        self.rows.is_all(nrows) && self.cols.is_all(ncols)
    }
}

/// Run a checked assignment
pub(crate) fn execute<T: GraphBLASType>(
    c: &mut Matrix<T>,
    job: &AssignJob<'_, T>,
    ctx: &Context,
) -> Result<()> {
    let (nrows, ncols) = c.shape();
    let whole = job.is_whole(nrows, ncols);
    if let OpMask::Empty = job.mask {
        if !job.replace {
            log::debug!("assign: complemented empty mask, nothing to do");
            return Ok(());
        }
        if job.mask_on_c || whole {
            log::debug!("assign: complemented empty mask with replace, C cleared");
            c.clear();
            return c.conform_finalized();
        }
    }
    c.wait()?;

    match c.sparsity() {
        Sparsity::Bitmap | Sparsity::Full => {
            if c.sparsity() == Sparsity::Full {
                c.convert_finalized(Sparsity::Bitmap)?;
            }
            if whole && job.source.is_dense() && !matches!(job.mask, OpMask::Empty) {
                log::debug!("assign: bitmap C, whole-matrix cell kernel");
                bitmap::assign_cells(c, job, ctx)?;
            } else {
                log::debug!("assign: bitmap C, cell-wise over {}x{}", job.rows.len(), job.cols.len());
                bitmap::assign_cellwise(c, job, ctx)?;
            }
            c.conform_finalized()
        }
        Sparsity::Sparse | Sparsity::Hypersparse => {
            if whole && job.accum.is_none() && matches!(job.mask, OpMask::None) {
                log::debug!("assign: C = A");
                let copy = match &job.source {
                    Source::Matrix { matrix, .. } => (*matrix).clone(),
                    Source::Scalar(value) => Matrix::iso_full(nrows, ncols, *value)?,
                };
                return c.replace_content(copy);
            }
            let dense_update = whole
                && job.source.is_dense()
                && matches!(job.mask, OpMask::None | OpMask::Mask(_))
                && c.sparsity_control() & sparsity_control::BITMAP != 0;
            if dense_update {
                log::debug!("assign: sparse C to bitmap, whole-matrix cell kernel");
                c.convert_finalized(Sparsity::Bitmap)?;
                bitmap::assign_cells(c, job, ctx)?;
                c.conform_finalized()
            } else {
                sparse::assign_sparse(c, job, ctx)
            }
        }
    }
}

/// Write the result `t` of an operation into C through the mask and accumulator
pub(crate) fn write_result<T: GraphBLASType>(
    c: &mut Matrix<T>,
    mask: OpMask<'_>,
    accum: Option<&BinaryOp<T>>,
    t: Matrix<T>,
    replace: bool,
    ctx: &Context,
) -> Result<()> {
    debug_assert_eq!(c.shape(), t.shape());
    if matches!(mask, OpMask::None) && accum.is_none() {
        return c.replace_content(t);
    }
    let (nrows, ncols) = c.shape();
    let job = AssignJob {
        rows: Indices::all(nrows),
        cols: Indices::all(ncols),
        mask,
        mask_on_c: true,
        accum,
        source: Source::matrix(&t),
        replace,
    };
    execute(c, &job, ctx)
}

#[allow(clippy::too_many_arguments)]
fn assign_from<T: GraphBLASType>(
    c: &mut Matrix<T>,
    mask: Option<&dyn MaskSource>,
    accum: Option<&BinaryOp<T>>,
    a: Option<&Matrix<T>>,
    value: T,
    rows: &IndexList,
    cols: &IndexList,
    desc: Option<&Descriptor>,
    mask_on_c: bool,
    ctx: &Context,
) -> Result<()> {
    ctx.install(|| {
        let desc = desc.copied().unwrap_or_default();
        let rows = rows.resolve(c.nrows())?;
        let cols = cols.resolve(c.ncols())?;
        let region = (rows.len(), cols.len());
        if let Some(a) = a {
            if a.shape() != region {
                return Err(GraphBlasError::DimensionMismatch);
            }
        }
        let mask_shape = if mask_on_c { c.shape() } else { region };
        let mask = op_mask(mask, &desc, mask_shape)?;
        let finalized = a.map(|a| a.finalized()).transpose()?;
        let source = match &finalized {
            Some(a) => Source::matrix(a),
            None => Source::Scalar(value),
        };
        let job = AssignJob {
            rows,
            cols,
            mask,
            mask_on_c,
            accum,
            source,
            replace: desc.replace,
        };
        execute(c, &job, ctx)
    })
}

/// C<M,replace>(I,J) accum= A
///
/// # Arguments
/// * `c` - Output matrix (modified in place)
/// * `mask` - Optional mask, same shape as `c`
/// * `accum` - Optional accumulator combining old and new entries
/// * `a` - Input matrix of shape |I| x |J|
/// * `rows`, `cols` - Index sets I and J
/// * `desc` - Optional descriptor
#[allow(clippy::too_many_arguments)]
pub fn assign<T: GraphBLASType>(
    c: &mut Matrix<T>,
    mask: Option<&dyn MaskSource>,
    accum: Option<&BinaryOp<T>>,
    a: &Matrix<T>,
    rows: &IndexList,
    cols: &IndexList,
    desc: Option<&Descriptor>,
    ctx: &Context,
) -> Result<()> {
    assign_from(c, mask, accum, Some(a), T::default(), rows, cols, desc, true, ctx)
}

/// C<M,replace>(I,J) accum= value
#[allow(clippy::too_many_arguments)]
pub fn assign_scalar<T: GraphBLASType>(
    c: &mut Matrix<T>,
    mask: Option<&dyn MaskSource>,
    accum: Option<&BinaryOp<T>>,
    value: T,
    rows: &IndexList,
    cols: &IndexList,
    desc: Option<&Descriptor>,
    ctx: &Context,
) -> Result<()> {
    assign_from(c, mask, accum, None, value, rows, cols, desc, true, ctx)
}

/// C(I,J)<M,replace> accum= A
///
/// The mask has the shape of `a`; C outside IxJ is never touched.
#[allow(clippy::too_many_arguments)]
pub fn subassign<T: GraphBLASType>(
    c: &mut Matrix<T>,
    mask: Option<&dyn MaskSource>,
    accum: Option<&BinaryOp<T>>,
    a: &Matrix<T>,
    rows: &IndexList,
    cols: &IndexList,
    desc: Option<&Descriptor>,
    ctx: &Context,
) -> Result<()> {
    assign_from(c, mask, accum, Some(a), T::default(), rows, cols, desc, false, ctx)
}

/// C(I,J)<M,replace> accum= value
#[allow(clippy::too_many_arguments)]
pub fn subassign_scalar<T: GraphBLASType>(
    c: &mut Matrix<T>,
    mask: Option<&dyn MaskSource>,
    accum: Option<&BinaryOp<T>>,
    value: T,
    rows: &IndexList,
    cols: &IndexList,
    desc: Option<&Descriptor>,
    ctx: &Context,
) -> Result<()> {
    assign_from(c, mask, accum, None, value, rows, cols, desc, false, ctx)
}

/// C(I,j)<m,replace> accum= u, with `u` and `mask` of shape |I| x 1
#[allow(clippy::too_many_arguments)]
pub fn col_subassign<T: GraphBLASType>(
    c: &mut Matrix<T>,
    mask: Option<&dyn MaskSource>,
    accum: Option<&BinaryOp<T>>,
    u: &Matrix<T>,
    rows: &IndexList,
    j: usize,
    desc: Option<&Descriptor>,
    ctx: &Context,
) -> Result<()> {
    if j >= c.ncols() {
        return Err(GraphBlasError::IndexOutOfBounds);
    }
    subassign(c, mask, accum, u, rows, &IndexList::List(vec![j]), desc, ctx)
}

/// C(i,J)<m,replace> accum= u, with `u` and `mask` of shape 1 x |J|
#[allow(clippy::too_many_arguments)]
pub fn row_subassign<T: GraphBLASType>(
    c: &mut Matrix<T>,
    mask: Option<&dyn MaskSource>,
    accum: Option<&BinaryOp<T>>,
    u: &Matrix<T>,
    i: usize,
    cols: &IndexList,
    desc: Option<&Descriptor>,
    ctx: &Context,
) -> Result<()> {
    if i >= c.nrows() {
        return Err(GraphBlasError::IndexOutOfBounds);
    }
    subassign(c, mask, accum, u, &IndexList::List(vec![i]), cols, desc, ctx)
}
