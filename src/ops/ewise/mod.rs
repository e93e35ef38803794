// Element-wise Operations
//
// C<M,replace> accum= A op B over the union (add, union) or the intersection
// (mult) of the patterns of A and B. The result T is built first, sparse or
// hypersparse when the inputs are sparse enough to make that pay, bitmap
// otherwise; T then goes into C through the mask and accumulator.

mod sparse;

use crate::compiler::encode::CellKind;
use crate::core::binary_op::BinaryOp;
use crate::core::context::Context;
use crate::core::error::{try_filled, GraphBlasError, Result};
use crate::core::mask::MaskSource;
use crate::core::matrix::{Matrix, Storage};
use crate::core::view::MatrixView;
use crate::ops::assign::write_result;
use crate::ops::cells::{run_cells, CellJob};
use crate::ops::descriptor::Descriptor;
use crate::ops::{op_mask, OpMask};
use crate::types::GraphBLASType;

/// Inputs of one element-wise computation of T
pub(crate) struct EwiseJob<'a, T: GraphBLASType> {
    pub kind: CellKind,
    pub op: &'a BinaryOp<T>,
    pub a: MatrixView<'a, T>,
    pub b: MatrixView<'a, T>,
    pub mask: &'a OpMask<'a>,
    pub alpha: T,
    pub beta: T,
}

impl<'a, T: GraphBLASType> EwiseJob<'a, T> {
    /// T is sparse for a union of sparse inputs or an intersection with one
    fn sparse_result(&self) -> bool {
        match self.kind {
            CellKind::Mult => self.a.is_sparse() || self.b.is_sparse(),
            _ => self.a.is_sparse() && self.b.is_sparse(),
        }
    }
}

/// Compute T = A op B restricted to the mask
fn compute<T: GraphBLASType>(job: &EwiseJob<'_, T>, ctx: &Context) -> Result<Matrix<T>> {
    if job.sparse_result() {
        log::debug!(
            "ewise: {} {} -> sparse T ({:?}, {:?})",
            job.kind.name(),
            job.op.name(),
            job.a.sparsity(),
            job.b.sparsity()
        );
        return sparse::ewise_sparse(job, ctx);
    }
    log::debug!(
        "ewise: {} {} -> bitmap T ({:?}, {:?})",
        job.kind.name(),
        job.op.name(),
        job.a.sparsity(),
        job.b.sparsity()
    );
    let (nrows, ncols) = (job.a.vlen, job.a.vdim);
    let a = job.a.to_cells()?;
    let b = job.b.to_cells()?;
    let mask = job.mask.mask();
    let raw = mask.map(|m| m.raw_cells()).transpose()?;
    let cells = CellJob {
        kind: job.kind,
        op: job.op,
        a: Some(&a),
        b: &b,
        mask: raw.as_deref(),
        complement: mask.map_or(false, |m| m.is_complemented()),
        clear_masked_out: true,
        alpha: job.alpha,
        beta: job.beta,
    };
    let n = nrows * ncols;
    let mut tb = try_filled(n, 0u8)?;
    let mut tx = try_filled(n, T::default())?;
    let nvals = run_cells(&cells, &mut tb, &mut tx, ctx)?;
    let mut t = Matrix::with_storage(nrows, ncols, Storage::Bitmap { b: tb, x: tx, nvals });
    t.conform_finalized()?;
    Ok(t)
}

#[allow(clippy::too_many_arguments)]
fn ewise<T: GraphBLASType>(
    c: &mut Matrix<T>,
    mask: Option<&dyn MaskSource>,
    accum: Option<&BinaryOp<T>>,
    kind: CellKind,
    op: &BinaryOp<T>,
    a: &Matrix<T>,
    alpha: T,
    b: &Matrix<T>,
    beta: T,
    desc: Option<&Descriptor>,
    ctx: &Context,
) -> Result<()> {
    ctx.install(|| {
        if a.shape() != b.shape() || a.shape() != c.shape() {
            return Err(GraphBlasError::DimensionMismatch);
        }
        let desc = desc.copied().unwrap_or_default();
        let (nrows, ncols) = c.shape();
        let mask = op_mask(mask, &desc, c.shape())?;
        if let OpMask::Empty = mask {
            // nothing can be written; C only loses entries under replace
            let t = Matrix::new(nrows, ncols)?;
            return write_result(c, mask, accum, t, desc.replace, ctx);
        }
        let t = {
            let a = a.finalized()?;
            let b = b.finalized()?;
            let job = EwiseJob {
                kind,
                op,
                a: a.view(),
                b: b.view(),
                mask: &mask,
                alpha,
                beta,
            };
            compute(&job, ctx)?
        };
        write_result(c, mask, accum, t, desc.replace, ctx)
    })
}

/// C<M,replace> accum= A op B over the union of the patterns
///
/// # Arguments
/// * `c` - Output matrix (modified in place)
/// * `mask` - Optional mask, same shape as `c`
/// * `accum` - Optional accumulator combining C with the result
/// * `op` - Operator applied where both A and B have an entry
/// * `a`, `b` - Input matrices
/// * `desc` - Optional descriptor
#[allow(clippy::too_many_arguments)]
pub fn ewise_add<T: GraphBLASType>(
    c: &mut Matrix<T>,
    mask: Option<&dyn MaskSource>,
    accum: Option<&BinaryOp<T>>,
    op: &BinaryOp<T>,
    a: &Matrix<T>,
    b: &Matrix<T>,
    desc: Option<&Descriptor>,
    ctx: &Context,
) -> Result<()> {
    ewise(c, mask, accum, CellKind::Add, op, a, T::default(), b, T::default(), desc, ctx)
}

/// C<M,replace> accum= A op B over the intersection of the patterns
#[allow(clippy::too_many_arguments)]
pub fn ewise_mult<T: GraphBLASType>(
    c: &mut Matrix<T>,
    mask: Option<&dyn MaskSource>,
    accum: Option<&BinaryOp<T>>,
    op: &BinaryOp<T>,
    a: &Matrix<T>,
    b: &Matrix<T>,
    desc: Option<&Descriptor>,
    ctx: &Context,
) -> Result<()> {
    ewise(c, mask, accum, CellKind::Mult, op, a, T::default(), b, T::default(), desc, ctx)
}

/// C<M,replace> accum= A op B over the union of the patterns, with `alpha`
/// standing in for a missing A and `beta` for a missing B
#[allow(clippy::too_many_arguments)]
pub fn ewise_union<T: GraphBLASType>(
    c: &mut Matrix<T>,
    mask: Option<&dyn MaskSource>,
    accum: Option<&BinaryOp<T>>,
    op: &BinaryOp<T>,
    a: &Matrix<T>,
    alpha: T,
    b: &Matrix<T>,
    beta: T,
    desc: Option<&Descriptor>,
    ctx: &Context,
) -> Result<()> {
    ewise(c, mask, accum, CellKind::Union, op, a, alpha, b, beta, desc, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::cache::KernelCache;
    use crate::core::context::JitControl;
    use crate::core::matrix::{sparsity_control, Sparsity};
    use std::sync::Arc;

    fn ctx() -> Context {
        Context::new()
            .with_kernel_cache(Arc::new(KernelCache::in_memory()))
            .with_jit_control(JitControl::Off)
    }

    fn with_control(mut m: Matrix<i64>, control: u8) -> Matrix<i64> {
        m.set_sparsity_control(control).unwrap();
        m
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut c = Matrix::<i64>::new(2, 2).unwrap();
        let a = Matrix::<i64>::new(2, 2).unwrap();
        let b = Matrix::<i64>::new(2, 3).unwrap();
        let err = ewise_add(&mut c, None, None, &BinaryOp::plus(), &a, &b, None, &ctx()).unwrap_err();
        assert_eq!(err, GraphBlasError::DimensionMismatch);
        assert_eq!(c.nvals().unwrap(), 0);
    }

    #[test]
    fn test_bitmap_union_substitutes_missing_side() {
        let a = with_control(
            Matrix::from_tuples(2, 2, &[0, 1], &[0, 1], &[1, 2], None).unwrap(),
            sparsity_control::BITMAP,
        );
        let b = with_control(
            Matrix::from_tuples(2, 2, &[0, 1], &[0, 0], &[10, 20], None).unwrap(),
            sparsity_control::BITMAP,
        );
        let mut c = Matrix::new(2, 2).unwrap();
        let minus = BinaryOp::builtin(crate::core::binary_op::BinaryOpcode::Minus);
        ewise_union(&mut c, None, None, &minus, &a, 100, &b, 1000, None, &ctx()).unwrap();
        // (0,0) 1-10, (1,0) 100-20, (1,1) 2-1000
        assert_eq!(c.extract_element(0, 0).unwrap(), Some(-9));
        assert_eq!(c.extract_element(1, 0).unwrap(), Some(80));
        assert_eq!(c.extract_element(1, 1).unwrap(), Some(-998));
        assert_eq!(c.extract_element(0, 1).unwrap(), None);
    }

    #[test]
    fn test_full_inputs_give_full_result() {
        let a = Matrix::from_dense(2, 2, vec![1i64, 2, 3, 4]).unwrap();
        let b = Matrix::from_dense(2, 2, vec![10i64, 20, 30, 40]).unwrap();
        let mut c = Matrix::new(2, 2).unwrap();
        ewise_add(&mut c, None, None, &BinaryOp::plus(), &a, &b, None, &ctx()).unwrap();
        assert_eq!(c.sparsity(), Sparsity::Full);
        assert_eq!(c.extract_element(1, 1).unwrap(), Some(44));
    }

    #[test]
    fn test_complemented_absent_mask_with_replace_clears() {
        let a = Matrix::from_dense(2, 2, vec![1i64; 4]).unwrap();
        let mut c = Matrix::from_dense(2, 2, vec![5i64; 4]).unwrap();
        let mut desc = Descriptor::with_mask_complement();
        ewise_mult(&mut c, None, None, &BinaryOp::times(), &a, &a, Some(&desc), &ctx()).unwrap();
        assert_eq!(c.nvals().unwrap(), 4);
        desc.set_replace(true);
        ewise_mult(&mut c, None, None, &BinaryOp::times(), &a, &a, Some(&desc), &ctx()).unwrap();
        assert_eq!(c.nvals().unwrap(), 0);
    }

    #[test]
    fn test_masked_accumulate() {
        let a = Matrix::from_dense(2, 2, vec![1i64, 2, 3, 4]).unwrap();
        let mut c = Matrix::from_dense(2, 2, vec![100i64; 4]).unwrap();
        // mask selects column 1 only
        let mask = Matrix::from_tuples(2, 2, &[0, 1], &[1, 1], &[true, true], None).unwrap();
        let plus = BinaryOp::plus();
        ewise_add(&mut c, Some(&mask), Some(&plus), &plus, &a, &a, None, &ctx()).unwrap();
        let (_, _, vals) = c.extract_tuples().unwrap();
        assert_eq!(vals, vec![100, 100, 106, 108]);
    }
}
