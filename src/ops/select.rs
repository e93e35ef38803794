// Selection
//
// C<M,replace> accum= select(A, op): keep the entries of A for which the
// index-unary predicate holds. A sparse A is filtered in two phases over
// entry slices; a bitmap or full A only loses presence bytes.

use crate::core::binary_op::BinaryOp;
use crate::core::context::Context;
use crate::core::error::{try_filled, GraphBlasError, Result};
use crate::core::index_unary_op::IndexUnaryOp;
use crate::core::mask::MaskSource;
use crate::core::matrix::{Matrix, Storage};
use crate::core::view::MatrixView;
use crate::ops::assign::write_result;
use crate::ops::descriptor::Descriptor;
use crate::ops::{op_mask, OpMask};
use crate::slice::{self, EntrySlice};
use crate::types::GraphBLASType;
use rayon::prelude::*;

/// C<M,replace> accum= select(A, op)
///
/// # Arguments
/// * `c` - Output matrix (modified in place)
/// * `mask` - Optional mask, same shape as `c`
/// * `accum` - Optional accumulator
/// * `op` - Predicate on (value, row, column)
/// * `a` - Input matrix
/// * `desc` - Optional descriptor
#[allow(clippy::too_many_arguments)]
pub fn select<T: GraphBLASType>(
    c: &mut Matrix<T>,
    mask: Option<&dyn MaskSource>,
    accum: Option<&BinaryOp<T>>,
    op: &IndexUnaryOp<T>,
    a: &Matrix<T>,
    desc: Option<&Descriptor>,
    ctx: &Context,
) -> Result<()> {
    ctx.install(|| {
        if a.shape() != c.shape() {
            return Err(GraphBlasError::DimensionMismatch);
        }
        let desc = desc.copied().unwrap_or_default();
        let (nrows, ncols) = c.shape();
        let mask = op_mask(mask, &desc, c.shape())?;
        let t = match mask {
            OpMask::Empty => Matrix::new(nrows, ncols)?,
            _ => {
                let a = a.finalized()?;
                let v = a.view();
                log::debug!("select: {} on {:?} A with {} entries", op.name(), v.sparsity(), v.nvals);
                if v.is_sparse() {
                    select_sparse(op, &v, ctx)?
                } else {
                    select_dense(op, &v, ctx)?
                }
            }
        };
        write_result(c, mask, accum, t, desc.replace, ctx)
    })
}

fn select_sparse<T: GraphBLASType>(op: &IndexUnaryOp<T>, v: &MatrixView<'_, T>, ctx: &Context) -> Result<Matrix<T>> {
    let (p, ai) = match (v.p, v.i) {
        (Some(p), Some(i)) => (p, i),
        _ => return Err(GraphBlasError::InvalidObject),
    };
    let nnz = ai.len();
    let nvec = v.nvec();
    let ntasks = slice::ntasks(ctx.nthreads(nnz as f64), nnz);
    let slices = slice::ek_slice(p, ntasks);

    // phase 1: kept entries per slice and vector
    let counts: Vec<Vec<usize>> = slices
        .par_iter()
        .map(|s| {
            let mut counts = vec![0usize; s.klast - s.kfirst + 1];
            for_each_entry(p, s, |k, pos| {
                if op.apply(v.value(pos), ai[pos], v.vector(k)) {
                    counts[k - s.kfirst] += 1;
                }
            });
            counts
        })
        .collect();

    let slice_lens: Vec<usize> = counts.iter().map(|c| c.iter().sum()).collect();
    let mut per_vector = vec![0usize; nvec];
    for (s, c) in slices.iter().zip(&counts) {
        for (k, n) in (s.kfirst..=s.klast).zip(c) {
            per_vector[k] += n;
        }
    }
    let (h, mut tp) = match v.h {
        Some(h) => {
            let (h, tp): (Vec<usize>, Vec<usize>) = h
                .iter()
                .zip(&per_vector)
                .filter(|&(_, &n)| n > 0)
                .map(|(&j, &n)| (j, n))
                .unzip();
            (Some(h), tp)
        }
        None => (None, per_vector),
    };
    tp.push(0);
    let tnz = slice::cumsum(&mut tp);

    // phase 2
    let mut ti = try_filled(tnz, 0usize)?;
    let mut tx = try_filled(tnz, T::default())?;
    {
        let ti_pieces = slice::split_by_lengths(&mut ti, &slice_lens);
        let tx_pieces = slice::split_by_lengths(&mut tx, &slice_lens);
        slices
            .par_iter()
            .zip(ti_pieces.into_par_iter().zip(tx_pieces.into_par_iter()))
            .for_each(|(s, (ti, tx))| {
                let mut at = 0;
                for_each_entry(p, s, |k, pos| {
                    let x = v.value(pos);
                    if op.apply(x, ai[pos], v.vector(k)) {
                        ti[at] = ai[pos];
                        tx[at] = x;
                        at += 1;
                    }
                });
            });
    }
    log::debug!("select: kept {} of {} entries", tnz, nnz);

    let storage = match h {
        Some(h) => Storage::Hypersparse { h, p: tp, i: ti, x: tx },
        None => Storage::Sparse { p: tp, i: ti, x: tx },
    };
    let mut t = Matrix::with_storage(v.vlen, v.vdim, storage);
    t.conform_finalized()?;
    Ok(t)
}

/// Visit the entries of one slice with the vector holding each
fn for_each_entry(p: &[usize], s: &EntrySlice, mut visit: impl FnMut(usize, usize)) {
    let mut k = s.kfirst;
    for pos in s.entries.clone() {
        while p[k + 1] <= pos {
            k += 1;
        }
        visit(k, pos);
    }
}

fn select_dense<T: GraphBLASType>(op: &IndexUnaryOp<T>, v: &MatrixView<'_, T>, ctx: &Context) -> Result<Matrix<T>> {
    let vlen = v.vlen;
    let n = vlen * v.vdim;
    let mut b = match v.b {
        Some(b) => b.to_vec(),
        None => try_filled(n, 1u8)?,
    };
    let ntasks = slice::ntasks(ctx.nthreads(n as f64), n);
    let chunk = ((n + ntasks - 1) / ntasks).max(1);
    let nvals: usize = b
        .par_chunks_mut(chunk)
        .enumerate()
        .map(|(t, piece)| {
            let base = t * chunk;
            let mut kept = 0;
            for (k, cell) in piece.iter_mut().enumerate() {
                if *cell == 0 {
                    continue;
                }
                let pos = base + k;
                if op.apply(v.value(pos), pos % vlen, pos / vlen) {
                    kept += 1;
                } else {
                    *cell = 0;
                }
            }
            kept
        })
        .sum();
    let mut t = Matrix::with_storage(
        vlen,
        v.vdim,
        Storage::Bitmap {
            b,
            x: v.x.to_vec(),
            nvals,
        },
    );
    t.iso = v.iso;
    t.conform_finalized()?;
    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::cache::KernelCache;
    use crate::core::matrix::{sparsity_control, Sparsity};
    use std::sync::Arc;

    fn ctx() -> Context {
        Context::new().with_kernel_cache(Arc::new(KernelCache::in_memory()))
    }

    fn square(control: u8) -> Matrix<i32> {
        let mut m = Matrix::from_dense(3, 3, (1..=9).collect()).unwrap();
        m.set_sparsity_control(control).unwrap();
        m
    }

    #[test]
    fn test_tril_across_layouts() {
        for control in [sparsity_control::FULL, sparsity_control::BITMAP, sparsity_control::SPARSE] {
            let a = square(control);
            let mut c = Matrix::new(3, 3).unwrap();
            select(&mut c, None, None, &IndexUnaryOp::Tril(0), &a, None, &ctx()).unwrap();
            let (rows, cols, vals) = c.extract_tuples().unwrap();
            assert_eq!(rows, vec![0, 1, 2, 1, 2, 2]);
            assert_eq!(cols, vec![0, 0, 0, 1, 1, 2]);
            assert_eq!(vals, vec![1, 2, 3, 5, 6, 9]);
        }
    }

    #[test]
    fn test_value_predicate_on_hypersparse() {
        let mut a = Matrix::from_tuples(1000, 1000, &[3, 4, 900], &[10, 10, 500], &[5, -1, 7], None).unwrap();
        a.set_sparsity_control(sparsity_control::HYPERSPARSE).unwrap();
        let mut c = Matrix::new(1000, 1000).unwrap();
        select(&mut c, None, None, &IndexUnaryOp::ValueGt(0), &a, None, &ctx()).unwrap();
        assert_eq!(c.sparsity(), Sparsity::Hypersparse);
        let (rows, cols, vals) = c.extract_tuples().unwrap();
        assert_eq!((rows, cols, vals), (vec![3, 900], vec![10, 500], vec![5, 7]));
    }

    #[test]
    fn test_user_predicate_with_accum() {
        fn even_row(_x: i32, i: usize, _j: usize) -> bool {
            i % 2 == 0
        }
        let op = IndexUnaryOp::user("even_row", even_row).unwrap();
        let a = square(sparsity_control::SPARSE);
        let mut c = Matrix::from_dense(3, 3, vec![100; 9]).unwrap();
        let plus = BinaryOp::plus();
        select(&mut c, None, Some(&plus), &op, &a, None, &ctx()).unwrap();
        assert_eq!(c.extract_element(0, 0).unwrap(), Some(101));
        assert_eq!(c.extract_element(1, 0).unwrap(), Some(100));
        assert_eq!(c.extract_element(2, 2).unwrap(), Some(109));
    }

    #[test]
    fn test_many_slices_keep_order() {
        let n = 200;
        let rows: Vec<usize> = (0..n).collect();
        let vals: Vec<i32> = (0..n as i32).collect();
        let mut a = Matrix::from_tuples(n, n, &rows, &rows, &vals, None).unwrap();
        a.set_sparsity_control(sparsity_control::SPARSE).unwrap();
        let ctx = ctx().with_nthreads(4).unwrap().with_chunk(1.0).unwrap();
        let mut c = Matrix::new(n, n).unwrap();
        select(&mut c, None, None, &IndexUnaryOp::ValueGe(100), &a, None, &ctx).unwrap();
        let (r, _, v) = c.extract_tuples().unwrap();
        assert_eq!(r, (100..n).collect::<Vec<_>>());
        assert_eq!(v, (100..n as i32).collect::<Vec<_>>());
    }
}
