// Sparse element-wise result in two phases
//
// Phase 1 walks every task's columns and counts the entries each column of T
// will hold. The counts are summed per column and prefix-summed into Tp, and
// the row/value arrays are allocated at their exact size. Phase 2 walks the
// same tasks again and writes into disjoint pieces of those arrays, so no
// task ever synchronizes with another.

use super::EwiseJob;
use crate::compiler::encode::CellKind;
use crate::core::context::Context;
use crate::core::error::{try_filled, Result};
use crate::core::matrix::{Matrix, Storage};
use crate::core::view::MatrixView;
use crate::ops::cells::{cell_present, resolve_cell};
use crate::ops::factory::{dispatch, OpKernel};
use crate::slice::{self, TaskSlice};
use crate::types::GraphBLASType;
use rayon::prelude::*;
use std::ops::Range;

pub(super) fn ewise_sparse<T: GraphBLASType>(job: &EwiseJob<'_, T>, ctx: &Context) -> Result<Matrix<T>> {
    let (nrows, ncols) = (job.a.vlen, job.a.vdim);
    let (cols, hyper) = candidate_columns(job);
    let work: Vec<usize> = cols.iter().map(|&j| column_work(job, j)).collect();
    let total: usize = work.iter().sum();
    let ntasks = slice::ntasks(ctx.nthreads(total as f64), cols.len());
    let tasks = slice::vector_tasks(&work, nrows, ntasks);
    log::trace!("ewise: {} candidate columns, {} tasks", cols.len(), tasks.len());

    // phase 1: entries per task and column
    let counts: Vec<Vec<usize>> = tasks
        .par_iter()
        .map(|task| {
            task.vectors()
                .map(|k| {
                    let j = cols[k];
                    let mcol = job.mask.mask().map(|m| m.column(j));
                    let mut n = 0;
                    walk_column(job, j, task.rows.as_ref(), |i, a, b| {
                        let m = mcol.as_ref().map_or(true, |c| c.get(i));
                        if cell_present(job.kind, true, m, a.is_some(), b.is_some()) {
                            n += 1;
                        }
                    });
                    n
                })
                .collect()
        })
        .collect();

    let task_lens: Vec<usize> = counts.iter().map(|c| c.iter().sum()).collect();
    let mut per_column = vec![0usize; cols.len()];
    for (task, c) in tasks.iter().zip(&counts) {
        for (k, n) in task.vectors().zip(c) {
            per_column[k] += n;
        }
    }

    let (h, mut p) = if hyper {
        let (h, p): (Vec<usize>, Vec<usize>) = cols
            .iter()
            .zip(&per_column)
            .filter(|&(_, &n)| n > 0)
            .map(|(&j, &n)| (j, n))
            .unzip();
        (Some(h), p)
    } else {
        (None, per_column)
    };
    p.push(0);
    let tnz = slice::cumsum(&mut p);
    log::debug!("ewise: sparse T with {} entries", tnz);

    // phase 2: fill exactly sized pieces
    let mut ti = try_filled(tnz, 0usize)?;
    let mut tx = try_filled(tnz, T::default())?;
    {
        let ti_pieces = slice::split_by_lengths(&mut ti, &task_lens);
        let tx_pieces = slice::split_by_lengths(&mut tx, &task_lens);
        dispatch(
            job.op,
            Phase2 {
                job,
                cols: &cols,
                tasks: &tasks,
                ti: ti_pieces,
                tx: tx_pieces,
            },
        );
    }

    let storage = match h {
        Some(h) => Storage::Hypersparse { h, p, i: ti, x: tx },
        None => Storage::Sparse { p, i: ti, x: tx },
    };
    let mut t = Matrix::with_storage(nrows, ncols, storage);
    t.conform_finalized()?;
    Ok(t)
}

/// Columns of T that may hold entries, and whether T is hypersparse
fn candidate_columns<T: GraphBLASType>(job: &EwiseJob<'_, T>) -> (Vec<usize>, bool) {
    let all = || (0..job.a.vdim).collect::<Vec<_>>();
    match (job.kind, job.a.h, job.b.h) {
        (CellKind::Mult, Some(ha), Some(hb)) => (merge_sorted(ha, hb, false), true),
        (CellKind::Mult, Some(h), None) | (CellKind::Mult, None, Some(h)) => (h.to_vec(), true),
        (_, Some(ha), Some(hb)) => (merge_sorted(ha, hb, true), true),
        _ => (all(), false),
    }
}

/// Union (`keep_single`) or intersection of two sorted lists
fn merge_sorted(a: &[usize], b: &[usize], keep_single: bool) -> Vec<usize> {
    let mut out = Vec::with_capacity(if keep_single { a.len() + b.len() } else { a.len().min(b.len()) });
    let (mut x, mut y) = (0, 0);
    while x < a.len() && y < b.len() {
        if a[x] == b[y] {
            out.push(a[x]);
            x += 1;
            y += 1;
        } else if a[x] < b[y] {
            if keep_single {
                out.push(a[x]);
            }
            x += 1;
        } else {
            if keep_single {
                out.push(b[y]);
            }
            y += 1;
        }
    }
    if keep_single {
        out.extend_from_slice(&a[x..]);
        out.extend_from_slice(&b[y..]);
    }
    out
}

fn column_work<T: GraphBLASType>(job: &EwiseJob<'_, T>, j: usize) -> usize {
    let listed = |v: &MatrixView<'_, T>| if v.is_sparse() { v.column_range(j).len() } else { 0 };
    match (job.kind, job.a.is_sparse(), job.b.is_sparse()) {
        (CellKind::Mult, true, false) => listed(&job.a),
        (CellKind::Mult, false, true) => listed(&job.b),
        (_, true, true) => listed(&job.a) + listed(&job.b),
        _ => job.a.vlen,
    }
}

/// Visit the cells of column `j` (rows in `rows` only) that A or B may hold
///
/// Cells are visited in increasing row order with the entry of each side.
fn walk_column<T, V>(job: &EwiseJob<'_, T>, j: usize, rows: Option<&Range<usize>>, mut visit: V)
where
    T: GraphBLASType,
    V: FnMut(usize, Option<T>, Option<T>),
{
    let (a, b) = (&job.a, &job.b);
    let span = |v: &MatrixView<'_, T>| match rows {
        Some(r) => v.column_rows(j, r.start, r.end),
        None => v.column_range(j),
    };
    match (a.is_sparse(), b.is_sparse(), job.kind) {
        (true, true, _) => {
            let (ra, rb) = (span(a), span(b));
            let (mut pa, mut pb) = (ra.start, rb.start);
            while pa < ra.end || pb < rb.end {
                let ia = if pa < ra.end { a.row(pa) } else { usize::MAX };
                let ib = if pb < rb.end { b.row(pb) } else { usize::MAX };
                if ia == ib {
                    visit(ia, Some(a.value(pa)), Some(b.value(pb)));
                    pa += 1;
                    pb += 1;
                } else if ia < ib {
                    visit(ia, Some(a.value(pa)), None);
                    pa += 1;
                } else {
                    visit(ib, None, Some(b.value(pb)));
                    pb += 1;
                }
            }
        }
        (true, false, CellKind::Mult) => {
            for pa in span(a) {
                let i = a.row(pa);
                if let Some(y) = b.get(i, j) {
                    visit(i, Some(a.value(pa)), Some(y));
                }
            }
        }
        (false, true, CellKind::Mult) => {
            for pb in span(b) {
                let i = b.row(pb);
                if let Some(x) = a.get(i, j) {
                    visit(i, Some(x), Some(b.value(pb)));
                }
            }
        }
        _ => {
            let range = rows.cloned().unwrap_or(0..a.vlen);
            for i in range {
                visit(i, a.get(i, j), b.get(i, j));
            }
        }
    }
}

struct Phase2<'r, 'a, T: GraphBLASType> {
    job: &'r EwiseJob<'a, T>,
    cols: &'r [usize],
    tasks: &'r [TaskSlice],
    ti: Vec<&'r mut [usize]>,
    tx: Vec<&'r mut [T]>,
}

impl<'r, 'a, T: GraphBLASType> OpKernel<T> for Phase2<'r, 'a, T> {
    type Output = ();

    fn run<F>(self, f: F)
    where
        F: Fn(T, T) -> T + Send + Sync + Copy,
    {
        let (job, cols) = (self.job, self.cols);
        self.tasks
            .par_iter()
            .zip(self.ti.into_par_iter().zip(self.tx.into_par_iter()))
            .for_each(|(task, (ti, tx))| {
                let mut at = 0;
                for k in task.vectors() {
                    let j = cols[k];
                    let mcol = job.mask.mask().map(|m| m.column(j));
                    walk_column(job, j, task.rows.as_ref(), |i, a, b| {
                        let m = mcol.as_ref().map_or(true, |c| c.get(i));
                        if let Some(z) = resolve_cell(job.kind, true, m, a, b, job.alpha, job.beta, &f) {
                            ti[at] = i;
                            tx[at] = z;
                            at += 1;
                        }
                    });
                }
                debug_assert_eq!(at, ti.len());
            });
    }
}

#[cfg(test)]
mod tests {
    use super::merge_sorted;
    use crate::compiler::cache::KernelCache;
    use crate::core::binary_op::BinaryOp;
    use crate::core::context::{Context, JitControl};
    use crate::core::matrix::{sparsity_control, Matrix, Sparsity};
    use crate::ops::descriptor::Descriptor;
    use crate::ops::ewise::{ewise_add, ewise_mult, ewise_union};
    use std::sync::Arc;

    fn ctx() -> Context {
        Context::new()
            .with_kernel_cache(Arc::new(KernelCache::in_memory()))
            .with_jit_control(JitControl::Off)
    }

    fn hyper(n: usize, rows: &[usize], cols: &[usize], vals: &[i64]) -> Matrix<i64> {
        let mut m = Matrix::from_tuples(n, n, rows, cols, vals, None).unwrap();
        m.set_sparsity_control(sparsity_control::HYPERSPARSE).unwrap();
        m
    }

    #[test]
    fn test_merge_sorted() {
        assert_eq!(merge_sorted(&[1, 3, 5], &[2, 3, 6], true), vec![1, 2, 3, 5, 6]);
        assert_eq!(merge_sorted(&[1, 3, 5], &[2, 3, 6], false), vec![3]);
        assert!(merge_sorted(&[], &[4], false).is_empty());
    }

    #[test]
    fn test_hypersparse_add_and_mult() {
        let a = hyper(100, &[1, 50], &[3, 90], &[1, 2]);
        let b = hyper(100, &[1, 7], &[3, 40], &[10, 20]);
        let mut c = Matrix::new(100, 100).unwrap();
        ewise_add(&mut c, None, None, &BinaryOp::plus(), &a, &b, None, &ctx()).unwrap();
        assert_eq!(c.sparsity(), Sparsity::Hypersparse);
        let (rows, cols, vals) = c.extract_tuples().unwrap();
        assert_eq!((rows, cols, vals), (vec![1, 7, 50], vec![3, 40, 90], vec![11, 20, 2]));

        let mut c = Matrix::new(100, 100).unwrap();
        ewise_mult(&mut c, None, None, &BinaryOp::times(), &a, &b, None, &ctx()).unwrap();
        let (rows, cols, vals) = c.extract_tuples().unwrap();
        assert_eq!((rows, cols, vals), (vec![1], vec![3], vec![10]));
    }

    #[test]
    fn test_mult_sparse_with_full() {
        let mut a = Matrix::from_tuples(3, 3, &[0, 2], &[1, 2], &[2i64, 3], None).unwrap();
        a.set_sparsity_control(sparsity_control::SPARSE).unwrap();
        let b = Matrix::from_dense(3, 3, (1..=9).collect::<Vec<i64>>()).unwrap();
        let mut c = Matrix::new(3, 3).unwrap();
        ewise_mult(&mut c, None, None, &BinaryOp::times(), &a, &b, None, &ctx()).unwrap();
        // b(0,1) = 4, b(2,2) = 9
        assert_eq!(c.extract_element(0, 1).unwrap(), Some(8));
        assert_eq!(c.extract_element(2, 2).unwrap(), Some(27));
        assert_eq!(c.nvals().unwrap(), 2);
    }

    #[test]
    fn test_union_with_sparse_complemented_mask() {
        let a = hyper(4, &[0, 1], &[0, 1], &[1, 2]);
        let b = hyper(4, &[1, 3], &[1, 3], &[10, 30]);
        // complemented mask hides (1,1)
        let mask = Matrix::from_tuples(4, 4, &[1], &[1], &[true], None).unwrap();
        let desc = Descriptor::with_mask_complement();
        let mut c = Matrix::new(4, 4).unwrap();
        ewise_union(&mut c, Some(&mask), None, &BinaryOp::plus(), &a, 100, &b, 1000, Some(&desc), &ctx())
            .unwrap();
        let (rows, cols, vals) = c.extract_tuples().unwrap();
        assert_eq!((rows, cols, vals), (vec![0, 3], vec![0, 3], vec![1001, 130]));
    }

    #[test]
    fn test_many_columns_split_across_tasks() {
        let n = 300;
        let rows: Vec<usize> = (0..n).collect();
        let vals: Vec<i64> = (0..n as i64).collect();
        let mut a = Matrix::from_tuples(n, n, &rows, &rows, &vals, None).unwrap();
        a.set_sparsity_control(sparsity_control::SPARSE).unwrap();
        let ctx = Context::new()
            .with_kernel_cache(Arc::new(KernelCache::in_memory()))
            .with_jit_control(JitControl::Off)
            .with_nthreads(4)
            .unwrap()
            .with_chunk(1.0)
            .unwrap();
        let mut c = Matrix::new(n, n).unwrap();
        ewise_add(&mut c, None, None, &BinaryOp::plus(), &a, &a, None, &ctx).unwrap();
        let (r, cc, v) = c.extract_tuples().unwrap();
        assert_eq!(r, rows);
        assert_eq!(cc, rows);
        assert_eq!(v, vals.iter().map(|x| 2 * x).collect::<Vec<_>>());
    }
}
