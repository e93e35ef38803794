// Assignment into a bitmap C
//
// A cell of C is in one of four states while it is assigned: not in C, in C,
// masked out, or masked out but present. The state, the new entry of A and
// the accumulator decide the presence byte and value written back, so every
// column of C is updated independently of the others.

use super::{AssignJob, Source};
use crate::core::binary_op::BinaryOp;
use crate::core::context::Context;
use crate::core::error::Result;
use crate::core::matrix::{Matrix, Storage};
use crate::core::view::Cells;
use crate::ops::cells::{resolve_cell, run_cells, CellJob};
use crate::ops::factory::{dispatch, OpKernel};
use crate::slice;
use crate::types::GraphBLASType;
use rayon::prelude::*;

/// Whole-matrix update from a dense A or a scalar, in place on C's cells
pub(super) fn assign_cells<T: GraphBLASType>(
    c: &mut Matrix<T>,
    job: &AssignJob<'_, T>,
    ctx: &Context,
) -> Result<()> {
    c.expand_iso()?;
    let b = match &job.source {
        Source::Matrix { view, .. } => view.to_cells()?,
        Source::Scalar(value) => Cells::scalar(*value),
    };
    let mask = job.mask.mask();
    let raw = mask.map(|m| m.raw_cells()).transpose()?;
    let second = BinaryOp::second();
    let cells = CellJob {
        kind: job.kind(),
        op: job.accum.unwrap_or(&second),
        a: None,
        b: &b,
        mask: raw.as_deref(),
        complement: mask.map_or(false, |m| m.is_complemented()),
        clear_masked_out: job.replace,
        alpha: T::default(),
        beta: T::default(),
    };
    if let Storage::Bitmap { b, x, nvals } = &mut c.storage {
        *nvals = run_cells(&cells, b, x, ctx)?;
    }
    Ok(())
}

/// One column of C handed to a task
struct Column<'c, T> {
    j: usize,
    /// Position of `j` in J, `None` outside IxJ
    kj: Option<usize>,
    b: &'c mut [u8],
    x: &'c mut [T],
}

/// Resolve the cells of IxJ one by one, plus the rest of C when assign with
/// replace deletes masked-out entries outside IxJ
pub(super) fn assign_cellwise<T: GraphBLASType>(
    c: &mut Matrix<T>,
    job: &AssignJob<'_, T>,
    ctx: &Context,
) -> Result<()> {
    let (nrows, ncols) = c.shape();
    if nrows == 0 || ncols == 0 {
        return Ok(());
    }
    c.expand_iso()?;
    let outside = job.sweeps_outside();
    let (b, x, nvals) = match &mut c.storage {
        Storage::Bitmap { b, x, nvals } => (b, x, nvals),
        _ => return Ok(()),
    };

    let mut slots: Vec<Option<(&mut [u8], &mut [T])>> =
        b.chunks_mut(nrows).zip(x.chunks_mut(nrows)).map(Some).collect();
    let mut columns: Vec<Column<'_, T>> = Vec::with_capacity(job.cols.len());
    for kj in 0..job.cols.len() {
        let j = job.cols.get(kj);
        if let Some((b, x)) = slots[j].take() {
            columns.push(Column { j, kj: Some(kj), b, x });
        }
    }
    if outside {
        for (j, slot) in slots.into_iter().enumerate() {
            if let Some((b, x)) = slot {
                columns.push(Column { j, kj: None, b, x });
            }
        }
    }

    let per_column = if outside { nrows } else { job.rows.len() };
    let nthreads = ctx.nthreads((columns.len() * per_column) as f64);
    let ntasks = slice::ntasks(nthreads, columns.len());
    let second = BinaryOp::second();
    let delta = dispatch(
        job.accum.unwrap_or(&second),
        CellwiseColumns {
            job,
            columns,
            ntasks,
            outside,
        },
    );
    *nvals = (*nvals as isize + delta) as usize;
    Ok(())
}

struct CellwiseColumns<'j, 'a, 'c, T: GraphBLASType> {
    job: &'j AssignJob<'a, T>,
    columns: Vec<Column<'c, T>>,
    ntasks: usize,
    outside: bool,
}

impl<'j, 'a, 'c, T: GraphBLASType> OpKernel<T> for CellwiseColumns<'j, 'a, 'c, T> {
    /// Change in the number of entries
    type Output = isize;

    fn run<F>(mut self, f: F) -> isize
    where
        F: Fn(T, T) -> T + Send + Sync + Copy,
    {
        let job = self.job;
        let outside = self.outside;
        let kind = job.kind();
        let chunk = ((self.columns.len() + self.ntasks - 1) / self.ntasks).max(1);
        self.columns
            .par_chunks_mut(chunk)
            .map(|task| {
                let mut delta = 0isize;
                for col in task.iter_mut() {
                    let j = col.j;
                    let mut set = |i: usize, z: Option<T>, b: &mut [u8], x: &mut [T]| {
                        let was = b[i] != 0;
                        match z {
                            Some(v) => {
                                b[i] = 1;
                                x[i] = v;
                            }
                            None => b[i] = 0,
                        }
                        delta += (z.is_some() as isize) - (was as isize);
                    };
                    match col.kj {
                        Some(kj) => {
                            for ki in 0..job.rows.len() {
                                let i = job.rows.get(ki);
                                let m = job.mask_at(i, j, ki, kj);
                                let old = (col.b[i] != 0).then(|| col.x[i]);
                                let new = job.source.get(ki, kj);
                                let z = resolve_cell(kind, job.replace, m, old, new, T::default(), T::default(), &f);
                                set(i, z, col.b, col.x);
                            }
                            if outside {
                                for i in 0..col.b.len() {
                                    if col.b[i] != 0 && job.rows.position(i).is_none() && !job.mask.get(i, j) {
                                        set(i, None, col.b, col.x);
                                    }
                                }
                            }
                        }
                        None => {
                            for i in 0..col.b.len() {
                                if col.b[i] != 0 && !job.mask.get(i, j) {
                                    set(i, None, col.b, col.x);
                                }
                            }
                        }
                    }
                }
                delta
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::cache::KernelCache;
    use crate::core::context::{Context, JitControl};
    use crate::core::index_list::IndexList;
    use crate::core::matrix::{sparsity_control, Matrix, Sparsity};
    use crate::ops::assign::{assign, assign_scalar, subassign};
    use crate::ops::descriptor::Descriptor;
    use crate::core::binary_op::BinaryOp;
    use std::sync::Arc;

    fn ctx(control: JitControl) -> Context {
        Context::new()
            .with_kernel_cache(Arc::new(KernelCache::in_memory()))
            .with_jit_control(control)
    }

    fn bitmap(nrows: usize, ncols: usize, rows: &[usize], cols: &[usize], vals: &[i32]) -> Matrix<i32> {
        let mut m = Matrix::from_tuples(nrows, ncols, rows, cols, vals, None).unwrap();
        m.set_sparsity_control(sparsity_control::BITMAP).unwrap();
        m
    }

    #[test]
    fn test_scalar_with_diagonal_mask_and_replace() {
        for control in [JitControl::Off, JitControl::On] {
            let mut c = bitmap(2, 2, &[0, 1], &[1, 0], &[1, 2]);
            let mask = Matrix::from_tuples(2, 2, &[0, 1], &[0, 1], &[true, true], None).unwrap();
            let mut desc = Descriptor::with_replace();
            desc.set_mask_structure(true);
            assign_scalar(&mut c, Some(&mask), None, 9, &IndexList::All, &IndexList::All, Some(&desc), &ctx(control))
                .unwrap();
            assert_eq!(c.sparsity(), Sparsity::Bitmap);
            let (rows, cols, vals) = c.extract_tuples().unwrap();
            assert_eq!((rows, cols, vals), (vec![0, 1], vec![0, 1], vec![9, 9]));
        }
    }

    #[test]
    fn test_accumulate_into_region() {
        let mut c = bitmap(3, 3, &[0, 1, 2], &[0, 1, 2], &[1, 2, 3]);
        let a = Matrix::from_tuples(2, 2, &[0, 1], &[0, 0], &[10, 20], None).unwrap();
        let rows = IndexList::List(vec![2, 0]);
        let cols = IndexList::Range { start: 1, end: 3 };
        let plus = BinaryOp::plus();
        assign(&mut c, None, Some(&plus), &a, &rows, &cols, None, &ctx(JitControl::Off)).unwrap();
        // A(0,0) lands on C(2,1), A(1,0) on C(0,1)
        assert_eq!(c.extract_element(2, 1).unwrap(), Some(10));
        assert_eq!(c.extract_element(0, 1).unwrap(), Some(20));
        assert_eq!(c.extract_element(2, 2).unwrap(), Some(3));
        assert_eq!(c.nvals().unwrap(), 5);
    }

    #[test]
    fn test_assign_replace_sweeps_outside_region() {
        let mut c = bitmap(2, 3, &[0, 1, 0, 1], &[0, 0, 2, 2], &[1, 2, 3, 4]);
        let mask = Matrix::from_tuples(2, 3, &[0], &[0], &[true], None).unwrap();
        let a = Matrix::from_tuples(1, 1, &[0], &[0], &[7], None).unwrap();
        let rows = IndexList::List(vec![0]);
        let cols = IndexList::List(vec![0]);
        let desc = Descriptor::with_replace();
        assign(&mut c, Some(&mask), None, &a, &rows, &cols, Some(&desc), &ctx(JitControl::Off)).unwrap();
        let (rows, cols, vals) = c.extract_tuples().unwrap();
        assert_eq!((rows, cols, vals), (vec![0], vec![0], vec![7]));

        // subassign never looks outside the region
        let mut c = bitmap(2, 3, &[0, 1, 0, 1], &[0, 0, 2, 2], &[1, 2, 3, 4]);
        let sub_mask = Matrix::from_tuples(1, 1, &[0], &[0], &[true], None).unwrap();
        let rows = IndexList::List(vec![0]);
        let cols = IndexList::List(vec![0]);
        subassign(&mut c, Some(&sub_mask), None, &a, &rows, &cols, Some(&desc), &ctx(JitControl::Off))
            .unwrap();
        assert_eq!(c.nvals().unwrap(), 4);
        assert_eq!(c.extract_element(0, 0).unwrap(), Some(7));
    }
}
