// Cell kernels: element-wise work over bitmap and full cell arrays
//
// Every cell resolves independently from its mask bit and the presence and
// value of its two inputs, so the cell range is cut into equal pieces and run
// in parallel. The kernel comes from the JIT cache when one is available,
// else from the factory (built-in operator inlined), else from the generic
// instance calling the operator through its function pointer.

use crate::compiler::backend::{call_user_op, CompiledKernel, KernelArgs, UserOpCall};
use crate::compiler::encode::{encodify, CellKernelSpec, CellKind, MaskMode};
use crate::core::binary_op::BinaryOp;
use crate::core::context::Context;
use crate::core::error::Result;
use crate::core::view::Cells;
use crate::ops::factory::{dispatch, OpKernel};
use crate::slice;
use crate::types::GraphBLASType;
use rayon::prelude::*;
use std::ptr;

/// Whether a cell is present in the result
///
/// `m` is the mask bit with any complement already applied.
#[inline]
pub(crate) fn cell_present(kind: CellKind, clear: bool, m: bool, a: bool, b: bool) -> bool {
    if !m {
        return !clear && a;
    }
    match kind {
        CellKind::Add | CellKind::Union => a || b,
        CellKind::Mult => a && b,
        CellKind::Second => b,
    }
}

/// Result of one cell, `None` when the cell is empty
///
/// Masked-out cells keep `a` unless `clear` is set. `Union` replaces a missing
/// `a` by `alpha` and a missing `b` by `beta`.
#[allow(clippy::too_many_arguments)]
#[inline]
pub(crate) fn resolve_cell<T: Copy, F: Fn(T, T) -> T>(
    kind: CellKind,
    clear: bool,
    m: bool,
    a: Option<T>,
    b: Option<T>,
    alpha: T,
    beta: T,
    op: &F,
) -> Option<T> {
    if !m {
        return if clear { None } else { a };
    }
    match (kind, a, b) {
        (CellKind::Second, _, b) => b,
        (_, Some(x), Some(y)) => Some(op(x, y)),
        (CellKind::Mult, _, _) => None,
        (CellKind::Add, a, None) => a,
        (CellKind::Add, None, b) => b,
        (CellKind::Union, Some(x), None) => Some(op(x, beta)),
        (CellKind::Union, None, Some(y)) => Some(op(alpha, y)),
        (CellKind::Union, None, None) => None,
    }
}

/// One cell-wise computation
pub(crate) struct CellJob<'a, T: GraphBLASType> {
    pub kind: CellKind,
    pub op: &'a BinaryOp<T>,
    /// First input; `None` reads it from the output (C updated in place)
    pub a: Option<&'a Cells<'a, T>>,
    pub b: &'a Cells<'a, T>,
    /// Uncomplemented mask byte per cell
    pub mask: Option<&'a [u8]>,
    pub complement: bool,
    pub clear_masked_out: bool,
    pub alpha: T,
    pub beta: T,
}

impl<'a, T: GraphBLASType> CellJob<'a, T> {
    fn spec(&self) -> CellKernelSpec {
        CellKernelSpec {
            kind: self.kind,
            opcode: self.op.opcode(),
            type_code: T::TYPE_CODE,
            a_full: self.a.map_or(false, |a| a.is_full()),
            a_iso: self.a.map_or(false, |a| a.iso),
            b_full: self.b.is_full(),
            b_iso: self.b.iso,
            mask: match self.mask {
                None => MaskMode::None,
                Some(_) if self.complement => MaskMode::Complement,
                Some(_) => MaskMode::Mask,
            },
            clear_masked_out: self.clear_masked_out,
        }
    }
}

/// Run `job` over every cell of `cb`/`cx`; returns the number of present cells
///
/// Every output presence byte is written; a value only where the cell is
/// present.
pub(crate) fn run_cells<T: GraphBLASType>(
    job: &CellJob<'_, T>,
    cb: &mut [u8],
    cx: &mut [T],
    ctx: &Context,
) -> Result<usize> {
    debug_assert_eq!(cb.len(), cx.len());
    let n = cb.len();
    let nthreads = ctx.nthreads(n as f64);
    let ntasks = slice::ntasks(nthreads, n);

    if ctx.jit().control.allows_lookup() {
        let request = encodify(job.spec(), job.op);
        if let Some(loaded) = ctx
            .kernel_cache()
            .get_or_build(&request, ctx.kernel_source(), ctx.jit())?
        {
            log::debug!(
                "cells: {} kernel {}, {} cells, {} tasks",
                if loaded.kernel.is_native() { "jit" } else { "interpreted" },
                request.key.name(),
                n,
                ntasks
            );
            return Ok(run_kernel(&loaded.kernel, job, cb, cx, ntasks));
        }
    }

    log::debug!(
        "cells: {} kernel {}_{}, {} cells, {} tasks",
        if job.op.is_builtin() { "factory" } else { "generic" },
        job.kind.name(),
        job.op.name(),
        n,
        ntasks
    );
    Ok(dispatch(
        job.op,
        FactoryCells {
            job,
            cb,
            cx,
            ntasks,
        },
    ))
}

fn run_kernel<T: GraphBLASType>(
    kernel: &CompiledKernel,
    job: &CellJob<'_, T>,
    cb: &mut [u8],
    cx: &mut [T],
    ntasks: usize,
) -> usize {
    let n = cb.len();
    let cbp = cb.as_mut_ptr();
    let cxp = cx.as_mut_ptr() as *mut u8;
    let (ab, ax) = match job.a {
        Some(a) => (
            a.b.as_ref().map_or(ptr::null(), |b| b.as_ptr()),
            a.x.as_ptr() as *const u8,
        ),
        None => (cbp as *const u8, cxp as *const u8),
    };
    let call: UserOpCall = call_user_op::<T>;
    let args = KernelArgs {
        ab,
        ax,
        bb: job.b.b.as_ref().map_or(ptr::null(), |b| b.as_ptr()),
        bx: job.b.x.as_ptr() as *const u8,
        mb: job.mask.map_or(ptr::null(), |m| m.as_ptr()),
        cb: cbp,
        cx: cxp,
        alpha: &job.alpha as *const T as *const u8,
        beta: &job.beta as *const T as *const u8,
        op_ctx: job.op.function() as *const () as *const u8,
        op_call: call as *const () as *const u8,
    };
    (0..ntasks)
        .into_par_iter()
        .map(|tid| {
            let cells = slice::partition(n, tid, ntasks);
            // SAFETY: every array covers all n cells and tasks own disjoint
            // output ranges; in place, each cell is read before it is written
            unsafe { kernel.run(&args, cells.start, cells.end) }
        })
        .sum()
}

struct FactoryCells<'j, 'a, T: GraphBLASType> {
    job: &'j CellJob<'a, T>,
    cb: &'j mut [u8],
    cx: &'j mut [T],
    ntasks: usize,
}

impl<'j, 'a, T: GraphBLASType> OpKernel<T> for FactoryCells<'j, 'a, T> {
    type Output = usize;

    fn run<F>(self, f: F) -> usize
    where
        F: Fn(T, T) -> T + Send + Sync + Copy,
    {
        let job = self.job;
        let n = self.cb.len();
        let chunk = ((n + self.ntasks - 1) / self.ntasks).max(1);
        self.cb
            .par_chunks_mut(chunk)
            .zip(self.cx.par_chunks_mut(chunk))
            .enumerate()
            .map(|(tid, (cb, cx))| {
                let base = tid * chunk;
                let mut count = 0;
                for k in 0..cb.len() {
                    let p = base + k;
                    let m = job.mask.map_or(true, |mb| (mb[p] != 0) != job.complement);
                    let a = match job.a {
                        Some(a) => a.present(p).then(|| a.value(p)),
                        None => (cb[k] != 0).then(|| cx[k]),
                    };
                    let b = job.b.present(p).then(|| job.b.value(p));
                    match resolve_cell(job.kind, job.clear_masked_out, m, a, b, job.alpha, job.beta, &f) {
                        Some(z) => {
                            cb[k] = 1;
                            cx[k] = z;
                            count += 1;
                        }
                        None => cb[k] = 0,
                    }
                }
                count
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::backend::KernelSource;
    use crate::compiler::cache::KernelCache;
    use crate::compiler::interpreter::InterpretedSource;
    use crate::compiler::CraneliftSource;
    use crate::core::binary_op::BinaryOpcode;
    use crate::core::context::JitControl;
    use std::borrow::Cow;
    use std::sync::Arc;

    fn cells(b: &[u8], x: &[i64]) -> Cells<'static, i64> {
        Cells {
            b: Some(Cow::Owned(b.to_vec())),
            x: Cow::Owned(x.to_vec()),
            iso: false,
        }
    }

    fn context(control: JitControl, source: Arc<dyn KernelSource>) -> Context {
        Context::new()
            .with_kernel_cache(Arc::new(KernelCache::in_memory()))
            .with_kernel_source(source)
            .with_jit_control(control)
    }

    #[test]
    fn test_resolve_cell() {
        let plus = |x: i32, y: i32| x + y;
        assert_eq!(resolve_cell(CellKind::Add, true, true, Some(1), Some(2), 0, 0, &plus), Some(3));
        assert_eq!(resolve_cell(CellKind::Add, true, true, None, Some(2), 0, 0, &plus), Some(2));
        assert_eq!(resolve_cell(CellKind::Mult, true, true, Some(1), None, 0, 0, &plus), None);
        assert_eq!(resolve_cell(CellKind::Union, true, true, Some(1), None, 10, 20, &plus), Some(21));
        assert_eq!(resolve_cell(CellKind::Union, true, true, None, Some(2), 10, 20, &plus), Some(12));
        assert_eq!(resolve_cell(CellKind::Second, false, true, Some(1), None, 0, 0, &plus), None);
        assert_eq!(resolve_cell(CellKind::Second, false, false, Some(1), Some(5), 0, 0, &plus), Some(1));
        assert_eq!(resolve_cell(CellKind::Second, true, false, Some(1), Some(5), 0, 0, &plus), None);
    }

    #[test]
    fn test_cell_present_matches_resolve() {
        let first = |x: i32, _y: i32| x;
        for kind in [CellKind::Add, CellKind::Union, CellKind::Mult, CellKind::Second] {
            for bits in 0..16u8 {
                let (clear, m, a, b) = (bits & 1 != 0, bits & 2 != 0, bits & 4 != 0, bits & 8 != 0);
                let z = resolve_cell(kind, clear, m, a.then_some(1), b.then_some(2), 0, 0, &first);
                assert_eq!(z.is_some(), cell_present(kind, clear, m, a, b));
            }
        }
    }

    #[test]
    fn test_kernels_agree() {
        let a = cells(&[1, 1, 0, 0, 1, 0], &[1, 2, 0, 0, 5, 0]);
        let b = cells(&[1, 0, 1, 0, 1, 1], &[10, 0, 30, 0, 50, 60]);
        let mask = [1u8, 1, 1, 1, 0, 0];
        let op = BinaryOp::<i64>::times();
        let user = BinaryOp::<i64>::user("mul", "z = x * y", |x, y| x * y).unwrap();
        let mut results = Vec::new();
        for (control, source) in [
            (JitControl::Off, Arc::new(InterpretedSource) as Arc<dyn KernelSource>),
            (JitControl::On, Arc::new(InterpretedSource)),
            (JitControl::On, Arc::new(CraneliftSource::new())),
        ] {
            for op in [&op, &user] {
                let ctx = context(control, Arc::clone(&source));
                let job = CellJob {
                    kind: CellKind::Add,
                    op,
                    a: Some(&a),
                    b: &b,
                    mask: Some(&mask),
                    complement: false,
                    clear_masked_out: true,
                    alpha: 0,
                    beta: 0,
                };
                let (mut cb, mut cx) = (vec![0u8; 6], vec![0i64; 6]);
                let count = run_cells(&job, &mut cb, &mut cx, &ctx).unwrap();
                let present: Vec<Option<i64>> =
                    cb.iter().zip(&cx).map(|(&p, &v)| (p != 0).then_some(v)).collect();
                results.push((count, present));
            }
        }
        assert_eq!(results[0], (3, vec![Some(10), Some(2), Some(30), None, None, None]));
        assert!(results.iter().all(|r| *r == results[0]));
    }

    #[test]
    fn test_comparison_kernels_agree() {
        let a = cells(&[1, 1, 0, 0, 1, 0], &[1, 2, 0, 0, 5, 0]);
        let b = cells(&[1, 0, 1, 0, 1, 1], &[10, 0, 30, 0, 50, 60]);
        let isgt = BinaryOp::<i64>::builtin(BinaryOpcode::IsGt);
        for (control, source) in [
            (JitControl::Off, Arc::new(InterpretedSource) as Arc<dyn KernelSource>),
            (JitControl::On, Arc::new(InterpretedSource)),
            (JitControl::On, Arc::new(CraneliftSource::new())),
        ] {
            let ctx = context(control, source);
            let job = CellJob {
                kind: CellKind::Union,
                op: &isgt,
                a: Some(&a),
                b: &b,
                mask: None,
                complement: false,
                clear_masked_out: true,
                alpha: 3,
                beta: 1,
            };
            let (mut cb, mut cx) = (vec![0u8; 6], vec![0i64; 6]);
            let count = run_cells(&job, &mut cb, &mut cx, &ctx).unwrap();
            let present: Vec<Option<i64>> = cb.iter().zip(&cx).map(|(&p, &v)| (p != 0).then_some(v)).collect();
            // missing sides take alpha = 3 for A and beta = 1 for B
            assert_eq!(count, 5, "{:?}", control);
            assert_eq!(present, vec![Some(0), Some(1), Some(0), None, Some(0), Some(0)]);
        }
    }

    #[test]
    fn test_in_place_update() {
        let b = Cells::scalar(7i64);
        let mask = [0u8, 1, 0, 1];
        let op = BinaryOp::plus();
        for control in [JitControl::Off, JitControl::On] {
            let ctx = context(control, Arc::new(CraneliftSource::new()));
            let job = CellJob {
                kind: CellKind::Add,
                op: &op,
                a: None,
                b: &b,
                mask: Some(&mask),
                complement: true,
                clear_masked_out: false,
                alpha: 0,
                beta: 0,
            };
            let (mut cb, mut cx) = (vec![1u8, 1, 0, 0], vec![1i64, 2, 0, 0]);
            let count = run_cells(&job, &mut cb, &mut cx, &ctx).unwrap();
            assert_eq!(count, 3);
            assert_eq!(cb, vec![1, 1, 1, 0]);
            assert_eq!(&cx[..3], &[8, 2, 7]);
        }
    }
}
