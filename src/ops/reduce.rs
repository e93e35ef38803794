// Reduction to a scalar
//
// Entries are cut into equal slices, each slice is folded in parallel starting
// from the identity, and the partials are combined in slice order. The slicing
// depends only on the matrix and the thread count, so repeated reductions of
// the same matrix combine their values in the same order.

use crate::core::context::Context;
use crate::core::error::Result;
use crate::core::matrix::Matrix;
use crate::core::monoid::Monoid;
use crate::core::view::MatrixView;
use crate::ops::factory::{dispatch, OpKernel};
use crate::slice;
use crate::types::GraphBLASType;
use rayon::prelude::*;
use std::ops::Range;

/// Reduce all entries of `a` with `monoid`
///
/// # Arguments
/// * `monoid` - Associative operator and its identity
/// * `a` - Input matrix; pending work is finished on a private copy
///
/// Returns the identity for a matrix with no entries.
pub fn reduce_to_scalar<T: GraphBLASType>(monoid: &Monoid<T>, a: &Matrix<T>, ctx: &Context) -> Result<T> {
    ctx.install(|| {
        let a = a.finalized()?;
        let v = a.view();
        let identity = monoid.identity();
        if v.nvals == 0 {
            return Ok(identity);
        }
        let ranges: Vec<Range<usize>> = match v.p {
            Some(p) => {
                let nnz = v.nvals;
                let ntasks = slice::ntasks(ctx.nthreads(nnz as f64), nnz);
                slice::ek_slice(p, ntasks).into_iter().map(|s| s.entries).collect()
            }
            None => {
                let n = v.vlen * v.vdim;
                let ntasks = slice::ntasks(ctx.nthreads(n as f64), n);
                (0..ntasks).map(|tid| slice::partition(n, tid, ntasks)).collect()
            }
        };
        log::debug!(
            "reduce: {} over {} entries in {} slices",
            monoid.name(),
            v.nvals,
            ranges.len()
        );
        let partials = dispatch(
            monoid.op(),
            Partials {
                view: &v,
                ranges: &ranges,
                identity,
            },
        );
        Ok(partials.into_iter().fold(identity, |acc, x| monoid.apply(acc, x)))
    })
}

struct Partials<'r, 'a, T> {
    view: &'r MatrixView<'a, T>,
    ranges: &'r [Range<usize>],
    identity: T,
}

impl<'r, 'a, T: GraphBLASType> OpKernel<T> for Partials<'r, 'a, T> {
    type Output = Vec<T>;

    fn run<F>(self, f: F) -> Vec<T>
    where
        F: Fn(T, T) -> T + Send + Sync + Copy,
    {
        let (view, identity) = (self.view, self.identity);
        self.ranges
            .par_iter()
            .map(|r| {
                r.clone()
                    .filter(|&pos| view.present(pos))
                    .map(|pos| view.value(pos))
                    .fold(identity, f)
            })
            .collect()
    }
}
