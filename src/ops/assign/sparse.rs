// Assignment into a sparse or hypersparse C
//
// The entries of C(I,J) are located once per column (the snapshot S) and the
// net change of every touched cell is computed against that immutable
// snapshot in parallel: an entry of S is updated in place or turned into a
// zombie, a new entry becomes a pending tuple. The actions are applied
// afterwards in task order; zombies and pending tuples stay in C until it is
// next finalized.

use super::{AssignJob, Source};
use crate::core::binary_op::BinaryOp;
use crate::core::context::Context;
use crate::core::error::Result;
use crate::core::index_list::Indices;
use crate::core::matrix::{flip, is_zombie, Matrix, Storage};
use crate::core::view::MatrixView;
use crate::ops::cells::resolve_cell;
use crate::ops::factory::{dispatch, OpKernel};
use crate::slice::{self, TaskSlice};
use crate::types::GraphBLASType;
use rayon::prelude::*;
use std::ops::Range;

/// Net change of one cell of C
#[derive(Debug, Clone, Copy, PartialEq)]
enum Action<T> {
    /// Entry at position `pos` takes a new value
    Update(usize, T),
    /// Entry at position `pos` is deleted
    Zombie(usize),
    /// New entry (i, j)
    Insert(usize, usize, T),
}

pub(super) fn assign_sparse<T: GraphBLASType>(
    c: &mut Matrix<T>,
    job: &AssignJob<'_, T>,
    ctx: &Context,
) -> Result<()> {
    c.expand_iso()?;
    let (nrows, _) = c.shape();
    let (mut actions, sweep) = {
        let cv = c.view();

        // work per column of J: its snapshot plus the entries it may gain
        let work: Vec<usize> = (0..job.cols.len())
            .map(|kj| {
                let j = job.cols.get(kj);
                let incoming = match &job.source {
                    Source::Matrix { view, .. } => view.column_range(kj).len(),
                    Source::Scalar(_) => job.rows.len(),
                };
                cv.column_range(j).len() + incoming
            })
            .collect();
        let total: usize = work.iter().sum();
        let ntasks = slice::ntasks(ctx.nthreads(total as f64), job.cols.len());
        let tasks = slice::vector_tasks(&work, job.rows.len(), ntasks);
        log::debug!(
            "assign: sparse C, {}x{} region, {} tasks",
            job.rows.len(),
            job.cols.len(),
            tasks.len()
        );

        let second = BinaryOp::second();
        let actions = dispatch(
            job.accum.unwrap_or(&second),
            RegionActions {
                job,
                cv: &cv,
                tasks: &tasks,
            },
        );
        let sweep = if job.sweeps_outside() {
            outside_zombies(job, &cv, ctx)
        } else {
            Vec::new()
        };
        (actions, sweep)
    };
    actions.extend(sweep.into_iter().map(Action::Zombie));
    apply(c, actions, nrows)
}

/// Apply actions computed against the snapshot
fn apply<T: GraphBLASType>(c: &mut Matrix<T>, actions: Vec<Action<T>>, nrows: usize) -> Result<()> {
    let (mut updates, mut zombies, mut inserts) = (0usize, 0usize, 0usize);
    let mut new_zombies = 0;
    if let Storage::Hypersparse { i, x, .. } | Storage::Sparse { i, x, .. } = &mut c.storage {
        for action in &actions {
            match *action {
                Action::Update(pos, value) => {
                    x[pos] = value;
                    updates += 1;
                }
                Action::Zombie(pos) => {
                    if !is_zombie(i[pos]) {
                        i[pos] = flip(i[pos]);
                        new_zombies += 1;
                    }
                    zombies += 1;
                }
                Action::Insert(..) => {}
            }
        }
    }
    c.nzombies += new_zombies;
    c.pending.reserve(actions.len())?;
    for action in actions {
        if let Action::Insert(row, col, value) = action {
            debug_assert!(row < nrows);
            c.pending.push(row, col, value)?;
            inserts += 1;
        }
    }
    log::debug!(
        "assign: {} updated in place, {} zombies, {} pending",
        updates,
        zombies,
        inserts
    );
    Ok(())
}

/// Positions of C(i,j) for i in `rows(klo..khi)`, as (ki, pos) sorted by ki
fn snapshot<T: GraphBLASType>(
    cv: &MatrixView<'_, T>,
    rows: &Indices<'_>,
    j: usize,
    ks: &Range<usize>,
) -> Vec<(usize, usize)> {
    if ks.is_empty() {
        return Vec::new();
    }
    let range = if rows.is_monotone() {
        cv.column_rows(j, rows.get(ks.start), rows.get(ks.end - 1) + 1)
    } else {
        cv.column_range(j)
    };
    let mut s: Vec<(usize, usize)> = range
        .filter_map(|pos| {
            rows.position(cv.row(pos))
                .filter(|ki| ks.contains(ki))
                .map(|ki| (ki, pos))
        })
        .collect();
    if !rows.is_monotone() {
        s.sort_unstable_by_key(|e| e.0);
    }
    s
}

struct RegionActions<'r, 'a, 'v, T: GraphBLASType> {
    job: &'r AssignJob<'a, T>,
    cv: &'r MatrixView<'v, T>,
    tasks: &'r [TaskSlice],
}

impl<'r, 'a, 'v, T: GraphBLASType> OpKernel<T> for RegionActions<'r, 'a, 'v, T> {
    type Output = Vec<Action<T>>;

    fn run<F>(self, f: F) -> Vec<Action<T>>
    where
        F: Fn(T, T) -> T + Send + Sync + Copy,
    {
        let (job, cv) = (self.job, self.cv);
        let kind = job.kind();
        let nrows_region = job.rows.len();
        let per_task: Vec<Vec<Action<T>>> = self
            .tasks
            .par_iter()
            .map(|task| {
                let ks = task.rows.clone().unwrap_or(0..nrows_region);
                let mut out = Vec::new();
                for kj in task.vectors() {
                    let j = job.cols.get(kj);
                    let s = snapshot(cv, &job.rows, j, &ks);
                    let mut visit = |ki: usize, pos: Option<usize>, new: Option<T>| {
                        let i = job.rows.get(ki);
                        let m = job.mask_at(i, j, ki, kj);
                        let old = pos.map(|p| cv.value(p));
                        let z = resolve_cell(kind, job.replace, m, old, new, T::default(), T::default(), &f);
                        match (pos, z) {
                            (Some(p), Some(v)) => out.push(Action::Update(p, v)),
                            (Some(p), None) => out.push(Action::Zombie(p)),
                            (None, Some(v)) => out.push(Action::Insert(i, j, v)),
                            (None, None) => {}
                        }
                    };
                    match &job.source {
                        Source::Scalar(value) => {
                            let mut at = s.iter().peekable();
                            for ki in ks.clone() {
                                let pos = at.next_if(|e| e.0 == ki).map(|e| e.1);
                                visit(ki, pos, Some(*value));
                            }
                        }
                        Source::Matrix { view, .. } => {
                            // merge the snapshot with column kj of A, both sorted by ki
                            let incoming: Vec<(usize, T)> = view
                                .column_rows(kj, ks.start, ks.end)
                                .filter(|&p| view.present(p))
                                .map(|p| (view.row(p), view.value(p)))
                                .collect();
                            let (mut x, mut y) = (0, 0);
                            while x < s.len() || y < incoming.len() {
                                let ks_old = s.get(x).map_or(usize::MAX, |e| e.0);
                                let ks_new = incoming.get(y).map_or(usize::MAX, |e| e.0);
                                if ks_old == ks_new {
                                    visit(ks_old, Some(s[x].1), Some(incoming[y].1));
                                    x += 1;
                                    y += 1;
                                } else if ks_old < ks_new {
                                    visit(ks_old, Some(s[x].1), None);
                                    x += 1;
                                } else {
                                    visit(ks_new, None, Some(incoming[y].1));
                                    y += 1;
                                }
                            }
                        }
                    }
                }
                out
            })
            .collect();
        per_task.into_iter().flatten().collect()
    }
}

/// Entries of C outside IxJ where the mask is false
fn outside_zombies<T: GraphBLASType>(job: &AssignJob<'_, T>, cv: &MatrixView<'_, T>, ctx: &Context) -> Vec<usize> {
    let nvec = cv.nvec();
    let ntasks = slice::ntasks(ctx.nthreads(cv.nvals as f64), nvec);
    let per_task: Vec<Vec<usize>> = (0..ntasks)
        .into_par_iter()
        .map(|tid| {
            let mut out = Vec::new();
            for k in slice::partition(nvec, tid, ntasks) {
                let j = cv.vector(k);
                let in_cols = job.cols.position(j).is_some();
                for pos in cv.range(k) {
                    let i = cv.row(pos);
                    let inside = in_cols && job.rows.position(i).is_some();
                    if !inside && !job.mask.get(i, j) {
                        out.push(pos);
                    }
                }
            }
            out
        })
        .collect();
    per_task.into_iter().flatten().collect()
}
