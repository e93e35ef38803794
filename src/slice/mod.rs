// Work Partitioner: Split vectors or entries into balanced task slices
//
// Every function here is a pure function of its arguments, so identical
// inputs always produce identical slicing and reductions over per-task
// partials merge in the same order on every run.

use std::ops::Range;

/// Tasks created per thread when more than one thread is used
pub const TASKS_PER_THREAD: usize = 32;

/// Threads worth using for `work` units, at least one and at most `nthreads_max`
pub fn nthreads(work: f64, chunk: f64, nthreads_max: usize) -> usize {
    let nthreads_max = nthreads_max.max(1);
    let chunk = if chunk > 0.0 { chunk } else { 1.0 };
    let wanted = (work / chunk).floor();
    if !(wanted >= 1.0) {
        return 1;
    }
    if wanted >= nthreads_max as f64 {
        nthreads_max
    } else {
        wanted as usize
    }
}

/// Number of tasks for `units` independent pieces of work
pub fn ntasks(nthreads: usize, units: usize) -> usize {
    if nthreads <= 1 {
        1
    } else {
        (TASKS_PER_THREAD * nthreads).min(units.max(1))
    }
}

/// Half-open range `tid` of `ntasks` near-equal pieces of `0..n`
pub fn partition(n: usize, tid: usize, ntasks: usize) -> Range<usize> {
    debug_assert!(tid < ntasks);
    let at = |t: usize| ((t as u128 * n as u128) / ntasks as u128) as usize;
    let start = if tid == 0 { 0 } else { at(tid) };
    let end = if tid + 1 == ntasks { n } else { at(tid + 1) };
    start..end
}

/// Vector range, or a row range inside one heavy vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSlice {
    /// First vector
    pub kfirst: usize,
    /// One past the last vector
    pub klast: usize,
    /// Row range of a fine task; `klast == kfirst + 1`
    pub rows: Option<Range<usize>>,
}

impl TaskSlice {
    pub fn is_fine(&self) -> bool {
        self.rows.is_some()
    }

    pub fn vectors(&self) -> Range<usize> {
        self.kfirst..self.klast
    }
}

/// Group vectors into about `ntasks` tasks of balanced work
///
/// Consecutive vectors are gathered until a task reaches the target work. A
/// vector heavier than the target becomes several fine tasks over disjoint row
/// ranges of `0..vlen`. Tasks are in vector order, and fine tasks of one vector
/// in row order, so task outputs concatenate in the order of the result.
pub fn vector_tasks(work: &[usize], vlen: usize, ntasks: usize) -> Vec<TaskSlice> {
    let nvec = work.len();
    if ntasks <= 1 || nvec == 0 {
        return vec![TaskSlice {
            kfirst: 0,
            klast: nvec,
            rows: None,
        }];
    }
    let total: usize = work.iter().sum();
    let target = (total / ntasks).max(1);

    let mut tasks = Vec::with_capacity(ntasks + 1);
    let mut start = 0;
    let mut acc = 0;
    for (k, &w) in work.iter().enumerate() {
        if w > target && vlen > 1 {
            if start < k {
                tasks.push(TaskSlice {
                    kfirst: start,
                    klast: k,
                    rows: None,
                });
            }
            let nfine = ((w + target - 1) / target).min(vlen);
            for f in 0..nfine {
                tasks.push(TaskSlice {
                    kfirst: k,
                    klast: k + 1,
                    rows: Some(partition(vlen, f, nfine)),
                });
            }
            start = k + 1;
            acc = 0;
            continue;
        }
        acc += w;
        if acc >= target {
            tasks.push(TaskSlice {
                kfirst: start,
                klast: k + 1,
                rows: None,
            });
            start = k + 1;
            acc = 0;
        }
    }
    if start < nvec {
        tasks.push(TaskSlice {
            kfirst: start,
            klast: nvec,
            rows: None,
        });
    }
    tasks
}

/// Entry range of one task plus the vectors it touches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySlice {
    pub entries: Range<usize>,
    /// Vector holding the first entry
    pub kfirst: usize,
    /// Vector holding the last entry
    pub klast: usize,
}

/// Split the entries described by vector pointers `p` into `ntasks` ranges
///
/// Empty ranges are dropped; a vector may be shared by neighbouring tasks.
pub fn ek_slice(p: &[usize], ntasks: usize) -> Vec<EntrySlice> {
    let nvec = p.len().saturating_sub(1);
    let nnz = p.last().copied().unwrap_or(0);
    let ntasks = ntasks.clamp(1, nnz.max(1));
    let vector_of = |pos: usize| p[..nvec + 1].partition_point(|&start| start <= pos) - 1;
    (0..ntasks)
        .map(|tid| partition(nnz, tid, ntasks))
        .filter(|r| !r.is_empty())
        .map(|entries| EntrySlice {
            kfirst: vector_of(entries.start),
            klast: vector_of(entries.end - 1),
            entries,
        })
        .collect()
}

/// Split `data` into consecutive pieces of the given lengths
pub fn split_by_lengths<'a, X>(mut data: &'a mut [X], lens: &[usize]) -> Vec<&'a mut [X]> {
    let mut pieces = Vec::with_capacity(lens.len());
    for &len in lens {
        let (head, tail) = std::mem::take(&mut data).split_at_mut(len);
        pieces.push(head);
        data = tail;
    }
    pieces
}

/// Exclusive prefix sum in place; returns the total
pub fn cumsum(counts: &mut [usize]) -> usize {
    let mut total = 0;
    for c in counts.iter_mut() {
        let here = *c;
        *c = total;
        total += here;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nthreads_heuristic() {
        assert_eq!(nthreads(10.0, 65536.0, 8), 1);
        assert_eq!(nthreads(3.0 * 65536.0, 65536.0, 8), 3);
        assert_eq!(nthreads(1e12, 65536.0, 8), 8);
        assert_eq!(nthreads(f64::NAN, 1.0, 4), 1);
    }

    #[test]
    fn test_partition_covers_range() {
        let n = 103;
        let ntasks = 7;
        let mut next = 0;
        for tid in 0..ntasks {
            let r = partition(n, tid, ntasks);
            assert_eq!(r.start, next);
            next = r.end;
        }
        assert_eq!(next, n);
    }

    #[test]
    fn test_vector_tasks_are_deterministic_and_complete() {
        let work = vec![1, 0, 3, 2, 5, 1, 1, 0, 4];
        let a = vector_tasks(&work, 10, 4);
        let b = vector_tasks(&work, 10, 4);
        assert_eq!(a, b);
        let mut k = 0;
        for t in &a {
            // fine tasks of one vector repeat the same kfirst
            assert!(t.kfirst == k || (t.is_fine() && t.kfirst + 1 == k));
            k = t.klast;
        }
        assert!(a.iter().any(|t| t.is_fine()));
        assert_eq!(k, work.len());
    }

    #[test]
    fn test_heavy_vector_split_into_fine_tasks() {
        let work = vec![1, 1, 100, 1];
        let tasks = vector_tasks(&work, 50, 4);
        let fine: Vec<_> = tasks.iter().filter(|t| t.is_fine()).collect();
        assert!(fine.len() > 1);
        assert!(fine.iter().all(|t| t.kfirst == 2 && t.klast == 3));
        let mut row = 0;
        for t in fine {
            let rows = t.rows.clone().unwrap();
            assert_eq!(rows.start, row);
            row = rows.end;
        }
        assert_eq!(row, 50);
    }

    #[test]
    fn test_single_task() {
        let tasks = vector_tasks(&[5, 5, 5], 3, 1);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].vectors(), 0..3);
    }

    #[test]
    fn test_ek_slice() {
        // vectors: [0,3) [3,3) [3,10)
        let p = [0, 3, 3, 10];
        let slices = ek_slice(&p, 3);
        assert_eq!(slices.len(), 3);
        assert_eq!(slices[0].entries, 0..3);
        assert_eq!((slices[0].kfirst, slices[0].klast), (0, 0));
        assert_eq!((slices[1].kfirst, slices[1].klast), (2, 2));
        assert_eq!(slices[2].entries.end, 10);
        assert!(ek_slice(&[0, 0], 4).is_empty());
    }

    #[test]
    fn test_split_and_cumsum() {
        let mut counts = vec![2, 0, 3];
        assert_eq!(cumsum(&mut counts), 5);
        assert_eq!(counts, vec![0, 2, 2]);

        let mut data = [1, 2, 3, 4, 5];
        let pieces = split_by_lengths(&mut data, &[2, 0, 3]);
        assert_eq!(pieces[0], &[1, 2]);
        assert!(pieces[1].is_empty());
        assert_eq!(pieces[2], &[3, 4, 5]);
    }
}
