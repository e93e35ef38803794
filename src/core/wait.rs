// Core Layer: Finalizing a matrix
//
// Resolves deferred work: pending tuples are sorted and merged, zombies are
// dropped, jumbled columns are sorted. New arrays are fully built before the
// old ones are replaced, so a failed finalize leaves the matrix untouched.

use crate::core::error::{try_filled, try_with_capacity, Result};
use crate::core::matrix::{is_zombie, Matrix, Sparsity, Storage};
use crate::core::pending::Duplicates;
use crate::types::GraphBLASType;

impl<T: GraphBLASType> Matrix<T> {
    /// Finish all pending work; a finalized matrix is left as is
    pub fn wait(&mut self) -> Result<()> {
        if !self.has_pending_work() {
            return Ok(());
        }
        let was_hyper = match self.sparsity() {
            Sparsity::Hypersparse => true,
            Sparsity::Sparse => false,
            // bitmap and full matrices never defer work
            Sparsity::Bitmap | Sparsity::Full => return Ok(()),
        };
        log::trace!(
            "wait: {} pending, {} zombies, jumbled {}",
            self.pending.len(),
            self.nzombies,
            self.jumbled
        );

        if self.iso && !self.pending_keeps_iso() {
            self.expand_iso()?;
        }
        let tuples = self.pending.assemble()?;

        let (h_old, p_old, i_old, x_old): (Option<&[usize]>, &[usize], &[usize], &[T]) =
            match &self.storage {
                Storage::Hypersparse { h, p, i, x } => {
                    (Some(h.as_slice()), p.as_slice(), i.as_slice(), x.as_slice())
                }
                Storage::Sparse { p, i, x } => (None, p.as_slice(), i.as_slice(), x.as_slice()),
                _ => unreachable!("layout checked above"),
            };
        let iso = self.iso;
        let value_at = |pos: usize| if iso { x_old[0] } else { x_old[pos] };
        let nvec_old = p_old.len() - 1;
        let capacity = p_old[nvec_old] - self.nzombies + tuples.len();
        let dup = self.pending.dup();

        let mut h_new: Vec<usize> = Vec::new();
        let mut p_new: Vec<usize> = try_with_capacity(nvec_old + tuples.len() + 1)?;
        let mut i_new: Vec<usize> = try_with_capacity(capacity)?;
        let mut x_new: Vec<T> = if iso {
            vec![x_old[0]]
        } else {
            try_with_capacity(capacity)?
        };
        p_new.push(0);

        let mut live: Vec<(usize, T)> = Vec::new();
        let (mut k, mut t) = (0usize, 0usize);
        loop {
            let next_old = (k < nvec_old).then(|| h_old.map_or(k, |h| h[k]));
            let next_tuple = tuples.get(t).map(|tuple| tuple.1);
            let j = match (next_old, next_tuple) {
                (None, None) => break,
                (Some(a), None) => a,
                (None, Some(b)) => b,
                (Some(a), Some(b)) => a.min(b),
            };

            live.clear();
            if next_old == Some(j) {
                for pos in p_old[k]..p_old[k + 1] {
                    if !is_zombie(i_old[pos]) {
                        live.push((i_old[pos], value_at(pos)));
                    }
                }
                if self.jumbled {
                    live.sort_unstable_by_key(|e| e.0);
                }
                k += 1;
            }
            let t_start = t;
            while t < tuples.len() && tuples[t].1 == j {
                t += 1;
            }
            let incoming = &tuples[t_start..t];

            // merge the live column with the incoming tuples
            let (mut a, mut b) = (0usize, 0usize);
            while a < live.len() || b < incoming.len() {
                let take_live = b >= incoming.len() || (a < live.len() && live[a].0 < incoming[b].0);
                let (row, value) = if take_live {
                    a += 1;
                    live[a - 1]
                } else if a < live.len() && live[a].0 == incoming[b].0 {
                    let merged = dup.resolve(live[a].1, incoming[b].2);
                    a += 1;
                    b += 1;
                    (live[a - 1].0, merged)
                } else {
                    b += 1;
                    (incoming[b - 1].0, incoming[b - 1].2)
                };
                i_new.push(row);
                if !iso {
                    x_new.push(value);
                }
            }
            if i_new.len() > p_new[p_new.len() - 1] {
                h_new.push(j);
                p_new.push(i_new.len());
            }
        }

        let storage = if was_hyper {
            Storage::Hypersparse {
                h: h_new,
                p: p_new,
                i: i_new,
                x: x_new,
            }
        } else {
            // expand the compact column pointers to one per column
            let mut p_full = try_filled(self.ncols + 1, 0usize)?;
            let mut kk = 0;
            for j in 0..self.ncols {
                p_full[j] = p_new[kk];
                if kk < h_new.len() && h_new[kk] == j {
                    kk += 1;
                }
            }
            p_full[self.ncols] = p_new[kk];
            Storage::Sparse {
                p: p_full,
                i: i_new,
                x: x_new,
            }
        };

        self.storage = storage;
        self.nzombies = 0;
        self.pending.clear();
        self.jumbled = false;
        self.conform_finalized()
    }

    /// Pending values can be merged into an iso matrix without expanding it
    fn pending_keeps_iso(&self) -> bool {
        let iso_value = match &self.storage {
            Storage::Hypersparse { x, .. } | Storage::Sparse { x, .. } => x.first().copied(),
            _ => None,
        };
        matches!(self.pending.dup(), Duplicates::LastWins)
            && self.pending.values().iter().all(|v| Some(*v) == iso_value)
    }
}

#[cfg(test)]
mod tests {
    use crate::core::binary_op::BinaryOp;
    use crate::core::matrix::{sparsity_control, Matrix, Sparsity};

    #[test]
    fn test_wait_merges_pending_into_existing() {
        let mut m = Matrix::from_tuples(4, 4, &[0, 3], &[1, 1], &[1, 4], None).unwrap();
        m.set_sparsity_control(sparsity_control::SPARSE).unwrap();
        m.set_element(2, 1, 3).unwrap();
        m.set_element(1, 0, 9).unwrap();
        m.set_element(3, 1, 40).unwrap();
        assert_eq!(m.npending(), 2);
        m.wait().unwrap();
        let (rows, cols, vals) = m.extract_tuples().unwrap();
        assert_eq!(rows, vec![1, 0, 2, 3]);
        assert_eq!(cols, vec![0, 1, 1, 1]);
        assert_eq!(vals, vec![9, 1, 3, 40]);
        assert_eq!(m.sparsity(), Sparsity::Sparse);
    }

    #[test]
    fn test_wait_is_idempotent() {
        let mut m = Matrix::from_tuples(5, 5, &[0, 4], &[0, 4], &[1.0, 2.0], None).unwrap();
        m.set_sparsity_control(sparsity_control::HYPERSPARSE).unwrap();
        m.wait().unwrap();
        let before = m.extract_tuples().unwrap();
        m.wait().unwrap();
        assert_eq!(m.extract_tuples().unwrap(), before);
        assert_eq!(m.sparsity(), Sparsity::Hypersparse);
    }

    #[test]
    fn test_build_dup_combines_in_order() {
        let minus = BinaryOp::<i32>::builtin(crate::core::binary_op::BinaryOpcode::Minus);
        let mut m =
            Matrix::from_tuples(2, 2, &[1, 1, 1], &[0, 0, 0], &[10, 1, 2], Some(&minus)).unwrap();
        assert_eq!(m.extract_element(1, 0).unwrap(), Some(7));
    }

    #[test]
    fn test_jumbled_columns_are_sorted() {
        let mut m = Matrix::from_tuples(4, 1, &[0, 1, 2], &[0, 0, 0], &[1, 2, 3], None).unwrap();
        m.set_sparsity_control(sparsity_control::SPARSE).unwrap();
        if let crate::core::matrix::Storage::Sparse { i, x, .. } = &mut m.storage {
            i.reverse();
            x.reverse();
        }
        m.jumbled = true;
        m.wait().unwrap();
        assert!(!m.is_jumbled());
        let (rows, _, vals) = m.extract_tuples().unwrap();
        assert_eq!(rows, vec![0, 1, 2]);
        assert_eq!(vals, vec![1, 2, 3]);
    }
}
