// Core Layer: Layout conversion
//
// Explicit conversion between the four layouts and the density heuristic that
// picks a layout after an operation. Conversions build the target arrays
// before swapping them in.

use crate::core::error::{try_filled, try_with_capacity, GraphBlasError, Result};
use crate::core::matrix::{sparsity_control, Matrix, Sparsity, Storage};
use crate::types::GraphBLASType;

impl<T: GraphBLASType> Matrix<T> {
    /// Allowed layouts as `sparsity_control` bit flags
    pub fn sparsity_control(&self) -> u8 {
        self.sparsity_control
    }

    /// Restrict the allowed layouts and conform to them
    pub fn set_sparsity_control(&mut self, control: u8) -> Result<()> {
        let control = control & sparsity_control::AUTO;
        if control == 0 {
            return Err(GraphBlasError::InvalidValue);
        }
        self.sparsity_control = control;
        self.conform()
    }

    pub fn hyper_switch(&self) -> f64 {
        self.hyper_switch
    }

    /// Fraction of non-empty columns below which the matrix goes hypersparse
    pub fn set_hyper_switch(&mut self, hyper_switch: f64) -> Result<()> {
        if !hyper_switch.is_finite() {
            return Err(GraphBlasError::InvalidValue);
        }
        self.hyper_switch = hyper_switch;
        Ok(())
    }

    pub fn bitmap_switch(&self) -> f64 {
        self.bitmap_switch
    }

    /// Density at or above which the matrix goes bitmap
    pub fn set_bitmap_switch(&mut self, bitmap_switch: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&bitmap_switch) {
            return Err(GraphBlasError::InvalidValue);
        }
        self.bitmap_switch = bitmap_switch;
        Ok(())
    }

    /// Finalize, then move to the layout chosen by the density heuristic
    pub fn conform(&mut self) -> Result<()> {
        self.wait()?;
        self.conform_finalized()
    }

    pub(crate) fn conform_finalized(&mut self) -> Result<()> {
        let target = self.choose_sparsity();
        if target != self.sparsity() {
            log::trace!("conform: {:?} -> {:?}", self.sparsity(), target);
            self.convert_finalized(target)?;
        }
        Ok(())
    }

    fn nonempty_columns(&self) -> usize {
        match &self.storage {
            Storage::Hypersparse { p, .. } | Storage::Sparse { p, .. } => {
                p.windows(2).filter(|w| w[1] > w[0]).count()
            }
            Storage::Bitmap { b, .. } => {
                if self.nrows == 0 {
                    0
                } else {
                    b.chunks(self.nrows).filter(|c| c.iter().any(|&v| v != 0)).count()
                }
            }
            Storage::Full { .. } => {
                if self.nrows == 0 {
                    0
                } else {
                    self.ncols
                }
            }
        }
    }

    /// Layout the heuristic picks for a finalized matrix
    fn choose_sparsity(&self) -> Sparsity {
        let control = self.sparsity_control;
        let current = self.sparsity();
        let allows = |s: Sparsity| control & s.control_bit() != 0;

        if allows(Sparsity::Full) && self.as_if_full() {
            return Sparsity::Full;
        }
        let sparse_allowed = allows(Sparsity::Sparse) || allows(Sparsity::Hypersparse);
        if allows(Sparsity::Bitmap) || !sparse_allowed {
            if !sparse_allowed {
                return Sparsity::Bitmap;
            }
            let ncells = self.ncells() as f64;
            let density = if ncells > 0.0 {
                self.live_nvals() as f64 / ncells
            } else {
                0.0
            };
            // a bitmap only goes back to sparse at half the switch density
            let threshold = if current == Sparsity::Bitmap {
                self.bitmap_switch / 2.0
            } else {
                self.bitmap_switch
            };
            if ncells > 0.0 && density >= threshold {
                return Sparsity::Bitmap;
            }
        }
        if !allows(Sparsity::Hypersparse) {
            return Sparsity::Sparse;
        }
        if !allows(Sparsity::Sparse) {
            return Sparsity::Hypersparse;
        }
        if self.ncols <= 1 {
            return Sparsity::Sparse;
        }
        let nonempty = self.nonempty_columns() as f64;
        let limit = self.hyper_switch * self.ncols as f64;
        // leaving hypersparse takes twice the switch
        let limit = if current == Sparsity::Hypersparse {
            2.0 * limit
        } else {
            limit
        };
        if nonempty <= limit {
            Sparsity::Hypersparse
        } else {
            Sparsity::Sparse
        }
    }

    /// Convert to `target`, finalizing first
    ///
    /// Converting to full requires every cell to be present.
    pub fn convert_to(&mut self, target: Sparsity) -> Result<()> {
        self.wait()?;
        if target == self.sparsity() {
            return Ok(());
        }
        if target == Sparsity::Full && !self.as_if_full() {
            return Err(GraphBlasError::InvalidValue);
        }
        log::debug!("convert: {:?} -> {:?}", self.sparsity(), target);
        self.convert_finalized(target)
    }

    pub(crate) fn convert_finalized(&mut self, target: Sparsity) -> Result<()> {
        debug_assert!(!self.has_pending_work());
        let storage = match (&self.storage, target) {
            (Storage::Full { x }, Sparsity::Bitmap) => Storage::Bitmap {
                b: try_filled(self.ncells(), 1u8)?,
                x: x.clone(),
                nvals: self.ncells(),
            },
            (Storage::Bitmap { x, .. }, Sparsity::Full) => Storage::Full { x: x.clone() },
            _ => {
                let (p, i, x) = self.sparse_parts()?;
                match target {
                    Sparsity::Sparse => Storage::Sparse { p, i, x },
                    Sparsity::Hypersparse => {
                        let nonempty = p.windows(2).filter(|w| w[1] > w[0]).count();
                        let mut h = try_with_capacity(nonempty)?;
                        let mut hp = try_with_capacity(nonempty + 1)?;
                        hp.push(0);
                        for j in 0..self.ncols {
                            if p[j + 1] > p[j] {
                                h.push(j);
                                hp.push(p[j + 1]);
                            }
                        }
                        Storage::Hypersparse { h, p: hp, i, x }
                    }
                    Sparsity::Bitmap => {
                        let n = self.ncells();
                        let mut b = try_filled(n, 0u8)?;
                        let mut bx = if self.iso {
                            x.clone()
                        } else {
                            try_filled(n, T::default())?
                        };
                        for j in 0..self.ncols {
                            for pos in p[j]..p[j + 1] {
                                let cell = j * self.nrows + i[pos];
                                b[cell] = 1;
                                if !self.iso {
                                    bx[cell] = x[pos];
                                }
                            }
                        }
                        Storage::Bitmap {
                            b,
                            x: bx,
                            nvals: i.len(),
                        }
                    }
                    // all cells present: the sorted column-major values are the cells
                    Sparsity::Full => Storage::Full { x },
                }
            }
        };
        self.storage = storage;
        Ok(())
    }

    /// Compressed-column arrays (one pointer per column) of a finalized matrix
    fn sparse_parts(&self) -> Result<(Vec<usize>, Vec<usize>, Vec<T>)> {
        let (nrows, ncols) = (self.nrows, self.ncols);
        let nvals = self.live_nvals();
        match &self.storage {
            Storage::Sparse { p, i, x } => Ok((p.clone(), i.clone(), x.clone())),
            Storage::Hypersparse { h, p, i, x } => {
                let mut pf = try_filled(ncols + 1, 0usize)?;
                let mut k = 0;
                for j in 0..ncols {
                    pf[j] = p[k];
                    if k < h.len() && h[k] == j {
                        k += 1;
                    }
                }
                pf[ncols] = p[k];
                Ok((pf, i.clone(), x.clone()))
            }
            Storage::Bitmap { b, x, .. } => {
                let mut p = try_with_capacity(ncols + 1)?;
                let mut i = try_with_capacity(nvals)?;
                let mut xs = if self.iso {
                    x.clone()
                } else {
                    try_with_capacity(nvals)?
                };
                p.push(0);
                for j in 0..ncols {
                    for r in 0..nrows {
                        let cell = j * nrows + r;
                        if b[cell] != 0 {
                            i.push(r);
                            if !self.iso {
                                xs.push(x[cell]);
                            }
                        }
                    }
                    p.push(i.len());
                }
                Ok((p, i, xs))
            }
            Storage::Full { x } => {
                let mut p = try_with_capacity(ncols + 1)?;
                let mut i = try_with_capacity(nvals)?;
                p.push(0);
                for _ in 0..ncols {
                    i.extend(0..nrows);
                    p.push(i.len());
                }
                Ok((p, i, x.clone()))
            }
        }
    }
}
