// Core Layer: Masks
//
// Any matrix can act as a mask, through its structure alone or through its
// values cast to boolean. The mask type is erased here so operations accept a
// mask of any element type. The complement is applied at the single point a
// mask bit is read (`MaskColumn::get`); `raw_cells` exposes uncomplemented
// bytes for kernels that apply the complement themselves.

use crate::core::error::{try_filled, Result};
use crate::core::matrix::Matrix;
use crate::core::view::MatrixView;
use crate::types::GraphBLASType;
use std::borrow::Cow;
use std::collections::HashMap;

/// A matrix usable as a mask
pub trait MaskSource: Sync {
    /// (nrows, ncols) of the mask
    fn mask_shape(&self) -> (usize, usize);

    /// Type-erased mask arrays; `structural` ignores the values
    fn mask_parts(&self, structural: bool) -> Result<MaskParts<'_>>;
}

/// Type-erased mask arrays
#[derive(Debug, Clone)]
pub enum MaskParts<'a> {
    /// Listed entries; `values` holds each entry cast to bool when valued
    Sparse {
        h: Option<Cow<'a, [usize]>>,
        p: Cow<'a, [usize]>,
        i: Cow<'a, [usize]>,
        values: Option<Vec<bool>>,
    },
    /// One byte per cell, 0 or 1, column-major
    Dense(Cow<'a, [u8]>),
    /// Every cell is true
    All,
}

impl<'a> MaskParts<'a> {
    fn into_owned(self) -> MaskParts<'static> {
        match self {
            MaskParts::Sparse { h, p, i, values } => MaskParts::Sparse {
                h: h.map(|h| Cow::Owned(h.into_owned())),
                p: Cow::Owned(p.into_owned()),
                i: Cow::Owned(i.into_owned()),
                values,
            },
            MaskParts::Dense(b) => MaskParts::Dense(Cow::Owned(b.into_owned())),
            MaskParts::All => MaskParts::All,
        }
    }
}

fn parts_of<'a, M: GraphBLASType>(v: &MatrixView<'a, M>, structural: bool) -> Result<MaskParts<'a>> {
    if let (Some(p), Some(i)) = (v.p, v.i) {
        let values = if structural {
            None
        } else {
            let n = i.len();
            Some((0..n).map(|pos| v.value(pos).to_bool()).collect())
        };
        return Ok(MaskParts::Sparse {
            h: v.h.map(Cow::Borrowed),
            p: Cow::Borrowed(p),
            i: Cow::Borrowed(i),
            values,
        });
    }
    if structural || (v.iso && v.value(0).to_bool()) {
        return Ok(match v.b {
            Some(b) => MaskParts::Dense(Cow::Borrowed(b)),
            None => MaskParts::All,
        });
    }
    let n = v.vlen * v.vdim;
    let mut cells = try_filled(n, 0u8)?;
    for (cell, out) in cells.iter_mut().enumerate() {
        *out = (v.present(cell) && v.value(cell).to_bool()) as u8;
    }
    Ok(MaskParts::Dense(Cow::Owned(cells)))
}

impl<M: GraphBLASType> MaskSource for Matrix<M> {
    fn mask_shape(&self) -> (usize, usize) {
        self.shape()
    }

    fn mask_parts(&self, structural: bool) -> Result<MaskParts<'_>> {
        if self.has_pending_work() {
            let mut copy = self.clone();
            copy.wait()?;
            return Ok(parts_of(&copy.view(), structural)?.into_owned());
        }
        parts_of(&self.view(), structural)
    }
}

/// A mask ready to be probed
pub(crate) struct Mask<'a> {
    nrows: usize,
    ncols: usize,
    parts: MaskParts<'a>,
    complement: bool,
    hyper_index: Option<HashMap<usize, usize>>,
}

impl<'a> Mask<'a> {
    pub(crate) fn new(source: &'a dyn MaskSource, structural: bool, complement: bool) -> Result<Self> {
        let (nrows, ncols) = source.mask_shape();
        let parts = source.mask_parts(structural)?;
        let hyper_index = match &parts {
            MaskParts::Sparse { h: Some(h), .. } => {
                Some(h.iter().enumerate().map(|(k, &j)| (j, k)).collect())
            }
            _ => None,
        };
        Ok(Self {
            nrows,
            ncols,
            parts,
            complement,
            hyper_index,
        })
    }

    pub(crate) fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    pub(crate) fn is_complemented(&self) -> bool {
        self.complement
    }

    /// True everywhere before the complement is applied
    pub(crate) fn is_all(&self) -> bool {
        matches!(self.parts, MaskParts::All)
    }

    pub(crate) fn column(&self, j: usize) -> MaskColumn<'_> {
        let kind = match &self.parts {
            MaskParts::Sparse { h, p, i, values } => {
                let k = match h {
                    Some(_) => self.hyper_index.as_ref().and_then(|idx| idx.get(&j).copied()),
                    None => Some(j),
                };
                match k {
                    Some(k) => {
                        let (start, end) = (p[k], p[k + 1]);
                        ColumnKind::Sparse {
                            rows: &i[start..end],
                            values: values.as_deref().map(|v| &v[start..end]),
                        }
                    }
                    None => ColumnKind::Sparse {
                        rows: &[],
                        values: None,
                    },
                }
            }
            MaskParts::Dense(b) => ColumnKind::Dense(&b[j * self.nrows..(j + 1) * self.nrows]),
            MaskParts::All => ColumnKind::All,
        };
        MaskColumn {
            kind,
            complement: self.complement,
        }
    }

    /// Complemented mask value of cell (i, j)
    pub(crate) fn get(&self, i: usize, j: usize) -> bool {
        self.column(j).get(i)
    }

    /// Uncomplemented byte per cell, column-major
    pub(crate) fn raw_cells(&self) -> Result<Cow<'_, [u8]>> {
        match &self.parts {
            MaskParts::Dense(b) => Ok(Cow::Borrowed(b.as_ref())),
            MaskParts::All => Ok(Cow::Owned(try_filled(self.nrows * self.ncols, 1u8)?)),
            MaskParts::Sparse { .. } => {
                let mut cells = try_filled(self.nrows * self.ncols, 0u8)?;
                for j in 0..self.ncols {
                    let col = self.column(j);
                    if let ColumnKind::Sparse { rows, values } = col.kind {
                        for (k, &i) in rows.iter().enumerate() {
                            let on = values.map_or(true, |v| v[k]);
                            cells[j * self.nrows + i] = on as u8;
                        }
                    }
                }
                Ok(Cow::Owned(cells))
            }
        }
    }
}

enum ColumnKind<'m> {
    Sparse {
        rows: &'m [usize],
        values: Option<&'m [bool]>,
    },
    Dense(&'m [u8]),
    All,
}

/// One column of a mask
pub(crate) struct MaskColumn<'m> {
    kind: ColumnKind<'m>,
    complement: bool,
}

impl<'m> MaskColumn<'m> {
    /// Mask value before the complement
    #[inline]
    fn raw(&self, i: usize) -> bool {
        match &self.kind {
            ColumnKind::Sparse { rows, values } => match rows.binary_search(&i) {
                Ok(k) => values.map_or(true, |v| v[k]),
                Err(_) => false,
            },
            ColumnKind::Dense(b) => b[i] != 0,
            ColumnKind::All => true,
        }
    }

    /// Complemented mask value of row `i`
    #[inline]
    pub(crate) fn get(&self, i: usize) -> bool {
        self.raw(i) ^ self.complement
    }
}
