// High-Level Operations Module
//
// Masked operations over matrices: element-wise combination, assignment,
// reduction and selection. Every entry point validates its arguments, reads
// finalized inputs, computes a result and writes it into C through the mask.

pub mod assign;
pub(crate) mod cells;
pub mod descriptor;
pub mod ewise;
pub(crate) mod factory;
pub mod reduce;
pub mod select;

// Re-exports
pub use assign::{assign, assign_scalar, col_subassign, row_subassign, subassign, subassign_scalar};
pub use descriptor::{Descriptor, DescriptorField, DescriptorValue};
pub use ewise::{ewise_add, ewise_mult, ewise_union};
pub use reduce::reduce_to_scalar;
pub use select::select;

use crate::core::error::{GraphBlasError, Result};
use crate::core::mask::{Mask, MaskSource};

/// Mask of one operation with the descriptor applied
pub(crate) enum OpMask<'a> {
    /// No mask: every cell may be written
    None,
    /// Complement of an absent mask: no cell may be written
    Empty,
    Mask(Mask<'a>),
}

impl<'a> OpMask<'a> {
    /// The mask to probe, if cells are selected individually
    pub(crate) fn mask(&self) -> Option<&Mask<'a>> {
        match self {
            OpMask::Mask(mask) => Some(mask),
            OpMask::None | OpMask::Empty => None,
        }
    }

    /// Mask value of cell (i, j), complement applied
    #[inline]
    pub(crate) fn get(&self, i: usize, j: usize) -> bool {
        match self {
            OpMask::None => true,
            OpMask::Empty => false,
            OpMask::Mask(mask) => mask.get(i, j),
        }
    }
}

/// Prepare the mask of an operation writing a `shape` region
pub(crate) fn op_mask<'a>(
    mask: Option<&'a dyn MaskSource>,
    desc: &Descriptor,
    shape: (usize, usize),
) -> Result<OpMask<'a>> {
    let source = match mask {
        Some(source) => source,
        None if desc.mask_complement => return Ok(OpMask::Empty),
        None => return Ok(OpMask::None),
    };
    if source.mask_shape() != shape {
        return Err(GraphBlasError::DimensionMismatch);
    }
    let mask = Mask::new(source, desc.mask_structure, desc.mask_complement)?;
    debug_assert_eq!(mask.shape(), shape);
    Ok(match (mask.is_all(), mask.is_complemented()) {
        (true, false) => OpMask::None,
        (true, true) => OpMask::Empty,
        _ => OpMask::Mask(mask),
    })
}
