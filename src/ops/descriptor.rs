// Descriptor Support
//
// Descriptors modify the behavior of masked operations:
// - Output replace: entries of C outside the mask are deleted
// - Mask complement: invert the mask
// - Mask structure: use the mask's pattern, ignore its values

use crate::core::error::{GraphBlasError, Result};

/// Descriptor for modifying operation behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Descriptor {
    /// Delete entries of C where the mask is false
    pub replace: bool,

    /// Use complement of mask (select elements where mask is false/zero)
    pub mask_complement: bool,

    /// Use only structure of mask (ignore values)
    pub mask_structure: bool,
}

impl Descriptor {
    /// Create a new descriptor with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create descriptor with output replace enabled
    pub fn with_replace() -> Self {
        Self {
            replace: true,
            ..Self::new()
        }
    }

    /// Create descriptor with mask complement enabled
    pub fn with_mask_complement() -> Self {
        Self {
            mask_complement: true,
            ..Self::new()
        }
    }

    /// Create descriptor with mask structure enabled
    pub fn with_mask_structure() -> Self {
        Self {
            mask_structure: true,
            ..Self::new()
        }
    }

    pub fn set_replace(&mut self, value: bool) -> &mut Self {
        self.replace = value;
        self
    }

    pub fn set_mask_complement(&mut self, value: bool) -> &mut Self {
        self.mask_complement = value;
        self
    }

    pub fn set_mask_structure(&mut self, value: bool) -> &mut Self {
        self.mask_structure = value;
        self
    }
}

/// Descriptor fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorField {
    Output,
    Mask,
}

/// Descriptor values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorValue {
    /// Default behavior
    Default,
    /// Replace output
    Replace,
    /// Use mask structure only
    Structure,
    /// Use mask complement
    Complement,
    /// Structure and complement together
    StructuralComplement,
}

impl Descriptor {
    /// Set a descriptor field to a value
    ///
    /// Setting the mask field replaces both mask flags.
    pub fn set_field(&mut self, field: DescriptorField, value: DescriptorValue) -> Result<()> {
        match (field, value) {
            (DescriptorField::Output, DescriptorValue::Replace) => self.replace = true,
            (DescriptorField::Output, DescriptorValue::Default) => self.replace = false,
            (DescriptorField::Mask, DescriptorValue::Default) => {
                self.mask_structure = false;
                self.mask_complement = false;
            }
            (DescriptorField::Mask, DescriptorValue::Structure) => {
                self.mask_structure = true;
                self.mask_complement = false;
            }
            (DescriptorField::Mask, DescriptorValue::Complement) => {
                self.mask_structure = false;
                self.mask_complement = true;
            }
            (DescriptorField::Mask, DescriptorValue::StructuralComplement) => {
                self.mask_structure = true;
                self.mask_complement = true;
            }
            _ => return Err(GraphBlasError::InvalidValue),
        }
        Ok(())
    }

    /// Get a descriptor field value
    pub fn get_field(&self, field: DescriptorField) -> DescriptorValue {
        match field {
            DescriptorField::Output if self.replace => DescriptorValue::Replace,
            DescriptorField::Output => DescriptorValue::Default,
            DescriptorField::Mask => match (self.mask_structure, self.mask_complement) {
                (false, false) => DescriptorValue::Default,
                (true, false) => DescriptorValue::Structure,
                (false, true) => DescriptorValue::Complement,
                (true, true) => DescriptorValue::StructuralComplement,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_creation() {
        let desc = Descriptor::new();
        assert!(!desc.replace);
        assert!(!desc.mask_complement);
        assert!(!desc.mask_structure);
        assert!(Descriptor::with_replace().replace);
    }

    #[test]
    fn test_descriptor_chaining() {
        let mut desc = Descriptor::new();
        desc.set_replace(true).set_mask_complement(true);
        assert!(desc.replace);
        assert!(desc.mask_complement);
        assert!(!desc.mask_structure);
    }

    #[test]
    fn test_descriptor_field_set_get() {
        let mut desc = Descriptor::new();
        desc.set_field(DescriptorField::Output, DescriptorValue::Replace).unwrap();
        assert_eq!(desc.get_field(DescriptorField::Output), DescriptorValue::Replace);

        desc.set_field(DescriptorField::Mask, DescriptorValue::StructuralComplement)
            .unwrap();
        assert!(desc.mask_structure && desc.mask_complement);
        desc.set_field(DescriptorField::Mask, DescriptorValue::Structure).unwrap();
        assert_eq!(desc.get_field(DescriptorField::Mask), DescriptorValue::Structure);
        assert!(!desc.mask_complement);
    }

    #[test]
    fn test_descriptor_invalid_field_value() {
        let mut desc = Descriptor::new();
        let result = desc.set_field(DescriptorField::Output, DescriptorValue::Complement);
        assert_eq!(result.unwrap_err(), GraphBlasError::InvalidValue);
    }
}
