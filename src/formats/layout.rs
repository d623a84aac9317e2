// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Constant buffer layouts.
//!
//! A layout maps parameter names to {offset, pin format, array size} and
//! governs how constants pack into a buffer: every parameter starts on a
//! 16-byte register boundary. Layouts are built once through
//! [`ConstantBufferLayoutBuilder`] and immutable afterwards.

use std::collections::BTreeMap;

use super::pin::{self, NOT_ARRAY, PinFormat};

/// Maximum number of constant buffer binding slots per stage.
pub const MAX_CONSTANT_BUFFER_SLOTS: u32 = 16;

/// Error raised while building a layout.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("parameter {0} is already defined")]
    DuplicateName(String),
    #[error("only float and integer class formats are acceptable, got {0:?}")]
    NonNumericFormat(PinFormat),
}

/// Location of one named parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterLocation {
    pub offset: u32,
    pub format: PinFormat,
    pub array_size: u32,
}

/// Describes how named parameters fit into a constant buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantBufferLayout {
    // Keyed by name; iteration order is the name order, which also defines
    // structural equality.
    parameters: BTreeMap<String, ParameterLocation>,
}

impl ConstantBufferLayout {
    /// Number of parameters in the layout.
    pub fn parameter_count(&self) -> u32 {
        self.parameters.len() as u32
    }

    /// Whether `name` is defined by this layout.
    pub fn is_defined(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    /// Location of `name`, if defined.
    pub fn try_get(&self, name: &str) -> Option<ParameterLocation> {
        self.parameters.get(name).copied()
    }

    /// Offset of `name`, if defined.
    pub fn try_get_offset(&self, name: &str) -> Option<u32> {
        self.parameters.get(name).map(|p| p.offset)
    }

    /// Smallest buffer size in bytes all parameters fit into, rounded up
    /// to a whole 16-byte register.
    pub fn minimum_buffer_size_in_bytes(&self) -> u32 {
        let end = self
            .parameters
            .values()
            .map(|p| {
                p.offset
                    + pin::advance(p.format, p.array_size)
                        .expect("layouts only hold sized formats")
            })
            .max()
            .unwrap_or(0);
        ((end + 15) / 16) * 16
    }

    /// Iterates `(name, location)` pairs in name order.
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &ParameterLocation)> {
        self.parameters.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Constructs [`ConstantBufferLayout`] values.
///
/// Not thread safe; consumed by [`ConstantBufferLayoutBuilder::create_layout`].
#[derive(Debug, Default)]
pub struct ConstantBufferLayoutBuilder {
    current_offset: u32,
    parameters: BTreeMap<String, ParameterLocation>,
}

impl ConstantBufferLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter at an explicit offset.
    pub fn add_element(
        &mut self,
        name: &str,
        format: PinFormat,
        array_size: u32,
        offset: u32,
    ) -> Result<(), LayoutError> {
        let scalar = format.to_scalar();
        if !matches!(
            scalar,
            PinFormat::Float | PinFormat::Integer | PinFormat::UInteger
        ) {
            return Err(LayoutError::NonNumericFormat(format));
        }
        if self.parameters.contains_key(name) {
            return Err(LayoutError::DuplicateName(name.to_string()));
        }
        self.parameters.insert(
            name.to_string(),
            ParameterLocation {
                offset,
                format,
                array_size,
            },
        );
        Ok(())
    }

    /// Appends a non-array parameter at the next aligned offset.
    pub fn append_element(&mut self, name: &str, format: PinFormat) -> Result<(), LayoutError> {
        self.append_element_array(name, format, NOT_ARRAY)
    }

    /// Appends an array parameter at the next aligned offset.
    pub fn append_element_array(
        &mut self,
        name: &str,
        format: PinFormat,
        array_size: u32,
    ) -> Result<(), LayoutError> {
        let offset = pin::align(format, self.current_offset);
        self.add_element(name, format, array_size, offset)?;
        self.current_offset = offset
            + pin::advance(format, array_size).ok_or(LayoutError::NonNumericFormat(format))?;
        Ok(())
    }

    /// Finishes the layout, consuming the builder.
    pub fn create_layout(self) -> ConstantBufferLayout {
        ConstantBufferLayout {
            parameters: self.parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_packs_to_registers() {
        let mut builder = ConstantBufferLayoutBuilder::new();
        builder.append_element("scale", PinFormat::Float).unwrap();
        builder
            .append_element("transform", PinFormat::Float4x4)
            .unwrap();
        builder.append_element("tint", PinFormat::Floatx4).unwrap();
        let layout = builder.create_layout();

        assert_eq!(layout.try_get_offset("scale"), Some(0));
        // The scalar occupies one register; the matrix starts on the next.
        assert_eq!(layout.try_get_offset("transform"), Some(16));
        assert_eq!(layout.try_get_offset("tint"), Some(80));
        assert_eq!(layout.minimum_buffer_size_in_bytes(), 96);
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut builder = ConstantBufferLayoutBuilder::new();
        builder.append_element("x", PinFormat::Float).unwrap();
        assert!(matches!(
            builder.append_element("x", PinFormat::Float),
            Err(LayoutError::DuplicateName(_))
        ));
    }

    #[test]
    fn non_numeric_formats_rejected() {
        let mut builder = ConstantBufferLayoutBuilder::new();
        assert!(matches!(
            builder.append_element("t", PinFormat::Texture2D),
            Err(LayoutError::NonNumericFormat(_))
        ));
        assert!(matches!(
            builder.append_element("n", PinFormat::UNormx2),
            Err(LayoutError::NonNumericFormat(_))
        ));
    }

    #[test]
    fn arrays_advance_by_count() {
        let mut builder = ConstantBufferLayoutBuilder::new();
        builder
            .append_element_array("bones", PinFormat::Float4x4, 4)
            .unwrap();
        builder.append_element("weight", PinFormat::Float).unwrap();
        let layout = builder.create_layout();
        assert_eq!(layout.try_get_offset("weight"), Some(256));
        let bones = layout.try_get("bones").unwrap();
        assert_eq!(bones.array_size, 4);
    }

    #[test]
    fn minimum_size_of_empty_layout() {
        let layout = ConstantBufferLayoutBuilder::new().create_layout();
        assert_eq!(layout.minimum_buffer_size_in_bytes(), 0);
        assert_eq!(layout.parameter_count(), 0);
    }

    #[test]
    fn structural_equality() {
        let build = || {
            let mut b = ConstantBufferLayoutBuilder::new();
            b.append_element("a", PinFormat::Floatx4).unwrap();
            b.append_element("b", PinFormat::Integer).unwrap();
            b.create_layout()
        };
        assert_eq!(build(), build());
    }
}
