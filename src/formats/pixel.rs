// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Pixel format descriptions.
//!
//! A pixel format is an ordered sequence of elements, each pairing a
//! component (red, depth, stencil, ...) with a component format (8-bit
//! unorm, 32-bit float, ...). Offsets are resolved sequentially, so the
//! format is always "full" with no implicit padding. After construction the
//! aggregate is classified against [`CommonFormatLayout`], the closed set of
//! hardware-canonical layouts; formats that fall outside the set are tagged
//! [`CommonFormatLayout::NotCommonLayout`], which is not an error — it means
//! the driver may reject the format and callers should check support
//! explicitly.

use std::fmt;

/// Error raised for malformed pixel format descriptors or invalid
/// component combinations.
#[derive(Debug, thiserror::Error)]
#[error("invalid pixel format: {0}")]
pub struct InvalidPixelFormat(pub String);

/// A component slot within a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelComponent {
    NotKnown,
    Red,
    Green,
    Blue,
    Alpha,
    Luminance,
    Bump,
    NormalX,
    NormalY,
    NormalZ,
    Reflection,
    Refraction,
    Depth,
    Stencil,
    User0,
    User1,
    User2,
    User3,
    User4,
    User5,
    User6,
    User7,
    User8,
    User9,
}

impl PixelComponent {
    /// Short mnemonic used in textual descriptors.
    pub fn code(self) -> &'static str {
        match self {
            PixelComponent::NotKnown => "N",
            PixelComponent::Red => "R",
            PixelComponent::Green => "G",
            PixelComponent::Blue => "B",
            PixelComponent::Alpha => "A",
            PixelComponent::Luminance => "L",
            PixelComponent::Bump => "Bump",
            PixelComponent::NormalX => "Nx",
            PixelComponent::NormalY => "Ny",
            PixelComponent::NormalZ => "Nz",
            PixelComponent::Reflection => "Refl",
            PixelComponent::Refraction => "Refr",
            PixelComponent::Depth => "D",
            PixelComponent::Stencil => "S",
            PixelComponent::User0 => "U0",
            PixelComponent::User1 => "U1",
            PixelComponent::User2 => "U2",
            PixelComponent::User3 => "U3",
            PixelComponent::User4 => "U4",
            PixelComponent::User5 => "U5",
            PixelComponent::User6 => "U6",
            PixelComponent::User7 => "U7",
            PixelComponent::User8 => "U8",
            PixelComponent::User9 => "U9",
        }
    }

    fn parse(code: &str) -> Result<Self, InvalidPixelFormat> {
        Ok(match code {
            "N" => PixelComponent::NotKnown,
            "R" => PixelComponent::Red,
            "G" => PixelComponent::Green,
            "B" => PixelComponent::Blue,
            "A" => PixelComponent::Alpha,
            "L" => PixelComponent::Luminance,
            "Bump" => PixelComponent::Bump,
            "Nx" => PixelComponent::NormalX,
            "Ny" => PixelComponent::NormalY,
            "Nz" => PixelComponent::NormalZ,
            "Refl" => PixelComponent::Reflection,
            "Refr" => PixelComponent::Refraction,
            "D" => PixelComponent::Depth,
            "S" => PixelComponent::Stencil,
            "U0" => PixelComponent::User0,
            "U1" => PixelComponent::User1,
            "U2" => PixelComponent::User2,
            "U3" => PixelComponent::User3,
            "U4" => PixelComponent::User4,
            "U5" => PixelComponent::User5,
            "U6" => PixelComponent::User6,
            "U7" => PixelComponent::User7,
            "U8" => PixelComponent::User8,
            "U9" => PixelComponent::User9,
            other => {
                return Err(InvalidPixelFormat(format!("unsupported component {other}")));
            }
        })
    }
}

/// Storage format of a single pixel component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelComponentFormat {
    Typeless8,
    Typeless16,
    Typeless24,
    Typeless32,
    Typeless64,
    UInt8,
    UInt16,
    UInt24,
    UInt32,
    UInt64,
    SInt8,
    SInt16,
    SInt24,
    SInt32,
    SInt64,
    Float16,
    Float24,
    Float32,
    Float64,
    UNorm8,
    UNorm16,
    SNorm8,
    SNorm16,
}

/// Numeric interpretation class of a component format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelComponentFormatGroup {
    Typeless,
    UInt,
    SInt,
    Float,
    UNorm,
    SNorm,
}

impl PixelComponentFormat {
    /// Byte size of the component format.
    pub fn byte_size(self) -> u32 {
        use PixelComponentFormat::*;
        match self {
            Typeless8 | UInt8 | SInt8 | UNorm8 | SNorm8 => 1,
            Typeless16 | UInt16 | SInt16 | UNorm16 | SNorm16 | Float16 => 2,
            Typeless24 | UInt24 | SInt24 | Float24 => 3,
            Typeless32 | UInt32 | SInt32 | Float32 => 4,
            Typeless64 | UInt64 | SInt64 | Float64 => 8,
        }
    }

    /// The interpretation group of the format.
    pub fn group(self) -> PixelComponentFormatGroup {
        use PixelComponentFormat::*;
        match self {
            Typeless8 | Typeless16 | Typeless24 | Typeless32 | Typeless64 => {
                PixelComponentFormatGroup::Typeless
            }
            UInt8 | UInt16 | UInt24 | UInt32 | UInt64 => PixelComponentFormatGroup::UInt,
            SInt8 | SInt16 | SInt24 | SInt32 | SInt64 => PixelComponentFormatGroup::SInt,
            Float16 | Float24 | Float32 | Float64 => PixelComponentFormatGroup::Float,
            UNorm8 | UNorm16 => PixelComponentFormatGroup::UNorm,
            SNorm8 | SNorm16 => PixelComponentFormatGroup::SNorm,
        }
    }

    /// Whether the format carries no interpretation of its own.
    pub fn is_typeless(self) -> bool {
        self.group() == PixelComponentFormatGroup::Typeless
    }

    /// Short mnemonic used in textual descriptors.
    pub fn code(self) -> &'static str {
        use PixelComponentFormat::*;
        match self {
            Typeless8 => "T8",
            Typeless16 => "T16",
            Typeless24 => "T24",
            Typeless32 => "T32",
            Typeless64 => "T64",
            UInt8 => "UI8",
            UInt16 => "UI16",
            UInt24 => "UI24",
            UInt32 => "UI32",
            UInt64 => "UI64",
            SInt8 => "SI8",
            SInt16 => "SI16",
            SInt24 => "SI24",
            SInt32 => "SI32",
            SInt64 => "SI64",
            Float16 => "F16",
            Float24 => "F24",
            Float32 => "F32",
            Float64 => "F64",
            UNorm8 => "UN8",
            UNorm16 => "UN16",
            SNorm8 => "SN8",
            SNorm16 => "SN16",
        }
    }

    fn parse(code: &str) -> Result<Self, InvalidPixelFormat> {
        use PixelComponentFormat::*;
        Ok(match code {
            "T8" => Typeless8,
            "T16" => Typeless16,
            "T24" => Typeless24,
            "T32" => Typeless32,
            "T64" => Typeless64,
            "UI8" => UInt8,
            "UI16" => UInt16,
            "UI24" => UInt24,
            "UI32" => UInt32,
            "UI64" => UInt64,
            "SI8" => SInt8,
            "SI16" => SInt16,
            "SI24" => SInt24,
            "SI32" => SInt32,
            "SI64" => SInt64,
            "F16" => Float16,
            "F24" => Float24,
            "F32" => Float32,
            "F64" => Float64,
            "UN8" => UNorm8,
            "UN16" => UNorm16,
            "SN8" => SNorm8,
            "SN16" => SNorm16,
            other => return Err(InvalidPixelFormat(format!("unsupported format {other}"))),
        })
    }
}

/// Hardware-canonical pixel byte layouts.
///
/// Closed enumeration used to test driver format support without
/// per-driver special-casing. `NotCommonLayout` marks formats the
/// classification cannot place; such formats are still valid descriptions,
/// the driver just may not accept them.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommonFormatLayout {
    D24_UNORM_S8_UINT,
    D32_FLOAT,
    D32_FLOAT_S24_UINT,
    X8_TYPELESS,
    X16_TYPELESS,
    X32_TYPELESS,
    X8_UINT,
    X16_UINT,
    X32_UINT,
    X8_SINT,
    X16_SINT,
    X32_SINT,
    X8_UNORM,
    X16_UNORM,
    X8_SNORM,
    X16_SNORM,
    X16_FLOAT,
    X32_FLOAT,
    X8Y8_TYPELESS,
    X16Y16_TYPELESS,
    X32Y32_TYPELESS,
    X8Y8_UINT,
    X16Y16_UINT,
    X32Y32_UINT,
    X8Y8_SINT,
    X16Y16_SINT,
    X32Y32_SINT,
    X8Y8_UNORM,
    X16Y16_UNORM,
    X8Y8_SNORM,
    X16Y16_SNORM,
    X16Y16_FLOAT,
    X32Y32_FLOAT,
    X8Y8Z8_TYPELESS,
    X16Y16Z16_TYPELESS,
    X32Y32Z32_TYPELESS,
    X8Y8Z8_UINT,
    X16Y16Z16_UINT,
    X32Y32Z32_UINT,
    X8Y8Z8_SINT,
    X16Y16Z16_SINT,
    X32Y32Z32_SINT,
    X8Y8Z8_UNORM,
    X16Y16Z16_UNORM,
    X8Y8Z8_SNORM,
    X16Y16Z16_SNORM,
    X16Y16Z16_FLOAT,
    X32Y32Z32_FLOAT,
    X8Y8Z8W8_TYPELESS,
    X16Y16Z16W16_TYPELESS,
    X32Y32Z32W32_TYPELESS,
    X8Y8Z8W8_UINT,
    X16Y16Z16W16_UINT,
    X32Y32Z32W32_UINT,
    X8Y8Z8W8_SINT,
    X16Y16Z16W16_SINT,
    X32Y32Z32W32_SINT,
    X8Y8Z8W8_UNORM,
    X16Y16Z16W16_UNORM,
    X8Y8Z8W8_SNORM,
    X16Y16Z16W16_SNORM,
    X16Y16Z16W16_FLOAT,
    X32Y32Z32W32_FLOAT,
    NotCommonLayout,
}

/// A single pixel element: component, component format and resolved offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element {
    component: PixelComponent,
    format: PixelComponentFormat,
    offset: u32,
}

impl Element {
    /// Component bound by this element.
    pub fn component(&self) -> PixelComponent {
        self.component
    }

    /// Storage format of the component.
    pub fn format(&self) -> PixelComponentFormat {
        self.format
    }

    /// Byte offset within the pixel, computed at format construction.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Resolves the element at `offset` and returns the offset following it.
    fn resolve(&mut self, offset: u32) -> u32 {
        self.offset = offset;
        offset + self.format.byte_size()
    }

    /// Whether this element can stand in for `other`.
    ///
    /// Equal formats are compatible; a typeless format is compatible with
    /// any typed format of the same width.
    pub fn is_compatible(&self, other: &Element) -> bool {
        if self.format == other.format {
            return true;
        }
        self.format.is_typeless() && self.format.byte_size() == other.format.byte_size()
    }

    fn parse(desc: &str) -> Result<Self, InvalidPixelFormat> {
        let mut split = desc.split('.');
        let (component, format) = match (split.next(), split.next(), split.next()) {
            (Some(c), Some(f), None) => (c, f),
            _ => {
                return Err(InvalidPixelFormat(format!(
                    "element {desc:?} is not a single Component.Format pair"
                )));
            }
        };
        Ok(Element {
            component: PixelComponent::parse(component)?,
            format: PixelComponentFormat::parse(format)?,
            offset: 0,
        })
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.component.code(), self.format.code())
    }
}

/// An immutable pixel format description.
#[derive(Debug, Clone)]
pub struct PixelFormat {
    elements: Vec<Element>,
    size: u32,
    is_typeless: bool,
    common_layout: CommonFormatLayout,
}

impl PixelFormat {
    /// Parses a whitespace-separated list of `Component.Format` pairs.
    ///
    /// ```
    /// use stages_and_states::formats::{CommonFormatLayout, PixelFormat};
    ///
    /// let fmt = PixelFormat::parse("R.UN8 G.UN8 B.UN8 A.UN8").unwrap();
    /// assert_eq!(fmt.size(), 4);
    /// assert_eq!(fmt.common_layout(), CommonFormatLayout::X8Y8Z8W8_UNORM);
    /// ```
    pub fn parse(descriptor: &str) -> Result<Self, InvalidPixelFormat> {
        let tokens: Vec<&str> = descriptor.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(InvalidPixelFormat("empty descriptor".to_string()));
        }
        let elements = tokens
            .iter()
            .map(|t| Element::parse(t))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_elements(elements)
    }

    fn from_elements(mut elements: Vec<Element>) -> Result<Self, InvalidPixelFormat> {
        // No component may appear twice.
        for i in 0..elements.len() {
            for j in 0..i {
                if elements[i].component == elements[j].component {
                    return Err(InvalidPixelFormat(format!(
                        "component {} was repeated twice",
                        elements[i].component.code()
                    )));
                }
            }
        }

        let is_typeless = elements.iter().any(|e| e.format.is_typeless());

        let mut size = 0;
        for element in &mut elements {
            size = element.resolve(size);
        }

        let common_layout = classify(&elements);
        Ok(PixelFormat {
            elements,
            size,
            is_typeless,
            common_layout,
        })
    }

    /// Builds the canonical format for a common layout, where one exists.
    ///
    /// RGBA component assignment is used for the value channels. Returns
    /// `None` for `NotCommonLayout`.
    pub fn from_common_layout(layout: CommonFormatLayout) -> Option<PixelFormat> {
        let descriptor = match layout {
            CommonFormatLayout::NotCommonLayout => return None,
            CommonFormatLayout::X8Y8Z8W8_UNORM => "R.UN8 G.UN8 B.UN8 A.UN8",
            CommonFormatLayout::X8Y8Z8W8_UINT => "R.UI8 G.UI8 B.UI8 A.UI8",
            CommonFormatLayout::X8Y8Z8W8_SNORM => "R.SN8 G.SN8 B.SN8 A.SN8",
            CommonFormatLayout::X32Y32Z32W32_FLOAT => "R.F32 G.F32 B.F32 A.F32",
            CommonFormatLayout::X8_UNORM => "R.UN8",
            CommonFormatLayout::X32_FLOAT => "R.F32",
            CommonFormatLayout::D32_FLOAT => "D.F32",
            CommonFormatLayout::D24_UNORM_S8_UINT => "D.F24 S.UI8",
            CommonFormatLayout::D32_FLOAT_S24_UINT => "D.F32 S.UI24",
            _ => return None,
        };
        // The table above only holds descriptors this parser accepts.
        Some(Self::parse(descriptor).expect("canonical descriptor must parse"))
    }

    /// Total pixel size in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Whether any element is typeless.
    pub fn is_typeless(&self) -> bool {
        self.is_typeless
    }

    /// The common layout classification of this format.
    pub fn common_layout(&self) -> CommonFormatLayout {
        self.common_layout
    }

    /// Number of elements.
    pub fn element_count(&self) -> u32 {
        self.elements.len() as u32
    }

    /// Element at `index`.
    pub fn element(&self, index: u32) -> &Element {
        &self.elements[index as usize]
    }

    /// Iterates the elements in declaration order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    /// Finds the element binding `component`, if present.
    pub fn find(&self, component: PixelComponent) -> Option<&Element> {
        self.elements.iter().find(|e| e.component == component)
    }

    /// Whether the format binds `component`.
    pub fn has_component(&self, component: PixelComponent) -> bool {
        self.find(component).is_some()
    }

    /// Determines whether `other` can be used where this format is expected.
    ///
    /// Equal common layouts are compatible outright; otherwise the formats
    /// must agree element-by-element under typeless/typed compatibility.
    pub fn is_compatible(&self, other: &PixelFormat) -> bool {
        if self.common_layout == other.common_layout {
            return true;
        }
        if self.element_count() != other.element_count() {
            return false;
        }
        self.elements
            .iter()
            .zip(other.elements.iter())
            .all(|(a, b)| a.is_compatible(b))
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.elements.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{element}")?;
        }
        Ok(())
    }
}

impl PartialEq for PixelFormat {
    fn eq(&self, other: &Self) -> bool {
        self.elements == other.elements
    }
}

impl Eq for PixelFormat {}

/// Classifies an element sequence against the common layout table.
fn classify(elements: &[Element]) -> CommonFormatLayout {
    use CommonFormatLayout::*;
    use PixelComponentFormat as F;

    match elements.len() {
        1 => {
            let e = &elements[0];
            match e.format {
                F::Typeless8 => X8_TYPELESS,
                F::Typeless16 => X16_TYPELESS,
                F::Typeless32 => X32_TYPELESS,
                F::UInt8 => X8_UINT,
                F::UInt16 => X16_UINT,
                F::UInt32 => X32_UINT,
                F::SInt8 => X8_SINT,
                F::SInt16 => X16_SINT,
                F::SInt32 => X32_SINT,
                F::Float16 => X16_FLOAT,
                F::Float32 if e.component == PixelComponent::Depth => D32_FLOAT,
                F::Float32 => X32_FLOAT,
                F::UNorm8 => X8_UNORM,
                F::UNorm16 => X16_UNORM,
                F::SNorm8 => X8_SNORM,
                F::SNorm16 => X16_SNORM,
                _ => NotCommonLayout,
            }
        }
        2 => {
            // Unequal element formats are only hardware-canonical as
            // combined depth-stencil layouts.
            if elements[0].format != elements[1].format {
                if elements[0].component == PixelComponent::Depth
                    && elements[1].component == PixelComponent::Stencil
                {
                    if elements[0].format == F::Float24 && elements[1].format == F::UInt8 {
                        return D24_UNORM_S8_UINT;
                    }
                    if elements[0].format == F::Float32 && elements[1].format == F::UInt24 {
                        return D32_FLOAT_S24_UINT;
                    }
                }
                return NotCommonLayout;
            }
            match elements[0].format {
                F::Typeless8 => X8Y8_TYPELESS,
                F::Typeless16 => X16Y16_TYPELESS,
                F::Typeless32 => X32Y32_TYPELESS,
                F::UInt8 => X8Y8_UINT,
                F::UInt16 => X16Y16_UINT,
                F::UInt32 => X32Y32_UINT,
                F::SInt8 => X8Y8_SINT,
                F::SInt16 => X16Y16_SINT,
                F::SInt32 => X32Y32_SINT,
                F::Float16 => X16Y16_FLOAT,
                F::Float32 => X32Y32_FLOAT,
                F::UNorm8 => X8Y8_UNORM,
                F::UNorm16 => X16Y16_UNORM,
                F::SNorm8 => X8Y8_SNORM,
                F::SNorm16 => X16Y16_SNORM,
                _ => NotCommonLayout,
            }
        }
        3 => {
            if elements.iter().any(|e| e.format != elements[0].format) {
                return NotCommonLayout;
            }
            match elements[0].format {
                F::Typeless8 => X8Y8Z8_TYPELESS,
                F::Typeless16 => X16Y16Z16_TYPELESS,
                F::Typeless32 => X32Y32Z32_TYPELESS,
                F::UInt8 => X8Y8Z8_UINT,
                F::UInt16 => X16Y16Z16_UINT,
                F::UInt32 => X32Y32Z32_UINT,
                F::SInt8 => X8Y8Z8_SINT,
                F::SInt16 => X16Y16Z16_SINT,
                F::SInt32 => X32Y32Z32_SINT,
                F::Float16 => X16Y16Z16_FLOAT,
                F::Float32 => X32Y32Z32_FLOAT,
                F::UNorm8 => X8Y8Z8_UNORM,
                F::UNorm16 => X16Y16Z16_UNORM,
                F::SNorm8 => X8Y8Z8_SNORM,
                F::SNorm16 => X16Y16Z16_SNORM,
                _ => NotCommonLayout,
            }
        }
        4 => {
            if elements.iter().any(|e| e.format != elements[0].format) {
                return NotCommonLayout;
            }
            match elements[0].format {
                F::Typeless8 => X8Y8Z8W8_TYPELESS,
                F::Typeless16 => X16Y16Z16W16_TYPELESS,
                F::Typeless32 => X32Y32Z32W32_TYPELESS,
                F::UInt8 => X8Y8Z8W8_UINT,
                F::UInt16 => X16Y16Z16W16_UINT,
                F::UInt32 => X32Y32Z32W32_UINT,
                F::SInt8 => X8Y8Z8W8_SINT,
                F::SInt16 => X16Y16Z16W16_SINT,
                F::SInt32 => X32Y32Z32W32_SINT,
                F::Float16 => X16Y16Z16W16_FLOAT,
                F::Float32 => X32Y32Z32W32_FLOAT,
                F::UNorm8 => X8Y8Z8W8_UNORM,
                F::UNorm16 => X16Y16Z16W16_UNORM,
                F::SNorm8 => X8Y8Z8W8_SNORM,
                F::SNorm16 => X16Y16Z16W16_SNORM,
                _ => NotCommonLayout,
            }
        }
        _ => NotCommonLayout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba8_unorm() {
        let fmt = PixelFormat::parse("R.UN8 G.UN8 B.UN8 A.UN8").unwrap();
        assert_eq!(fmt.size(), 4);
        assert_eq!(fmt.common_layout(), CommonFormatLayout::X8Y8Z8W8_UNORM);
        assert_eq!(fmt.element_count(), 4);
        assert!(!fmt.is_typeless());
    }

    #[test]
    fn offsets_are_cumulative() {
        let fmt = PixelFormat::parse("R.F32 G.UN16 B.UI8").unwrap();
        assert_eq!(fmt.element(0).offset(), 0);
        assert_eq!(fmt.element(1).offset(), 4);
        assert_eq!(fmt.element(2).offset(), 6);
        assert_eq!(fmt.size(), 7);
        // Mixed widths do not classify.
        assert_eq!(fmt.common_layout(), CommonFormatLayout::NotCommonLayout);
    }

    #[test]
    fn offset_monotonicity() {
        let fmt = PixelFormat::parse("R.UN8 G.UN16 B.F32 A.T64").unwrap();
        let elements: Vec<_> = fmt.elements().collect();
        for pair in elements.windows(2) {
            assert_eq!(
                pair[0].offset() + pair[0].format().byte_size(),
                pair[1].offset()
            );
        }
        let last = elements.last().unwrap();
        assert_eq!(last.offset() + last.format().byte_size(), fmt.size());
    }

    #[test]
    fn display_roundtrip() {
        for descriptor in [
            "R.UN8 G.UN8 B.UN8 A.UN8",
            "D.F24 S.UI8",
            "L.F32",
            "R.T8 G.T8",
            "Nx.SN16 Ny.SN16 Nz.SN16",
        ] {
            let fmt = PixelFormat::parse(descriptor).unwrap();
            let reparsed = PixelFormat::parse(&fmt.to_string()).unwrap();
            assert_eq!(fmt, reparsed, "descriptor {descriptor}");
        }
    }

    #[test]
    fn duplicate_component_rejected() {
        assert!(PixelFormat::parse("R.UN8 R.UN8").is_err());
    }

    #[test]
    fn malformed_descriptors_rejected() {
        assert!(PixelFormat::parse("").is_err());
        assert!(PixelFormat::parse("R").is_err());
        assert!(PixelFormat::parse("R.UN8.UN8").is_err());
        assert!(PixelFormat::parse("Q.UN8").is_err());
        assert!(PixelFormat::parse("R.XX9").is_err());
    }

    #[test]
    fn depth_stencil_layouts() {
        let fmt = PixelFormat::parse("D.F24 S.UI8").unwrap();
        assert_eq!(fmt.common_layout(), CommonFormatLayout::D24_UNORM_S8_UINT);
        let fmt = PixelFormat::parse("D.F32 S.UI24").unwrap();
        assert_eq!(fmt.common_layout(), CommonFormatLayout::D32_FLOAT_S24_UINT);
        let fmt = PixelFormat::parse("D.F32").unwrap();
        assert_eq!(fmt.common_layout(), CommonFormatLayout::D32_FLOAT);
    }

    #[test]
    fn typeless_compatibility() {
        let typeless = PixelFormat::parse("R.T8 G.T8 B.T8 A.T8").unwrap();
        let unorm = PixelFormat::parse("R.UN8 G.UN8 B.UN8 A.UN8").unwrap();
        let wide = PixelFormat::parse("R.UN16 G.UN16 B.UN16 A.UN16").unwrap();
        assert!(typeless.is_compatible(&unorm));
        assert!(!typeless.is_compatible(&wide));
        // Same common layout is compatible outright.
        let bgra_like = PixelFormat::parse("B.UN8 G.UN8 R.UN8 A.UN8").unwrap();
        assert!(unorm.is_compatible(&bgra_like));
    }

    #[test]
    fn from_common_layout_roundtrip() {
        let fmt = PixelFormat::from_common_layout(CommonFormatLayout::X8Y8Z8W8_UNORM).unwrap();
        assert_eq!(fmt.common_layout(), CommonFormatLayout::X8Y8Z8W8_UNORM);
        assert!(PixelFormat::from_common_layout(CommonFormatLayout::NotCommonLayout).is_none());
    }

    #[test]
    fn find_and_has_component() {
        let fmt = PixelFormat::parse("R.UN8 A.UN8").unwrap();
        assert!(fmt.has_component(PixelComponent::Alpha));
        assert!(!fmt.has_component(PixelComponent::Depth));
        assert_eq!(fmt.find(PixelComponent::Alpha).unwrap().offset(), 1);
    }
}
