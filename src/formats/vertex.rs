// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Vertex format descriptions.
//!
//! A vertex format binds pin components (position, normal, texture
//! coordinates, ...) to pin formats, with offsets resolved sequentially so
//! the layout is "full" with no blank spaces. Hardware can usually consume
//! any format defined here, though the number of components may be limited.

use std::fmt;

use super::pin::{PinComponent, PinFormat};

/// Error raised for malformed vertex format descriptors.
#[derive(Debug, thiserror::Error)]
#[error("invalid vertex format: {0}")]
pub struct InvalidVertexFormat(pub String);

/// An element of a vertex format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element {
    component: PinComponent,
    format: PinFormat,
    offset: u32,
}

impl Element {
    pub fn component(&self) -> PinComponent {
        self.component
    }

    pub fn format(&self) -> PinFormat {
        self.format
    }

    /// Byte offset within the vertex, computed at format construction.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Byte size of the element's format.
    pub fn byte_size(&self) -> u32 {
        // Parsing only admits sized formats, so the table always answers.
        self.format
            .byte_size()
            .expect("vertex elements always carry sized formats")
    }

    fn resolve(&mut self, offset: u32) -> u32 {
        self.offset = offset;
        offset + self.byte_size()
    }

    fn parse(desc: &str) -> Result<Self, InvalidVertexFormat> {
        let mut split = desc.split('.');
        let (component, format) = match (split.next(), split.next(), split.next()) {
            (Some(c), Some(f), None) => (c, f),
            _ => {
                return Err(InvalidVertexFormat(format!(
                    "element {desc:?} is not a single Component.Format pair"
                )));
            }
        };
        Ok(Element {
            component: parse_component(component)?,
            format: parse_format(format)?,
            offset: 0,
        })
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            component_code(self.component),
            format_code(self.format)
        )
    }
}

/// An immutable vertex format description.
#[derive(Debug, Clone)]
pub struct VertexFormat {
    elements: Vec<Element>,
    size: u32,
}

impl VertexFormat {
    /// Parses a whitespace-separated list of `Component.Format` pairs.
    ///
    /// ```
    /// use stages_and_states::formats::VertexFormat;
    ///
    /// let fmt = VertexFormat::parse("P.Fx3 N.Fx3 T0.Fx2").unwrap();
    /// assert_eq!(fmt.byte_size(), 12 + 12 + 8);
    /// assert_eq!(fmt.element_count(), 3);
    /// ```
    pub fn parse(descriptor: &str) -> Result<Self, InvalidVertexFormat> {
        let tokens: Vec<&str> = descriptor.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(InvalidVertexFormat("empty descriptor".to_string()));
        }
        let mut elements = tokens
            .iter()
            .map(|t| Element::parse(t))
            .collect::<Result<Vec<_>, _>>()?;

        for i in 0..elements.len() {
            for j in 0..i {
                if elements[i].component == elements[j].component {
                    return Err(InvalidVertexFormat(format!(
                        "component {} was repeated twice",
                        component_code(elements[i].component)
                    )));
                }
            }
        }

        let mut size = 0;
        for element in &mut elements {
            size = element.resolve(size);
        }
        Ok(VertexFormat { elements, size })
    }

    /// Size of one vertex in bytes.
    pub fn byte_size(&self) -> u32 {
        self.size
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

    /// Whether the format binds `component`.
    pub fn has_component(&self, component: PinComponent) -> bool {
        self.find(component).is_some()
    }

    /// Finds the element binding `component`, if present.
    pub fn find(&self, component: PinComponent) -> Option<&Element> {
        self.elements.iter().find(|e| e.component == component)
    }

    /// Byte offset of `component`, erroring when absent.
    pub fn offset_of(&self, component: PinComponent) -> Result<u32, InvalidVertexFormat> {
        self.find(component).map(|e| e.offset).ok_or_else(|| {
            InvalidVertexFormat(format!(
                "component {} does not exist in vertex format {self}",
                component_code(component)
            ))
        })
    }

    /// Format of `component`, erroring when absent.
    pub fn format_of(&self, component: PinComponent) -> Result<PinFormat, InvalidVertexFormat> {
        self.find(component).map(|e| e.format).ok_or_else(|| {
            InvalidVertexFormat(format!(
                "component {} does not exist in vertex format {self}",
                component_code(component)
            ))
        })
    }
}

impl fmt::Display for VertexFormat {
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

impl PartialEq for VertexFormat {
    fn eq(&self, other: &Self) -> bool {
        self.elements == other.elements
    }
}

impl Eq for VertexFormat {}

fn component_code(component: PinComponent) -> &'static str {
    use PinComponent::*;
    match component {
        None => "X",
        Position => "P",
        Normal => "N",
        Colour => "C",
        SecondaryColour => "SC",
        BlendWeights => "BW",
        BlendIndices => "BI",
        BiNormal => "B",
        Tangent => "T",
        TexCoord0 => "T0",
        TexCoord1 => "T1",
        TexCoord2 => "T2",
        TexCoord3 => "T3",
        TexCoord4 => "T4",
        TexCoord5 => "T5",
        TexCoord6 => "T6",
        TexCoord7 => "T7",
        TexCoord8 => "T8",
        TexCoord9 => "T9",
        TexCoord10 => "T10",
        TexCoord11 => "T11",
        TexCoord12 => "T12",
        TexCoord13 => "T13",
        TexCoord14 => "T14",
        TexCoord15 => "T15",
        User0 => "U0",
        User1 => "U1",
        User2 => "U2",
        User3 => "U3",
        User4 => "U4",
        User5 => "U5",
    }
}

fn parse_component(code: &str) -> Result<PinComponent, InvalidVertexFormat> {
    use PinComponent::*;
    Ok(match code {
        "P" => Position,
        "N" => Normal,
        "C" => Colour,
        "SC" => SecondaryColour,
        "BW" => BlendWeights,
        "BI" => BlendIndices,
        "B" => BiNormal,
        "T" => Tangent,
        "T0" => TexCoord0,
        "T1" => TexCoord1,
        "T2" => TexCoord2,
        "T3" => TexCoord3,
        "T4" => TexCoord4,
        "T5" => TexCoord5,
        "T6" => TexCoord6,
        "T7" => TexCoord7,
        "T8" => TexCoord8,
        "T9" => TexCoord9,
        "T10" => TexCoord10,
        "T11" => TexCoord11,
        "T12" => TexCoord12,
        "T13" => TexCoord13,
        "T14" => TexCoord14,
        "T15" => TexCoord15,
        "U0" => User0,
        "U1" => User1,
        "U2" => User2,
        "U3" => User3,
        "U4" => User4,
        "U5" => User5,
        other => {
            return Err(InvalidVertexFormat(format!("unknown component {other}")));
        }
    })
}

fn format_code(format: PinFormat) -> &'static str {
    use PinFormat::*;
    match format {
        Integer => "I",
        Integerx2 => "Ix2",
        Integerx3 => "Ix3",
        Integerx4 => "Ix4",
        UInteger => "UI",
        UIntegerx2 => "UIx2",
        UIntegerx3 => "UIx3",
        UIntegerx4 => "UIx4",
        SNorm => "SN",
        SNormx2 => "SNx2",
        SNormx3 => "SNx3",
        SNormx4 => "SNx4",
        UNorm => "UN",
        UNormx2 => "UNx2",
        UNormx3 => "UNx3",
        UNormx4 => "UNx4",
        Float => "F",
        Floatx2 => "Fx2",
        Floatx3 => "Fx3",
        Floatx4 => "Fx4",
        Float2x2 => "F2x2",
        Float3x3 => "F3x3",
        Float4x4 => "F4x4",
        Integer2x2 => "I2x2",
        Integer3x3 => "I3x3",
        Integer4x4 => "I4x4",
        UInteger2x2 => "UI2x2",
        UInteger3x3 => "UI3x3",
        UInteger4x4 => "UI4x4",
        SNorm2x2 => "SN2x2",
        SNorm3x3 => "SN3x3",
        SNorm4x4 => "SN4x4",
        UNorm2x2 => "UN2x2",
        UNorm3x3 => "UN3x3",
        UNorm4x4 => "UN4x4",
        _ => unreachable!("vertex elements never carry reference formats"),
    }
}

fn parse_format(code: &str) -> Result<PinFormat, InvalidVertexFormat> {
    use PinFormat::*;
    Ok(match code {
        "I" => Integer,
        "Ix2" => Integerx2,
        "Ix3" => Integerx3,
        "Ix4" => Integerx4,
        "UI" => UInteger,
        "UIx2" => UIntegerx2,
        "UIx3" => UIntegerx3,
        "UIx4" => UIntegerx4,
        "SN" => SNorm,
        "SNx2" => SNormx2,
        "SNx3" => SNormx3,
        "SNx4" => SNormx4,
        "UN" => UNorm,
        "UNx2" => UNormx2,
        "UNx3" => UNormx3,
        "UNx4" => UNormx4,
        "F" => Float,
        "Fx2" => Floatx2,
        "Fx3" => Floatx3,
        "Fx4" => Floatx4,
        other => {
            return Err(InvalidVertexFormat(format!(
                "format {other} not recognised"
            )));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_normal() {
        let fmt = VertexFormat::parse("P.Fx3 N.Fx3").unwrap();
        assert_eq!(fmt.byte_size(), 24);
        assert_eq!(fmt.element_count(), 2);
        assert_eq!(fmt.offset_of(PinComponent::Normal).unwrap(), 12);
        assert_eq!(
            fmt.format_of(PinComponent::Position).unwrap(),
            PinFormat::Floatx3
        );
    }

    #[test]
    fn display_roundtrip() {
        for descriptor in ["P.Fx3 N.Fx3 T0.Fx2", "P.Fx4 C.UNx4", "BW.Fx4 BI.UIx4"] {
            let fmt = VertexFormat::parse(descriptor).unwrap();
            let reparsed = VertexFormat::parse(&fmt.to_string()).unwrap();
            assert_eq!(fmt, reparsed);
        }
    }

    #[test]
    fn offset_monotonicity() {
        let fmt = VertexFormat::parse("P.Fx3 N.SNx3 T0.Fx2 C.UNx4").unwrap();
        let elements: Vec<_> = fmt.elements().collect();
        for pair in elements.windows(2) {
            assert_eq!(pair[0].offset() + pair[0].byte_size(), pair[1].offset());
        }
        let last = elements.last().unwrap();
        assert_eq!(last.offset() + last.byte_size(), fmt.byte_size());
    }

    #[test]
    fn missing_component_errors() {
        let fmt = VertexFormat::parse("P.Fx3").unwrap();
        assert!(fmt.offset_of(PinComponent::Normal).is_err());
        assert!(!fmt.has_component(PinComponent::TexCoord0));
    }

    #[test]
    fn malformed_rejected() {
        assert!(VertexFormat::parse("").is_err());
        assert!(VertexFormat::parse("P").is_err());
        assert!(VertexFormat::parse("P.Fx9").is_err());
        assert!(VertexFormat::parse("Z.Fx3").is_err());
        assert!(VertexFormat::parse("P.Fx3 P.Fx3").is_err());
    }
}
