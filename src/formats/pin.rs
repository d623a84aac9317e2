// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Shader pin shapes and the constant-buffer packing rules built on them.

/// Array-size sentinel: the pin is not an array.
pub const NOT_ARRAY: u32 = u32::MAX;

/// Array-size sentinel: the pin is an array whose length is only known at
/// run time.
pub const DYNAMIC_ARRAY: u32 = u32::MAX - 1;

/// The shape of a value flowing through a shader pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinFormat {
    Undefined,
    Integer,
    Integerx2,
    Integerx3,
    Integerx4,
    UInteger,
    UIntegerx2,
    UIntegerx3,
    UIntegerx4,
    Bool,
    Boolx2,
    Boolx3,
    Boolx4,
    SNorm,
    SNormx2,
    SNormx3,
    SNormx4,
    UNorm,
    UNormx2,
    UNormx3,
    UNormx4,
    Float,
    Floatx2,
    Floatx3,
    Floatx4,
    BufferTexture,
    Texture1D,
    Texture1DArray,
    Texture2D,
    Texture2DArray,
    TextureCube,
    Texture3D,
    Sampler,
    Interface,
    Float2x2,
    Float3x3,
    Float4x4,
    Integer2x2,
    Integer3x3,
    Integer4x4,
    UInteger2x2,
    UInteger3x3,
    UInteger4x4,
    SNorm2x2,
    SNorm3x3,
    SNorm4x4,
    UNorm2x2,
    UNorm3x3,
    UNorm4x4,
}

/// Named input slots of the vertex/shader binding model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinComponent {
    None,
    Position,
    Normal,
    Colour,
    SecondaryColour,
    BlendWeights,
    BlendIndices,
    BiNormal,
    Tangent,
    TexCoord0,
    TexCoord1,
    TexCoord2,
    TexCoord3,
    TexCoord4,
    TexCoord5,
    TexCoord6,
    TexCoord7,
    TexCoord8,
    TexCoord9,
    TexCoord10,
    TexCoord11,
    TexCoord12,
    TexCoord13,
    TexCoord14,
    TexCoord15,
    User0,
    User1,
    User2,
    User3,
    User4,
    User5,
}

impl PinFormat {
    /// Byte size of the format, `None` for reference kinds (textures,
    /// samplers, interfaces) whose size is not a layout question.
    pub fn byte_size(self) -> Option<u32> {
        use PinFormat::*;
        Some(match self {
            Integer | UInteger | Float => 4,
            Integerx2 | UIntegerx2 | Floatx2 => 4 * 2,
            Integerx3 | UIntegerx3 | Floatx3 => 4 * 3,
            Integerx4 | UIntegerx4 | Floatx4 => 4 * 4,
            Bool => 1,
            Boolx2 => 2,
            Boolx3 => 3,
            Boolx4 => 4,
            SNorm | UNorm => 2,
            SNormx2 | UNormx2 => 2 * 2,
            SNormx3 | UNormx3 => 2 * 3,
            SNormx4 | UNormx4 => 2 * 4,
            Float2x2 => 4 * 2 * 2,
            Float3x3 => 4 * 3 * 3,
            Float4x4 => 4 * 4 * 4,
            Integer2x2 | UInteger2x2 => 4 * 2 * 2,
            Integer3x3 | UInteger3x3 => 4 * 3 * 3,
            Integer4x4 | UInteger4x4 => 4 * 4 * 4,
            SNorm2x2 | UNorm2x2 => 2 * 2 * 2,
            SNorm3x3 | UNorm3x3 => 2 * 3 * 3,
            SNorm4x4 | UNorm4x4 => 2 * 4 * 4,
            Undefined | BufferTexture | Texture1D | Texture1DArray | Texture2D
            | Texture2DArray | TextureCube | Texture3D | Sampler | Interface => return None,
        })
    }

    /// The scalar class underlying the format, `Undefined` for references.
    pub fn to_scalar(self) -> PinFormat {
        use PinFormat::*;
        match self {
            Integer | Integerx2 | Integerx3 | Integerx4 | Integer2x2 | Integer3x3 | Integer4x4 => {
                Integer
            }
            UInteger | UIntegerx2 | UIntegerx3 | UIntegerx4 | UInteger2x2 | UInteger3x3
            | UInteger4x4 => UInteger,
            Float | Floatx2 | Floatx3 | Floatx4 | Float2x2 | Float3x3 | Float4x4 => Float,
            SNorm | SNormx2 | SNormx3 | SNormx4 | SNorm2x2 | SNorm3x3 | SNorm4x4 => SNorm,
            UNorm | UNormx2 | UNormx3 | UNormx4 | UNorm2x2 | UNorm3x3 | UNorm4x4 => UNorm,
            Bool | Boolx2 | Boolx3 | Boolx4 => Bool,
            _ => Undefined,
        }
    }

    /// Whether the format references a texture resource.
    pub fn is_texture(self) -> bool {
        use PinFormat::*;
        matches!(
            self,
            BufferTexture
                | Texture1D
                | Texture1DArray
                | Texture2D
                | Texture2DArray
                | TextureCube
                | Texture3D
        )
    }
}

/// Rounds `offset` up to the next constant-buffer slot for `format`.
///
/// All scalar, vector and matrix constants pack to 16-byte registers; the
/// format parameter is kept so tighter packing classes can be introduced
/// without touching call sites.
pub fn align(_format: PinFormat, offset: u32) -> u32 {
    ((offset + 15) / 16) * 16
}

/// Bytes a parameter of `format` advances the packing cursor.
///
/// Arrays multiply the element size by their count; both the
/// [`NOT_ARRAY`] and [`DYNAMIC_ARRAY`] sentinels advance by one element.
pub fn advance(format: PinFormat, array_size: u32) -> Option<u32> {
    let size = format.byte_size()?;
    let count = if array_size == NOT_ARRAY || array_size == DYNAMIC_ARRAY {
        1
    } else {
        array_size
    };
    Some(size * count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_table() {
        assert_eq!(PinFormat::Float.byte_size(), Some(4));
        assert_eq!(PinFormat::Floatx3.byte_size(), Some(12));
        assert_eq!(PinFormat::Float4x4.byte_size(), Some(64));
        assert_eq!(PinFormat::UNormx4.byte_size(), Some(8));
        assert_eq!(PinFormat::Boolx3.byte_size(), Some(3));
        assert_eq!(PinFormat::Texture2D.byte_size(), None);
    }

    #[test]
    fn sixteen_byte_alignment() {
        assert_eq!(align(PinFormat::Float, 0), 0);
        assert_eq!(align(PinFormat::Float, 1), 16);
        assert_eq!(align(PinFormat::Float4x4, 16), 16);
        assert_eq!(align(PinFormat::Floatx2, 17), 32);
    }

    #[test]
    fn advance_respects_sentinels() {
        assert_eq!(advance(PinFormat::Floatx4, NOT_ARRAY), Some(16));
        assert_eq!(advance(PinFormat::Floatx4, DYNAMIC_ARRAY), Some(16));
        assert_eq!(advance(PinFormat::Floatx4, 3), Some(48));
        assert_eq!(advance(PinFormat::Sampler, NOT_ARRAY), None);
    }

    #[test]
    fn scalar_classes() {
        assert_eq!(PinFormat::Float4x4.to_scalar(), PinFormat::Float);
        assert_eq!(PinFormat::UIntegerx3.to_scalar(), PinFormat::UInteger);
        assert_eq!(PinFormat::Texture2D.to_scalar(), PinFormat::Undefined);
    }
}
