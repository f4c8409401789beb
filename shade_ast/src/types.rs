use std::fmt::Display;

use smol_str::SmolStr;

/// The component type of scalars, vectors, and matrices.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ScalarType {
    Bool,
    Int,
    Uint,
    Half,
    Float,
    Double,
}

/// The shape of a texture resource like `Texture2DArray` or `Buffer`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum TextureDim {
    Texture1D,
    Texture1DArray,
    Texture2D,
    Texture2DArray,
    Texture2DMS,
    Texture2DMSArray,
    Texture3D,
    TextureCube,
    TextureCubeArray,
    Buffer,
}

impl TextureDim {
    /// The dimension suffix used by GLSL sampler types like `2DArray` in `sampler2DArray`.
    pub fn sampler_suffix(&self) -> &'static str {
        match self {
            TextureDim::Texture1D => "1D",
            TextureDim::Texture1DArray => "1DArray",
            TextureDim::Texture2D => "2D",
            TextureDim::Texture2DArray => "2DArray",
            TextureDim::Texture2DMS => "2DMS",
            TextureDim::Texture2DMSArray => "2DMSArray",
            TextureDim::Texture3D => "3D",
            TextureDim::TextureCube => "Cube",
            TextureDim::TextureCubeArray => "CubeArray",
            TextureDim::Buffer => "Buffer",
        }
    }

    /// The number of coordinate components used to sample this texture, including the array layer.
    pub fn coordinate_count(&self) -> u8 {
        match self {
            TextureDim::Texture1D | TextureDim::Buffer => 1,
            TextureDim::Texture1DArray | TextureDim::Texture2D | TextureDim::Texture2DMS => 2,
            TextureDim::Texture2DArray
            | TextureDim::Texture2DMSArray
            | TextureDim::Texture3D
            | TextureDim::TextureCube => 3,
            TextureDim::TextureCubeArray => 4,
        }
    }

    /// The number of components returned by `textureSize`.
    pub fn size_count(&self) -> u8 {
        match self {
            TextureDim::Texture1D | TextureDim::Buffer => 1,
            TextureDim::Texture1DArray
            | TextureDim::Texture2D
            | TextureDim::Texture2DMS
            | TextureDim::TextureCube => 2,
            TextureDim::Texture2DArray
            | TextureDim::Texture2DMSArray
            | TextureDim::Texture3D
            | TextureDim::TextureCubeArray => 3,
        }
    }

    pub fn is_multisampled(&self) -> bool {
        matches!(self, TextureDim::Texture2DMS | TextureDim::Texture2DMSArray)
    }
}

/// A GLSL combined sampler type like `usampler2DShadow`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct SamplerType {
    pub dim: TextureDim,
    /// `Int` or `Uint` for integer samplers and `Float` otherwise.
    pub element: ScalarType,
    pub shadow: bool,
}

impl SamplerType {
    pub fn new(dim: TextureDim) -> Self {
        Self {
            dim,
            element: ScalarType::Float,
            shadow: false,
        }
    }
}

impl Display for SamplerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.element {
            ScalarType::Int => "i",
            ScalarType::Uint => "u",
            _ => "",
        };
        let shadow = if self.shadow { "Shadow" } else { "" };
        write!(f, "{prefix}sampler{}{shadow}", self.dim.sampler_suffix())
    }
}

/// The static type of a variable or expression.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Type {
    Void,
    Scalar(ScalarType),
    /// A vector like `float4` with 1 to 4 components.
    Vector(ScalarType, u8),
    /// A matrix like `float3x4` with 3 rows and 4 columns.
    Matrix {
        scalar: ScalarType,
        rows: u8,
        columns: u8,
    },
    /// An array with an optional constant length like `float[4]`.
    Array(Box<Type>, Option<u32>),
    /// A separate texture like `Texture2D<uint4>` or `Buffer<float4>`.
    Texture {
        dim: TextureDim,
        element: Option<Box<Type>>,
    },
    /// A separate sampler like `SamplerState` or `SamplerComparisonState`.
    SamplerState { comparison: bool },
    /// A combined sampler.
    /// Legacy `sampler` declarations have no concrete type until they are used by a fetch.
    Sampler(Option<SamplerType>),
    /// A user defined struct or typedef name.
    Named(SmolStr),
}

impl Type {
    pub fn float() -> Self {
        Type::Scalar(ScalarType::Float)
    }

    pub fn int() -> Self {
        Type::Scalar(ScalarType::Int)
    }

    pub fn bool() -> Self {
        Type::Scalar(ScalarType::Bool)
    }

    pub fn vec(size: u8) -> Self {
        Type::Vector(ScalarType::Float, size)
    }

    pub fn is_texture(&self) -> bool {
        matches!(self, Type::Texture { .. })
    }

    pub fn is_sampler_state(&self) -> bool {
        matches!(self, Type::SamplerState { .. })
    }

    pub fn is_sampler(&self) -> bool {
        matches!(self, Type::Sampler(_))
    }

    /// Textures and separate samplers have no GLSL equivalent
    /// and can't be passed to functions after conversion.
    pub fn is_resource(&self) -> bool {
        self.is_texture() || self.is_sampler_state()
    }

    /// The component type for scalars, vectors, matrices, and texture elements.
    pub fn scalar(&self) -> Option<ScalarType> {
        match self {
            Type::Scalar(s) | Type::Vector(s, _) => Some(*s),
            Type::Matrix { scalar, .. } => Some(*scalar),
            Type::Array(ty, _) => ty.scalar(),
            Type::Texture { element, .. } => element.as_ref().and_then(|e| e.scalar()),
            _ => None,
        }
    }

    /// The number of scalar components in this type.
    pub fn component_count(&self) -> Option<u8> {
        match self {
            Type::Scalar(_) => Some(1),
            Type::Vector(_, n) => Some(*n),
            Type::Matrix { rows, columns, .. } => Some(rows * columns),
            _ => None,
        }
    }

    /// The combined sampler type for this texture.
    pub fn texture_sampler(&self, shadow: bool) -> Option<SamplerType> {
        match self {
            Type::Texture { dim, element } => {
                let element = match element.as_ref().and_then(|e| e.scalar()) {
                    Some(ScalarType::Int) => ScalarType::Int,
                    Some(ScalarType::Uint) => ScalarType::Uint,
                    _ => ScalarType::Float,
                };
                Some(SamplerType {
                    dim: *dim,
                    element,
                    shadow,
                })
            }
            _ => None,
        }
    }
}
