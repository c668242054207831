use super::PlyError;

/// Layout of the vertex element.
#[derive(Debug, PartialEq, Clone)]
pub enum PlyType {
    /// Exactly `float x, y, z, nx, ny, nz`, decoded as a packed record.
    XYZNormals,
    /// Any other layout, decoded property by property.
    Dynamic(Vec<PlyPropertyDefinition>),
}

/// A property declared in the PLY header.
#[derive(Debug, PartialEq, Clone)]
pub struct PlyPropertyDefinition {
    /// The property name.
    pub name: String,
    /// The scalar type, or the item type of a list property.
    pub data_type: PlyDataType,
    /// The type of the length prefix for list properties.
    pub list_count: Option<PlyDataType>,
}

impl PlyPropertyDefinition {
    /// Create a scalar property definition.
    pub fn scalar(name: &str, data_type: PlyDataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            list_count: None,
        }
    }

    /// Check if this is a list property.
    pub fn is_list(&self) -> bool {
        self.list_count.is_some()
    }
}

/// Scalar types supported by the PLY format.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum PlyDataType {
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
    /// Signed 8-bit integer.
    Int8,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    UInt32,
}

impl PlyDataType {
    /// Parse a type name from the header.
    pub fn parse(type_str: &str) -> Result<Self, PlyError> {
        match type_str {
            "float" | "float32" => Ok(PlyDataType::Float32),
            "double" | "float64" => Ok(PlyDataType::Float64),
            "char" | "int8" => Ok(PlyDataType::Int8),
            "uchar" | "uint8" => Ok(PlyDataType::UInt8),
            "short" | "int16" => Ok(PlyDataType::Int16),
            "ushort" | "uint16" => Ok(PlyDataType::UInt16),
            "int" | "int32" => Ok(PlyDataType::Int32),
            "uint" | "uint32" => Ok(PlyDataType::UInt32),
            _ => Err(PlyError::UnsupportedProperty(type_str.to_string())),
        }
    }

    /// Size in bytes of one binary value.
    pub fn size(&self) -> usize {
        match self {
            PlyDataType::Float32 | PlyDataType::Int32 | PlyDataType::UInt32 => 4,
            PlyDataType::Float64 => 8,
            PlyDataType::Int16 | PlyDataType::UInt16 => 2,
            PlyDataType::Int8 | PlyDataType::UInt8 => 1,
        }
    }

    /// Decode one little-endian value.
    ///
    /// PRECONDITION: `bytes.len() == self.size()`.
    pub(crate) fn decode_le(&self, bytes: &[u8]) -> Result<f64, PlyError> {
        let too_short = || PlyError::Parse(format!("expected {} bytes", self.size()));
        let value = match self {
            PlyDataType::Float32 => {
                f32::from_le_bytes(bytes.try_into().map_err(|_| too_short())?) as f64
            }
            PlyDataType::Float64 => f64::from_le_bytes(bytes.try_into().map_err(|_| too_short())?),
            PlyDataType::Int8 => *bytes.first().ok_or_else(too_short)? as i8 as f64,
            PlyDataType::UInt8 => *bytes.first().ok_or_else(too_short)? as f64,
            PlyDataType::Int16 => {
                i16::from_le_bytes(bytes.try_into().map_err(|_| too_short())?) as f64
            }
            PlyDataType::UInt16 => {
                u16::from_le_bytes(bytes.try_into().map_err(|_| too_short())?) as f64
            }
            PlyDataType::Int32 => {
                i32::from_le_bytes(bytes.try_into().map_err(|_| too_short())?) as f64
            }
            PlyDataType::UInt32 => {
                u32::from_le_bytes(bytes.try_into().map_err(|_| too_short())?) as f64
            }
        };
        Ok(value)
    }

    /// Parse one ASCII token.
    pub(crate) fn parse_token(&self, token: &str) -> Result<f64, PlyError> {
        let err = || PlyError::Parse(format!("invalid {self:?} value '{token}'"));
        match self {
            PlyDataType::Float32 | PlyDataType::Float64 => token.parse::<f64>().map_err(|_| err()),
            PlyDataType::Int8 | PlyDataType::Int16 | PlyDataType::Int32 => {
                token.parse::<i64>().map(|v| v as f64).map_err(|_| err())
            }
            PlyDataType::UInt8 | PlyDataType::UInt16 | PlyDataType::UInt32 => {
                token.parse::<u64>().map(|v| v as f64).map_err(|_| err())
            }
        }
    }
}

/// Packed binary vertex record with position and normal.
#[repr(C, packed)]
#[derive(Debug, bincode::Decode)]
pub struct XYZNormalsProperty {
    /// x coordinate
    pub x: f32,
    /// y coordinate
    pub y: f32,
    /// z coordinate
    pub z: f32,
    /// normal x component
    pub nx: f32,
    /// normal y component
    pub ny: f32,
    /// normal z component
    pub nz: f32,
}

impl XYZNormalsProperty {
    /// The position as double precision.
    pub fn to_point(&self) -> [f64; 3] {
        [self.x as f64, self.y as f64, self.z as f64]
    }

    /// The normal as double precision.
    pub fn to_normal(&self) -> [f64; 3] {
        [self.nx as f64, self.ny as f64, self.nz as f64]
    }
}

/// Column positions of the known vertex properties among the scalar properties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct VertexLayout {
    pub position: [usize; 3],
    pub normal: Option<[usize; 3]>,
    pub scalar: Option<usize>,
}

impl VertexLayout {
    pub(crate) fn from_properties(properties: &[PlyPropertyDefinition]) -> Result<Self, PlyError> {
        let column = |name: &str| {
            properties
                .iter()
                .filter(|p| !p.is_list())
                .position(|p| p.name == name)
        };
        let required = |name: &'static str| column(name).ok_or(PlyError::MissingProperty(name));

        let position = [required("x")?, required("y")?, required("z")?];
        let normal = match (column("nx"), column("ny"), column("nz")) {
            (Some(x), Some(y), Some(z)) => Some([x, y, z]),
            _ => None,
        };
        let scalar = column("quality").or_else(|| column("scalar"));

        Ok(Self {
            position,
            normal,
            scalar,
        })
    }

    pub(crate) fn point(&self, record: &[f64]) -> [f64; 3] {
        self.position.map(|i| record[i])
    }

    pub(crate) fn normal(&self, record: &[f64]) -> Option<[f64; 3]> {
        self.normal.map(|cols| cols.map(|i| record[i]))
    }

    pub(crate) fn scalar(&self, record: &[f64]) -> Option<f32> {
        self.scalar.map(|i| record[i] as f32)
    }
}

impl PlyType {
    /// Size in bytes of one packed record, `None` for dynamic layouts.
    pub fn packed_size(&self) -> Option<usize> {
        match self {
            PlyType::XYZNormals => Some(std::mem::size_of::<XYZNormalsProperty>()),
            PlyType::Dynamic(_) => None,
        }
    }

    /// Decode one packed record.
    pub fn deserialize(&self, buffer: &[u8]) -> Result<XYZNormalsProperty, PlyError> {
        match self {
            PlyType::XYZNormals => {
                let (property, _): (XYZNormalsProperty, usize) =
                    bincode::decode_from_slice(buffer, bincode::config::standard())?;
                Ok(property)
            }
            PlyType::Dynamic(_) => Err(PlyError::UnsupportedFormat(
                "dynamic layouts are not packed".to_string(),
            )),
        }
    }

    /// Pick the packed layout when the vertex properties match it exactly.
    pub fn detect_format(properties: &[PlyPropertyDefinition]) -> Self {
        let expected_names = ["x", "y", "z", "nx", "ny", "nz"];
        if properties.len() == expected_names.len()
            && properties
                .iter()
                .zip(expected_names.iter())
                .all(|(p, expected)| {
                    &p.name == expected && p.data_type == PlyDataType::Float32 && !p.is_list()
                })
        {
            return PlyType::XYZNormals;
        }
        PlyType::Dynamic(properties.to_vec())
    }
}
