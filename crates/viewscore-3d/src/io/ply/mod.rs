mod parser;
mod properties;
mod writer;

pub use parser::*;
pub use properties::*;
pub use writer::*;

use crate::{mesh::MeshError, pointcloud::PointCloudError};

/// Error types for the PLY module.
#[derive(Debug, thiserror::Error)]
pub enum PlyError {
    /// Failed to read or write the PLY file
    #[error("Failed to access PLY file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode a packed record
    #[error("Failed to decode PLY record: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// The header is not a valid PLY header
    #[error("Malformed PLY header: {0}")]
    MalformedHeader(String),

    /// The body format is not supported
    #[error("Unsupported PLY format: {0}")]
    UnsupportedFormat(String),

    /// A property type is not supported
    #[error("Unsupported PLY property type: {0}")]
    UnsupportedProperty(String),

    /// A required element or property is missing
    #[error("Missing PLY element or property: {0}")]
    MissingProperty(&'static str),

    /// A value in the body could not be parsed
    #[error("Failed to parse PLY data: {0}")]
    Parse(String),

    /// The file holds no vertices
    #[error("PLY file has no vertices")]
    Empty,

    /// The decoded data is not a valid mesh
    #[error(transparent)]
    Mesh(#[from] MeshError),

    /// The decoded data is not a valid point cloud
    #[error(transparent)]
    PointCloud(#[from] PointCloudError),
}
