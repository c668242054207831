use std::path::PathBuf;

use viewscore_3d::{
    io::ply::PlyError, mesh::MeshError, spatial::SpatialError, transfer::TransferError,
};

use crate::parallel::ParallelError;

/// Error types for the viewpoint quality pipeline.
#[derive(Debug, thiserror::Error)]
pub enum QualityError {
    /// An input file cannot be read, parsed or is empty.
    #[error("Failed to load {}: {source}", .path.display())]
    Load {
        /// The failing file.
        path: PathBuf,
        /// The underlying cause.
        source: PlyError,
    },

    /// A spatial index was built over empty geometry.
    #[error("Cannot index the {input}: {source}")]
    EmptyGeometry {
        /// Which input was empty.
        input: &'static str,
        /// The underlying cause.
        source: SpatialError,
    },

    /// The scored mesh cannot be written.
    #[error("Failed to export {}: {source}", .path.display())]
    Export {
        /// The output file.
        path: PathBuf,
        /// The underlying cause.
        source: PlyError,
    },

    /// A buffer does not have one slot per item.
    #[error("Expected {expected} slots but got {actual}")]
    SizeMismatch {
        /// The number of items.
        expected: usize,
        /// The number of slots.
        actual: usize,
    },

    /// The score field does not fit the mesh.
    #[error(transparent)]
    Mesh(#[from] MeshError),

    /// A structure failed to cross the host/device boundary.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// A parallel pass failed to start.
    #[error(transparent)]
    Parallel(#[from] ParallelError),
}
