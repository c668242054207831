mod bvh;
mod kdtree;
mod ray;

pub use bvh::{RayHit, RayIntersectionIndex};
pub use kdtree::{NearestNeighborIndex, Neighbor};
pub use ray::Ray;

/// Error types for the spatial index module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SpatialError {
    /// An index was built over zero usable points or triangles.
    #[error("Cannot build a spatial index over empty geometry")]
    EmptyGeometry,
}
