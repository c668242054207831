#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Axis-aligned bounding boxes.
pub mod aabb;

/// I/O utilities for reading and writing 3D data.
pub mod io;

/// Triangle mesh type.
pub mod mesh;

/// Point cloud type.
pub mod pointcloud;

/// Nearest-neighbor and ray-intersection indexes.
pub mod spatial;

/// Host/device blob transfer.
pub mod transfer;
