#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Per-point observation evidence.
pub mod accumulator;

/// Simulated pinhole camera.
pub mod camera;

/// Pipeline configuration.
pub mod config;

/// Order-preserving quality encoding for atomic updates.
pub mod encoding;

/// Error types for the crate.
pub mod error;

/// Equirectangular quality grid.
pub mod grid;

/// Execution strategies for the data-parallel passes.
pub mod parallel;

/// The staged scoring pipeline.
pub mod pipeline;

/// Projection of per-point evidence onto the quality grid.
pub mod projector;

/// Candidate viewpoint scoring.
pub mod scorer;

/// Visibility tests and evidence accumulation.
pub mod visibility;

pub use error::QualityError;
