use glam::DVec3;
use serde::{Deserialize, Serialize};
use viewscore_3d::mesh::TriangleMesh;

use crate::{
    encoding::PackedQualityBuffer,
    grid::SphericalQualityGrid,
    parallel::{dispatch_for_each, ExecutionStrategy},
    QualityError,
};

/// How a direction reads the quality grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GridLookup {
    /// The containing cell.
    Nearest,
    /// Bilinear interpolation between cell centres.
    #[default]
    Bilinear,
}

/// Assigns a quality score to every vertex of a candidate-viewpoint sphere.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewpointScorer {
    lookup: GridLookup,
    strategy: ExecutionStrategy,
}

impl ViewpointScorer {
    /// Create a scorer using `lookup`.
    pub fn new(lookup: GridLookup) -> Self {
        Self {
            lookup,
            strategy: ExecutionStrategy::default(),
        }
    }

    /// Set the execution strategy.
    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Grid value along `direction`.
    pub fn sample(&self, grid: &SphericalQualityGrid, direction: &[f64; 3]) -> f32 {
        match self.lookup {
            GridLookup::Nearest => grid.sample_nearest(direction),
            GridLookup::Bilinear => grid.sample_bilinear(direction),
        }
    }

    /// Write the score of every vertex of `sphere` into `scores`.
    ///
    /// A vertex's direction is taken from the sphere's centroid; a vertex at the centroid
    /// scores zero. Every vertex owns exactly one slot of `scores`.
    pub fn score(
        &self,
        grid: &SphericalQualityGrid,
        sphere: &TriangleMesh,
        scores: &PackedQualityBuffer,
    ) -> Result<(), QualityError> {
        if scores.len() != sphere.num_vertices() {
            return Err(QualityError::SizeMismatch {
                expected: sphere.num_vertices(),
                actual: scores.len(),
            });
        }

        let center = DVec3::from_array(sphere.centroid());
        let vertices = sphere.vertices();

        dispatch_for_each(self.strategy, vertices.len(), |i| {
            let direction = DVec3::from_array(vertices[i]) - center;
            scores.store(i, self.sample(grid, &direction.to_array()));
        })?;

        Ok(())
    }

    /// Score every vertex of `sphere` and decode the result.
    pub fn score_mesh(
        &self,
        grid: &SphericalQualityGrid,
        sphere: &TriangleMesh,
    ) -> Result<Vec<f32>, QualityError> {
        let scores = PackedQualityBuffer::new(sphere.num_vertices());
        self.score(grid, sphere, &scores)?;
        Ok(scores.decode_all())
    }
}

/// Attach decoded `scores` to `sphere` and move the sphere's centre onto `observer`.
pub fn export_scores(
    sphere: &mut TriangleMesh,
    scores: &PackedQualityBuffer,
    observer: &[f64; 3],
) -> Result<(), QualityError> {
    sphere.set_scalars(scores.decode_all())?;
    let offset = DVec3::from_array(*observer) - DVec3::from_array(sphere.centroid());
    sphere.translate(&offset.to_array());
    Ok(())
}
