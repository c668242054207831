use glam::DVec3;
use serde::{Deserialize, Serialize};
use viewscore_3d::spatial::{NearestNeighborIndex, Neighbor, RayIntersectionIndex};

use crate::{
    accumulator::{PerPointAccumulator, PointEvidence},
    camera::{CameraFrame, PinholeCamera},
    encoding::sanitize_quality,
    grid::{cell_direction, SphericalQualityGrid, GRID_WIDTH},
    parallel::{dispatch_rows, ExecutionStrategy},
    QualityError,
};

/// Default ground sample distance under which a view is at full resolution, in scene units.
pub const DEFAULT_TARGET_GSD: f64 = 0.01;

// angular size of one grid cell
const CELL_ANGLE: f64 = std::f64::consts::PI / 180.0;

/// Combines the evidence of the points around a ray hit into one cell value.
///
/// Implementations must return a finite, non-negative value for finite, non-negative
/// evidence, and zero for an empty neighborhood.
pub trait QualityAggregation: Send + Sync {
    /// Aggregate `neighbors` found within `radius` of the hit.
    fn aggregate(&self, neighbors: &[(Neighbor, PointEvidence)], radius: f64) -> f32;
}

/// Best quality among the observed neighbors.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxEvidence;

impl QualityAggregation for MaxEvidence {
    fn aggregate(&self, neighbors: &[(Neighbor, PointEvidence)], _radius: f64) -> f32 {
        neighbors
            .iter()
            .filter(|(_, e)| e.confidence > 0)
            .map(|(_, e)| e.quality)
            .fold(0.0, f32::max)
    }
}

/// Mean quality weighted by each neighbor's confidence.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountWeightedMean;

impl QualityAggregation for CountWeightedMean {
    fn aggregate(&self, neighbors: &[(Neighbor, PointEvidence)], _radius: f64) -> f32 {
        let (sum, weight) = neighbors
            .iter()
            .fold((0.0f64, 0.0f64), |(sum, weight), (_, e)| {
                let w = e.confidence as f64;
                (sum + w * e.quality as f64, weight + w)
            });
        if weight > 0.0 {
            (sum / weight) as f32
        } else {
            0.0
        }
    }
}

/// Mean quality weighted by `1 - distance / radius`.
///
/// Unobserved neighbors count with zero quality, so sparsely observed surfaces score lower.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceWeightedMean;

impl QualityAggregation for DistanceWeightedMean {
    fn aggregate(&self, neighbors: &[(Neighbor, PointEvidence)], radius: f64) -> f32 {
        if radius.is_nan() || radius <= 0.0 {
            return 0.0;
        }
        let (sum, weight) = neighbors
            .iter()
            .fold((0.0f64, 0.0f64), |(sum, weight), (n, e)| {
                // the nearest point always weighs something
                let w = (1.0 - n.distance / radius).max(f64::EPSILON);
                let q = if e.confidence > 0 { e.quality as f64 } else { 0.0 };
                (sum + w * q, weight + w)
            });
        if weight > 0.0 {
            (sum / weight) as f32
        } else {
            0.0
        }
    }
}

/// Selects a [`QualityAggregation`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AggregationPolicy {
    /// [`MaxEvidence`]
    Max,
    /// [`CountWeightedMean`]
    CountWeighted,
    /// [`DistanceWeightedMean`]
    #[default]
    DistanceWeighted,
}

impl AggregationPolicy {
    /// The aggregation this policy selects.
    pub fn aggregation(&self) -> &'static dyn QualityAggregation {
        match self {
            AggregationPolicy::Max => &MaxEvidence,
            AggregationPolicy::CountWeighted => &CountWeightedMean,
            AggregationPolicy::DistanceWeighted => &DistanceWeightedMean,
        }
    }
}

/// Projects per-point evidence onto a [`SphericalQualityGrid`] by sweeping a simulated camera
/// over every grid direction from a fixed viewpoint.
pub struct SphericalQualityProjector<'a> {
    rays: &'a RayIntersectionIndex,
    points: &'a NearestNeighborIndex,
    camera: PinholeCamera,
    target_gsd: f64,
    aggregation: &'a dyn QualityAggregation,
    strategy: ExecutionStrategy,
}

impl<'a> SphericalQualityProjector<'a> {
    /// Create a projector.
    ///
    /// # Arguments
    ///
    /// * `rays` - Ray index over the proxy surface.
    /// * `points` - Nearest-neighbor index over the accumulated points.
    /// * `camera` - The simulated camera.
    pub fn new(
        rays: &'a RayIntersectionIndex,
        points: &'a NearestNeighborIndex,
        camera: PinholeCamera,
    ) -> Self {
        Self {
            rays,
            points,
            camera,
            target_gsd: DEFAULT_TARGET_GSD,
            aggregation: AggregationPolicy::default().aggregation(),
            strategy: ExecutionStrategy::default(),
        }
    }

    /// Set the target ground sample distance.
    pub fn with_target_gsd(mut self, target_gsd: f64) -> Self {
        self.target_gsd = target_gsd;
        self
    }

    /// Set the aggregation.
    pub fn with_aggregation(mut self, aggregation: &'a dyn QualityAggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Set the execution strategy.
    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Radius on the surface covered by one cell at `depth`, never below one pixel.
    pub fn footprint_radius(&self, depth: f64) -> f64 {
        depth * CELL_ANGLE.tan().max(self.camera.pixel_angle().tan())
    }

    /// Down-weighting of views whose resolution is coarser than the target.
    pub fn resolution_weight(&self, depth: f64) -> f64 {
        let gsd = self.camera.ground_sample_distance(depth);
        if gsd > 0.0 && gsd.is_finite() {
            (self.target_gsd / gsd).min(1.0)
        } else {
            0.0
        }
    }

    /// Quality of cell `(row, col)` seen from `observer`.
    pub fn project_cell(
        &self,
        observer: DVec3,
        row: usize,
        col: usize,
        accumulator: &PerPointAccumulator,
    ) -> f32 {
        let forward = DVec3::from_array(cell_direction(row, col));
        let Some(frame) = CameraFrame::look_at(observer, forward) else {
            return 0.0;
        };
        let ray = frame.ray_through(&self.camera, self.camera.cx, self.camera.cy);
        let Some(hit) = self.rays.intersect(&ray, f64::INFINITY) else {
            return 0.0;
        };

        let radius = self.footprint_radius(hit.distance);
        let neighbors = self
            .points
            .within_radius(&hit.point, radius)
            .into_iter()
            .filter(|n| n.index < accumulator.len())
            .map(|n| (n, accumulator.evidence(n.index)))
            .collect::<Vec<_>>();

        let value = self.aggregation.aggregate(&neighbors, radius) as f64
            * self.resolution_weight(hit.distance);
        sanitize_quality(value as f32)
    }

    /// Build the quality grid seen from `observer`.
    ///
    /// Rows are processed in parallel; every cell is written exactly once.
    pub fn project(
        &self,
        observer: &[f64; 3],
        accumulator: &PerPointAccumulator,
    ) -> Result<SphericalQualityGrid, QualityError> {
        if accumulator.len() != self.points.points().len() {
            return Err(QualityError::SizeMismatch {
                expected: self.points.points().len(),
                actual: accumulator.len(),
            });
        }

        let observer = DVec3::from_array(*observer);
        let mut grid = SphericalQualityGrid::new();

        dispatch_rows(
            self.strategy,
            grid.as_slice_mut(),
            GRID_WIDTH,
            |row, cells| {
                for (col, cell) in cells.iter_mut().enumerate() {
                    *cell = self.project_cell(observer, row, col, accumulator);
                }
            },
        )?;

        log::debug!(
            "projected quality grid: {} covered cells, max {:.4}",
            grid.num_covered(),
            grid.max_value()
        );
        Ok(grid)
    }
}
