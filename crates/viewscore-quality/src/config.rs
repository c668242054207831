use serde::{Deserialize, Serialize};
use viewscore_3d::aabb::Aabb;

use crate::{
    camera::PinholeCamera,
    parallel::ExecutionStrategy,
    projector::{AggregationPolicy, DEFAULT_TARGET_GSD},
    scorer::GridLookup,
    visibility::DEFAULT_OCCLUSION_EPSILON,
};

/// Parameters of a scoring run.
///
/// Every field has a default, so a partial JSON document deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// The simulated camera used to project the quality grid.
    pub camera: PinholeCamera,
    /// Reference observer position. Derived from the proxy bounding box when unset.
    pub observer: Option<[f64; 3]>,
    /// Tolerance of the occlusion test, as a fraction of the proxy bounding-box diagonal.
    pub occlusion_epsilon: f64,
    /// Ground sample distance at which a view counts as full resolution.
    pub target_gsd: f64,
    /// How neighboring evidence is combined into a grid cell.
    pub aggregation: AggregationPolicy,
    /// How candidate vertices read the grid.
    pub lookup: GridLookup,
    /// Execution strategy of the parallel passes.
    pub strategy: ExecutionStrategy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            camera: PinholeCamera::default(),
            observer: None,
            occlusion_epsilon: DEFAULT_OCCLUSION_EPSILON,
            target_gsd: DEFAULT_TARGET_GSD,
            aggregation: AggregationPolicy::default(),
            lookup: GridLookup::default(),
            strategy: ExecutionStrategy::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the simulated camera.
    pub fn with_camera(mut self, camera: PinholeCamera) -> Self {
        self.camera = camera;
        self
    }

    /// Set an explicit observer position.
    pub fn with_observer(mut self, observer: [f64; 3]) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Set the relative occlusion tolerance.
    pub fn with_occlusion_epsilon(mut self, epsilon: f64) -> Self {
        self.occlusion_epsilon = epsilon;
        self
    }

    /// Set the target ground sample distance.
    pub fn with_target_gsd(mut self, target_gsd: f64) -> Self {
        self.target_gsd = target_gsd;
        self
    }

    /// Set the aggregation policy.
    pub fn with_aggregation(mut self, aggregation: AggregationPolicy) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Set the grid lookup.
    pub fn with_lookup(mut self, lookup: GridLookup) -> Self {
        self.lookup = lookup;
        self
    }

    /// Set the execution strategy.
    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// The observer position for a scene bounded by `bounds`.
    ///
    /// Without an explicit observer this is the centre of the top face of `bounds`, raised by
    /// half the box diagonal.
    pub fn resolve_observer(&self, bounds: &Aabb) -> [f64; 3] {
        if let Some(observer) = self.observer {
            return observer;
        }
        let [cx, cy, _] = bounds.center();
        [cx, cy, bounds.max[2] + 0.5 * bounds.diagonal()]
    }
}
