use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::DVec3;
use viewscore_3d::{
    pointcloud::PointCloud,
    spatial::{Ray, RayIntersectionIndex},
};

use crate::{
    accumulator::{ObservedView, PerPointAccumulator, ViewRecord},
    parallel::{dispatch_for_each, ExecutionStrategy},
    QualityError,
};

/// Default tolerance between a point and the first surface hit on the way to it, as a
/// fraction of the occluder's bounding-box diagonal.
pub const DEFAULT_OCCLUSION_EPSILON: f64 = 1e-4;

const PARALLAX_STEEPNESS: f64 = 32.0;
const PARALLAX_MIDPOINT: f64 = PI / 16.0;
const PARALLAX_MAX: f64 = PI / 4.0;

/// Result of testing one point against one observer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Visibility {
    /// The point is seen. `direction` points from the point to the observer.
    Visible {
        /// Unit direction towards the observer.
        direction: DVec3,
        /// Cosine between the normal and `direction`.
        incidence: f64,
    },
    /// The normal faces away from the observer.
    BackFacing,
    /// Some geometry lies between the observer and the point.
    Occluded,
    /// Non-finite input, or the observer sits on the point.
    Degenerate,
}

/// Counters of one or more accumulation passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccumulationStats {
    /// Points accepted and folded into the accumulator.
    pub accepted: usize,
    /// Points facing away from the observer.
    pub back_facing: usize,
    /// Points hidden behind other geometry.
    pub occluded: usize,
    /// Points with non-finite data.
    pub degenerate: usize,
    /// Points already observed from the same direction.
    pub duplicate: usize,
    /// Accepted points whose direction list was full.
    pub dropped_views: usize,
}

impl AccumulationStats {
    /// Add the counters of `other`.
    pub fn merge(&mut self, other: &AccumulationStats) {
        self.accepted += other.accepted;
        self.back_facing += other.back_facing;
        self.occluded += other.occluded;
        self.degenerate += other.degenerate;
        self.duplicate += other.duplicate;
        self.dropped_views += other.dropped_views;
    }

    /// Total number of visited points.
    pub fn total(&self) -> usize {
        self.accepted + self.back_facing + self.occluded + self.degenerate + self.duplicate
    }
}

#[derive(Default)]
struct AtomicStats {
    accepted: AtomicUsize,
    back_facing: AtomicUsize,
    occluded: AtomicUsize,
    degenerate: AtomicUsize,
    duplicate: AtomicUsize,
    dropped_views: AtomicUsize,
}

impl AtomicStats {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> AccumulationStats {
        AccumulationStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            back_facing: self.back_facing.load(Ordering::Relaxed),
            occluded: self.occluded.load(Ordering::Relaxed),
            degenerate: self.degenerate.load(Ordering::Relaxed),
            duplicate: self.duplicate.load(Ordering::Relaxed),
            dropped_views: self.dropped_views.load(Ordering::Relaxed),
        }
    }
}

/// Parallax term of the reconstructability heuristic for a triangulation angle in radians.
///
/// Rises sharply around `π/16` and falls back to zero at `π/4`.
pub fn parallax_weight(angle: f64) -> f64 {
    let sigmoid = 1.0 / (1.0 + (-PARALLAX_STEEPNESS * (angle - PARALLAX_MIDPOINT)).exp());
    sigmoid * (1.0 - (angle / PARALLAX_MAX).min(1.0))
}

/// Quality of a new observation with the given incidence cosine and direction, given the
/// directions already recorded for the point.
///
/// The result lies in `(0, 1]` for a positive incidence.
pub fn observation_quality(incidence: f64, direction: DVec3, views: &[ObservedView]) -> f32 {
    let parallax = views
        .iter()
        .map(|view| {
            let cos = view.direction().normalize_or_zero().dot(direction);
            parallax_weight(cos.clamp(-1.0, 1.0).acos())
        })
        .fold(0.0f64, f64::max);
    (incidence * (0.5 + 0.5 * parallax)) as f32
}

/// Tests point-cloud samples against an observer and folds accepted observations into a
/// [`PerPointAccumulator`].
pub struct VisibilityAccumulator<'a> {
    cloud: &'a PointCloud,
    rays: &'a RayIntersectionIndex,
    epsilon: f64,
    scale: f64,
    strategy: ExecutionStrategy,
}

impl<'a> VisibilityAccumulator<'a> {
    /// Create an accumulator pass over `cloud`, occluded by the triangles of `rays`.
    pub fn new(cloud: &'a PointCloud, rays: &'a RayIntersectionIndex) -> Self {
        let diagonal = rays.bounds().diagonal();
        let scale = if diagonal.is_finite() && diagonal > 0.0 {
            diagonal
        } else {
            1.0
        };
        Self {
            cloud,
            rays,
            epsilon: DEFAULT_OCCLUSION_EPSILON,
            scale,
            strategy: ExecutionStrategy::default(),
        }
    }

    /// Set the occlusion tolerance, relative to the diagonal of the occluder bounds.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Set the execution strategy.
    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// The occlusion tolerance in scene units.
    pub fn tolerance(&self) -> f64 {
        self.epsilon * self.scale
    }

    /// Test point `index` against `observer`.
    ///
    /// PRECONDITION: `index < cloud.len()`.
    pub fn classify(&self, index: usize, observer: DVec3) -> Visibility {
        let point = DVec3::from_array(self.cloud.points()[index]);
        let normal = DVec3::from_array(self.cloud.normals()[index]);

        if !(point.is_finite() && normal.is_finite() && observer.is_finite()) {
            return Visibility::Degenerate;
        }
        let (Some(normal), Some(direction)) =
            (normal.try_normalize(), (observer - point).try_normalize())
        else {
            return Visibility::Degenerate;
        };

        let incidence = normal.dot(direction);
        if incidence <= 0.0 {
            return Visibility::BackFacing;
        }

        let tolerance = self.tolerance();
        let distance = observer.distance(point);
        if distance <= tolerance {
            return Visibility::Degenerate;
        }

        // cast from the observer, anything hit before the point itself blocks it
        let ray = Ray::new(observer.to_array(), (-direction).to_array());
        if self.rays.occluded(&ray, distance - tolerance) {
            return Visibility::Occluded;
        }

        Visibility::Visible {
            direction,
            incidence,
        }
    }

    /// Run one pass for `observer` over every point.
    ///
    /// # Errors
    ///
    /// Fails if `accumulator` does not have one slot per point, or if the thread pool
    /// cannot be created.
    pub fn accumulate(
        &self,
        observer: &[f64; 3],
        accumulator: &PerPointAccumulator,
    ) -> Result<AccumulationStats, QualityError> {
        if accumulator.len() != self.cloud.len() {
            return Err(QualityError::SizeMismatch {
                expected: self.cloud.len(),
                actual: accumulator.len(),
            });
        }

        let observer = DVec3::from_array(*observer);
        let stats = AtomicStats::default();

        dispatch_for_each(self.strategy, self.cloud.len(), |i| {
            match self.classify(i, observer) {
                Visibility::Visible {
                    direction,
                    incidence,
                } => {
                    if accumulator.has_view(i, direction) {
                        AtomicStats::bump(&stats.duplicate);
                        return;
                    }
                    let quality = observation_quality(incidence, direction, &accumulator.views(i));
                    if accumulator.record_view(i, direction, 1.0) == ViewRecord::Full {
                        AtomicStats::bump(&stats.dropped_views);
                    }
                    accumulator.add_confidence(i);
                    accumulator.merge_quality(i, quality);
                    AtomicStats::bump(&stats.accepted);
                }
                Visibility::BackFacing => AtomicStats::bump(&stats.back_facing),
                Visibility::Occluded => AtomicStats::bump(&stats.occluded),
                Visibility::Degenerate => AtomicStats::bump(&stats.degenerate),
            }
        })?;

        let stats = stats.snapshot();
        log::debug!("accumulation pass from {observer}: {stats:?}");
        Ok(stats)
    }

    /// Run one pass per observer, in order.
    pub fn accumulate_all(
        &self,
        observers: &[[f64; 3]],
        accumulator: &PerPointAccumulator,
    ) -> Result<AccumulationStats, QualityError> {
        let mut total = AccumulationStats::default();
        for observer in observers {
            total.merge(&self.accumulate(observer, accumulator)?);
        }
        Ok(total)
    }
}
