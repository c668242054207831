use std::sync::atomic::{AtomicU32, Ordering};

use glam::DVec3;

use crate::encoding::PackedQualityBuffer;

/// Maximum number of observation directions recorded per point.
pub const MAX_VIEWS: usize = 16;

/// Cosine of the angle (0.5°) under which two observation directions are the same view.
pub const DUPLICATE_VIEW_COS: f64 = 0.999_961_923_064_171_3;

// direction xyz + weight
const SLOT_STRIDE: usize = 4;

// one ready bit per slot
const _: () = assert!(MAX_VIEWS <= u32::BITS as usize);

/// A recorded observation direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservedView {
    /// Unit direction from the point towards the observer.
    pub direction: [f32; 3],
    /// Weight of the observation.
    pub weight: f32,
}

impl ObservedView {
    /// The direction as a double precision vector.
    pub fn direction(&self) -> DVec3 {
        DVec3::new(
            self.direction[0] as f64,
            self.direction[1] as f64,
            self.direction[2] as f64,
        )
    }
}

/// Snapshot of the scalar evidence of one point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointEvidence {
    /// Number of consistent observations.
    pub confidence: u32,
    /// Best observation quality.
    pub quality: f32,
}

/// Outcome of [`PerPointAccumulator::record_view`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewRecord {
    /// The direction was stored.
    Recorded,
    /// The list already holds `MAX_VIEWS` directions and the new one was dropped.
    Full,
}

/// Per-point observation evidence in struct-of-arrays layout.
///
/// Each point owns a fixed arena of [`MAX_VIEWS`] direction slots plus a confidence counter
/// and an encoded quality value. Nothing is reallocated after construction and all updates
/// are atomic, so one instance is shared by reference across a parallel pass.
///
/// A slot is claimed through `view_counts` and becomes readable once its bit in `view_ready`
/// is set, after its values are stored. Readers never see a claimed slot that is still being
/// written.
pub struct PerPointAccumulator {
    view_counts: Vec<AtomicU32>,
    view_ready: Vec<AtomicU32>,
    view_slots: Vec<AtomicU32>,
    confidence: Vec<AtomicU32>,
    quality: PackedQualityBuffer,
}

impl PerPointAccumulator {
    /// Create an empty accumulator for `len` points.
    pub fn new(len: usize) -> Self {
        Self {
            view_counts: (0..len).map(|_| AtomicU32::new(0)).collect(),
            view_ready: (0..len).map(|_| AtomicU32::new(0)).collect(),
            view_slots: (0..len * MAX_VIEWS * SLOT_STRIDE)
                .map(|_| AtomicU32::new(0))
                .collect(),
            confidence: (0..len).map(|_| AtomicU32::new(0)).collect(),
            quality: PackedQualityBuffer::new(len),
        }
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.confidence.len()
    }

    /// Check if the accumulator tracks no point.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.confidence.is_empty()
    }

    /// Confidence counter of point `index`.
    pub fn confidence(&self, index: usize) -> u32 {
        self.confidence[index].load(Ordering::Acquire)
    }

    /// Decoded quality of point `index`.
    pub fn quality(&self, index: usize) -> f32 {
        self.quality.load(index)
    }

    /// The encoded quality values.
    pub fn quality_buffer(&self) -> &PackedQualityBuffer {
        &self.quality
    }

    /// Confidence and quality of point `index`.
    pub fn evidence(&self, index: usize) -> PointEvidence {
        PointEvidence {
            confidence: self.confidence(index),
            quality: self.quality(index),
        }
    }

    /// Number of recorded directions of point `index`.
    pub fn view_count(&self, index: usize) -> usize {
        self.view_ready[index].load(Ordering::Acquire).count_ones() as usize
    }

    /// The recorded directions of point `index`, in recording order.
    pub fn views(&self, index: usize) -> Vec<ObservedView> {
        let ready = self.view_ready[index].load(Ordering::Acquire);
        (0..MAX_VIEWS)
            .filter(|&slot| ready & (1 << slot) != 0)
            .map(|slot| {
                let base = (index * MAX_VIEWS + slot) * SLOT_STRIDE;
                let read = |k: usize| f32::from_bits(self.view_slots[base + k].load(Ordering::Relaxed));
                ObservedView {
                    direction: [read(0), read(1), read(2)],
                    weight: read(3),
                }
            })
            .collect()
    }

    /// Check if `direction` matches a recorded direction of point `index`.
    pub fn has_view(&self, index: usize, direction: DVec3) -> bool {
        self.views(index)
            .iter()
            .any(|view| view.direction().dot(direction) >= DUPLICATE_VIEW_COS)
    }

    /// Append an observation direction to point `index`.
    ///
    /// The write index is claimed with a saturating atomic increment; once the list is full
    /// further directions are dropped. The slot is published after its values are stored.
    pub fn record_view(&self, index: usize, direction: DVec3, weight: f32) -> ViewRecord {
        let claimed = self.view_counts[index].fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |n| ((n as usize) < MAX_VIEWS).then_some(n + 1),
        );
        let Ok(slot) = claimed else {
            return ViewRecord::Full;
        };

        let base = (index * MAX_VIEWS + slot as usize) * SLOT_STRIDE;
        let values = [
            direction.x as f32,
            direction.y as f32,
            direction.z as f32,
            weight,
        ];
        for (k, value) in values.iter().enumerate() {
            self.view_slots[base + k].store(value.to_bits(), Ordering::Relaxed);
        }
        self.view_ready[index].fetch_or(1 << slot, Ordering::Release);
        ViewRecord::Recorded
    }

    /// Increment the confidence counter of point `index`.
    pub fn add_confidence(&self, index: usize) {
        // saturating
        let _ = self.confidence[index].fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
            c.checked_add(1)
        });
    }

    /// Raise the quality of point `index` to `quality` if larger.
    pub fn merge_quality(&self, index: usize, quality: f32) -> f32 {
        self.quality.fetch_max(index, quality)
    }

    /// Decode the confidence counters of every point.
    pub fn confidences(&self) -> Vec<u32> {
        (0..self.len()).map(|i| self.confidence(i)).collect()
    }
}

impl std::fmt::Debug for PerPointAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerPointAccumulator")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_new_is_zeroed() {
        let acc = PerPointAccumulator::new(3);
        assert_eq!(acc.len(), 3);
        for i in 0..3 {
            assert_eq!(acc.evidence(i), PointEvidence::default());
            assert!(acc.views(i).is_empty());
        }
    }

    #[test]
    fn test_record_view_saturates() {
        let acc = PerPointAccumulator::new(2);
        for k in 0..MAX_VIEWS {
            let angle = k as f64 * 0.1;
            let dir = DVec3::new(angle.cos(), angle.sin(), 0.0);
            assert_eq!(acc.record_view(1, dir, 1.0), ViewRecord::Recorded);
        }
        assert_eq!(acc.record_view(1, DVec3::Z, 1.0), ViewRecord::Full);
        assert_eq!(acc.view_count(1), MAX_VIEWS);
        assert_eq!(acc.view_count(0), 0);

        let views = acc.views(1);
        assert_eq!(views.len(), MAX_VIEWS);
        assert_eq!(views[0].direction, [1.0, 0.0, 0.0]);
        assert_relative_eq!(views[3].direction()[1], 0.3f64.sin(), epsilon = 1e-6);
        assert_eq!(views[15].weight, 1.0);
    }

    #[test]
    fn test_claimed_slot_is_hidden_until_written() {
        let acc = PerPointAccumulator::new(1);
        // a writer that has claimed slot 0 but not stored it yet
        acc.view_counts[0].fetch_add(1, Ordering::AcqRel);
        assert_eq!(acc.view_count(0), 0);
        assert!(acc.views(0).is_empty());
        assert!(!acc.has_view(0, DVec3::ZERO));

        assert_eq!(acc.record_view(0, DVec3::Z, 0.5), ViewRecord::Recorded);
        assert_eq!(acc.view_count(0), 1);
        assert_eq!(
            acc.views(0),
            vec![ObservedView {
                direction: [0.0, 0.0, 1.0],
                weight: 0.5
            }]
        );
        assert!(acc.has_view(0, DVec3::Z));
    }

    #[test]
    fn test_has_view() {
        let acc = PerPointAccumulator::new(1);
        acc.record_view(0, DVec3::Z, 1.0);
        assert!(acc.has_view(0, DVec3::Z));
        let tilt = 0.2f64.to_radians();
        assert!(acc.has_view(0, DVec3::new(tilt.sin(), 0.0, tilt.cos())));
        let tilt = 1.0f64.to_radians();
        assert!(!acc.has_view(0, DVec3::new(tilt.sin(), 0.0, tilt.cos())));
    }

    #[test]
    fn test_counters() {
        let acc = PerPointAccumulator::new(1);
        acc.add_confidence(0);
        acc.add_confidence(0);
        assert_eq!(acc.merge_quality(0, 0.3), 0.0);
        assert_eq!(acc.merge_quality(0, 0.1), 0.3);
        assert_eq!(
            acc.evidence(0),
            PointEvidence {
                confidence: 2,
                quality: 0.3
            }
        );
        assert_eq!(acc.confidences(), vec![2]);
    }
}
