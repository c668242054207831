use glam::DVec3;

/// A ray with a unit direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// The origin of the ray.
    pub origin: [f64; 3],
    /// The unit direction of the ray.
    pub direction: [f64; 3],
}

impl Ray {
    /// Create a ray, normalizing its direction.
    ///
    /// A zero or non-finite direction yields a NaN direction that intersects nothing.
    pub fn new(origin: [f64; 3], direction: [f64; 3]) -> Self {
        let direction = DVec3::from_array(direction)
            .try_normalize()
            .unwrap_or(DVec3::NAN);
        Self {
            origin,
            direction: direction.to_array(),
        }
    }

    /// Create the ray from `from` towards `to` together with the distance between them.
    pub fn between(from: &[f64; 3], to: &[f64; 3]) -> (Self, f64) {
        let delta = DVec3::from_array(*to) - DVec3::from_array(*from);
        (Self::new(*from, delta.to_array()), delta.length())
    }

    /// The point at distance `t` along the ray.
    pub fn point_at(&self, t: f64) -> [f64; 3] {
        (DVec3::from_array(self.origin) + DVec3::from_array(self.direction) * t).to_array()
    }

    /// Check if both origin and direction are finite.
    pub fn is_finite(&self) -> bool {
        DVec3::from_array(self.origin).is_finite() && DVec3::from_array(self.direction).is_finite()
    }

    /// Component-wise inverse of the direction used by slab tests.
    pub(crate) fn inv_direction(&self) -> [f64; 3] {
        self.direction.map(|d| 1.0 / d)
    }
}
