use glam::DVec3;

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, bincode::Encode, bincode::Decode)]
pub struct Aabb {
    /// The minimum corner.
    pub min: [f64; 3],
    /// The maximum corner.
    pub max: [f64; 3],
}

impl Aabb {
    /// An empty box that absorbs any point it is grown by.
    pub const EMPTY: Aabb = Aabb {
        min: [f64::INFINITY; 3],
        max: [f64::NEG_INFINITY; 3],
    };

    /// Create a bounding box from two corners.
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// Compute the bounding box of a set of points.
    ///
    /// Non-finite points are ignored. Returns [`Aabb::EMPTY`] when no finite point exists.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a [f64; 3]>) -> Self {
        points
            .into_iter()
            .filter(|p| p.iter().all(|c| c.is_finite()))
            .fold(Self::EMPTY, |aabb, p| aabb.grow(p))
    }

    /// Check if the box contains no point.
    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| self.min[i] > self.max[i])
    }

    /// Return the box extended to contain `point`.
    pub fn grow(&self, point: &[f64; 3]) -> Self {
        let min = DVec3::from_array(self.min).min(DVec3::from_array(*point));
        let max = DVec3::from_array(self.max).max(DVec3::from_array(*point));
        Self::new(min.to_array(), max.to_array())
    }

    /// Return the smallest box containing both boxes.
    pub fn union(&self, other: &Aabb) -> Self {
        let min = DVec3::from_array(self.min).min(DVec3::from_array(other.min));
        let max = DVec3::from_array(self.max).max(DVec3::from_array(other.max));
        Self::new(min.to_array(), max.to_array())
    }

    /// The center of the box.
    pub fn center(&self) -> [f64; 3] {
        ((DVec3::from_array(self.min) + DVec3::from_array(self.max)) * 0.5).to_array()
    }

    /// The size of the box along each axis.
    pub fn extent(&self) -> [f64; 3] {
        (DVec3::from_array(self.max) - DVec3::from_array(self.min)).to_array()
    }

    /// The length of the box diagonal.
    pub fn diagonal(&self) -> f64 {
        DVec3::from_array(self.extent()).length()
    }

    /// Index of the longest axis.
    pub fn longest_axis(&self) -> usize {
        let e = self.extent();
        if e[0] >= e[1] && e[0] >= e[2] {
            0
        } else if e[1] >= e[2] {
            1
        } else {
            2
        }
    }

    /// Slab test against a ray given by its origin and the inverse of its direction.
    ///
    /// Returns the entry distance when the ray overlaps the box within `[0, t_max]`.
    pub fn intersect_ray(&self, origin: &[f64; 3], inv_dir: &[f64; 3], t_max: f64) -> Option<f64> {
        let mut t_near = 0.0f64;
        let mut t_far = t_max;
        for axis in 0..3 {
            let t1 = (self.min[axis] - origin[axis]) * inv_dir[axis];
            let t2 = (self.max[axis] - origin[axis]) * inv_dir[axis];
            // NaN (origin on a slab plane with a zero direction component) leaves the bounds as is
            t_near = t_near.max(t1.min(t2));
            t_far = t_far.min(t1.max(t2));
        }
        (t_near <= t_far).then_some(t_near)
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_points() {
        let points = [[0.0, 1.0, 2.0], [-1.0, 3.0, 0.5], [f64::NAN, 100.0, 0.0]];
        let aabb = Aabb::from_points(points.iter());
        assert_eq!(aabb.min, [-1.0, 1.0, 0.5]);
        assert_eq!(aabb.max, [0.0, 3.0, 2.0]);
        assert_eq!(aabb.center(), [-0.5, 2.0, 1.25]);
        assert_eq!(aabb.longest_axis(), 1);
    }

    #[test]
    fn test_empty() {
        let aabb = Aabb::from_points(std::iter::empty());
        assert!(aabb.is_empty());
        assert!(!aabb.grow(&[0.0, 0.0, 0.0]).is_empty());
    }

    #[test]
    fn test_intersect_ray() {
        let aabb = Aabb::new([-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]);
        let origin = [0.0, 0.0, 5.0];
        let inv_dir = [f64::INFINITY, f64::INFINITY, -1.0];
        let t = aabb.intersect_ray(&origin, &inv_dir, 100.0);
        assert_relative_eq!(t.unwrap_or(f64::NAN), 4.0);

        // too short
        assert!(aabb.intersect_ray(&origin, &inv_dir, 3.0).is_none());

        // pointing away
        let inv_dir = [f64::INFINITY, f64::INFINITY, 1.0];
        assert!(aabb.intersect_ray(&origin, &inv_dir, 100.0).is_none());
    }
}
