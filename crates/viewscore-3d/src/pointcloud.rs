use glam::DVec3;

use crate::aabb::Aabb;

/// Error types for the point cloud module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PointCloudError {
    /// The number of normals does not match the number of points.
    #[error("Number of normals ({0}) does not match the number of points ({1})")]
    NormalsLengthMismatch(usize, usize),
}

/// A point cloud with one unit normal per point.
#[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
    // The normals of the points.
    normals: Vec<[f64; 3]>,
}

impl PointCloud {
    /// Create a new point cloud from points and their normals.
    ///
    /// The normals are stored as given; use [`PointCloud::from_points_with_normals`]
    /// to normalize or synthesize them.
    pub fn new(points: Vec<[f64; 3]>, normals: Vec<[f64; 3]>) -> Result<Self, PointCloudError> {
        if points.len() != normals.len() {
            return Err(PointCloudError::NormalsLengthMismatch(
                normals.len(),
                points.len(),
            ));
        }
        Ok(Self { points, normals })
    }

    /// Create a point cloud guaranteeing one unit normal per point.
    ///
    /// Provided normals are normalized. Missing or zero-length normals are replaced by the
    /// outward direction from the center of the bounding box, or +Z for a point lying at
    /// the center. Non-finite normals are kept so that later visibility tests reject them.
    pub fn from_points_with_normals(
        points: Vec<[f64; 3]>,
        normals: Option<Vec<[f64; 3]>>,
    ) -> Result<Self, PointCloudError> {
        if let Some(normals) = &normals {
            if normals.len() != points.len() {
                return Err(PointCloudError::NormalsLengthMismatch(
                    normals.len(),
                    points.len(),
                ));
            }
        }

        let center = DVec3::from_array(Aabb::from_points(points.iter()).center());
        let mut synthesized = 0usize;

        let normals = points
            .iter()
            .enumerate()
            .map(|(i, point)| {
                let given = normals.as_ref().map(|n| DVec3::from_array(n[i]));
                match given {
                    Some(n) if !n.is_finite() => n.to_array(),
                    Some(n) if n.length_squared() > f64::EPSILON => n.normalize().to_array(),
                    _ => {
                        synthesized += 1;
                        let radial = DVec3::from_array(*point) - center;
                        radial.try_normalize().unwrap_or(DVec3::Z).to_array()
                    }
                }
            })
            .collect::<Vec<_>>();

        if synthesized > 0 {
            log::debug!("synthesized {synthesized} radial normals");
        }

        Ok(Self { points, normals })
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get as reference the normals of the points in the point cloud.
    pub fn normals(&self) -> &[[f64; 3]] {
        &self.normals
    }

    /// Get the minimum bound of the point cloud.
    pub fn get_min_bound(&self) -> DVec3 {
        if self.points.is_empty() {
            return DVec3::ZERO;
        }
        DVec3::from_array(Aabb::from_points(self.points.iter()).min)
    }

    /// Get the maximum bound of the point cloud.
    pub fn get_max_bound(&self) -> DVec3 {
        if self.points.is_empty() {
            return DVec3::ZERO;
        }
        DVec3::from_array(Aabb::from_points(self.points.iter()).max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pointcloud() -> Result<(), PointCloudError> {
        let pointcloud = PointCloud::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            vec![[0.0, 1.0, 0.0], [1.0, 0.0, 0.0]],
        )?;

        assert_eq!(pointcloud.len(), 2);
        assert_eq!(pointcloud.points().len(), 2);
        assert_eq!(pointcloud.normals().len(), 2);

        if let Some(p1) = pointcloud.points().last() {
            assert_eq!(p1[0], 1.0);
            assert_eq!(p1[1], 0.0);
            assert_eq!(p1[2], 0.0);
        }

        assert_eq!(pointcloud.get_min_bound(), DVec3::ZERO);
        assert_eq!(pointcloud.get_max_bound(), DVec3::X);
        Ok(())
    }

    #[test]
    fn test_pointcloud_length_mismatch() {
        let res = PointCloud::new(vec![[0.0; 3]; 2], vec![[0.0, 0.0, 1.0]]);
        assert_eq!(res, Err(PointCloudError::NormalsLengthMismatch(1, 2)));
    }

    #[test]
    fn test_normalize_given_normals() -> Result<(), PointCloudError> {
        let cloud = PointCloud::from_points_with_normals(
            vec![[0.0, 0.0, 0.0]],
            Some(vec![[0.0, 0.0, 3.0]]),
        )?;
        assert_eq!(cloud.normals()[0], [0.0, 0.0, 1.0]);
        Ok(())
    }

    #[test]
    fn test_synthesize_normals() -> Result<(), PointCloudError> {
        let cloud = PointCloud::from_points_with_normals(
            vec![[2.0, 0.0, 0.0], [-2.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
            None,
        )?;
        assert_relative_eq!(cloud.normals()[0][0], 1.0);
        assert_relative_eq!(cloud.normals()[1][0], -1.0);
        // the point at the center gets the fallback direction
        assert_eq!(cloud.normals()[2], [0.0, 0.0, 1.0]);
        Ok(())
    }

    #[test]
    fn test_keep_non_finite_normals() -> Result<(), PointCloudError> {
        let cloud = PointCloud::from_points_with_normals(
            vec![[0.0, 0.0, 0.0]],
            Some(vec![[f64::NAN, 0.0, 1.0]]),
        )?;
        assert!(cloud.normals()[0][0].is_nan());
        Ok(())
    }
}
