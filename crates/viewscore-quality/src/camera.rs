use glam::DVec3;
use serde::{Deserialize, Serialize};
use viewscore_3d::spatial::Ray;

/// Default focal length of the simulated camera, in pixels.
pub const DEFAULT_FOCAL_LENGTH: f64 = 1000.0;

/// Default image size of the simulated camera.
pub const DEFAULT_IMAGE_SIZE: ImageSize = ImageSize {
    width: 1280,
    height: 960,
};

/// Image size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    /// Width of the image in pixels.
    pub width: usize,
    /// Height of the image in pixels.
    pub height: usize,
}

/// Intrinsic parameters and image size of a pinhole camera.
///
/// # Fields
///
/// * `fx` - The focal length in the x direction
/// * `fy` - The focal length in the y direction
/// * `cx` - The x coordinate of the principal point
/// * `cy` - The y coordinate of the principal point
/// * `width` - The image width
/// * `height` - The image height
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeCamera {
    /// The focal length in the x direction
    pub fx: f64,
    /// The focal length in the y direction
    pub fy: f64,
    /// The x coordinate of the principal point
    pub cx: f64,
    /// The y coordinate of the principal point
    pub cy: f64,
    /// The image width
    pub width: usize,
    /// The image height
    pub height: usize,
}

impl Default for PinholeCamera {
    fn default() -> Self {
        Self::new(DEFAULT_FOCAL_LENGTH, DEFAULT_FOCAL_LENGTH, DEFAULT_IMAGE_SIZE)
    }
}

impl PinholeCamera {
    /// Create a camera with the principal point at the image centre.
    pub fn new(fx: f64, fy: f64, size: ImageSize) -> Self {
        Self {
            fx,
            fy,
            cx: size.width as f64 / 2.0,
            cy: size.height as f64 / 2.0,
            width: size.width,
            height: size.height,
        }
    }

    /// The image size.
    pub fn size(&self) -> ImageSize {
        ImageSize {
            width: self.width,
            height: self.height,
        }
    }

    /// Unit ray through pixel `(u, v)` in the camera frame (x right, y down, z forward).
    pub fn unproject(&self, u: f64, v: f64) -> [f64; 3] {
        DVec3::new((u - self.cx) / self.fx, (v - self.cy) / self.fy, 1.0)
            .normalize()
            .to_array()
    }

    /// Project a camera-frame point to pixel coordinates.
    ///
    /// Returns `None` for points at or behind the image plane.
    pub fn project(&self, point: &[f64; 3]) -> Option<[f64; 2]> {
        let [x, y, z] = *point;
        if z.is_nan() || z <= 0.0 {
            return None;
        }
        Some([self.fx * x / z + self.cx, self.fy * y / z + self.cy])
    }

    /// Size of one pixel on a fronto-parallel surface at `depth`.
    pub fn ground_sample_distance(&self, depth: f64) -> f64 {
        depth / self.fx.min(self.fy)
    }

    /// Angle subtended by one pixel at the principal point, in radians.
    pub fn pixel_angle(&self) -> f64 {
        (1.0 / self.fx.min(self.fy)).atan()
    }
}

/// Pose of a camera in the world frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFrame {
    /// The camera centre.
    pub origin: DVec3,
    /// The image x axis.
    pub right: DVec3,
    /// The image y axis.
    pub down: DVec3,
    /// The optical axis.
    pub forward: DVec3,
}

impl CameraFrame {
    /// Place a camera at `origin` looking along `forward`, with +Z as the up hint.
    ///
    /// Returns `None` for a zero or non-finite direction.
    pub fn look_at(origin: DVec3, forward: DVec3) -> Option<Self> {
        let forward = forward.try_normalize()?;
        let up = if forward.cross(DVec3::Z).length_squared() < 1e-12 {
            DVec3::X
        } else {
            DVec3::Z
        };
        let right = forward.cross(up).try_normalize()?;
        let down = forward.cross(right);
        Some(Self {
            origin,
            right,
            down,
            forward,
        })
    }

    /// Rotate a camera-frame direction into the world frame.
    pub fn to_world(&self, direction: &[f64; 3]) -> DVec3 {
        self.right * direction[0] + self.down * direction[1] + self.forward * direction[2]
    }

    /// World ray through pixel `(u, v)` of `camera`.
    pub fn ray_through(&self, camera: &PinholeCamera, u: f64, v: f64) -> Ray {
        let direction = self.to_world(&camera.unproject(u, v));
        Ray::new(self.origin.to_array(), direction.to_array())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_camera() {
        let camera = PinholeCamera::default();
        assert_eq!(camera.fx, 1000.0);
        assert_eq!(camera.size(), ImageSize { width: 1280, height: 960 });
        assert_eq!((camera.cx, camera.cy), (640.0, 480.0));
        assert_eq!(camera.unproject(640.0, 480.0), [0.0, 0.0, 1.0]);
        assert_relative_eq!(camera.ground_sample_distance(10.0), 0.01);
    }

    #[test]
    fn test_project_unproject() {
        let camera = PinholeCamera::default();
        let ray = camera.unproject(100.0, 700.0);
        let pixel = camera.project(&[ray[0] * 4.0, ray[1] * 4.0, ray[2] * 4.0]);
        let [u, v] = pixel.unwrap_or([f64::NAN; 2]);
        assert_relative_eq!(u, 100.0, epsilon = 1e-9);
        assert_relative_eq!(v, 700.0, epsilon = 1e-9);
        assert!(camera.project(&[0.0, 0.0, -1.0]).is_none());
    }

    #[test]
    fn test_look_at_is_orthonormal() {
        for forward in [DVec3::X, -DVec3::Z, DVec3::Z, DVec3::new(1.0, 2.0, -0.5)] {
            let frame = CameraFrame::look_at(DVec3::ZERO, forward);
            let Some(frame) = frame else {
                panic!("look_at failed for {forward}");
            };
            assert_relative_eq!(frame.right.dot(frame.down), 0.0, epsilon = 1e-12);
            assert_relative_eq!(frame.right.dot(frame.forward), 0.0, epsilon = 1e-12);
            assert_relative_eq!(
                frame.right.cross(frame.down).dot(frame.forward),
                1.0,
                epsilon = 1e-12
            );
            assert_relative_eq!(frame.forward.dot(forward.normalize()), 1.0, epsilon = 1e-12);
        }
        assert!(CameraFrame::look_at(DVec3::ZERO, DVec3::ZERO).is_none());
    }

    #[test]
    fn test_principal_ray() {
        let camera = PinholeCamera::default();
        let frame = CameraFrame::look_at(DVec3::new(0.0, 0.0, 2.0), -DVec3::Z);
        let ray = frame.map(|f| f.ray_through(&camera, camera.cx, camera.cy));
        assert_eq!(ray.map(|r| r.direction), Some([0.0, 0.0, -1.0]));
    }
}
