//! Reference camera model

use serde::{Deserialize, Serialize};
use spatia_core::{Quat, Vec3};

/// Integer pixel coordinate, bottom-left origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScreenPoint {
    pub x: i32,
    pub y: i32,
}

impl ScreenPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// World-space ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit direction
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Point at distance `t` along the ray
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Pinhole intrinsics in pixels of the reference resolution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

impl CameraIntrinsics {
    /// Principal point at the centre of a `width` x `height` image
    pub fn centered(width: u32, height: u32, focal_length: f32) -> Self {
        Self {
            fx: focal_length,
            fy: focal_length,
            cx: width as f32 * 0.5,
            cy: height as f32 * 0.5,
        }
    }
}

/// World pose of the eye the landmarks were captured from
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EyePose {
    pub position: Vec3,
    pub rotation: Quat,
}

/// Camera used to turn screen points into world rays
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCamera {
    pub pose: EyePose,
    pub intrinsics: CameraIntrinsics,
}

impl ReferenceCamera {
    pub fn new(pose: EyePose, intrinsics: CameraIntrinsics) -> Self {
        Self { pose, intrinsics }
    }

    /// Ray from the eye through a screen pixel.
    ///
    /// Camera space is +X right, +Y up, +Z forward; screen y grows upwards.
    pub fn screen_point_to_ray(&self, point: ScreenPoint) -> Ray {
        let k = &self.intrinsics;
        let local = Vec3::new(
            (point.x as f32 - k.cx) / k.fx,
            (point.y as f32 - k.cy) / k.fy,
            1.0,
        );
        Ray::new(self.pose.position, self.pose.rotation.rotate(local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_point_looks_forward() {
        let camera = ReferenceCamera::new(
            EyePose::default(),
            CameraIntrinsics::centered(1280, 960, 1000.0),
        );
        let ray = camera.screen_point_to_ray(ScreenPoint::new(640, 480));
        assert!(ray.direction.distance(&Vec3::FORWARD) < 1e-6);
    }

    #[test]
    fn test_ray_starts_at_eye() {
        let pose = EyePose {
            position: Vec3::new(0.0, 1.6, 0.0),
            rotation: Quat::IDENTITY,
        };
        let camera = ReferenceCamera::new(pose, CameraIntrinsics::centered(1280, 960, 1000.0));
        let ray = camera.screen_point_to_ray(ScreenPoint::new(0, 0));
        assert_eq!(ray.origin, pose.position);
        // bottom-left pixel points left and down
        assert!(ray.direction.x < 0.0 && ray.direction.y < 0.0);
    }

    #[test]
    fn test_rotated_eye() {
        let pose = EyePose {
            position: Vec3::ZERO,
            rotation: Quat::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), std::f32::consts::PI),
        };
        let camera = ReferenceCamera::new(pose, CameraIntrinsics::centered(100, 100, 50.0));
        let ray = camera.screen_point_to_ray(ScreenPoint::new(50, 50));
        assert!(ray.direction.distance(&Vec3::new(0.0, 0.0, -1.0)) < 1e-5);
    }
}
