//! Environment raycast seam

use spatia_core::Vec3;

use crate::Ray;

/// A ray hit on the environment depth surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    pub point: Vec3,
    pub distance: f32,
}

/// Environment query service (depth reconstruction lives behind this)
pub trait EnvironmentRaycast: Send + Sync {
    /// Cast `ray`; `None` when no surface is hit
    fn raycast(&self, ray: &Ray) -> Option<RaycastHit>;
}
