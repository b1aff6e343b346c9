//! Spatial projector

use std::sync::Arc;

use spatia_core::{NormalizedLandmark, Sample, Vec3};

use crate::{EnvironmentRaycast, ReferenceCamera, ScreenPoint};

/// Outcome of projecting one landmark
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectionResult {
    /// The ray hit the environment at this point
    Hit(Vec3),
    /// No surface along the ray
    Miss,
}

impl ProjectionResult {
    /// Collapse into a stabilizer sample; a miss carries no value
    pub fn into_sample(self) -> Sample {
        match self {
            ProjectionResult::Hit(point) => Some(point),
            ProjectionResult::Miss => None,
        }
    }
}

/// Maps normalized landmark coordinates onto world-space points.
///
/// The reference camera and the environment query are injected at
/// construction; nothing is looked up from global state.
pub struct SpatialProjector {
    camera: ReferenceCamera,
    width: u32,
    height: u32,
    environment: Arc<dyn EnvironmentRaycast>,
}

impl SpatialProjector {
    pub fn new(
        camera: ReferenceCamera,
        width: u32,
        height: u32,
        environment: Arc<dyn EnvironmentRaycast>,
    ) -> Self {
        Self {
            camera,
            width,
            height,
            environment,
        }
    }

    pub fn camera(&self) -> &ReferenceCamera {
        &self.camera
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Normalized (top-left origin) to integer screen pixel (bottom-left origin).
    ///
    /// x is clamped to [0, 1]; y is clamped then flipped. Scaling truncates
    /// towards zero.
    pub fn to_screen(&self, x: f32, y: f32) -> ScreenPoint {
        let u = clamp01(x);
        let v = 1.0 - clamp01(y);
        ScreenPoint::new(
            (u * self.width as f32) as i32,
            (v * self.height as f32) as i32,
        )
    }

    /// Project a single normalized coordinate
    pub fn project(&self, x: f32, y: f32) -> ProjectionResult {
        let screen = self.to_screen(x, y);
        let ray = self.camera.screen_point_to_ray(screen);

        match self.environment.raycast(&ray) {
            Some(hit) => ProjectionResult::Hit(hit.point),
            None => {
                tracing::trace!(x, y, ?screen, "projection miss");
                ProjectionResult::Miss
            }
        }
    }

    /// Project a landmark list into one sample per slot.
    ///
    /// With a `subset`, only those indices are projected and every other slot
    /// stays empty. Subset indices past the end of the list are skipped.
    pub fn project_landmarks(
        &self,
        landmarks: &[NormalizedLandmark],
        subset: Option<&[usize]>,
    ) -> Vec<Sample> {
        match subset {
            None => landmarks
                .iter()
                .map(|lm| self.project(lm.x, lm.y).into_sample())
                .collect(),
            Some(indices) => {
                let mut samples = vec![None; landmarks.len()];
                for &index in indices {
                    if let Some(lm) = landmarks.get(index) {
                        samples[index] = self.project(lm.x, lm.y).into_sample();
                    }
                }
                samples
            }
        }
    }
}

/// Clamp to [0, 1]; NaN maps to 0
#[inline]
fn clamp01(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
