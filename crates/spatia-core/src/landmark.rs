//! Landmarks and the validity predicate
//!
//! Validity is never stored. It is recomputed from the value every time it is
//! needed, and [`is_valid`] is the only rule anybody uses.

use serde::{Deserialize, Serialize};

use crate::Vec3;

/// A landmark as produced by the pose model: x/y normalized to the image
/// (top-left origin), z relative depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl NormalizedLandmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// A world-space landmark sample for one slot in one frame.
///
/// `None` means there is no value at all (slot not projected, or the raycast
/// missed). It is deliberately distinct from `Some(Vec3::ZERO)`, which is a
/// value that happens to be invalid.
pub type Sample = Option<Vec3>;

/// A point is invalid iff it is the exact zero vector or any coordinate is NaN.
#[inline]
pub fn is_valid(point: &Vec3) -> bool {
    !point.is_zero() && !point.has_nan()
}

/// Validity of a sample; a missing sample is never valid.
#[inline]
pub fn is_valid_sample(sample: &Sample) -> bool {
    sample.as_ref().map_or(false, is_valid)
}
