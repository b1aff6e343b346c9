//! Landmark sources and render streams
//!
//! The inference graph emits four landmark lists per frame ([`LandmarkSource`]).
//! Each list feeds one or more render streams ([`StreamKind`]); the face list
//! feeds both the face contour and the face anchor.

use serde::{Deserialize, Serialize};

/// Number of pose landmarks in a body list
pub const BODY_POINT_COUNT: usize = 33;

/// Number of landmarks in one hand list
pub const HAND_POINT_COUNT: usize = 21;

/// Number of landmarks in a face mesh list
pub const FACE_POINT_COUNT: usize = 478;

/// Face mesh indices the pipeline projects; every other face slot stays empty.
pub const FACE_KEY_INDICES: [usize; 9] = [10, 19, 61, 133, 152, 234, 291, 362, 454];

/// Forehead landmark used as the face anchor
pub const FACE_ANCHOR_INDEX: usize = 10;

/// One of the four landmark lists emitted by the inference graph
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkSource {
    Pose,
    LeftHand,
    RightHand,
    Face,
}

impl LandmarkSource {
    pub const ALL: [LandmarkSource; 4] = [
        LandmarkSource::Pose,
        LandmarkSource::LeftHand,
        LandmarkSource::RightHand,
        LandmarkSource::Face,
    ];

    /// Exact number of landmarks a complete list carries
    pub fn expected_len(self) -> usize {
        match self {
            LandmarkSource::Pose => BODY_POINT_COUNT,
            LandmarkSource::LeftHand | LandmarkSource::RightHand => HAND_POINT_COUNT,
            LandmarkSource::Face => FACE_POINT_COUNT,
        }
    }

    /// Indices that get projected, or `None` for every index
    pub fn projection_subset(self) -> Option<&'static [usize]> {
        match self {
            LandmarkSource::Face => Some(&FACE_KEY_INDICES),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LandmarkSource::Pose => "body",
            LandmarkSource::LeftHand => "left_hand",
            LandmarkSource::RightHand => "right_hand",
            LandmarkSource::Face => "face",
        }
    }
}

/// A render stream with its own stabilizer state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Body,
    LeftHand,
    RightHand,
    FaceContour,
    FaceAnchor,
}

impl StreamKind {
    pub const ALL: [StreamKind; 5] = [
        StreamKind::Body,
        StreamKind::LeftHand,
        StreamKind::RightHand,
        StreamKind::FaceContour,
        StreamKind::FaceAnchor,
    ];

    /// The landmark list this stream consumes
    pub fn source(self) -> LandmarkSource {
        match self {
            StreamKind::Body => LandmarkSource::Pose,
            StreamKind::LeftHand => LandmarkSource::LeftHand,
            StreamKind::RightHand => LandmarkSource::RightHand,
            StreamKind::FaceContour | StreamKind::FaceAnchor => LandmarkSource::Face,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StreamKind::Body => "body",
            StreamKind::LeftHand => "left_hand",
            StreamKind::RightHand => "right_hand",
            StreamKind::FaceContour => "face_contour",
            StreamKind::FaceAnchor => "face_anchor",
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
