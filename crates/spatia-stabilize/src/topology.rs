//! Static stream topologies
//!
//! A segment is a polyline over landmark indices. It is drawable only when
//! every index it references is active.

use spatia_core::{
    SpatiaError, SpatiaResult, StreamKind, BODY_POINT_COUNT, FACE_KEY_INDICES, FACE_POINT_COUNT,
    HAND_POINT_COUNT,
};

/// Body polylines: eyes, mouth, arms, shoulders, hips, legs
pub const BODY_CONNECTIONS: &[&[usize]] = &[
    &[1, 2, 3],
    &[4, 5, 6],
    &[7, 2, 0, 5, 8],
    &[9, 10],
    &[11, 13, 15],
    &[12, 14, 16],
    &[11, 12],
    &[23, 24],
    &[11, 23, 25, 27, 29, 31],
    &[12, 24, 26, 28, 30, 32],
];

/// Hand polylines: five fingers from the wrist, then the palm base
pub const HAND_CONNECTIONS: &[&[usize]] = &[
    &[0, 1, 2, 3, 4],
    &[0, 5, 6, 7, 8],
    &[0, 9, 10, 11, 12],
    &[0, 13, 14, 15, 16],
    &[0, 17, 18, 19, 20],
    &[5, 9, 13, 17],
];

/// Closed face outline: forehead, right cheek, chin, left cheek
pub const FACE_CONTOUR_CONNECTIONS: &[&[usize]] = &[&[10, 454, 152, 234, 10]];

/// Polylines over a stream's landmark indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSet {
    polylines: Vec<Vec<usize>>,
}

impl ConnectionSet {
    /// Build and validate: every polyline needs two or more indices, all of
    /// them tracked by the layout.
    pub fn new(
        stream: StreamKind,
        point_count: usize,
        tracked: &[usize],
        polylines: &[&[usize]],
    ) -> SpatiaResult<Self> {
        for line in polylines {
            if line.len() < 2 {
                return Err(SpatiaError::Config(format!(
                    "{stream} polyline needs at least two points"
                )));
            }
            for &index in line.iter() {
                if index >= point_count || !tracked.contains(&index) {
                    return Err(SpatiaError::InvalidTopology {
                        stream,
                        index,
                        point_count,
                    });
                }
            }
        }
        Ok(Self::from_static(polylines))
    }

    fn from_static(polylines: &[&[usize]]) -> Self {
        Self {
            polylines: polylines.iter().map(|line| line.to_vec()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.polylines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polylines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[usize]> {
        self.polylines.iter().map(Vec::as_slice)
    }
}

/// Point count, tracked slots and connections of one stream.
/// Immutable for the lifetime of the stream.
#[derive(Debug, Clone)]
pub struct StreamLayout {
    kind: StreamKind,
    point_count: usize,
    tracked: Vec<usize>,
    connections: ConnectionSet,
}

impl StreamLayout {
    pub fn new(
        kind: StreamKind,
        point_count: usize,
        tracked: Vec<usize>,
        polylines: &[&[usize]],
    ) -> SpatiaResult<Self> {
        if let Some(&index) = tracked.iter().find(|&&i| i >= point_count) {
            return Err(SpatiaError::InvalidTopology {
                stream: kind,
                index,
                point_count,
            });
        }
        let connections = ConnectionSet::new(kind, point_count, &tracked, polylines)?;
        Ok(Self {
            kind,
            point_count,
            tracked,
            connections,
        })
    }

    /// 33 pose points, all tracked
    pub fn body() -> Self {
        Self::builtin(
            StreamKind::Body,
            BODY_POINT_COUNT,
            (0..BODY_POINT_COUNT).collect(),
            BODY_CONNECTIONS,
        )
    }

    /// 21 hand points, all tracked
    pub fn hand(kind: StreamKind) -> Self {
        Self::builtin(
            kind,
            HAND_POINT_COUNT,
            (0..HAND_POINT_COUNT).collect(),
            HAND_CONNECTIONS,
        )
    }

    /// The nine face key points out of the 478-point mesh
    pub fn face_contour() -> Self {
        Self::builtin(
            StreamKind::FaceContour,
            FACE_POINT_COUNT,
            FACE_KEY_INDICES.to_vec(),
            FACE_CONTOUR_CONNECTIONS,
        )
    }

    fn builtin(
        kind: StreamKind,
        point_count: usize,
        tracked: Vec<usize>,
        polylines: &[&[usize]],
    ) -> Self {
        Self {
            kind,
            point_count,
            tracked,
            connections: ConnectionSet::from_static(polylines),
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Minimum list length a frame needs to count as data
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// Landmark indices that own a slot, in slot order
    pub fn tracked(&self) -> &[usize] {
        &self.tracked
    }

    pub fn connections(&self) -> &ConnectionSet {
        &self.connections
    }
}
