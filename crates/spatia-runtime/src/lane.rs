//! Source lanes
//!
//! A lane takes one landmark list per frame, projects it once and fans the
//! samples out to every stream fed by that list. The face lane feeds both
//! the face contour and the face anchor.

use std::sync::Arc;
use std::time::Duration;

use spatia_core::{LandmarkSource, NormalizedLandmark, Sample, StreamKind};
use spatia_project::SpatialProjector;
use spatia_stabilize::{
    FaceAnchorStabilizer, RenderSink, Stabilize, StreamLayout, StreamStabilizer,
};

use crate::PipelineConfig;

/// What happened to one delivered list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneUpdate {
    /// Routed to the stabilizers
    Dispatched,
    /// Not newer than the last list this lane applied
    OutOfOrder,
}

pub struct SourceLane {
    source: LandmarkSource,
    projector: Arc<SpatialProjector>,
    streams: Vec<Box<dyn Stabilize>>,
    last_frame_id: Option<u64>,
}

impl SourceLane {
    pub fn new(
        source: LandmarkSource,
        projector: Arc<SpatialProjector>,
        streams: Vec<Box<dyn Stabilize>>,
    ) -> Self {
        Self {
            source,
            projector,
            streams,
            last_frame_id: None,
        }
    }

    pub fn source(&self) -> LandmarkSource {
        self.source
    }

    pub fn stream_kinds(&self) -> Vec<StreamKind> {
        self.streams.iter().map(|s| s.kind()).collect()
    }

    pub fn last_frame_id(&self) -> Option<u64> {
        self.last_frame_id
    }

    /// Project a list into samples; a short list counts as no data
    pub fn project(&self, landmarks: Option<&[NormalizedLandmark]>) -> Option<Vec<Sample>> {
        let landmarks = landmarks.filter(|l| l.len() >= self.source.expected_len())?;
        Some(
            self.projector
                .project_landmarks(landmarks, self.source.projection_subset()),
        )
    }

    /// Route one list, computed from `frame_id`, through every stream
    pub fn apply(&mut self, frame_id: u64, landmarks: Option<&[NormalizedLandmark]>) -> LaneUpdate {
        if self.last_frame_id.map_or(false, |last| frame_id <= last) {
            tracing::debug!(
                source = self.source.name(),
                frame_id,
                last = ?self.last_frame_id,
                "dropping out-of-order landmarks"
            );
            return LaneUpdate::OutOfOrder;
        }
        self.last_frame_id = Some(frame_id);

        let samples = self.project(landmarks);
        for stream in &mut self.streams {
            let outcome = stream.update(samples.as_deref());
            tracing::trace!(stream = %stream.kind(), frame_id, ?outcome, "stream updated");
        }
        LaneUpdate::Dispatched
    }

    pub fn tick(&mut self, dt: Duration) {
        for stream in &mut self.streams {
            stream.tick(dt);
        }
    }

    pub fn present(&mut self, sink: &dyn RenderSink) {
        for stream in &mut self.streams {
            stream.present(sink);
        }
    }

    /// Back to the initial state for a new session
    pub fn reset(&mut self) {
        self.last_frame_id = None;
        for stream in &mut self.streams {
            stream.reset();
        }
    }

    pub fn dispose(&mut self, sink: &dyn RenderSink) {
        self.last_frame_id = None;
        for stream in &mut self.streams {
            stream.dispose(sink);
        }
    }
}

/// One lane per landmark source that has at least one enabled stream
pub fn build_lanes(config: &PipelineConfig, projector: Arc<SpatialProjector>) -> Vec<SourceLane> {
    let streams = &config.streams;
    let mut lanes = Vec::new();

    for source in LandmarkSource::ALL {
        let mut stabilizers: Vec<Box<dyn Stabilize>> = Vec::new();
        match source {
            LandmarkSource::Pose if streams.body.enabled => {
                stabilizers.push(Box::new(StreamStabilizer::new(
                    StreamLayout::body(),
                    streams.body.stream_config(),
                )));
            }
            LandmarkSource::LeftHand if streams.left_hand.enabled => {
                stabilizers.push(Box::new(StreamStabilizer::new(
                    StreamLayout::hand(StreamKind::LeftHand),
                    streams.left_hand.stream_config(),
                )));
            }
            LandmarkSource::RightHand if streams.right_hand.enabled => {
                stabilizers.push(Box::new(StreamStabilizer::new(
                    StreamLayout::hand(StreamKind::RightHand),
                    streams.right_hand.stream_config(),
                )));
            }
            LandmarkSource::Face => {
                if streams.face_contour.enabled {
                    stabilizers.push(Box::new(StreamStabilizer::new(
                        StreamLayout::face_contour(),
                        streams.face_contour.stream_config(),
                    )));
                }
                if streams.face_anchor.enabled {
                    stabilizers.push(Box::new(FaceAnchorStabilizer::new(
                        streams.face_anchor.anchor_config(),
                    )));
                }
            }
            _ => {}
        }

        if stabilizers.is_empty() {
            tracing::debug!(source = source.name(), "no enabled streams, lane skipped");
            continue;
        }
        lanes.push(SourceLane::new(source, projector.clone(), stabilizers));
    }

    lanes
}
