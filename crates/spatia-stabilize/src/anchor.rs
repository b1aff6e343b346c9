//! Face anchor stream
//!
//! A single slot (forehead landmark) whose stabilized position is smoothed by
//! a [`PositionDamper`] before it reaches the sink. Visibility changes are
//! reported to the sink on edges only.

use std::time::Duration;

use spatia_core::{is_valid_sample, Quat, Sample, SessionTime, StreamKind, Vec3, FACE_ANCHOR_INDEX, FACE_POINT_COUNT};

use crate::{FrameOutcome, PointState, PositionDamper, RenderSink, Stabilize, StabilizerStats, Visibility};

/// Face anchor tuning
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorConfig {
    pub hide_delay: Duration,
    pub smooth_time: Duration,
    /// Reserved. Not read by any update path.
    pub position_change_threshold: f32,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            hide_delay: Duration::from_millis(500),
            smooth_time: Duration::from_millis(100),
            position_change_threshold: 0.001,
        }
    }
}

/// Damped single-point anchor with edge-triggered visibility
pub struct FaceAnchorStabilizer {
    config: AnchorConfig,
    slot: PointState,
    rotation: Quat,
    damper: PositionDamper,
    visibility: Visibility,
    /// Visibility last pushed to the sink; the sink starts hidden
    reported: bool,
    prev_frame_valid: bool,
    now: SessionTime,
    last_valid_at: Option<SessionTime>,
    stats: StabilizerStats,
}

impl FaceAnchorStabilizer {
    pub fn new(config: AnchorConfig) -> Self {
        let damper = PositionDamper::new(config.smooth_time);
        Self {
            config,
            slot: PointState::Unset,
            rotation: Quat::IDENTITY,
            damper,
            visibility: Visibility::Hidden,
            reported: false,
            prev_frame_valid: false,
            now: SessionTime::ZERO,
            last_valid_at: None,
            stats: StabilizerStats::default(),
        }
    }

    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }

    pub fn is_visible(&self) -> bool {
        self.visibility == Visibility::Visible
    }

    /// Stabilized (undamped) target
    pub fn target(&self) -> Option<Vec3> {
        self.slot.position()
    }

    /// Damped position exposed to the sink
    pub fn position(&self) -> Option<Vec3> {
        self.damper.position()
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Whether the most recent applied frame carried a valid anchor point
    pub fn prev_frame_valid(&self) -> bool {
        self.prev_frame_valid
    }

    pub fn stats(&self) -> &StabilizerStats {
        &self.stats
    }

    /// Like [`Stabilize::update`], also taking the face orientation when the
    /// caller has one. Rotation is never damped.
    pub fn update_with_orientation(
        &mut self,
        samples: Option<&[Sample]>,
        orientation: Option<Quat>,
    ) -> FrameOutcome {
        self.stats.frames += 1;

        let samples = match samples {
            Some(s) if s.len() >= FACE_POINT_COUNT => s,
            _ => {
                self.stats.missing += 1;
                self.prev_frame_valid = false;
                self.check_timeout();
                return FrameOutcome::Missing;
            }
        };

        let sample = &samples[FACE_ANCHOR_INDEX];
        let valid = is_valid_sample(sample);
        let rising = valid && !self.prev_frame_valid;
        self.prev_frame_valid = valid;
        if !valid {
            self.stats.empty += 1;
            self.check_timeout();
            return FrameOutcome::NoValidPoints;
        }

        self.slot = self.slot.advance(sample);
        if let Some(rotation) = orientation {
            self.rotation = rotation.normalize();
        }
        if self.damper.position().is_none() {
            if let Some(target) = self.slot.position() {
                self.damper.snap(target);
            }
        }

        self.last_valid_at = Some(self.now);
        // Hidden implies the previous frame was not valid
        if rising && self.visibility == Visibility::Hidden {
            tracing::debug!("face anchor acquired");
            self.visibility = Visibility::Visible;
        }
        self.stats.applied += 1;

        FrameOutcome::Applied {
            valid: 1,
            held: 0,
            inactive: 0,
        }
    }

    fn check_timeout(&mut self) {
        if self.visibility != Visibility::Visible {
            return;
        }
        let quiet = self.last_valid_at.map_or(Duration::MAX, |t| self.now - t);
        if quiet > self.config.hide_delay {
            tracing::debug!(?quiet, "face anchor lost");
            self.visibility = Visibility::Hidden;
            self.prev_frame_valid = false;
            self.stats.hides += 1;
        }
    }
}

impl Default for FaceAnchorStabilizer {
    fn default() -> Self {
        Self::new(AnchorConfig::default())
    }
}

impl Stabilize for FaceAnchorStabilizer {
    fn kind(&self) -> StreamKind {
        StreamKind::FaceAnchor
    }

    fn update(&mut self, samples: Option<&[Sample]>) -> FrameOutcome {
        self.update_with_orientation(samples, None)
    }

    fn tick(&mut self, dt: Duration) {
        self.now = self.now + dt;
        if self.is_visible() {
            if let Some(target) = self.slot.position() {
                self.damper.step(target, dt);
            }
        }
        self.check_timeout();
    }

    fn present(&mut self, sink: &dyn RenderSink) {
        let visible = self.is_visible();
        if self.reported != visible {
            sink.set_anchor_visible(visible);
            self.reported = visible;
        }
        if visible {
            if let Some(position) = self.damper.position() {
                sink.set_anchor_pose(position, self.rotation);
            }
        }
    }

    fn reset(&mut self) {
        self.slot = PointState::Unset;
        self.rotation = Quat::IDENTITY;
        self.damper.reset();
        self.visibility = Visibility::Hidden;
        self.prev_frame_valid = false;
        self.last_valid_at = None;
    }

    fn dispose(&mut self, sink: &dyn RenderSink) {
        self.reset();
        if self.reported {
            sink.set_anchor_visible(false);
            self.reported = false;
        }
    }
}
