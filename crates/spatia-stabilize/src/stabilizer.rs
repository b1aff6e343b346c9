//! Generic stream stabilizer
//!
//! One instance per render stream, parameterized by a [`StreamLayout`]. Owns
//! its state exclusively; only [`Stabilize::update`] and [`Stabilize::tick`]
//! mutate it.

use std::time::Duration;

use spatia_core::{is_valid_sample, Sample, SessionTime, StreamKind, Vec3};

use crate::{
    FrameOutcome, PointColor, RenderSink, SegmentOutput, SlotOutput, Stabilize, StreamFrame,
    StreamLayout,
};

/// State of one point slot
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PointState {
    /// Never seen a valid value
    #[default]
    Unset,
    /// Valid in the most recent applied frame
    Valid(Vec3),
    /// Invalid in the most recent applied frame; showing the last good value
    HeldStale(Vec3),
}

impl PointState {
    /// Renderable position (current or held)
    pub fn position(&self) -> Option<Vec3> {
        match *self {
            PointState::Unset => None,
            PointState::Valid(p) | PointState::HeldStale(p) => Some(p),
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, PointState::Unset)
    }

    /// Next state given this frame's sample
    pub fn advance(self, sample: &Sample) -> PointState {
        match (sample, self) {
            (Some(p), _) if is_valid_sample(sample) => PointState::Valid(*p),
            (_, PointState::Valid(p)) | (_, PointState::HeldStale(p)) => PointState::HeldStale(p),
            (_, PointState::Unset) => PointState::Unset,
        }
    }
}

/// Stream-level visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Hidden,
    Visible,
}

/// Per-stream render and timing parameters
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    pub point_scale: f32,
    pub line_width: f32,
    /// Quiet period after the last valid frame before the stream hides
    pub hide_delay: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            point_scale: 0.01,
            line_width: 0.001,
            hide_delay: Duration::from_millis(500),
        }
    }
}

/// Counters for one stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StabilizerStats {
    pub frames: u64,
    pub applied: u64,
    pub missing: u64,
    pub empty: u64,
    pub substitutions: u64,
    pub hides: u64,
}

/// True as soon as one tracked slot carries a valid sample
pub fn has_at_least_one_valid_point(samples: &[Sample], tracked: &[usize]) -> bool {
    tracked
        .iter()
        .any(|&index| samples.get(index).map_or(false, is_valid_sample))
}

/// Hold-last-valid / hide-after-timeout stabilizer for a point/line stream
pub struct StreamStabilizer {
    layout: StreamLayout,
    config: StreamConfig,
    /// Parallel to `layout.tracked()`
    slots: Vec<PointState>,
    segments: Vec<bool>,
    visibility: Visibility,
    now: SessionTime,
    last_valid_at: Option<SessionTime>,
    stats: StabilizerStats,
}

impl StreamStabilizer {
    pub fn new(layout: StreamLayout, config: StreamConfig) -> Self {
        let slots = vec![PointState::Unset; layout.tracked().len()];
        let segments = vec![false; layout.connections().len()];
        Self {
            layout,
            config,
            slots,
            segments,
            visibility: Visibility::Hidden,
            now: SessionTime::ZERO,
            last_valid_at: None,
            stats: StabilizerStats::default(),
        }
    }

    pub fn layout(&self) -> &StreamLayout {
        &self.layout
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_visible(&self) -> bool {
        self.visibility == Visibility::Visible
    }

    pub fn stats(&self) -> &StabilizerStats {
        &self.stats
    }

    pub fn now(&self) -> SessionTime {
        self.now
    }

    pub fn last_valid_at(&self) -> Option<SessionTime> {
        self.last_valid_at
    }

    /// State of the slot owning landmark `index`
    pub fn point_state(&self, index: usize) -> Option<PointState> {
        self.slot_position(index).map(|slot| self.slots[slot])
    }

    /// Active = valid this frame or held from an earlier one
    pub fn is_active(&self, index: usize) -> bool {
        self.point_state(index).map_or(false, |s| s.is_active())
    }

    pub fn position(&self, index: usize) -> Option<Vec3> {
        self.point_state(index).and_then(|s| s.position())
    }

    pub fn segment_enabled(&self, segment: usize) -> bool {
        self.segments.get(segment).copied().unwrap_or(false)
    }

    fn slot_position(&self, index: usize) -> Option<usize> {
        self.layout.tracked().iter().position(|&i| i == index)
    }

    /// Phase 2: adopt valid samples, hold the last good value otherwise
    fn substitute(&mut self, samples: &[Sample]) -> (usize, usize, usize) {
        let (mut valid, mut held, mut inactive) = (0, 0, 0);
        for (slot, &index) in self.slots.iter_mut().zip(self.layout.tracked()) {
            *slot = slot.advance(&samples[index]);
            match slot {
                PointState::Valid(_) => valid += 1,
                PointState::HeldStale(_) => held += 1,
                PointState::Unset => inactive += 1,
            }
        }
        (valid, held, inactive)
    }

    /// Phase 3: a segment is enabled only when every endpoint is active
    fn refresh_segments(&mut self) {
        let tracked = self.layout.tracked();
        let slots = &self.slots;
        for (enabled, line) in self.segments.iter_mut().zip(self.layout.connections().iter()) {
            *enabled = line.iter().all(|index| {
                tracked
                    .iter()
                    .position(|i| i == index)
                    .map_or(false, |slot| slots[slot].is_active())
            });
        }
    }

    /// Phase 4: show on valid data, hide after the quiet period
    fn evaluate_visibility(&mut self, had_valid: bool) {
        if had_valid {
            self.last_valid_at = Some(self.now);
            if self.visibility == Visibility::Hidden {
                tracing::debug!(stream = %self.layout.kind(), "stream shown");
                self.visibility = Visibility::Visible;
            }
            return;
        }

        if self.visibility == Visibility::Visible {
            let quiet = self.last_valid_at.map_or(Duration::MAX, |t| self.now - t);
            if quiet > self.config.hide_delay {
                tracing::debug!(stream = %self.layout.kind(), ?quiet, "stream hidden");
                self.visibility = Visibility::Hidden;
                self.stats.hides += 1;
            }
        }
    }

    /// Render snapshot; a hidden stream has no active points or segments
    pub fn frame(&self) -> StreamFrame {
        let kind = self.layout.kind();
        let visible = self.is_visible();

        let points = self
            .layout
            .tracked()
            .iter()
            .zip(&self.slots)
            .map(|(&index, state)| SlotOutput {
                index,
                position: if visible { state.position() } else { None },
                stale: matches!(state, PointState::HeldStale(_)),
                color: PointColor::for_slot(kind, index),
            })
            .collect();

        let segments = self
            .layout
            .connections()
            .iter()
            .zip(&self.segments)
            .map(|(line, &enabled)| {
                let enabled = visible && enabled;
                let path = if enabled {
                    line.iter().filter_map(|&i| self.position(i)).collect()
                } else {
                    Vec::new()
                };
                SegmentOutput { enabled, path }
            })
            .collect();

        StreamFrame {
            kind,
            visible,
            points,
            segments,
            point_scale: self.config.point_scale,
            line_width: self.config.line_width,
        }
    }
}

impl Stabilize for StreamStabilizer {
    fn kind(&self) -> StreamKind {
        self.layout.kind()
    }

    fn update(&mut self, samples: Option<&[Sample]>) -> FrameOutcome {
        self.stats.frames += 1;

        // Phase 1: validity scan
        let samples = match samples {
            Some(s) if s.len() >= self.layout.point_count() => s,
            _ => {
                self.stats.missing += 1;
                self.evaluate_visibility(false);
                return FrameOutcome::Missing;
            }
        };
        if !has_at_least_one_valid_point(samples, self.layout.tracked()) {
            self.stats.empty += 1;
            self.evaluate_visibility(false);
            return FrameOutcome::NoValidPoints;
        }

        let (valid, held, inactive) = self.substitute(samples);
        self.stats.substitutions += held as u64;
        self.refresh_segments();
        self.evaluate_visibility(true);
        self.stats.applied += 1;

        FrameOutcome::Applied {
            valid,
            held,
            inactive,
        }
    }

    fn tick(&mut self, dt: Duration) {
        self.now = self.now + dt;
        self.evaluate_visibility(false);
    }

    fn present(&mut self, sink: &dyn RenderSink) {
        sink.present(&self.frame());
    }

    fn reset(&mut self) {
        self.slots.fill(PointState::Unset);
        self.segments.fill(false);
        self.visibility = Visibility::Hidden;
        self.last_valid_at = None;
    }

    fn dispose(&mut self, sink: &dyn RenderSink) {
        self.reset();
        sink.present(&self.frame());
    }
}
