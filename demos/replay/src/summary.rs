//! Counting render sink
//!
//! Keeps running totals per stream instead of the frames themselves, so a
//! replay of any length runs in constant memory.

use std::collections::HashMap;

use parking_lot::Mutex;
use spatia_core::{Quat, StreamKind, Vec3};
use spatia_stabilize::{RenderSink, StreamFrame};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    pub frames: u64,
    pub visible: u64,
    pub held_points: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AnchorSummary {
    pub shows: u64,
    pub hides: u64,
    pub poses: u64,
}

#[derive(Default)]
pub struct SummarySink {
    streams: Mutex<HashMap<StreamKind, StreamSummary>>,
    anchor: Mutex<AnchorSummary>,
}

impl SummarySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(&self, kind: StreamKind) -> StreamSummary {
        self.streams.lock().get(&kind).copied().unwrap_or_default()
    }

    pub fn anchor(&self) -> AnchorSummary {
        *self.anchor.lock()
    }
}

impl RenderSink for SummarySink {
    fn present(&self, frame: &StreamFrame) {
        let held = frame
            .points
            .iter()
            .filter(|p| p.stale && p.is_active())
            .count() as u64;

        let mut streams = self.streams.lock();
        let summary = streams.entry(frame.kind).or_default();
        summary.frames += 1;
        summary.visible += u64::from(frame.visible);
        summary.held_points += held;
    }

    fn set_anchor_visible(&self, visible: bool) {
        let mut anchor = self.anchor.lock();
        if visible {
            anchor.shows += 1;
        } else {
            anchor.hides += 1;
        }
    }

    fn set_anchor_pose(&self, _position: Vec3, _rotation: Quat) {
        self.anchor.lock().poses += 1;
    }
}
