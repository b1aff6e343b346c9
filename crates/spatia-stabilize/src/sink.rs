//! Render sink seam and the per-stream frame handed to it

use spatia_core::{Quat, StreamKind, Vec3};

/// Point colour hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointColor {
    White,
    Red,
    Blue,
    Green,
    Yellow,
}

impl PointColor {
    /// Body colouring: arms red/blue, legs green/yellow, the rest white
    pub fn for_slot(kind: StreamKind, index: usize) -> Self {
        if kind != StreamKind::Body {
            return PointColor::White;
        }
        match index {
            11..=16 if index % 2 == 1 => PointColor::Red,
            11..=16 => PointColor::Blue,
            23..=32 if index % 2 == 0 => PointColor::Green,
            23..=32 => PointColor::Yellow,
            _ => PointColor::White,
        }
    }
}

/// One point slot as the renderer should draw it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotOutput {
    /// Landmark index
    pub index: usize,
    /// `Some` iff the slot is active
    pub position: Option<Vec3>,
    /// Position is a held value from an earlier frame
    pub stale: bool,
    pub color: PointColor,
}

impl SlotOutput {
    pub fn is_active(&self) -> bool {
        self.position.is_some()
    }
}

/// One polyline as the renderer should draw it
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentOutput {
    pub enabled: bool,
    /// Vertex positions; empty when disabled
    pub path: Vec<Vec3>,
}

/// Complete render state of one stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFrame {
    pub kind: StreamKind,
    pub visible: bool,
    pub points: Vec<SlotOutput>,
    pub segments: Vec<SegmentOutput>,
    pub point_scale: f32,
    pub line_width: f32,
}

impl StreamFrame {
    pub fn active_points(&self) -> usize {
        self.points.iter().filter(|p| p.is_active()).count()
    }

    pub fn enabled_segments(&self) -> usize {
        self.segments.iter().filter(|s| s.enabled).count()
    }
}

/// Receiver of stabilized render state (mesh/line primitives live behind it).
///
/// Methods take `&self`: streams may present from different tasks, so
/// implementations own their synchronization.
pub trait RenderSink: Send + Sync {
    /// Full state of a point/line stream
    fn present(&self, frame: &StreamFrame);

    /// Face anchor activation; only called when it changes
    fn set_anchor_visible(&self, visible: bool);

    /// Face anchor transform while visible
    fn set_anchor_pose(&self, position: Vec3, rotation: Quat);
}
