//! SPATIA Stabilization - turning noisy per-frame landmarks into steady state
//!
//! Every render stream owns one stabilizer. Per frame it runs, in order:
//! 1. Validity scan (does the frame carry any valid point at all?)
//! 2. Per-point substitution (adopt valid points, hold the last good value)
//! 3. Segment visibility (a polyline is drawn only if every endpoint is active)
//! 4. Show/hide hysteresis (hide only after a quiet period)
//!
//! The face anchor stream additionally runs its target through a critically
//! damped spring before exposing it.

pub mod topology;
pub mod stabilizer;
pub mod damper;
pub mod anchor;
pub mod sink;

pub use topology::*;
pub use stabilizer::*;
pub use damper::*;
pub use anchor::*;
pub use sink::*;

use std::time::Duration;

use spatia_core::{Sample, StreamKind};

/// What a stabilizer made of one incoming frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// No list, or a list shorter than the stream expects
    Missing,
    /// A complete list without a single valid tracked point
    NoValidPoints,
    /// The frame was applied
    Applied {
        valid: usize,
        held: usize,
        inactive: usize,
    },
}

impl FrameOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, FrameOutcome::Applied { .. })
    }
}

/// Common driver interface for every stream's stabilizer
pub trait Stabilize: Send {
    fn kind(&self) -> StreamKind;

    /// Feed one frame of world-space samples (`None` = no data this frame)
    fn update(&mut self, samples: Option<&[Sample]>) -> FrameOutcome;

    /// Advance the stream's clock; evaluates the hide timeout
    fn tick(&mut self, dt: Duration);

    /// Push the current state to the render sink
    fn present(&mut self, sink: &dyn RenderSink);

    /// Back to the initial sentinel state
    fn reset(&mut self);

    /// Hide everything on the sink and drop all state
    fn dispose(&mut self, sink: &dyn RenderSink);
}
