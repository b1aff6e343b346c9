//! SPATIA Time - session clocks and frame deltas
//!
//! - [`MonotonicClock`]: wall clock for live sessions
//! - [`ManualClock`]: shareable clock advanced by hand (tests, replays)
//! - [`FrameClock`]: turns any clock into per-iteration deltas

pub mod clock;

pub use clock::*;
