//! Clock driven by the tokio timer
//!
//! Follows `tokio::time`, so a paused test runtime advances it together with
//! every `sleep` in the frame loop.

use spatia_core::SessionTime;
use spatia_time::Clock;
use tokio::time::Instant;

pub struct TokioClock {
    reference: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            reference: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> SessionTime {
        SessionTime::from_micros(self.reference.elapsed().as_micros() as u64)
    }
}
