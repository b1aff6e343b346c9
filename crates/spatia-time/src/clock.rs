//! Clock implementations

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use spatia_core::SessionTime;

/// Source of session time
pub trait Clock: Send + Sync {
    /// Current session time; never decreases
    fn now(&self) -> SessionTime;
}

/// Wall clock anchored at construction
pub struct MonotonicClock {
    reference: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
            reference: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> SessionTime {
        SessionTime::from_micros(self.reference.elapsed().as_micros() as u64)
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Clone, Default)]
pub struct ManualClock {
    value: Arc<Mutex<SessionTime>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by `dt`, returning the new time
    pub fn advance(&self, dt: Duration) -> SessionTime {
        let mut value = self.value.lock();
        *value = value.saturating_add(dt);
        *value
    }

    /// Jump forward to `target`; moving backwards is ignored
    pub fn set(&self, target: SessionTime) {
        let mut value = self.value.lock();
        if target > *value {
            *value = target;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SessionTime {
        *self.value.lock()
    }
}

/// Per-iteration delta source for the frame loop.
///
/// Deltas are not clamped: a stall shows up as one large delta so that hide
/// timeouts stay tied to wall-clock time.
pub struct FrameClock {
    clock: Arc<dyn Clock>,
    last: SessionTime,
    frames: u64,
}

impl FrameClock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let last = clock.now();
        FrameClock {
            clock,
            last,
            frames: 0,
        }
    }

    /// Time elapsed since the previous tick (or since construction)
    pub fn tick(&mut self) -> Duration {
        let now = self.clock.now();
        let dt = now - self.last;
        self.last = now;
        self.frames += 1;
        dt
    }

    /// Drop any time accumulated since the last tick (e.g. after a pause)
    pub fn resync(&mut self) {
        self.last = self.clock.now();
    }

    pub fn now(&self) -> SessionTime {
        self.last
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = MonotonicClock::new();

        let t1 = clock.now();
        std::thread::sleep(Duration::from_millis(10));
        let t2 = clock.now();

        assert!(t2 > t1);
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let other = clock.clone();

        clock.advance(Duration::from_millis(40));
        assert_eq!(other.now(), SessionTime::from_millis(40));
    }

    #[test]
    fn test_manual_clock_never_goes_back() {
        let clock = ManualClock::new();
        clock.set(SessionTime::from_millis(100));
        clock.set(SessionTime::from_millis(50));
        assert_eq!(clock.now(), SessionTime::from_millis(100));
    }

    #[test]
    fn test_frame_clock_deltas() {
        let manual = ManualClock::new();
        let mut frames = FrameClock::new(Arc::new(manual.clone()));

        manual.advance(Duration::from_millis(16));
        assert_eq!(frames.tick(), Duration::from_millis(16));

        manual.advance(Duration::from_millis(700));
        assert_eq!(frames.tick(), Duration::from_millis(700));

        assert_eq!(frames.tick(), Duration::ZERO);
        assert_eq!(frames.frames(), 3);
    }

    #[test]
    fn test_frame_clock_resync_discards_pause() {
        let manual = ManualClock::new();
        let mut frames = FrameClock::new(Arc::new(manual.clone()));

        manual.advance(Duration::from_secs(5));
        frames.resync();
        manual.advance(Duration::from_millis(10));

        assert_eq!(frames.tick(), Duration::from_millis(10));
    }
}
