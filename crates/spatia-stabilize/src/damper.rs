//! Critically damped spring smoothing
//!
//! Implicit-Euler style step with a rational approximation of `exp(-x)`.
//! Reaches the target within roughly `smooth_time` and never overshoots it.

use std::time::Duration;

use spatia_core::Vec3;

/// Lower bound on the smoothing time constant, in seconds
pub const MIN_SMOOTH_TIME: f32 = 1e-4;

/// One damping step along each axis.
///
/// Returns the new position; `velocity` is updated in place. A non-positive
/// `dt` leaves both untouched.
pub fn smooth_damp(current: Vec3, target: Vec3, velocity: &mut Vec3, smooth_time: f32, dt: f32) -> Vec3 {
    if dt <= 0.0 {
        return current;
    }

    let smooth_time = smooth_time.max(MIN_SMOOTH_TIME);
    let omega = 2.0 / smooth_time;
    let x = omega * dt;
    let exp = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);

    let change = current - target;
    let temp = (*velocity + change * omega) * dt;
    *velocity = (*velocity - temp * omega) * exp;
    let mut output = target + (change + temp) * exp;

    // Clamp if we crossed the target
    if (target - current).dot(&(output - target)) > 0.0 {
        output = target;
        *velocity = Vec3::ZERO;
    }

    output
}

/// Smoothed position that chases a target
#[derive(Debug, Clone)]
pub struct PositionDamper {
    smooth_time: Duration,
    velocity: Vec3,
    position: Option<Vec3>,
}

impl PositionDamper {
    pub fn new(smooth_time: Duration) -> Self {
        Self {
            smooth_time,
            velocity: Vec3::ZERO,
            position: None,
        }
    }

    pub fn smooth_time(&self) -> Duration {
        self.smooth_time
    }

    /// Current smoothed position, `None` before the first target
    pub fn position(&self) -> Option<Vec3> {
        self.position
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Jump straight to `target` with zero velocity
    pub fn snap(&mut self, target: Vec3) {
        self.position = Some(target);
        self.velocity = Vec3::ZERO;
    }

    /// Advance toward `target` by `dt`. The first call snaps.
    pub fn step(&mut self, target: Vec3, dt: Duration) -> Vec3 {
        let current = match self.position {
            Some(p) => p,
            None => {
                self.snap(target);
                return target;
            }
        };
        let next = smooth_damp(
            current,
            target,
            &mut self.velocity,
            self.smooth_time.as_secs_f32(),
            dt.as_secs_f32(),
        );
        self.position = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.position = None;
        self.velocity = Vec3::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_dt_is_noop() {
        let mut v = Vec3::new(1.0, 0.0, 0.0);
        let out = smooth_damp(Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0), &mut v, 0.1, 0.0);
        assert_eq!(out, Vec3::ZERO);
        assert_eq!(v, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_first_step_snaps() {
        let mut d = PositionDamper::new(Duration::from_millis(100));
        let target = Vec3::new(0.3, 1.5, 2.0);
        assert_eq!(d.step(target, Duration::from_millis(16)), target);
        assert_eq!(d.velocity(), Vec3::ZERO);
    }

    #[test]
    fn test_moves_toward_target() {
        let mut d = PositionDamper::new(Duration::from_millis(100));
        d.snap(Vec3::ZERO);
        let target = Vec3::new(1.0, 0.0, 0.0);

        let p1 = d.step(target, Duration::from_millis(16));
        let p2 = d.step(target, Duration::from_millis(16));
        assert!(p1.x > 0.0 && p1.x < 1.0);
        assert!(p2.x > p1.x && p2.x <= 1.0);
    }

    #[test]
    fn test_reaches_target_within_five_time_constants() {
        let mut d = PositionDamper::new(Duration::from_millis(100));
        d.snap(Vec3::ZERO);
        let target = Vec3::new(0.0, 2.0, -1.0);

        let mut p = Vec3::ZERO;
        for _ in 0..32 {
            p = d.step(target, Duration::from_millis(16));
        }
        assert!(p.distance(&target) < 0.01 * target.length());
    }

    #[test]
    fn test_tiny_smooth_time_is_clamped() {
        let mut v = Vec3::ZERO;
        let out = smooth_damp(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), &mut v, 0.0, 0.016);
        assert!(out.x.is_finite());
        assert!(out.x <= 1.0);
    }

    #[test]
    fn test_reset_forgets_position() {
        let mut d = PositionDamper::new(Duration::from_millis(100));
        d.snap(Vec3::new(1.0, 1.0, 1.0));
        d.reset();
        assert_eq!(d.position(), None);
    }

    proptest! {
        #[test]
        fn prop_converges_without_overshoot(
            smooth_ms in 10u64..2000,
            frac in 0.001f32..1.0,
            tx in -10.0f32..10.0,
            ty in -10.0f32..10.0,
            tz in -10.0f32..10.0,
        ) {
            let smooth = Duration::from_millis(smooth_ms);
            let dt = smooth.mul_f32(frac).max(Duration::from_micros(10));
            let target = Vec3::new(tx, ty, tz);
            let start = Vec3::ZERO;
            let mut d = PositionDamper::new(smooth);
            d.snap(start);

            let initial = start.distance(&target);
            let mut elapsed = Duration::ZERO;
            let mut p = start;
            while elapsed < smooth * 5 {
                p = d.step(target, dt);
                // never further from the start than the target along the path
                prop_assert!((p - start).dot(&(target - start)) <= initial * initial * 1.0001 + 1e-5);
                elapsed += dt;
            }
            prop_assert!(p.distance(&target) <= initial * 0.01 + 1e-4);
        }
    }
}
