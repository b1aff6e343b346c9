//! Seeded landmark generator
//!
//! Produces plausible landmark lists clustered in the middle of the image,
//! with configurable dropouts:
//! - whole lists missing
//! - truncated lists
//! - single points pushed off the edge of the environment (raycast miss)

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spatia_core::{LandmarkSource, NormalizedLandmark};
use spatia_runtime::{HolisticResult, SegmentationMask};

/// Dropout rates (0.0 - 1.0)
#[derive(Clone, Debug)]
pub struct DropoutConfig {
    /// A whole list is missing
    pub list_loss: f64,
    /// A list is cut short
    pub short_list: f64,
    /// A point lands where the environment has no surface
    pub point_miss: f64,
    /// Per-coordinate uniform noise
    pub jitter: f32,
}

impl DropoutConfig {
    pub fn clean() -> Self {
        DropoutConfig {
            list_loss: 0.0,
            short_list: 0.0,
            point_miss: 0.0,
            jitter: 0.002,
        }
    }

    pub fn flaky() -> Self {
        DropoutConfig {
            list_loss: 0.1,
            short_list: 0.02,
            point_miss: 0.1,
            jitter: 0.005,
        }
    }

    pub fn hostile() -> Self {
        DropoutConfig {
            list_loss: 0.4,
            short_list: 0.1,
            point_miss: 0.4,
            jitter: 0.02,
        }
    }
}

impl Default for DropoutConfig {
    fn default() -> Self {
        Self::flaky()
    }
}

pub struct LandmarkGenerator {
    rng: StdRng,
    config: DropoutConfig,
}

impl LandmarkGenerator {
    pub fn with_seed(config: DropoutConfig, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            config,
        }
    }

    pub fn config(&self) -> &DropoutConfig {
        &self.config
    }

    /// Resting position of landmark `index`, inside [0.35, 0.65] on both axes
    pub fn base_point(source: LandmarkSource, index: usize) -> NormalizedLandmark {
        let salt = source as usize * 13;
        let x = 0.35 + 0.3 * ((index * 37 + salt) % 100) as f32 / 100.0;
        let y = 0.35 + 0.3 * ((index * 61 + salt) % 100) as f32 / 100.0;
        NormalizedLandmark::new(x, y, 0.0)
    }

    /// One list for `source`, or `None` when the list is dropped
    pub fn list(&mut self, source: LandmarkSource) -> Option<Vec<NormalizedLandmark>> {
        if self.rng.gen_bool(self.config.list_loss) {
            return None;
        }

        let expected = source.expected_len();
        let len = if self.rng.gen_bool(self.config.short_list) {
            self.rng.gen_range(0..expected)
        } else {
            expected
        };

        let jitter = self.config.jitter.abs();
        let noise = Uniform::new_inclusive(-jitter, jitter);
        let points = (0..len)
            .map(|index| {
                let base = Self::base_point(source, index);
                if self.rng.gen_bool(self.config.point_miss) {
                    // far left edge, past the end of the mapped surface
                    return NormalizedLandmark::new(0.0, base.y, base.z);
                }
                NormalizedLandmark::new(
                    base.x + noise.sample(&mut self.rng),
                    base.y + noise.sample(&mut self.rng),
                    base.z,
                )
            })
            .collect();
        Some(points)
    }

    /// A full graph result for `frame_id`
    pub fn holistic(&mut self, frame_id: u64) -> HolisticResult {
        HolisticResult {
            frame_id,
            pose: self.list(LandmarkSource::Pose),
            left_hand: self.list(LandmarkSource::LeftHand),
            right_hand: self.list(LandmarkSource::RightHand),
            face: self.list(LandmarkSource::Face),
            segmentation_mask: Some(SegmentationMask {
                width: 4,
                height: 3,
                data: vec![0.0; 12],
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = LandmarkGenerator::with_seed(DropoutConfig::hostile(), 42);
        let mut b = LandmarkGenerator::with_seed(DropoutConfig::hostile(), 42);
        for frame in 0..20 {
            assert_eq!(a.holistic(frame), b.holistic(frame));
        }
    }

    #[test]
    fn test_clean_lists_are_complete() {
        let mut generator = LandmarkGenerator::with_seed(DropoutConfig::clean(), 1);
        for source in LandmarkSource::ALL {
            let list = generator.list(source).unwrap();
            assert_eq!(list.len(), source.expected_len());
            assert!(list.iter().all(|p| p.x > 0.3 && p.x < 0.7));
        }
    }

    #[test]
    fn test_hostile_drops_something() {
        let mut generator = LandmarkGenerator::with_seed(DropoutConfig::hostile(), 9);
        let results: Vec<_> = (0..50).map(|f| generator.holistic(f)).collect();

        assert!(results.iter().any(|r| r.pose.is_none()));
        assert!(results
            .iter()
            .filter_map(|r| r.left_hand.as_ref())
            .any(|l| l.len() < 21 || l.iter().any(|p| p.x == 0.0)));
    }

    proptest::proptest! {
        #[test]
        fn prop_points_are_misses_or_near_base(seed in proptest::prelude::any::<u64>()) {
            let mut generator = LandmarkGenerator::with_seed(DropoutConfig::hostile(), seed);
            for source in LandmarkSource::ALL {
                if let Some(list) = generator.list(source) {
                    proptest::prop_assert!(list.len() <= source.expected_len());
                    for (i, p) in list.iter().enumerate() {
                        let base = LandmarkGenerator::base_point(source, i);
                        let near = (p.x - base.x).abs() <= 0.021 && (p.y - base.y).abs() <= 0.021;
                        proptest::prop_assert!(p.x == 0.0 || near);
                    }
                }
            }
        }
    }
}
