//! Benchmarks for per-frame stabilization

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use spatia_core::{Sample, Vec3, FACE_ANCHOR_INDEX, FACE_POINT_COUNT};
use spatia_stabilize::{
    smooth_damp, FaceAnchorStabilizer, Stabilize, StreamConfig, StreamLayout, StreamStabilizer,
};

const FRAME: Duration = Duration::from_millis(16);

fn body_samples(dropout_every: usize) -> Vec<Sample> {
    (0..33)
        .map(|i| {
            if dropout_every > 0 && i % dropout_every == 0 {
                None
            } else {
                Some(Vec3::new(i as f32 * 0.01 + 0.1, 1.2, 2.0))
            }
        })
        .collect()
}

fn bench_body_update_clean(c: &mut Criterion) {
    let mut stabilizer = StreamStabilizer::new(StreamLayout::body(), StreamConfig::default());
    let samples = body_samples(0);

    c.bench_function("body_update_clean", |b| {
        b.iter(|| {
            stabilizer.tick(FRAME);
            black_box(stabilizer.update(Some(black_box(&samples))))
        })
    });
}

fn bench_body_update_with_dropouts(c: &mut Criterion) {
    let mut stabilizer = StreamStabilizer::new(StreamLayout::body(), StreamConfig::default());
    let clean = body_samples(0);
    let flaky = body_samples(3);
    stabilizer.update(Some(&clean));

    c.bench_function("body_update_dropouts", |b| {
        b.iter(|| {
            stabilizer.tick(FRAME);
            black_box(stabilizer.update(Some(black_box(&flaky))))
        })
    });
}

fn bench_body_frame_snapshot(c: &mut Criterion) {
    let mut stabilizer = StreamStabilizer::new(StreamLayout::body(), StreamConfig::default());
    stabilizer.update(Some(&body_samples(0)));

    c.bench_function("body_frame_snapshot", |b| b.iter(|| black_box(stabilizer.frame())));
}

fn bench_face_anchor(c: &mut Criterion) {
    let mut anchor = FaceAnchorStabilizer::default();
    let mut samples: Vec<Sample> = vec![None; FACE_POINT_COUNT];
    samples[FACE_ANCHOR_INDEX] = Some(Vec3::new(0.0, 1.6, 1.0));

    c.bench_function("face_anchor_update_tick", |b| {
        b.iter(|| {
            anchor.update(Some(black_box(&samples)));
            anchor.tick(FRAME);
            black_box(anchor.position())
        })
    });
}

fn bench_smooth_damp(c: &mut Criterion) {
    let target = Vec3::new(1.0, 2.0, 3.0);

    c.bench_function("smooth_damp", |b| {
        let mut velocity = Vec3::ZERO;
        let mut position = Vec3::ZERO;
        b.iter(|| {
            position = smooth_damp(position, black_box(target), &mut velocity, 0.1, 0.016);
            black_box(position)
        })
    });
}

criterion_group!(
    benches,
    bench_body_update_clean,
    bench_body_update_with_dropouts,
    bench_body_frame_snapshot,
    bench_face_anchor,
    bench_smooth_damp
);
criterion_main!(benches);
