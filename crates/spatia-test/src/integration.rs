//! End-to-end pipeline harness
//!
//! Wires a [`FrameDispatchLoop`] to the fakes in this crate and runs it for a
//! stretch of (tokio) time. Tests run with the tokio clock paused, so a
//! session of several seconds completes instantly and deterministically.

use std::sync::Arc;
use std::time::Duration;

use spatia_core::SpatiaResult;
use spatia_project::EnvironmentRaycast;
use spatia_runtime::{FrameDispatchLoop, PipelineConfig, PipelineParts, TokioClock};

use crate::fakes::{
    GraphProbe, PlaneEnvironment, PoolProbe, RecordingSink, ScriptedGraph, SourceProbe,
    SyntheticSource, VecFramePool,
};

/// Observers for every fake wired into a harness pipeline
pub struct HarnessProbes {
    pub pool: PoolProbe,
    pub source: SourceProbe,
    pub graph: GraphProbe,
    pub sink: Arc<RecordingSink>,
}

/// Build a loop over the fakes, projecting onto [`PlaneEnvironment::wall`]
pub fn build_pipeline(
    config: &PipelineConfig,
    source: SyntheticSource,
    graph: ScriptedGraph,
) -> SpatiaResult<(FrameDispatchLoop, HarnessProbes)> {
    build_pipeline_in(config, source, graph, Arc::new(PlaneEnvironment::wall()))
}

/// Like [`build_pipeline`], projecting onto `environment`
pub fn build_pipeline_in(
    config: &PipelineConfig,
    source: SyntheticSource,
    graph: ScriptedGraph,
    environment: Arc<dyn EnvironmentRaycast>,
) -> SpatiaResult<(FrameDispatchLoop, HarnessProbes)> {
    let pool = VecFramePool::new();
    let sink = Arc::new(RecordingSink::new());
    let probes = HarnessProbes {
        pool: pool.probe(),
        source: source.probe(),
        graph: graph.probe(),
        sink: sink.clone(),
    };

    let pipeline = FrameDispatchLoop::new(
        config,
        PipelineParts {
            source: Box::new(source),
            pool: Box::new(pool),
            graph: Box::new(graph),
            environment,
            sink,
            clock: Arc::new(TokioClock::new()),
        },
    )?;
    Ok((pipeline, probes))
}

/// Run `pipeline` on its own task for `duration`, then stop it
pub async fn run_for(
    mut pipeline: FrameDispatchLoop,
    duration: Duration,
) -> (FrameDispatchLoop, SpatiaResult<()>) {
    let handle = pipeline.handle();
    let task = tokio::spawn(async move {
        let result = pipeline.run().await;
        (pipeline, result)
    });

    tokio::time::sleep(duration).await;
    handle.stop();

    match task.await {
        Ok(done) => done,
        Err(e) => std::panic::resume_unwind(e.into_panic()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::EmptyEnvironment;
    use crate::generator::{DropoutConfig, LandmarkGenerator};
    use spatia_core::{
        is_valid, LandmarkSource, NormalizedLandmark, SpatiaError, StreamKind, BODY_POINT_COUNT,
        HAND_POINT_COUNT,
    };
    use spatia_runtime::{CapturePath, DispatchMode, HolisticResult, RunState};
    use spatia_stabilize::{StreamFrame, StreamLayout};

    const FRAME: Duration = Duration::from_millis(16);

    fn clean_graph(seed: u64) -> ScriptedGraph {
        let mut generator = LandmarkGenerator::with_seed(DropoutConfig::clean(), seed);
        ScriptedGraph::new(move |frame_id| generator.holistic(frame_id))
    }

    fn hand() -> Vec<NormalizedLandmark> {
        (0..HAND_POINT_COUNT)
            .map(|i| LandmarkGenerator::base_point(LandmarkSource::LeftHand, i))
            .collect()
    }

    /// Frames presented while running, without the final dispose frame
    fn live_frames(probes: &HarnessProbes, kind: StreamKind) -> Vec<StreamFrame> {
        let mut frames = probes.sink.frames(kind);
        frames.pop();
        frames
    }

    fn layout(kind: StreamKind) -> StreamLayout {
        match kind {
            StreamKind::Body => StreamLayout::body(),
            StreamKind::FaceContour => StreamLayout::face_contour(),
            other => StreamLayout::hand(other),
        }
    }

    fn assert_frame_invariants(frame: &StreamFrame) {
        if !frame.visible {
            assert_eq!(frame.active_points(), 0, "{:?} hidden but has points", frame.kind);
            assert_eq!(frame.enabled_segments(), 0, "{:?} hidden but has segments", frame.kind);
            return;
        }
        for point in frame.points.iter().filter_map(|p| p.position) {
            assert!(is_valid(&point));
        }
        let layout = layout(frame.kind);
        for (segment, line) in frame.segments.iter().zip(layout.connections().iter()) {
            let all_active = line.iter().all(|index| {
                frame
                    .points
                    .iter()
                    .any(|p| p.index == *index && p.is_active())
            });
            assert_eq!(segment.enabled, all_active);
            if segment.enabled {
                assert_eq!(segment.path.len(), line.len());
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_session_tracks_every_stream() {
        let config = PipelineConfig::default();
        let (pipeline, probes) = build_pipeline(&config, SyntheticSource::small(), clean_graph(1)).unwrap();

        let (pipeline, result) = run_for(pipeline, Duration::from_millis(400)).await;
        assert!(result.is_ok());

        let stats = pipeline.stats();
        assert!(stats.frames_submitted >= 20);
        assert!(stats.masks_released + 1 >= stats.frames_submitted);
        assert_eq!(probes.graph.snapshot().masks_released, stats.masks_released);

        let body = live_frames(&probes, StreamKind::Body);
        let last = body.last().unwrap();
        assert!(last.visible);
        assert_eq!(last.active_points(), BODY_POINT_COUNT);
        assert_eq!(last.enabled_segments(), 10);

        let left = live_frames(&probes, StreamKind::LeftHand);
        assert_eq!(left.last().unwrap().active_points(), HAND_POINT_COUNT);
        assert!(probes.sink.frames(StreamKind::FaceContour).is_empty());

        assert_eq!(probes.sink.anchor_visibility(), vec![true, false]);
        assert!(!probes.sink.anchor_poses().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_releases_resources_on_stop() {
        let (pipeline, probes) =
            build_pipeline(&PipelineConfig::default(), SyntheticSource::small(), clean_graph(2)).unwrap();
        let (pipeline, _) = run_for(pipeline, Duration::from_millis(200)).await;

        let pool = probes.pool.snapshot();
        assert_eq!(pool.allocations, 1);
        assert_eq!(pool.release_all_calls, 1);
        assert_eq!(pool.in_flight, 0);
        assert_eq!(pool.acquired, pool.released);
        assert_eq!((pool.width, pool.height, pool.capacity), (64, 48, 10));
        assert_eq!(probes.graph.snapshot().stops, 1);
        assert_eq!(pipeline.handle().state(), RunState::Stopped);

        let body = probes.sink.last_frame(StreamKind::Body).unwrap();
        assert!(!body.visible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_session_dispatches_per_stream() {
        let mut config = PipelineConfig::default();
        config.dispatch.mode = DispatchMode::Async;
        let (pipeline, probes) = build_pipeline(&config, SyntheticSource::small(), clean_graph(3)).unwrap();

        let (pipeline, result) = run_for(pipeline, Duration::from_millis(400)).await;
        assert!(result.is_ok());
        assert_eq!(probes.graph.snapshot().mode, Some(DispatchMode::Async));

        let stats = pipeline.stats();
        assert!(stats.frames_submitted >= 20);
        assert!(stats.results_dispatched >= 4 * (stats.frames_submitted - 1));
        assert_eq!(stats.masks_released, 0);

        let body = live_frames(&probes, StreamKind::Body);
        assert!(body.last().unwrap().visible);
        assert_eq!(probes.sink.anchor_visibility(), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_hides_only_after_hide_delay() {
        let graph = ScriptedGraph::new(|frame_id| HolisticResult {
            frame_id,
            left_hand: (frame_id < 10).then(hand),
            ..HolisticResult::default()
        });
        let (pipeline, probes) = build_pipeline(&PipelineConfig::default(), SyntheticSource::small(), graph).unwrap();
        let _ = run_for(pipeline, Duration::from_millis(1000)).await;

        let frames = live_frames(&probes, StreamKind::LeftHand);
        assert!(frames.len() > 50);
        // frame ids 0..=9 carry data; ~26 frames later is well inside 500ms
        assert!(frames[..=35].iter().all(|f| f.visible));
        assert_eq!(frames[20].active_points(), HAND_POINT_COUNT);

        let first_hidden = frames.iter().position(|f| !f.visible).unwrap();
        assert!(first_hidden > 35);
        assert!(frames[first_hidden..].iter().all(|f| !f.visible));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_failures_skip_frames() {
        let source = SyntheticSource::small().with_capture_failures(3);
        let (pipeline, probes) = build_pipeline(&PipelineConfig::default(), source, clean_graph(4)).unwrap();
        let (pipeline, result) = run_for(pipeline, Duration::from_millis(400)).await;
        assert!(result.is_ok());

        let stats = pipeline.stats();
        assert!(stats.readback_failures > 0);
        assert_eq!(stats.readback_failures, probes.source.snapshot().failed_captures);
        assert_eq!(stats.readback_failures + stats.frames_submitted, stats.frames_acquired);

        let pool = probes.pool.snapshot();
        assert_eq!(pool.acquired, pool.released);
        assert!(live_frames(&probes, StreamKind::Body).last().unwrap().visible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_copy_path() {
        let mut config = PipelineConfig::default();
        config.dispatch.capture_path = CapturePath::DeviceCopy;
        let (pipeline, probes) = build_pipeline(&config, SyntheticSource::small(), clean_graph(5)).unwrap();
        let _ = run_for(pipeline, Duration::from_millis(200)).await;

        let source = probes.source.snapshot();
        assert!(source.copies > 0);
        assert_eq!(source.readbacks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flipped_source_requests_flipped_readbacks() {
        let source = SyntheticSource::small().flipped();
        let (pipeline, probes) = build_pipeline(&PipelineConfig::default(), source, clean_graph(6)).unwrap();
        let _ = run_for(pipeline, Duration::from_millis(200)).await;

        let source = probes.source.snapshot();
        assert!(source.readbacks > 0);
        assert_eq!(source.flipped_readbacks, source.readbacks);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_exhaustion_waits_for_buffers() {
        let (mut pipeline, probes) =
            build_pipeline(&PipelineConfig::default(), SyntheticSource::small(), clean_graph(7)).unwrap();
        probes.pool.set_starved(true);

        let handle = pipeline.handle();
        let task = tokio::spawn(async move {
            let result = pipeline.run().await;
            (pipeline, result)
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(probes.graph.snapshot().submitted, 0);

        probes.pool.set_starved(false);
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.stop();

        let (pipeline, result) = task.await.unwrap();
        assert!(result.is_ok());
        assert!(pipeline.stats().pool_waits >= 10);
        assert!(probes.graph.snapshot().submitted > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_failure_is_fatal() {
        let source = SyntheticSource::small().failing_prepare();
        let (pipeline, probes) = build_pipeline(&PipelineConfig::default(), source, clean_graph(8)).unwrap();
        let (_, result) = run_for(pipeline, FRAME).await;

        assert!(matches!(result, Err(SpatiaError::SourceNotPrepared(_))));
        assert_eq!(probes.graph.snapshot().started, 0);
        let pool = probes.pool.snapshot();
        assert_eq!(pool.allocations, 0);
        assert_eq!(pool.release_all_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_graph_start_failure_releases_pool() {
        let graph = clean_graph(9).failing_start("model missing");
        let (pipeline, probes) = build_pipeline(&PipelineConfig::default(), SyntheticSource::small(), graph).unwrap();
        let (_, result) = run_for(pipeline, FRAME).await;

        assert!(matches!(result, Err(SpatiaError::GraphInit(_))));
        let pool = probes.pool.snapshot();
        assert_eq!(pool.allocations, 1);
        assert_eq!(pool.release_all_calls, 1);
        assert!(probes.sink.all_frames().iter().all(|f| !f.visible));
    }

    #[tokio::test(start_paused = true)]
    async fn test_graph_close_ends_session() {
        let graph = clean_graph(10).closing_after(5);
        let (pipeline, probes) = build_pipeline(&PipelineConfig::default(), SyntheticSource::small(), graph).unwrap();
        let (pipeline, result) = run_for(pipeline, Duration::from_millis(500)).await;

        assert!(matches!(result, Err(SpatiaError::GraphClosed)));
        assert_eq!(pipeline.stats().results_dispatched, 5 * 4);
        assert_eq!(probes.pool.snapshot().release_all_calls, 1);
        assert!(!probes.sink.last_frame(StreamKind::Body).unwrap().visible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_halts_acquisition() {
        let (mut pipeline, probes) =
            build_pipeline(&PipelineConfig::default(), SyntheticSource::small(), clean_graph(11)).unwrap();
        let handle = pipeline.handle();
        let task = tokio::spawn(async move {
            let result = pipeline.run().await;
            (pipeline, result)
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.pause();
        tokio::time::sleep(FRAME * 2).await;
        let paused_at = probes.graph.snapshot().submitted;

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(probes.graph.snapshot().submitted, paused_at);
        // paused time does not count toward the hide delay
        assert!(probes.sink.last_frame(StreamKind::Body).unwrap().visible);

        handle.resume();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(probes.graph.snapshot().submitted > paused_at);
        assert!(probes.sink.last_frame(StreamKind::Body).unwrap().visible);

        handle.stop();
        handle.stop();
        let (_, result) = task.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let (pipeline, probes) =
            build_pipeline(&PipelineConfig::default(), SyntheticSource::small(), clean_graph(12)).unwrap();
        let (pipeline, first) = run_for(pipeline, Duration::from_millis(100)).await;
        assert!(first.is_ok());
        pipeline.handle().stop();

        probes.sink.clear();
        let (_, second) = run_for(pipeline, Duration::from_millis(100)).await;
        assert!(second.is_ok());
        assert_eq!(probes.graph.snapshot().started, 2);
        assert_eq!(probes.pool.snapshot().release_all_calls, 2);

        let body = probes.sink.frames(StreamKind::Body);
        assert!(body.first().unwrap().visible);
        assert_eq!(probes.sink.anchor_visibility(), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_streams_never_presented() {
        let mut config = PipelineConfig::default();
        config.streams.body.enabled = false;
        config.streams.face_anchor.enabled = false;
        let (pipeline, probes) = build_pipeline(&config, SyntheticSource::small(), clean_graph(13)).unwrap();
        assert_eq!(
            pipeline.stream_kinds(),
            vec![StreamKind::LeftHand, StreamKind::RightHand]
        );

        let _ = run_for(pipeline, Duration::from_millis(200)).await;
        assert!(probes.sink.frames(StreamKind::Body).is_empty());
        assert!(probes.sink.anchor_visibility().is_empty());
        assert!(!probes.sink.frames(StreamKind::LeftHand).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flaky_session_invariants() {
        let mut config = PipelineConfig::default();
        config.streams.face_contour.enabled = true;
        let mut generator = LandmarkGenerator::with_seed(DropoutConfig::hostile(), 99);
        let graph = ScriptedGraph::new(move |frame_id| generator.holistic(frame_id));
        let (pipeline, probes) = build_pipeline(&config, SyntheticSource::small(), graph).unwrap();

        let _ = run_for(pipeline, Duration::from_secs(3)).await;

        let frames = probes.sink.all_frames();
        assert!(!frames.is_empty());
        for frame in &frames {
            assert_frame_invariants(frame);
        }

        // edge triggered: never the same visibility twice in a row
        let calls = probes.sink.anchor_visibility();
        assert!(calls.windows(2).all(|w| w[0] != w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_readbacks_return_buffers() {
        let mut config = PipelineConfig::default();
        config.dispatch.pool_capacity = 3;
        let source = SyntheticSource::small().dropping_readbacks();
        let (mut pipeline, probes) = build_pipeline(&config, source, clean_graph(14)).unwrap();

        let handle = pipeline.handle();
        let task = tokio::spawn(async move {
            let result = pipeline.run().await;
            (pipeline, result)
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        let pool = probes.pool.snapshot();
        handle.stop();
        let (pipeline, result) = task.await.unwrap();
        assert!(result.is_ok());

        // every buffer came back while the session was still running
        assert_eq!(pool.in_flight, 0);
        assert_eq!(pool.acquired, pool.released);
        let stats = pipeline.stats();
        assert!(stats.readback_failures > 3);
        assert_eq!(stats.pool_waits, 0);
        assert_eq!(stats.frames_submitted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_during_slow_inference_keeps_results_current() {
        let graph = clean_graph(15).with_latency(Duration::from_millis(5));
        let (mut pipeline, probes) =
            build_pipeline(&PipelineConfig::default(), SyntheticSource::small(), graph).unwrap();
        let handle = pipeline.handle();
        let task = tokio::spawn(async move {
            let result = pipeline.run().await;
            (pipeline, result)
        });

        // iterations take 5ms of inference plus a 16ms frame, so 44ms falls
        // inside the wait for the third result
        tokio::time::sleep(Duration::from_millis(44)).await;
        handle.pause();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.resume();
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.stop();

        let (pipeline, result) = task.await.unwrap();
        assert!(result.is_ok());
        let graph = probes.graph.snapshot();
        assert!(graph.submitted > 10);
        assert_eq!(graph.max_queued, 0);
        assert!(pipeline.stats().results_dispatched >= 4 * (graph.submitted - 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_surface_keeps_streams_hidden() {
        let (pipeline, probes) = build_pipeline_in(
            &PipelineConfig::default(),
            SyntheticSource::small(),
            clean_graph(16),
            Arc::new(EmptyEnvironment),
        )
        .unwrap();
        let (pipeline, result) = run_for(pipeline, Duration::from_millis(200)).await;
        assert!(result.is_ok());

        assert!(pipeline.stats().results_dispatched > 0);
        let frames = probes.sink.all_frames();
        assert!(!frames.is_empty());
        assert!(frames.iter().all(|f| !f.visible && f.active_points() == 0));
        assert!(probes.sink.anchor_visibility().is_empty());
    }
}
