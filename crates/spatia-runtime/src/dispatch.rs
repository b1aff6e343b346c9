//! Frame dispatch loop
//!
//! A single cooperative loop drives acquisition, capture and submission. Its
//! only suspension points are the frame-boundary wait, the readback wait and
//! the wait for the graph's next result. In asynchronous mode each landmark
//! source is drained by its own task; the task is the only writer of its
//! lane, so updates to one stream never race.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use spatia_core::{LandmarkSource, SpatiaError, SpatiaResult, StreamKind};
use spatia_project::{EnvironmentRaycast, SpatialProjector};
use spatia_stabilize::RenderSink;
use spatia_time::{Clock, FrameClock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::{
    build_lanes, CapturePath, DispatchConfig, FrameBuffer, FramePool, FrameSource, GraphOutputs,
    HolisticResult, InferenceGraph, LandmarkPacket, LaneUpdate, PipelineConfig, SourceInfo,
    SourceLane,
};

/// Consecutive pool misses before a warning is logged
const POOL_STARVATION_WARN: u64 = 120;

/// Run state shared between the loop and its handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    Stopped,
}

/// Control handle for a running loop. Every command is idempotent.
#[derive(Clone)]
pub struct RunHandle {
    state: Arc<watch::Sender<RunState>>,
}

impl RunHandle {
    pub fn pause(&self) {
        self.transition(RunState::Running, RunState::Paused);
    }

    pub fn resume(&self) {
        self.transition(RunState::Paused, RunState::Running);
    }

    pub fn stop(&self) {
        self.state.send_if_modified(|state| {
            let changed = *state != RunState::Stopped;
            *state = RunState::Stopped;
            changed
        });
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    fn transition(&self, from: RunState, to: RunState) {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
    }
}

/// Loop counters
#[derive(Clone, Debug, Default)]
pub struct DispatchStats {
    pub iterations: u64,
    pub frames_acquired: u64,
    pub pool_waits: u64,
    pub readback_failures: u64,
    pub frames_submitted: u64,
    pub submit_failures: u64,
    /// Landmark lists routed into a lane
    pub results_dispatched: u64,
    pub out_of_order_dropped: u64,
    pub masks_released: u64,
    pub last_iteration_duration: Duration,
}

/// Everything the loop needs from the outside world
pub struct PipelineParts {
    pub source: Box<dyn FrameSource>,
    pub pool: Box<dyn FramePool>,
    pub graph: Box<dyn InferenceGraph>,
    pub environment: Arc<dyn EnvironmentRaycast>,
    pub sink: Arc<dyn RenderSink>,
    pub clock: Arc<dyn Clock>,
}

/// Per-frame driver from camera to render sink
pub struct FrameDispatchLoop {
    dispatch: DispatchConfig,
    source: Box<dyn FrameSource>,
    pool: Box<dyn FramePool>,
    graph: Box<dyn InferenceGraph>,
    sink: Arc<dyn RenderSink>,
    lanes: Vec<Arc<Mutex<SourceLane>>>,
    frame_clock: FrameClock,
    state_tx: Arc<watch::Sender<RunState>>,
    state_rx: watch::Receiver<RunState>,
    stats: Arc<Mutex<DispatchStats>>,
    tasks: Vec<JoinHandle<()>>,
    source_info: Option<SourceInfo>,
    next_frame_id: u64,
    pool_miss_streak: u64,
    finished: bool,
}

impl FrameDispatchLoop {
    pub fn new(config: &PipelineConfig, parts: PipelineParts) -> SpatiaResult<Self> {
        config.validate()?;

        let projector = Arc::new(SpatialProjector::new(
            config.projection.camera,
            config.projection.reference_width,
            config.projection.reference_height,
            parts.environment,
        ));
        let lanes = build_lanes(config, projector)
            .into_iter()
            .map(|lane| Arc::new(Mutex::new(lane)))
            .collect();
        let (state_tx, state_rx) = watch::channel(RunState::Running);

        Ok(Self {
            dispatch: config.dispatch.clone(),
            source: parts.source,
            pool: parts.pool,
            graph: parts.graph,
            sink: parts.sink,
            lanes,
            frame_clock: FrameClock::new(parts.clock),
            state_tx: Arc::new(state_tx),
            state_rx,
            stats: Arc::new(Mutex::new(DispatchStats::default())),
            tasks: Vec::new(),
            source_info: None,
            next_frame_id: 0,
            pool_miss_streak: 0,
            finished: false,
        })
    }

    pub fn handle(&self) -> RunHandle {
        RunHandle {
            state: self.state_tx.clone(),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats.lock().clone()
    }

    /// Streams with a live stabilizer, in dispatch order
    pub fn stream_kinds(&self) -> Vec<StreamKind> {
        self.lanes
            .iter()
            .flat_map(|lane| lane.lock().stream_kinds())
            .collect()
    }

    pub fn source_info(&self) -> Option<SourceInfo> {
        self.source_info
    }

    /// Run one tracking session until stopped.
    ///
    /// Initialization failures are returned after every acquired resource has
    /// been released. Running again after a stop starts a fresh session.
    pub async fn run(&mut self) -> SpatiaResult<()> {
        if self.finished {
            self.state_tx.send_replace(RunState::Running);
            self.finished = false;
        }
        for lane in &self.lanes {
            lane.lock().reset();
        }

        let result = self.run_session().await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "tracking session failed");
        }
        self.shutdown();
        result
    }

    async fn run_session(&mut self) -> SpatiaResult<()> {
        let info = self.source.prepare()?;
        self.source_info = Some(info);
        self.pool
            .allocate(info.width, info.height, self.dispatch.pool_capacity);

        let mut results = match self.graph.start(self.dispatch.mode)? {
            GraphOutputs::Synchronous(rx) => Some(rx),
            GraphOutputs::Streams(streams) => {
                self.spawn_stream_tasks(streams);
                None
            }
        };

        tracing::info!(
            mode = ?self.dispatch.mode,
            capture = ?self.dispatch.capture_path,
            width = info.width,
            height = info.height,
            lanes = self.lanes.len(),
            "tracking session started"
        );

        self.frame_clock.resync();
        loop {
            let state = *self.state_rx.borrow_and_update();
            match state {
                RunState::Stopped => break,
                RunState::Paused => {
                    if self.state_rx.changed().await.is_err() {
                        break;
                    }
                    self.frame_clock.resync();
                    continue;
                }
                RunState::Running => {}
            }

            let started = Instant::now();
            let synchronous = results.is_some();
            self.step(&mut results).await?;
            if synchronous {
                self.present_lanes();
            }
            {
                let mut stats = self.stats.lock();
                stats.iterations += 1;
                stats.last_iteration_duration = started.elapsed();
            }

            self.wait_frame_boundary().await;
        }

        Ok(())
    }

    /// One loop iteration. Recoverable failures skip the rest of it and the
    /// frame is retried after the next boundary.
    async fn step(
        &mut self,
        results: &mut Option<mpsc::Receiver<HolisticResult>>,
    ) -> SpatiaResult<()> {
        let dt = self.frame_clock.tick();
        self.tick_lanes(dt, results.is_none());

        let Some(frame) = self.acquire() else {
            return Ok(());
        };
        let Some(frame) = self.capture(frame).await else {
            return Ok(());
        };

        let frame_id = self.next_frame_id;
        self.next_frame_id += 1;
        let submitted = self.graph.submit(frame_id, &frame);
        self.pool.release(frame);
        match submitted {
            Ok(()) => self.stats.lock().frames_submitted += 1,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, frame_id, "frame submission failed");
                self.stats.lock().submit_failures += 1;
                return Ok(());
            }
        }

        // Async results arrive on the stream tasks
        let Some(rx) = results else {
            return Ok(());
        };
        // A pause lets the in-flight result land first; only a stop abandons it
        let received = loop {
            tokio::select! {
                received = rx.recv() => break received,
                changed = self.state_rx.changed() => {
                    if changed.is_err() || *self.state_rx.borrow() == RunState::Stopped {
                        return Ok(());
                    }
                }
            }
        };
        match received {
            Some(result) => {
                self.dispatch_result(result);
                Ok(())
            }
            None => Err(SpatiaError::GraphClosed),
        }
    }

    fn acquire(&mut self) -> Option<FrameBuffer> {
        if let Some(frame) = self.pool.try_acquire() {
            self.pool_miss_streak = 0;
            self.stats.lock().frames_acquired += 1;
            return Some(frame);
        }

        self.pool_miss_streak += 1;
        self.stats.lock().pool_waits += 1;
        if self.pool_miss_streak == POOL_STARVATION_WARN {
            tracing::warn!(
                frames = self.pool_miss_streak,
                capacity = self.dispatch.pool_capacity,
                "{}",
                SpatiaError::PoolExhausted
            );
        } else {
            tracing::trace!("no free frame buffer, waiting for next frame");
        }
        None
    }

    async fn capture(&mut self, mut frame: FrameBuffer) -> Option<FrameBuffer> {
        let path = self.dispatch.capture_path;
        let failure = match path {
            CapturePath::DeviceCopy => match self.source.copy_to(&mut frame) {
                Ok(()) => return Some(frame),
                Err(e) => e,
            },
            CapturePath::Readback => {
                let flip = self.source_info.map_or(false, |info| info.vertically_flipped);
                let pending = self.source.request_readback(&frame, flip);
                match pending.await {
                    Ok(Ok(pixels)) if pixels.len() == frame.data.len() => {
                        frame.data = pixels;
                        return Some(frame);
                    }
                    Ok(Ok(pixels)) => SpatiaError::Readback(format!(
                        "readback returned {} bytes, expected {}",
                        pixels.len(),
                        frame.data.len()
                    )),
                    Ok(Err(e)) => e,
                    Err(_) => SpatiaError::Readback("readback request dropped".into()),
                }
            }
        };

        self.pool.release(frame);
        tracing::warn!(error = %failure, "frame capture failed, skipping frame");
        self.stats.lock().readback_failures += 1;
        None
    }

    fn dispatch_result(&mut self, mut result: HolisticResult) {
        {
            let mut stats = self.stats.lock();
            for lane in &self.lanes {
                let mut lane = lane.lock();
                let landmarks = result.landmarks(lane.source());
                match lane.apply(result.frame_id, landmarks) {
                    LaneUpdate::Dispatched => stats.results_dispatched += 1,
                    LaneUpdate::OutOfOrder => stats.out_of_order_dropped += 1,
                }
            }
        }

        if let Some(mask) = result.segmentation_mask.take() {
            self.graph.release_mask(mask);
            self.stats.lock().masks_released += 1;
        }
    }

    fn spawn_stream_tasks(&mut self, streams: Vec<(LandmarkSource, mpsc::Receiver<LandmarkPacket>)>) {
        for (source, mut rx) in streams {
            let Some(lane) = self
                .lanes
                .iter()
                .find(|lane| lane.lock().source() == source)
                .cloned()
            else {
                tracing::debug!(source = source.name(), "no lane for landmark stream, ignoring it");
                continue;
            };
            let sink = self.sink.clone();
            let stats = self.stats.clone();

            self.tasks.push(tokio::spawn(async move {
                while let Some(packet) = rx.recv().await {
                    let update = {
                        let mut lane = lane.lock();
                        let update = lane.apply(packet.frame_id, packet.landmarks.as_deref());
                        lane.present(sink.as_ref());
                        update
                    };
                    let mut stats = stats.lock();
                    match update {
                        LaneUpdate::Dispatched => stats.results_dispatched += 1,
                        LaneUpdate::OutOfOrder => stats.out_of_order_dropped += 1,
                    }
                }
                tracing::debug!(source = source.name(), "landmark stream closed");
            }));
        }
    }

    fn tick_lanes(&mut self, dt: Duration, present: bool) {
        for lane in &self.lanes {
            let mut lane = lane.lock();
            lane.tick(dt);
            if present {
                lane.present(self.sink.as_ref());
            }
        }
    }

    fn present_lanes(&mut self) {
        for lane in &self.lanes {
            lane.lock().present(self.sink.as_ref());
        }
    }

    /// Wait for the next frame boundary; a state change cuts the wait short
    async fn wait_frame_boundary(&mut self) {
        let interval = self.dispatch.frame_interval;
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = self.state_rx.changed() => {}
        }
    }

    /// Release everything the session holds. Safe to call more than once.
    fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.graph.stop();
        for lane in &self.lanes {
            lane.lock().dispose(self.sink.as_ref());
        }
        self.pool.release_all();
        self.state_tx.send_replace(RunState::Stopped);
        self.finished = true;

        let stats = self.stats.lock();
        tracing::info!(
            iterations = stats.iterations,
            submitted = stats.frames_submitted,
            dispatched = stats.results_dispatched,
            readback_failures = stats.readback_failures,
            "tracking session stopped"
        );
    }
}

impl Drop for FrameDispatchLoop {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (RunHandle, watch::Receiver<RunState>) {
        let (tx, rx) = watch::channel(RunState::Running);
        (RunHandle { state: Arc::new(tx) }, rx)
    }

    #[test]
    fn test_pause_resume() {
        let (handle, _rx) = handle();
        handle.pause();
        assert_eq!(handle.state(), RunState::Paused);
        handle.resume();
        assert_eq!(handle.state(), RunState::Running);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (handle, mut rx) = handle();
        rx.borrow_and_update();

        handle.stop();
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        handle.stop();
        assert!(!rx.has_changed().unwrap());
        assert_eq!(handle.state(), RunState::Stopped);
    }

    #[test]
    fn test_stopped_loop_ignores_pause_and_resume() {
        let (handle, _rx) = handle();
        handle.stop();
        handle.pause();
        handle.resume();
        assert_eq!(handle.state(), RunState::Stopped);
    }

    #[test]
    fn test_resume_without_pause_is_noop() {
        let (handle, mut rx) = handle();
        rx.borrow_and_update();
        handle.resume();
        assert!(!rx.has_changed().unwrap());
    }
}
