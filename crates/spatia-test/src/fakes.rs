//! Fakes for the pipeline's external collaborators
//!
//! Each fake that ends up boxed inside the frame loop hands out a cloneable
//! probe so tests can watch it from outside.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use spatia_core::{LandmarkSource, Quat, SpatiaError, SpatiaResult, StreamKind, Vec3};
use spatia_project::{EnvironmentRaycast, Ray, RaycastHit};
use spatia_runtime::{
    DispatchMode, FrameBuffer, FramePool, FrameSource, GraphOutputs, HolisticResult,
    InferenceGraph, LandmarkPacket, Readback, SegmentationMask, SourceInfo,
};
use spatia_stabilize::{RenderSink, StreamFrame};
use tokio::sync::{mpsc, oneshot};

/// Capacity of each simulated graph output channel
const RESULT_BUFFER: usize = 16;

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// Square wall facing the camera at `z = distance`
pub struct PlaneEnvironment {
    distance: f32,
    half_extent: f32,
}

impl PlaneEnvironment {
    pub fn new(distance: f32, half_extent: f32) -> Self {
        Self {
            distance,
            half_extent,
        }
    }

    /// 2x2 wall two units in front of the origin
    pub fn wall() -> Self {
        Self::new(2.0, 1.0)
    }
}

impl EnvironmentRaycast for PlaneEnvironment {
    fn raycast(&self, ray: &Ray) -> Option<RaycastHit> {
        if ray.direction.z <= f32::EPSILON {
            return None;
        }
        let t = (self.distance - ray.origin.z) / ray.direction.z;
        if t <= 0.0 {
            return None;
        }
        let point = ray.point_at(t);
        if point.x.abs() > self.half_extent || point.y.abs() > self.half_extent {
            return None;
        }
        Some(RaycastHit { point, distance: t })
    }
}

/// Environment with no surfaces at all
pub struct EmptyEnvironment;

impl EnvironmentRaycast for EmptyEnvironment {
    fn raycast(&self, _ray: &Ray) -> Option<RaycastHit> {
        None
    }
}

// ============================================================================
// FRAME POOL
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct PoolState {
    pub width: u32,
    pub height: u32,
    pub capacity: usize,
    pub allocations: u32,
    pub acquired: u64,
    pub released: u64,
    pub in_flight: usize,
    pub release_all_calls: u32,
    /// Pretend every buffer is in use
    pub starved: bool,
}

#[derive(Clone)]
pub struct PoolProbe {
    state: Arc<Mutex<PoolState>>,
}

impl PoolProbe {
    pub fn snapshot(&self) -> PoolState {
        self.state.lock().clone()
    }

    pub fn set_starved(&self, starved: bool) {
        self.state.lock().starved = starved;
    }
}

/// Fixed set of buffers kept in a Vec
#[derive(Default)]
pub struct VecFramePool {
    free: Vec<FrameBuffer>,
    state: Arc<Mutex<PoolState>>,
}

impl VecFramePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> PoolProbe {
        PoolProbe {
            state: self.state.clone(),
        }
    }
}

impl FramePool for VecFramePool {
    fn allocate(&mut self, width: u32, height: u32, capacity: usize) {
        self.free = (0..capacity)
            .map(|id| FrameBuffer::new(id as u64, width, height))
            .collect();

        let mut state = self.state.lock();
        state.width = width;
        state.height = height;
        state.capacity = capacity;
        state.allocations += 1;
        state.in_flight = 0;
    }

    fn try_acquire(&mut self) -> Option<FrameBuffer> {
        let mut state = self.state.lock();
        if state.starved {
            return None;
        }
        let frame = self.free.pop()?;
        state.acquired += 1;
        state.in_flight += 1;
        Some(frame)
    }

    fn release(&mut self, frame: FrameBuffer) {
        let mut state = self.state.lock();
        state.released += 1;
        state.in_flight = state.in_flight.saturating_sub(1);
        self.free.push(frame);
    }

    fn release_all(&mut self) {
        self.free.clear();
        let mut state = self.state.lock();
        state.in_flight = 0;
        state.release_all_calls += 1;
    }
}

// ============================================================================
// IMAGE SOURCE
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct SourceState {
    pub prepared: u32,
    pub copies: u64,
    pub readbacks: u64,
    pub failed_captures: u64,
    pub flipped_readbacks: u64,
}

#[derive(Clone)]
pub struct SourceProbe {
    state: Arc<Mutex<SourceState>>,
}

impl SourceProbe {
    pub fn snapshot(&self) -> SourceState {
        self.state.lock().clone()
    }
}

/// Camera stand-in producing blank images
pub struct SyntheticSource {
    info: SourceInfo,
    fail_prepare: bool,
    /// Every n-th capture fails
    fail_every: Option<u64>,
    /// Readback senders are dropped without an answer
    drop_readbacks: bool,
    state: Arc<Mutex<SourceState>>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            info: SourceInfo {
                width,
                height,
                vertically_flipped: false,
            },
            fail_prepare: false,
            fail_every: None,
            drop_readbacks: false,
            state: Arc::new(Mutex::new(SourceState::default())),
        }
    }

    /// Small images keep the pool cheap
    pub fn small() -> Self {
        Self::new(64, 48)
    }

    pub fn flipped(mut self) -> Self {
        self.info.vertically_flipped = true;
        self
    }

    pub fn failing_prepare(mut self) -> Self {
        self.fail_prepare = true;
        self
    }

    pub fn with_capture_failures(mut self, every: u64) -> Self {
        self.fail_every = Some(every.max(1));
        self
    }

    /// Readbacks never complete; their senders are dropped
    pub fn dropping_readbacks(mut self) -> Self {
        self.drop_readbacks = true;
        self
    }

    pub fn probe(&self) -> SourceProbe {
        SourceProbe {
            state: self.state.clone(),
        }
    }

    fn capture_result(&self, capture: u64) -> SpatiaResult<()> {
        match self.fail_every {
            Some(every) if capture % every == 0 => {
                self.state.lock().failed_captures += 1;
                Err(SpatiaError::Readback(format!("capture {capture} failed")))
            }
            _ => Ok(()),
        }
    }
}

impl FrameSource for SyntheticSource {
    fn prepare(&mut self) -> SpatiaResult<SourceInfo> {
        if self.fail_prepare {
            return Err(SpatiaError::SourceNotPrepared("camera unavailable".into()));
        }
        self.state.lock().prepared += 1;
        Ok(self.info)
    }

    fn copy_to(&mut self, frame: &mut FrameBuffer) -> SpatiaResult<()> {
        let capture = {
            let mut state = self.state.lock();
            state.copies += 1;
            state.copies
        };
        if let Some(byte) = frame.data.first_mut() {
            *byte = capture as u8;
        }
        self.capture_result(capture)
    }

    fn request_readback(&mut self, frame: &FrameBuffer, flip_vertically: bool) -> oneshot::Receiver<Readback> {
        let capture = {
            let mut state = self.state.lock();
            state.readbacks += 1;
            if flip_vertically {
                state.flipped_readbacks += 1;
            }
            state.readbacks
        };
        let (tx, rx) = oneshot::channel();
        if self.drop_readbacks {
            self.state.lock().failed_captures += 1;
            drop(tx);
            return rx;
        }
        let pixels = self
            .capture_result(capture)
            .map(|()| vec![capture as u8; frame.data.len()]);
        let _ = tx.send(pixels);
        rx
    }
}

// ============================================================================
// INFERENCE GRAPH
// ============================================================================

/// Produces the graph's answer for a submitted frame id
pub type Script = Box<dyn FnMut(u64) -> HolisticResult + Send>;

#[derive(Debug, Default, Clone)]
pub struct GraphState {
    pub started: u32,
    pub mode: Option<DispatchMode>,
    pub submitted: u64,
    pub last_frame_id: Option<u64>,
    pub masks_released: u64,
    pub stops: u32,
    /// Most synchronous results seen waiting in the channel at a submit
    pub max_queued: usize,
}

#[derive(Clone)]
pub struct GraphProbe {
    state: Arc<Mutex<GraphState>>,
}

impl GraphProbe {
    pub fn snapshot(&self) -> GraphState {
        self.state.lock().clone()
    }
}

/// Inference graph answering every submitted frame from a script
pub struct ScriptedGraph {
    script: Script,
    start_error: Option<String>,
    close_after: Option<u64>,
    latency: Option<Duration>,
    sync_tx: Option<mpsc::Sender<HolisticResult>>,
    stream_tx: Vec<(LandmarkSource, mpsc::Sender<LandmarkPacket>)>,
    state: Arc<Mutex<GraphState>>,
}

impl ScriptedGraph {
    pub fn new(script: impl FnMut(u64) -> HolisticResult + Send + 'static) -> Self {
        Self {
            script: Box::new(script),
            start_error: None,
            close_after: None,
            latency: None,
            sync_tx: None,
            stream_tx: Vec::new(),
            state: Arc::new(Mutex::new(GraphState::default())),
        }
    }

    /// Graph whose every frame carries no landmarks
    pub fn silent() -> Self {
        Self::new(|frame_id| HolisticResult {
            frame_id,
            ..HolisticResult::default()
        })
    }

    pub fn failing_start(mut self, message: &str) -> Self {
        self.start_error = Some(message.to_string());
        self
    }

    /// Close every output after `frames` submissions
    pub fn closing_after(mut self, frames: u64) -> Self {
        self.close_after = Some(frames);
        self
    }

    /// Answer each frame `latency` after it was submitted (needs a tokio runtime)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn probe(&self) -> GraphProbe {
        GraphProbe {
            state: self.state.clone(),
        }
    }

    fn is_open(&self) -> bool {
        self.sync_tx.is_some() || !self.stream_tx.is_empty()
    }

    fn close(&mut self) {
        self.sync_tx = None;
        self.stream_tx.clear();
    }

    fn answer_later(&self, latency: Duration, frame_id: u64, result: HolisticResult) {
        let sync_tx = self.sync_tx.clone();
        let stream_tx = self.stream_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            if let Some(tx) = sync_tx {
                let _ = tx.send(result).await;
                return;
            }
            for (source, tx) in stream_tx {
                let _ = tx
                    .send(LandmarkPacket {
                        frame_id,
                        landmarks: result.landmarks(source).map(|l| l.to_vec()),
                    })
                    .await;
            }
        });
    }
}

impl InferenceGraph for ScriptedGraph {
    fn start(&mut self, mode: DispatchMode) -> SpatiaResult<GraphOutputs> {
        if let Some(message) = &self.start_error {
            return Err(SpatiaError::GraphInit(message.clone()));
        }
        {
            let mut state = self.state.lock();
            state.started += 1;
            state.mode = Some(mode);
        }

        match mode {
            DispatchMode::Sync => {
                let (tx, rx) = mpsc::channel(RESULT_BUFFER);
                self.sync_tx = Some(tx);
                Ok(GraphOutputs::Synchronous(rx))
            }
            DispatchMode::Async => {
                let mut outputs = Vec::new();
                for source in LandmarkSource::ALL {
                    let (tx, rx) = mpsc::channel(RESULT_BUFFER);
                    self.stream_tx.push((source, tx));
                    outputs.push((source, rx));
                }
                Ok(GraphOutputs::Streams(outputs))
            }
        }
    }

    fn submit(&mut self, frame_id: u64, _frame: &FrameBuffer) -> SpatiaResult<()> {
        if !self.is_open() {
            return Err(SpatiaError::GraphClosed);
        }
        let submitted = {
            let mut state = self.state.lock();
            state.submitted += 1;
            state.last_frame_id = Some(frame_id);
            if let Some(tx) = &self.sync_tx {
                state.max_queued = state.max_queued.max(tx.max_capacity() - tx.capacity());
            }
            state.submitted
        };
        if self.close_after.map_or(false, |limit| submitted > limit) {
            self.close();
            return Ok(());
        }

        let result = (self.script)(frame_id);
        if let Some(latency) = self.latency {
            self.answer_later(latency, frame_id, result);
            return Ok(());
        }
        if let Some(tx) = &self.sync_tx {
            return tx.try_send(result).map_err(|_| SpatiaError::GraphClosed);
        }
        for (source, tx) in &self.stream_tx {
            let _ = tx.try_send(LandmarkPacket {
                frame_id,
                landmarks: result.landmarks(*source).map(|l| l.to_vec()),
            });
        }
        Ok(())
    }

    fn release_mask(&mut self, mask: SegmentationMask) {
        drop(mask);
        self.state.lock().masks_released += 1;
    }

    fn stop(&mut self) {
        self.close();
        self.state.lock().stops += 1;
    }
}

// ============================================================================
// RENDER SINK
// ============================================================================

/// Sink that keeps everything it is shown
#[derive(Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<StreamFrame>>,
    anchor_visibility: Mutex<Vec<bool>>,
    anchor_poses: Mutex<Vec<(Vec3, Quat)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_frames(&self) -> Vec<StreamFrame> {
        self.frames.lock().clone()
    }

    pub fn frames(&self, kind: StreamKind) -> Vec<StreamFrame> {
        self.frames
            .lock()
            .iter()
            .filter(|f| f.kind == kind)
            .cloned()
            .collect()
    }

    pub fn last_frame(&self, kind: StreamKind) -> Option<StreamFrame> {
        self.frames.lock().iter().rev().find(|f| f.kind == kind).cloned()
    }

    pub fn anchor_visibility(&self) -> Vec<bool> {
        self.anchor_visibility.lock().clone()
    }

    pub fn anchor_poses(&self) -> Vec<(Vec3, Quat)> {
        self.anchor_poses.lock().clone()
    }

    pub fn clear(&self) {
        self.frames.lock().clear();
        self.anchor_visibility.lock().clear();
        self.anchor_poses.lock().clear();
    }
}

impl RenderSink for RecordingSink {
    fn present(&self, frame: &StreamFrame) {
        self.frames.lock().push(frame.clone());
    }

    fn set_anchor_visible(&self, visible: bool) {
        self.anchor_visibility.lock().push(visible);
    }

    fn set_anchor_pose(&self, position: Vec3, rotation: Quat) {
        self.anchor_poses.lock().push((position, rotation));
    }
}
