//! External collaborators of the frame loop
//!
//! The camera source, the frame pool and the inference graph live outside
//! this crate. The loop only talks to them through these traits.

use spatia_core::{LandmarkSource, NormalizedLandmark, SpatiaResult};
use tokio::sync::{mpsc, oneshot};

use crate::DispatchMode;

/// A reusable RGBA image buffer owned by a [`FramePool`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    /// Pool slot id
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(id: u64, width: u32, height: u32) -> Self {
        Self {
            id,
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }
}

/// Bounded set of reusable frame buffers
pub trait FramePool: Send {
    /// (Re)create the buffers for the prepared source dimensions
    fn allocate(&mut self, width: u32, height: u32, capacity: usize);

    /// A free buffer, or `None` if every buffer is in flight
    fn try_acquire(&mut self) -> Option<FrameBuffer>;

    /// Return a buffer taken with [`FramePool::try_acquire`]
    fn release(&mut self, frame: FrameBuffer);

    /// Drop every buffer
    fn release_all(&mut self);
}

/// What a prepared source reports about its images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    /// Readbacks must flip the image vertically
    pub vertically_flipped: bool,
}

/// Pixels of a completed readback, packed like [`FrameBuffer::data`]
pub type Readback = SpatiaResult<Vec<u8>>;

/// Camera or video source
pub trait FrameSource: Send {
    fn prepare(&mut self) -> SpatiaResult<SourceInfo>;

    /// Direct on-device copy into `frame`
    fn copy_to(&mut self, frame: &mut FrameBuffer) -> SpatiaResult<()>;

    /// Start an asynchronous readback sized for `frame`. The caller keeps the
    /// buffer; dropping the sender counts as a failed readback.
    fn request_readback(&mut self, frame: &FrameBuffer, flip_vertically: bool) -> oneshot::Receiver<Readback>;
}

/// Per-frame segmentation mask. Dropped as soon as its frame is dispatched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentationMask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

/// Combined result for one submitted frame (synchronous mode)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HolisticResult {
    pub frame_id: u64,
    pub pose: Option<Vec<NormalizedLandmark>>,
    pub left_hand: Option<Vec<NormalizedLandmark>>,
    pub right_hand: Option<Vec<NormalizedLandmark>>,
    pub face: Option<Vec<NormalizedLandmark>>,
    pub segmentation_mask: Option<SegmentationMask>,
}

impl HolisticResult {
    pub fn landmarks(&self, source: LandmarkSource) -> Option<&[NormalizedLandmark]> {
        match source {
            LandmarkSource::Pose => self.pose.as_deref(),
            LandmarkSource::LeftHand => self.left_hand.as_deref(),
            LandmarkSource::RightHand => self.right_hand.as_deref(),
            LandmarkSource::Face => self.face.as_deref(),
        }
    }
}

/// One landmark list delivered on its own (asynchronous mode)
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkPacket {
    /// Id of the frame the list was computed from
    pub frame_id: u64,
    pub landmarks: Option<Vec<NormalizedLandmark>>,
}

/// Result channels handed out by a started graph
#[derive(Debug)]
pub enum GraphOutputs {
    Synchronous(mpsc::Receiver<HolisticResult>),
    Streams(Vec<(LandmarkSource, mpsc::Receiver<LandmarkPacket>)>),
}

/// Pose-estimation graph
pub trait InferenceGraph: Send {
    /// Start the graph; the output shape follows `mode`
    fn start(&mut self, mode: DispatchMode) -> SpatiaResult<GraphOutputs>;

    /// Feed one captured frame. The graph copies what it needs.
    fn submit(&mut self, frame_id: u64, frame: &FrameBuffer) -> SpatiaResult<()>;

    /// Release a mask once its frame has been dispatched
    fn release_mask(&mut self, mask: SegmentationMask) {
        drop(mask);
    }

    /// Stop the graph and close its outputs. Must tolerate repeated calls.
    fn stop(&mut self);
}
