//! SPATIA Runtime - Frame dispatch and session orchestration
//!
//! Each loop iteration:
//! 1. Advance the frame clock and tick every stream
//! 2. Acquire a buffer from the frame pool (wait a frame boundary if none)
//! 3. Capture the current source image (device copy or async readback)
//! 4. Submit the buffer to the inference graph
//! 5. Route results through projector, stabilizers and render sink
//! 6. Release per-frame resources

pub mod config;
pub mod logging;
pub mod source;
pub mod clock;
pub mod lane;
pub mod dispatch;

pub use config::*;
pub use logging::*;
pub use source::*;
pub use clock::*;
pub use lane::*;
pub use dispatch::*;
