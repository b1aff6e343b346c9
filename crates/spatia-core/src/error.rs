//! Error types for the SPATIA pipeline

use thiserror::Error;

use crate::StreamKind;

/// Core SPATIA errors
///
/// Missing data, invalid points and projection misses are not errors: they
/// travel as values and are absorbed by the stabilizers.
#[derive(Error, Debug)]
pub enum SpatiaError {
    // Initialization errors
    #[error("Image source failed to prepare: {0}")]
    SourceNotPrepared(String),

    #[error("Inference graph failed to start: {0}")]
    GraphInit(String),

    #[error("Inference graph closed its output")]
    GraphClosed,

    // Acquisition errors
    #[error("Frame readback failed: {0}")]
    Readback(String),

    #[error("Frame pool exhausted")]
    PoolExhausted,

    // Configuration errors
    #[error("Invalid topology for {stream:?}: index {index} outside {point_count} points")]
    InvalidTopology {
        stream: StreamKind,
        index: usize,
        point_count: usize,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SpatiaError {
    /// Fatal errors end the tracking session; everything else is skipped locally.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SpatiaError::SourceNotPrepared(_)
                | SpatiaError::GraphInit(_)
                | SpatiaError::GraphClosed
                | SpatiaError::InvalidTopology { .. }
                | SpatiaError::Config(_)
        )
    }
}

/// Result type for SPATIA operations
pub type SpatiaResult<T> = Result<T, SpatiaError>;
