//! SPATIA Test Harness - Simulated collaborators and end-to-end checks
//!
//! This crate provides:
//! - Fakes for the environment, frame pool, camera source, inference graph and render sink
//! - A seeded landmark generator with configurable dropouts
//! - End-to-end pipeline tests

pub mod fakes;
pub mod generator;
pub mod integration;

pub use fakes::*;
pub use generator::*;
pub use integration::*;
