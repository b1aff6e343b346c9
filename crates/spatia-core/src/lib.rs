//! SPATIA Core - Fundamental types and primitives
//!
//! This crate defines the core types used throughout the SPATIA pipeline:
//! - Geometry (Vec3, Quat)
//! - Landmarks and the single validity predicate
//! - Landmark sources and render streams
//! - Session time
//! - Error taxonomy

pub mod geometry;
pub mod landmark;
pub mod stream;
pub mod time;
pub mod error;

pub use geometry::*;
pub use landmark::*;
pub use stream::*;
pub use time::*;
pub use error::*;
