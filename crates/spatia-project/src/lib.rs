//! SPATIA Projection - normalized 2D landmarks to world-space points
//!
//! A landmark's normalized image coordinate is mapped onto the reference
//! camera's screen, turned into a world ray from the reference eye, and cast
//! against the environment depth surface. A miss is a distinct outcome, never
//! a point at the origin.

pub mod camera;
pub mod raycast;
pub mod projector;

pub use camera::*;
pub use raycast::*;
pub use projector::*;
