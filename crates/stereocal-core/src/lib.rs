//! Core types for `stereocal-rs`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...),
//! - the pinhole camera model (intrinsics + Brown-Conrady distortion),
//! - calibration pattern geometry and canonical object points,
//! - observation types and the append-only observation store.
//!
//! Camera pipeline: `pixel = K ∘ distortion ∘ projection(point)`

/// Linear algebra type aliases and helpers.
pub mod math;
/// Pinhole camera model with Brown-Conrady distortion.
pub mod models;
/// Observation types and the pattern observation store.
pub mod observation;
/// Calibration pattern geometry.
pub mod pattern;
/// Left/right camera addressing.
pub mod side;

pub use math::*;
pub use models::*;
pub use observation::*;
pub use pattern::*;
pub use side::*;
