//! Core types and geometry for automatic intrinsic camera calibration.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any concrete frame source, corner detector or image type.

mod logger;
mod pattern;
mod result;
pub mod synthetic;

pub use logger::init_with_level;
pub use pattern::{PatternSpec, SpecError, MAX_INNER_CORNERS, MIN_INNER_CORNERS};
pub use result::{fov_degrees, CalibrationReport, CalibrationResult, CorrespondenceSample};
