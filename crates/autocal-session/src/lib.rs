//! Automatic intrinsic calibration sessions.
//!
//! [`CalibrationSession`] drives the full pipeline on a dedicated worker
//! thread: frames from a [`FrameSource`] go through a [`BoardDetector`] and
//! the [`SampleAccumulator`] until enough views are collected, then the
//! solver runs and [`store`] writes the artifacts. Callers observe the run
//! through [`CalibrationSession::status`] and a [`ProgressSink`].

mod accumulator;
mod session;
mod source;
pub mod store;

pub use accumulator::{AcquisitionLimits, Decision, SampleAccumulator};
pub use session::{
    CalibrationSession, SessionConfig, SessionError, SessionState, SessionStatus,
};
pub use source::{BoardDetector, FrameSource, LogSink, ProgressSink};
pub use store::StoreError;
