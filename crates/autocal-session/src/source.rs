//! Seam traits between the session worker and the outside world.

use autocal_chessboard::PatternDetector;
use image::DynamicImage;
use log::info;
use nalgebra::Point2;

/// Supplier of camera frames. Owned by the worker for the duration of a run,
/// which serializes camera access by construction.
///
/// `read` returns `None` on a failed grab; the session backs off and retries,
/// escalating to a camera failure only after a sustained run of misses.
pub trait FrameSource: Send + 'static {
    fn read(&mut self) -> Option<DynamicImage>;
}

/// Board detector seam. The production implementation is
/// [`PatternDetector`]; tests substitute scripted detectors.
pub trait BoardDetector: Send + 'static {
    fn detect(&self, frame: &DynamicImage) -> Option<Vec<Point2<f64>>>;
}

impl BoardDetector for PatternDetector {
    fn detect(&self, frame: &DynamicImage) -> Option<Vec<Point2<f64>>> {
        PatternDetector::detect(self, frame)
    }
}

/// Receiver of progress updates: percentage plus the operator instruction.
/// Published after every accepted sample and on key transitions.
pub trait ProgressSink: Send + 'static {
    fn publish(&self, progress: u8, message: &str);
}

/// Sink that forwards updates to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn publish(&self, progress: u8, message: &str) {
        info!("[{progress:3}%] {message}");
    }
}
