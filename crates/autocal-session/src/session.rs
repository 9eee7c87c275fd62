//! Calibration session lifecycle and acquisition worker.
//!
//! One session owns one optional worker thread. The worker pulls frames,
//! feeds the detector and the accumulator, then hands the samples to the
//! solver and the store. All externally visible state lives in a single
//! mutex-guarded snapshot that is replaced whole, never partially updated.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use autocal_core::{CalibrationResult, PatternSpec, SpecError};
use autocal_solve::{solve, SolveError};
use image::GenericImageView;
use log::{error, info, warn};
use thiserror::Error;

use crate::{
    accumulator::{AcquisitionLimits, Decision, SampleAccumulator},
    source::{BoardDetector, FrameSource, ProgressSink},
    store::{self, StoreError},
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid pattern spec: {0}")]
    InvalidSpec(#[from] SpecError),

    #[error("a calibration run is already in progress")]
    Busy,

    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("not enough samples: need {required}, got {got}")]
    InsufficientSamples { required: usize, got: usize },

    #[error("calibration solve failed: {0}")]
    SolveFailure(#[from] SolveError),

    #[error("failed to persist results: {0}")]
    PersistenceFailure(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Acquiring,
    Solving,
    Complete,
}

/// Snapshot returned by [`CalibrationSession::status`], taken under a single
/// lock acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// `round(collected / max_images * 100)`.
    pub progress: u8,
    /// Operator instruction or terminal message.
    pub message: String,
    /// Target geometry of the current/next run.
    pub pattern_spec: PatternSpec,
    /// Whether a completed [`CalibrationResult`] is held.
    pub has_result: bool,
}

/// Worker cadence and failure budgets. Defaults match interactive use;
/// tests shrink the durations.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub limits: AcquisitionLimits,
    /// Target frame pacing, roughly 30 fps.
    pub frame_pacing: Duration,
    /// Pause after each accepted sample so the operator can move the board.
    pub post_accept_pause: Duration,
    /// Backoff after a failed frame read.
    pub read_backoff: Duration,
    /// Consecutive failed reads tolerated before the camera is declared gone.
    pub read_failure_budget: usize,
    /// Artifact directory; `None` keeps results in memory only.
    pub output_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            limits: AcquisitionLimits::default(),
            frame_pacing: Duration::from_millis(33),
            post_accept_pause: Duration::from_millis(500),
            read_backoff: Duration::from_millis(100),
            read_failure_budget: 150,
            output_dir: None,
        }
    }
}

struct Shared {
    state: SessionState,
    progress: u8,
    message: String,
    result: Option<CalibrationResult>,
}

impl Shared {
    fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            progress: 0,
            message: String::from("idle"),
            result: None,
        }
    }
}

pub struct CalibrationSession {
    config: SessionConfig,
    spec: PatternSpec,
    shared: Arc<Mutex<Shared>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl CalibrationSession {
    pub fn new(spec: PatternSpec, config: SessionConfig) -> Self {
        Self {
            config,
            spec,
            shared: Arc::new(Mutex::new(Shared::idle())),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn pattern_spec(&self) -> &PatternSpec {
        &self.spec
    }

    /// Begin a run on a dedicated worker thread.
    ///
    /// Rejects with [`SessionError::Busy`] while a previous run is still
    /// alive; a finished worker is joined here before the new one starts.
    pub fn start<S, D, P>(
        &mut self,
        source: S,
        detector: D,
        sink: P,
    ) -> Result<(), SessionError>
    where
        S: FrameSource,
        D: BoardDetector,
        P: ProgressSink,
    {
        self.admit_new_run()?;

        self.stop.store(false, Ordering::SeqCst);
        {
            let mut shared = self.lock();
            *shared = Shared::idle();
            shared.state = SessionState::Acquiring;
            shared.message = String::from("place the board in front of the camera");
        }

        let ctx = WorkerContext {
            spec: self.spec,
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
            stop: Arc::clone(&self.stop),
        };
        self.worker = Some(thread::spawn(move || ctx.run(source, detector, sink)));
        Ok(())
    }

    /// Request the running acquisition to end. Idempotent; a stop always
    /// terminates the loop promptly, even below `min_images`, in which case
    /// the run fails with `InsufficientSamples`.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn status(&self) -> SessionStatus {
        let shared = self.lock();
        SessionStatus {
            state: shared.state,
            progress: shared.progress,
            message: shared.message.clone(),
            pattern_spec: self.spec,
            has_result: shared.result.is_some(),
        }
    }

    /// The completed result, if the last run reached `Complete`.
    pub fn result(&self) -> Option<CalibrationResult> {
        self.lock().result.clone()
    }

    /// Force the session back to `Idle`: stop any run in flight, join the
    /// worker and discard all derived state, including a held result.
    pub fn reset(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("calibration worker panicked");
            }
        }
        *self.lock() = Shared::idle();
    }

    /// Swap the target geometry. Rejected while a run is in flight; on
    /// success any held result is discarded.
    pub fn update_pattern_spec(&mut self, spec: PatternSpec) -> Result<(), SessionError> {
        self.admit_new_run()?;
        self.spec = spec;
        *self.lock() = Shared::idle();
        Ok(())
    }

    /// Join a finished worker, or refuse while one is still running.
    fn admit_new_run(&mut self) -> Result<(), SessionError> {
        if let Some(handle) = self.worker.take() {
            if !handle.is_finished() {
                self.worker = Some(handle);
                return Err(SessionError::Busy);
            }
            if handle.join().is_err() {
                error!("calibration worker panicked");
                *self.lock() = Shared::idle();
            }
        }
        Ok(())
    }

    /// Block until the current run finishes. Primarily for embedders that
    /// drive the session synchronously.
    pub fn wait(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("calibration worker panicked");
                *self.lock() = Shared::idle();
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        // Lock poisoning only happens if a worker panicked mid-update; the
        // snapshot is still replaced whole, so recover the guard.
        match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for CalibrationSession {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

struct WorkerContext {
    spec: PatternSpec,
    config: SessionConfig,
    shared: Arc<Mutex<Shared>>,
    stop: Arc<AtomicBool>,
}

impl WorkerContext {
    fn run<S, D, P>(self, source: S, detector: D, sink: P)
    where
        S: FrameSource,
        D: BoardDetector,
        P: ProgressSink,
    {
        match self.acquire_and_solve(source, detector, &sink) {
            Ok(result) => {
                let message = format!(
                    "calibration complete, reprojection error {:.6} px",
                    result.reprojection_error
                );
                info!("{message}");
                sink.publish(100, &message);
                let mut shared = self.lock();
                shared.state = SessionState::Complete;
                shared.progress = 100;
                shared.message = message;
                shared.result = Some(result);
            }
            Err(err) => {
                let message = err.to_string();
                warn!("calibration run failed: {message}");
                sink.publish(0, &message);
                let mut shared = self.lock();
                shared.state = SessionState::Idle;
                shared.progress = 0;
                shared.message = message;
                shared.result = None;
            }
        }
    }

    fn acquire_and_solve<S, D, P>(
        &self,
        mut source: S,
        detector: D,
        sink: &P,
    ) -> Result<CalibrationResult, SessionError>
    where
        S: FrameSource,
        D: BoardDetector,
        P: ProgressSink,
    {
        let limits = self.config.limits;
        let mut accumulator = SampleAccumulator::new(&self.spec, limits);
        let mut image_size: Option<(u32, u32)> = None;
        let mut read_failures = 0usize;

        info!(
            "acquisition started: {}x{} grid, {}-{} images",
            self.spec.cols(),
            self.spec.rows(),
            limits.min_images,
            limits.max_images
        );
        sink.publish(0, "place the board in front of the camera");

        while !self.stop.load(Ordering::SeqCst) && !accumulator.is_full() {
            let Some(frame) = source.read() else {
                read_failures += 1;
                if read_failures >= self.config.read_failure_budget {
                    return Err(SessionError::CameraUnavailable(format!(
                        "{read_failures} consecutive failed frame reads"
                    )));
                }
                sink.publish(self.lock().progress, "camera read failed");
                thread::sleep(self.config.read_backoff);
                continue;
            };
            read_failures = 0;

            if image_size.is_none() {
                let size = frame.dimensions();
                info!("image size: {}x{}", size.0, size.1);
                image_size = Some(size);
            }

            let corners = detector.detect(&frame);
            let decision = accumulator.consider(corners.as_deref(), Instant::now());

            let progress = Self::progress(accumulator.collected(), limits.max_images);
            {
                let mut shared = self.lock();
                shared.progress = progress;
                shared.message = accumulator.instruction().to_string();
            }
            if decision == Decision::Accepted {
                sink.publish(progress, accumulator.instruction());
                thread::sleep(self.config.post_accept_pause);
            }

            thread::sleep(self.config.frame_pacing);
        }

        let collected = accumulator.collected();
        if collected < limits.min_images {
            return Err(SessionError::InsufficientSamples {
                required: limits.min_images,
                got: collected,
            });
        }
        let image_size = match image_size {
            Some(size) => size,
            // Unreachable with min_images >= 1; keep the error honest anyway.
            None => return Err(SessionError::CameraUnavailable(String::from(
                "no frame delivered an image size",
            ))),
        };

        let handoff =
            format!("captured {collected} images, solving calibration parameters...");
        info!("{handoff}");
        sink.publish(100, &handoff);
        {
            let mut shared = self.lock();
            shared.state = SessionState::Solving;
            shared.progress = 100;
            shared.message = handoff;
        }

        let result = solve(accumulator.samples(), image_size, self.spec)?;

        if let Some(dir) = &self.config.output_dir {
            // Persistence failures are reported but the in-memory result
            // stays valid.
            if let Err(err) = store::persist(&result, dir) {
                error!("persisting calibration artifacts failed: {err}");
                sink.publish(100, &SessionError::PersistenceFailure(err).to_string());
            }
        }
        Ok(result)
    }

    fn progress(collected: usize, max_images: usize) -> u8 {
        ((collected as f64 / max_images as f64) * 100.0).round() as u8
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
