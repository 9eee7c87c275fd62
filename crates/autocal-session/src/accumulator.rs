//! Per-frame sample acceptance policy.
//!
//! The accumulator decides whether a detected board becomes a calibration
//! sample, enforces the capture cooldown, tracks the collected count against
//! the configured bounds and maintains the operator instruction text.

use std::time::{Duration, Instant};

use autocal_core::{CorrespondenceSample, PatternSpec};
use log::info;
use nalgebra::{Point2, Point3};

/// Canned pose-diversity hints, one per accepted sample. Calibration quality
/// depends on angular and distance variety, so the operator is steered
/// through distinct poses rather than asked for raw frame count.
const POSE_HINTS: [&str; 10] = [
    "hold the board facing the camera",
    "tilt the board to the left",
    "tilt the board to the right",
    "tilt the board upward",
    "tilt the board downward",
    "move the board closer to the camera",
    "move the board farther from the camera",
    "rotate the board in its plane",
    "change the board angle",
    "try a different distance",
];

/// Outcome of [`SampleAccumulator::consider`] for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Detection accepted as a new calibration sample.
    Accepted,
    /// Board detected but still inside the capture cooldown.
    Cooldown,
    /// No full board in this frame.
    NotFound,
    /// `max_images` reached; nothing further is accepted.
    Full,
}

/// Sampling bounds and cadence.
#[derive(Debug, Clone, Copy)]
pub struct AcquisitionLimits {
    pub min_images: usize,
    pub max_images: usize,
    pub capture_interval: Duration,
}

impl Default for AcquisitionLimits {
    fn default() -> Self {
        Self {
            min_images: 15,
            max_images: 30,
            capture_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
pub struct SampleAccumulator {
    limits: AcquisitionLimits,
    object_points: Vec<Point3<f64>>,
    samples: Vec<CorrespondenceSample>,
    last_accept: Option<Instant>,
    instruction: String,
}

impl SampleAccumulator {
    pub fn new(spec: &PatternSpec, limits: AcquisitionLimits) -> Self {
        Self {
            limits,
            object_points: spec.object_points(),
            samples: Vec::with_capacity(limits.max_images),
            last_accept: None,
            instruction: String::from("place the board in front of the camera"),
        }
    }

    /// Judge one frame's detection outcome at time `now`.
    ///
    /// Consecutive accepted samples are always at least `capture_interval`
    /// apart, and the sample count never exceeds `max_images`.
    pub fn consider(&mut self, detection: Option<&[Point2<f64>]>, now: Instant) -> Decision {
        if self.samples.len() >= self.limits.max_images {
            return Decision::Full;
        }

        let decision = match detection {
            None => {
                self.instruction =
                    String::from("place the full board in view and ensure good lighting");
                Decision::NotFound
            }
            Some(corners) => match self.cooldown_remaining(now) {
                Some(remaining) => {
                    self.instruction = format!(
                        "hold the pose, {:.1} s until the next capture",
                        remaining.as_secs_f64()
                    );
                    Decision::Cooldown
                }
                None => {
                    self.accept(corners, now);
                    Decision::Accepted
                }
            },
        };

        if self.sufficient() {
            self.instruction.push_str(&format!(
                " ({}/{}, enough to stop early)",
                self.samples.len(),
                self.limits.max_images
            ));
        }
        decision
    }

    fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        let last = self.last_accept?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed >= self.limits.capture_interval {
            None
        } else {
            Some(self.limits.capture_interval - elapsed)
        }
    }

    fn accept(&mut self, corners: &[Point2<f64>], now: Instant) {
        debug_assert_eq!(corners.len(), self.object_points.len());
        self.samples.push(CorrespondenceSample {
            object_points: self.object_points.clone(),
            image_points: corners.to_vec(),
        });
        self.last_accept = Some(now);

        let collected = self.samples.len();
        info!("accepted sample {collected}/{}", self.limits.max_images);
        self.instruction = format!(
            "captured {collected}/{} images; {}",
            self.limits.max_images,
            hint_for(collected)
        );
    }

    /// Current operator instruction, updated on every `consider`.
    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn collected(&self) -> usize {
        self.samples.len()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.limits.max_images
    }

    /// Whether enough samples exist to finish early.
    pub fn sufficient(&self) -> bool {
        self.samples.len() >= self.limits.min_images
    }

    pub fn samples(&self) -> &[CorrespondenceSample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<CorrespondenceSample> {
        self.samples
    }

    pub fn limits(&self) -> &AcquisitionLimits {
        &self.limits
    }
}

/// Fixed hint table with a saturating fallback past the last entry.
fn hint_for(collected: usize) -> String {
    match POSE_HINTS.get(collected - 1) {
        Some(hint) => (*hint).to_string(),
        None => format!("keep varying the angle (image {collected})"),
    }
}
