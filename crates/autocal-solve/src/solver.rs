//! Solver entry point: linear initialization, joint refinement, error and
//! field-of-view summary.

use autocal_core::{fov_degrees, CalibrationResult, CorrespondenceSample, PatternSpec};
use log::info;
use nalgebra::{Point2, Rotation3};
use thiserror::Error;

use crate::homography::dlt_homography;
use crate::pose::pose_from_homography;
use crate::projection::{project_point, Distortion};
use crate::refine::{refine, RefinedParams};
use crate::zhang::intrinsics_from_homographies;

/// Terminal solver failures. Propagated to the caller, never retried.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("need at least {required} calibration views, got {got}")]
    NotEnoughSamples { required: usize, got: usize },

    #[error("samples carry inconsistent point counts")]
    InconsistentSamples,

    #[error("image size must be non-zero, got {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },

    #[error("homography estimation failed: {0}")]
    Homography(&'static str),

    #[error("pose decomposition failed: {0}")]
    Pose(&'static str),

    #[error("degenerate configuration in intrinsics estimation")]
    DegenerateIntrinsics,

    #[error("non-linear refinement diverged")]
    Diverged,
}

const LM_MAX_ITERS: usize = 80;

/// Zhang-style planar calibration over the accumulated samples.
///
/// Runs normalized-DLT homographies per view, the closed-form intrinsics
/// seed, per-view pose decomposition and joint LM refinement, then summarizes
/// mean reprojection error and field of view.
pub fn solve(
    samples: &[CorrespondenceSample],
    image_size: (u32, u32),
    pattern_spec: PatternSpec,
) -> Result<CalibrationResult, SolveError> {
    let (width, height) = image_size;
    if width == 0 || height == 0 {
        return Err(SolveError::InvalidImageSize { width, height });
    }
    if samples.len() < 3 {
        return Err(SolveError::NotEnoughSamples {
            required: 3,
            got: samples.len(),
        });
    }
    let n_points = samples[0].len();
    if n_points < 4
        || samples
            .iter()
            .any(|s| s.len() != n_points || s.image_points.len() != s.object_points.len())
    {
        return Err(SolveError::InconsistentSamples);
    }

    // Board points live on z=0; homographies see their planar coordinates.
    let homographies = samples
        .iter()
        .map(|s| {
            let board: Vec<Point2<f64>> =
                s.object_points.iter().map(|p| Point2::new(p.x, p.y)).collect();
            dlt_homography(&board, &s.image_points)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let intr0 = intrinsics_from_homographies(&homographies)?;
    info!(
        "linear init: fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
        intr0.fx, intr0.fy, intr0.cx, intr0.cy
    );

    let k0 = intr0.matrix();
    let poses0 = homographies
        .iter()
        .map(|h| {
            pose_from_homography(&k0, h)
                .map(|iso| (iso.rotation.scaled_axis(), iso.translation.vector))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let refined = refine(samples, intr0, Distortion::default(), &poses0, LM_MAX_ITERS)?;
    let reprojection_error = mean_reprojection_error(samples, &refined);
    info!(
        "refined: fx={:.2} fy={:.2} cx={:.2} cy={:.2}, final cost {:.3e}, \
         mean reprojection error {:.6} px",
        refined.intr.fx,
        refined.intr.fy,
        refined.intr.cx,
        refined.intr.cy,
        refined.final_cost,
        reprojection_error
    );

    let fov = fov_degrees(refined.intr.fx, refined.intr.fy, width, height);
    let (rvecs, tvecs) = refined.poses.iter().cloned().unzip();

    Ok(CalibrationResult {
        camera_matrix: refined.intr.matrix(),
        dist_coeffs: refined.dist.coeffs,
        rvecs,
        tvecs,
        reprojection_error,
        sample_count: samples.len(),
        pattern_spec,
        image_size,
        fov,
    })
}

/// Per-view error is the L2 norm of the stacked residual vector divided by
/// the point count; the summary is the mean over views.
fn mean_reprojection_error(samples: &[CorrespondenceSample], params: &RefinedParams) -> f64 {
    let mut total = 0.0;
    for (sample, (rvec, tvec)) in samples.iter().zip(&params.poses) {
        let rot = Rotation3::new(*rvec);
        let mut sq_sum = 0.0;
        for (obj, img) in sample.object_points.iter().zip(&sample.image_points) {
            let proj = project_point(&params.intr, &params.dist, &rot, tvec, obj);
            sq_sum += (proj - img).norm_squared();
        }
        total += sq_sum.sqrt() / sample.len() as f64;
    }
    total / samples.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_image_size() {
        let spec = PatternSpec::default();
        assert!(matches!(
            solve(&[], (0, 480), spec),
            Err(SolveError::InvalidImageSize { .. })
        ));
    }

    #[test]
    fn rejects_too_few_views() {
        let spec = PatternSpec::default();
        assert!(matches!(
            solve(&[], (640, 480), spec),
            Err(SolveError::NotEnoughSamples { required: 3, got: 0 })
        ));
    }
}
