//! Joint Levenberg-Marquardt refinement of intrinsics, distortion and
//! per-view poses against pixel reprojection residuals.
//!
//! The Jacobian is numeric (forward differences); the normal equations are
//! solved densely. Parameter layout:
//! `[fx, fy, cx, cy, k1, k2, p1, p2, k3, (rvec, tvec) per view]`.

use autocal_core::CorrespondenceSample;
use log::debug;
use nalgebra::{DMatrix, DVector, Rotation3, Vector3};

use crate::projection::{project_point, Distortion, Intrinsics};
use crate::solver::SolveError;

const INTRINSIC_PARAMS: usize = 9;
const POSE_PARAMS: usize = 6;

#[derive(Debug, Clone)]
pub(crate) struct RefinedParams {
    pub intr: Intrinsics,
    pub dist: Distortion,
    /// Per-view (axis-angle rotation, translation).
    pub poses: Vec<(Vector3<f64>, Vector3<f64>)>,
    /// Final sum of squared pixel residuals.
    pub final_cost: f64,
}

fn pack(intr: &Intrinsics, dist: &Distortion, poses: &[(Vector3<f64>, Vector3<f64>)]) -> DVector<f64> {
    let mut x = DVector::zeros(INTRINSIC_PARAMS + POSE_PARAMS * poses.len());
    x[0] = intr.fx;
    x[1] = intr.fy;
    x[2] = intr.cx;
    x[3] = intr.cy;
    x.rows_mut(4, 5).copy_from_slice(&dist.coeffs);
    for (v, (rvec, tvec)) in poses.iter().enumerate() {
        let base = INTRINSIC_PARAMS + POSE_PARAMS * v;
        x.rows_mut(base, 3).copy_from(rvec);
        x.rows_mut(base + 3, 3).copy_from(tvec);
    }
    x
}

fn unpack(x: &DVector<f64>, views: usize) -> (Intrinsics, Distortion, Vec<(Vector3<f64>, Vector3<f64>)>) {
    let intr = Intrinsics {
        fx: x[0],
        fy: x[1],
        cx: x[2],
        cy: x[3],
    };
    let dist = Distortion {
        coeffs: [x[4], x[5], x[6], x[7], x[8]],
    };
    let poses = (0..views)
        .map(|v| {
            let base = INTRINSIC_PARAMS + POSE_PARAMS * v;
            (
                Vector3::new(x[base], x[base + 1], x[base + 2]),
                Vector3::new(x[base + 3], x[base + 4], x[base + 5]),
            )
        })
        .collect();
    (intr, dist, poses)
}

fn residuals(samples: &[CorrespondenceSample], x: &DVector<f64>, out: &mut DVector<f64>) {
    let (intr, dist, poses) = unpack(x, samples.len());
    let mut row = 0;
    for (sample, (rvec, tvec)) in samples.iter().zip(&poses) {
        let rot = Rotation3::new(*rvec);
        for (obj, img) in sample.object_points.iter().zip(&sample.image_points) {
            let proj = project_point(&intr, &dist, &rot, tvec, obj);
            out[row] = proj.x - img.x;
            out[row + 1] = proj.y - img.y;
            row += 2;
        }
    }
}

fn numeric_jacobian(
    samples: &[CorrespondenceSample],
    x: &DVector<f64>,
    base: &DVector<f64>,
) -> DMatrix<f64> {
    let n_res = base.len();
    let n_par = x.len();
    let mut jac = DMatrix::zeros(n_res, n_par);
    let mut x_pert = x.clone();
    let mut r_pert = DVector::zeros(n_res);

    for p in 0..n_par {
        let step = 1e-6 * x[p].abs().max(1e-3);
        x_pert[p] = x[p] + step;
        residuals(samples, &x_pert, &mut r_pert);
        x_pert[p] = x[p];

        let inv_step = 1.0 / step;
        for r in 0..n_res {
            jac[(r, p)] = (r_pert[r] - base[r]) * inv_step;
        }
    }
    jac
}

/// Run LM until the relative cost improvement stalls or `max_iters` is hit.
pub(crate) fn refine(
    samples: &[CorrespondenceSample],
    intr0: Intrinsics,
    dist0: Distortion,
    poses0: &[(Vector3<f64>, Vector3<f64>)],
    max_iters: usize,
) -> Result<RefinedParams, SolveError> {
    let n_res: usize = samples.iter().map(|s| 2 * s.len()).sum();
    let mut x = pack(&intr0, &dist0, poses0);
    let mut r = DVector::zeros(n_res);
    residuals(samples, &x, &mut r);
    let mut cost = r.norm_squared();
    if !cost.is_finite() {
        return Err(SolveError::Diverged);
    }

    let n_par = x.len();
    let mut lambda = 1e-3;
    let mut r_trial = DVector::zeros(n_res);

    for iter in 0..max_iters {
        let jac = numeric_jacobian(samples, &x, &r);
        let jtj = jac.transpose() * &jac;
        let grad = jac.transpose() * &r;

        let mut improved = false;
        let mut stalled = false;
        for _ in 0..12 {
            let mut a = jtj.clone();
            for i in 0..n_par {
                a[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
            }
            let Some(chol) = a.cholesky() else {
                lambda *= 10.0;
                continue;
            };
            let delta = chol.solve(&(-&grad));
            let x_trial = &x + &delta;
            residuals(samples, &x_trial, &mut r_trial);
            let cost_trial = r_trial.norm_squared();

            if cost_trial.is_finite() && cost_trial < cost {
                let rel_drop = (cost - cost_trial) / cost.max(1e-300);
                x = x_trial;
                std::mem::swap(&mut r, &mut r_trial);
                cost = cost_trial;
                lambda = (lambda * 0.3).max(1e-12);
                improved = true;
                stalled = rel_drop < 1e-12 || delta.norm() < 1e-14;
                break;
            }

            lambda *= 10.0;
            if lambda > 1e10 {
                break;
            }
        }

        debug!("lm iter {iter}: cost {cost:.6e}, lambda {lambda:.1e}");
        if !improved || stalled {
            break;
        }
    }

    if !cost.is_finite() || x.iter().any(|v| !v.is_finite()) {
        return Err(SolveError::Diverged);
    }

    let (intr, dist, poses) = unpack(&x, samples.len());
    Ok(RefinedParams {
        intr,
        dist,
        poses,
        final_cost: cost,
    })
}
