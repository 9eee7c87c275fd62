//! Closed-form intrinsics from plane homographies (Zhang's method).

use nalgebra::{DMatrix, Matrix3, SVector};

use crate::projection::Intrinsics;
use crate::solver::SolveError;

/// The 6-vector `v_ij(H)` from Zhang's constraints on the image of the
/// absolute conic.
fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = h.column(i);
    let hj = h.column(j);
    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Estimate intrinsics from at least 3 plane homographies.
///
/// Solves `V b = 0` for the conic coefficients and extracts fx, fy, cx, cy
/// per Zhang's paper. The skew estimate is discarded; this solver holds skew
/// at zero throughout.
pub fn intrinsics_from_homographies(hs: &[Matrix3<f64>]) -> Result<Intrinsics, SolveError> {
    if hs.len() < 3 {
        return Err(SolveError::NotEnoughSamples {
            required: 3,
            got: hs.len(),
        });
    }

    let m = hs.len();
    let mut vmtx = DMatrix::<f64>::zeros(2 * m, 6);
    for (k, h) in hs.iter().enumerate() {
        let v11 = v_ij(h, 0, 0);
        let v22 = v_ij(h, 1, 1);
        let v12 = v_ij(h, 0, 1);
        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    let svd = vmtx.svd(true, true);
    let v_t = svd.v_t.ok_or(SolveError::DegenerateIntrinsics)?;
    let b = v_t.row(v_t.nrows() - 1);

    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if denom_norm <= 0.0 || denom.abs() / denom_norm <= 1e-8 {
        return Err(SolveError::DegenerateIntrinsics);
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda.signum() != b11.signum() {
        return Err(SolveError::DegenerateIntrinsics);
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    if !(alpha.is_finite() && beta.is_finite() && u0.is_finite() && v0.is_finite()) {
        return Err(SolveError::DegenerateIntrinsics);
    }

    Ok(Intrinsics {
        fx: alpha,
        fy: beta,
        cx: u0,
        cy: v0,
    })
}
