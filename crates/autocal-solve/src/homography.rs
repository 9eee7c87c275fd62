//! Normalized DLT homography estimation.
//!
//! Estimates `H` with `x' ~ H x`, mapping planar board points (board x/y, the
//! z=0 plane) to pixel coordinates. Hartley normalization (zero mean, average
//! distance sqrt(2)) is applied to both point sets for numerical stability and
//! undone on the output.

use nalgebra::{DMatrix, Matrix3, Point2, Vector3};

use crate::solver::SolveError;

fn normalize_points(pts: &[Point2<f64>]) -> Option<(Vec<Point2<f64>>, Matrix3<f64>)> {
    let n = pts.len() as f64;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for p in pts {
        cx += p.x;
        cy += p.y;
    }
    cx /= n;
    cy /= n;

    let mut mean_dist = 0.0;
    for p in pts {
        let dx = p.x - cx;
        let dy = p.y - cy;
        mean_dist += (dx * dx + dy * dy).sqrt();
    }
    mean_dist /= n;

    if mean_dist <= 1e-12 {
        return None;
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);

    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x, p.y, 1.0);
            Point2::new(v.x, v.y)
        })
        .collect();
    Some((out, t))
}

/// Estimate a homography `H` such that `image ~ H * board` via normalized DLT.
pub fn dlt_homography(
    board: &[Point2<f64>],
    image: &[Point2<f64>],
) -> Result<Matrix3<f64>, SolveError> {
    let n = board.len();
    if n < 4 || image.len() != n {
        return Err(SolveError::Homography("need at least 4 correspondences"));
    }

    let (board_n, t_b) = normalize_points(board)
        .ok_or(SolveError::Homography("degenerate board points"))?;
    let (image_n, t_i) = normalize_points(image)
        .ok_or(SolveError::Homography("degenerate image points"))?;

    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for (i, (pb, pi)) in board_n.iter().zip(image_n.iter()).enumerate() {
        let (x, y) = (pb.x, pb.y);
        let (u, v) = (pi.x, pi.y);

        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    // Solve A h = 0: singular vector of the smallest singular value. Pad to
    // square first; nalgebra's SVD wants nrows >= ncols for full V^T.
    let mut a_work = a;
    if a_work.nrows() < a_work.ncols() {
        let (rows, cols) = a_work.shape();
        let mut a_pad = DMatrix::<f64>::zeros(cols, cols);
        a_pad.view_mut((0, 0), (rows, cols)).copy_from(&a_work);
        a_work = a_pad;
    }

    let svd = a_work.svd(true, true);
    let v_t = svd.v_t.ok_or(SolveError::Homography("svd failed"))?;
    let h_vec = v_t.row(v_t.nrows() - 1);

    let mut h = Matrix3::zeros();
    for r in 0..3 {
        for c in 0..3 {
            h[(r, c)] = h_vec[3 * r + c];
        }
    }

    let t_i_inv = t_i
        .try_inverse()
        .ok_or(SolveError::Homography("normalization not invertible"))?;
    h = t_i_inv * h * t_b;

    let scale = h[(2, 2)];
    if scale.abs() < 1e-12 {
        return Err(SolveError::Homography("homography has zero scale"));
    }
    Ok(h / scale)
}
