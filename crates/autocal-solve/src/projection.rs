//! Forward projection model: pinhole intrinsics (zero skew) plus
//! Brown-Conrady distortion in OpenCV coefficient order (k1, k2, p1, p2, k3).

use nalgebra::{Matrix3, Point2, Point3, Rotation3, Vector3};

/// Pinhole intrinsics, skew fixed at zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        }
    }
}

/// Brown-Conrady distortion, `[k1, k2, p1, p2, k3]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Distortion {
    pub coeffs: [f64; 5],
}

impl Distortion {
    /// Apply distortion to normalized camera coordinates.
    #[inline]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let [k1, k2, p1, p2, k3] = self.coeffs;
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (k1 + r2 * (k2 + r2 * k3));
        let xd = x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
        let yd = y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
        (xd, yd)
    }
}

/// Project a board-local point through rotation `r`, translation `t`,
/// distortion and intrinsics.
#[inline]
pub fn project_point(
    intr: &Intrinsics,
    dist: &Distortion,
    r: &Rotation3<f64>,
    t: &Vector3<f64>,
    p: &Point3<f64>,
) -> Point2<f64> {
    let q = r * p.coords + t;
    let x = q.x / q.z;
    let y = q.y / q.z;
    let (xd, yd) = dist.apply(x, y);
    Point2::new(intr.fx * xd + intr.cx, intr.fy * yd + intr.cy)
}
