use nalgebra::{Matrix3, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::pattern::PatternSpec;

/// One accepted calibration view: board-local 3D points paired with their
/// observed pixel coordinates, in the same (row-major) order.
///
/// Samples are created on acceptance and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrespondenceSample {
    pub object_points: Vec<Point3<f64>>,
    pub image_points: Vec<Point2<f64>>,
}

impl CorrespondenceSample {
    #[inline]
    pub fn len(&self) -> usize {
        self.object_points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.object_points.is_empty()
    }
}

/// Output of a completed calibration solve. Created exactly once per session,
/// immutable, replaced whole on reset.
#[derive(Debug, Clone)]
pub struct CalibrationResult {
    /// 3x3 intrinsic matrix `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`.
    pub camera_matrix: Matrix3<f64>,
    /// Brown-Conrady coefficients in k1, k2, p1, p2, k3 order.
    pub dist_coeffs: [f64; 5],
    /// Per-sample board rotation, axis-angle.
    pub rvecs: Vec<Vector3<f64>>,
    /// Per-sample board translation, camera frame.
    pub tvecs: Vec<Vector3<f64>>,
    /// Mean per-view pixel reprojection error.
    pub reprojection_error: f64,
    /// Number of accepted samples that fed the solve.
    pub sample_count: usize,
    pub pattern_spec: PatternSpec,
    /// (width, height) in pixels.
    pub image_size: (u32, u32),
    /// (horizontal, vertical) field of view in degrees.
    pub fov: (f64, f64),
}

impl CalibrationResult {
    #[inline]
    pub fn fx(&self) -> f64 {
        self.camera_matrix[(0, 0)]
    }

    #[inline]
    pub fn fy(&self) -> f64 {
        self.camera_matrix[(1, 1)]
    }

    /// Row-major flattening of the intrinsic matrix.
    pub fn camera_matrix_flat(&self) -> [f64; 9] {
        let m = &self.camera_matrix;
        [
            m[(0, 0)],
            m[(0, 1)],
            m[(0, 2)],
            m[(1, 0)],
            m[(1, 1)],
            m[(1, 2)],
            m[(2, 0)],
            m[(2, 1)],
            m[(2, 2)],
        ]
    }

    pub fn to_report(&self) -> CalibrationReport {
        let m = &self.camera_matrix;
        CalibrationReport {
            camera_matrix: [
                [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
                [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
                [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
            ],
            dist_coeffs: self.dist_coeffs.to_vec(),
            reprojection_error: self.reprojection_error,
            calibration_images: self.sample_count,
            chessboard_size: [
                self.pattern_spec.cols() as f64,
                self.pattern_spec.rows() as f64,
                self.pattern_spec.square_size(),
            ],
            fov: [self.fov.0, self.fov.1],
            image_size: [self.image_size.0, self.image_size.1],
        }
    }
}

/// Serializable form of [`CalibrationResult`], the schema of
/// `calibration.json`. Matrices are plain nested arrays (row-major).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub camera_matrix: [[f64; 3]; 3],
    pub dist_coeffs: Vec<f64>,
    pub reprojection_error: f64,
    pub calibration_images: usize,
    /// `[inner cols, inner rows, square size]`.
    pub chessboard_size: [f64; 3],
    /// `[horizontal, vertical]` degrees.
    pub fov: [f64; 2],
    /// `[width, height]` pixels.
    pub image_size: [u32; 2],
}

/// Horizontal and vertical field of view in degrees from focal lengths and
/// image dimensions: `2 * atan(dim / (2 * f))`.
pub fn fov_degrees(fx: f64, fy: f64, width: u32, height: u32) -> (f64, f64) {
    let fov_h = 2.0 * (width as f64 / (2.0 * fx)).atan();
    let fov_v = 2.0 * (height as f64 / (2.0 * fy)).atan();
    (fov_h.to_degrees(), fov_v.to_degrees())
}
