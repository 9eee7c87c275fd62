//! Synthetic board/camera geometry for tests and examples.
//!
//! Projects a known board through a ground-truth pinhole camera so solver and
//! session tests can run against exact, noise-free correspondences.

use nalgebra::{Isometry3, Matrix3, Point2, Point3, Rotation3, Translation3, Vector3};

/// Build an intrinsic matrix with zero skew.
pub fn camera_matrix(fx: f64, fy: f64, cx: f64, cy: f64) -> Matrix3<f64> {
    Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0)
}

/// Deterministic set of `n` board poses (board frame -> camera frame) with
/// varied yaw, pitch, roll and distance around `distance` meters.
///
/// The variation is what makes Zhang's closed-form step well conditioned; a
/// fronto-parallel-only set would be degenerate.
pub fn tilted_poses(n: usize, distance: f64) -> Vec<Isometry3<f64>> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            let pitch = 0.30 * (1.3 * t + 0.7).sin();
            let yaw = 0.35 * (0.9 * t).sin();
            let roll = 0.15 * (0.5 * t).cos();
            let rot = Rotation3::from_euler_angles(pitch, yaw, roll);
            let trans = Vector3::new(
                -0.06 + 0.02 * (0.8 * t).sin(),
                -0.05 + 0.02 * (1.1 * t).cos(),
                distance + 0.08 * (0.6 * t).sin(),
            );
            Isometry3::from_parts(Translation3::from(trans), rot.into())
        })
        .collect()
}

/// Project board-local points through `pose` and `k`, no distortion.
pub fn project_pinhole(
    k: &Matrix3<f64>,
    pose: &Isometry3<f64>,
    object_points: &[Point3<f64>],
) -> Vec<Point2<f64>> {
    object_points
        .iter()
        .map(|p| {
            let q = pose.transform_point(p);
            let v = k * Vector3::new(q.x, q.y, q.z);
            Point2::new(v.x / v.z, v.y / v.z)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn projection_of_board_origin_matches_manual_pinhole() {
        let k = camera_matrix(600.0, 590.0, 320.0, 240.0);
        let pose = Isometry3::translation(0.1, -0.05, 1.0);
        let pts = [Point3::new(0.0, 0.0, 0.0)];
        let proj = project_pinhole(&k, &pose, &pts);
        assert_relative_eq!(proj[0].x, 320.0 + 600.0 * 0.1, epsilon = 1e-12);
        assert_relative_eq!(proj[0].y, 240.0 - 590.0 * 0.05, epsilon = 1e-12);
    }

    #[test]
    fn poses_stay_in_front_of_the_camera() {
        for pose in tilted_poses(30, 0.8) {
            assert!(pose.translation.z > 0.5);
        }
    }
}
