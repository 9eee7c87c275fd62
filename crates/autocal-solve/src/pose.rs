//! Board pose from a plane-induced homography.
//!
//! For a board on its own z=0 plane, `H = K [r1 r2 t]` up to scale. Given `K`
//! the rotation columns and translation are recovered, and the rotation is
//! projected onto SO(3) (polar decomposition via SVD).

use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};

use crate::solver::SolveError;

/// Decompose `H` into a board-to-camera pose given intrinsics `K`.
pub fn pose_from_homography(
    k: &Matrix3<f64>,
    h: &Matrix3<f64>,
) -> Result<Isometry3<f64>, SolveError> {
    let k_inv = k
        .try_inverse()
        .ok_or(SolveError::Pose("intrinsic matrix not invertible"))?;

    let h1 = h.column(0);
    let h2 = h.column(1);
    let h3 = h.column(2).into_owned();

    let k_inv_h1 = k_inv * h1;
    let k_inv_h2 = k_inv * h2;

    let norm1 = k_inv_h1.norm();
    let norm2 = k_inv_h2.norm();
    if norm1 <= 1e-12 || norm2 <= 1e-12 {
        return Err(SolveError::Pose("homography columns collapse under K^-1"));
    }
    // Scale from the average of the two rotation-column norms.
    let lambda = 1.0 / ((norm1 + norm2) * 0.5);

    let r1 = (lambda * k_inv_h1).into_owned();
    let r2 = (lambda * k_inv_h2).into_owned();
    let r3 = r1.cross(&r2);

    let mut r_mat = Matrix3::<f64>::zeros();
    r_mat.set_column(0, &r1);
    r_mat.set_column(1, &r2);
    r_mat.set_column(2, &r3);

    let svd = r_mat.svd(true, true);
    let u = svd.u.ok_or(SolveError::Pose("svd failed"))?;
    let v_t = svd.v_t.ok_or(SolveError::Pose("svd failed"))?;
    let mut r_orth = u * v_t;

    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let mut t_vec: Vector3<f64> = lambda * (k_inv * h3);
    // The board must lie in front of the camera; a sign flip of H puts it
    // behind, in which case both R columns and t negate together.
    if t_vec.z < 0.0 {
        t_vec = -t_vec;
        let c0 = -r_orth.column(0).into_owned();
        let c1 = -r_orth.column(1).into_owned();
        r_orth.set_column(0, &c0);
        r_orth.set_column(1, &c1);
    }

    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Ok(Isometry3::from_parts(Translation3::from(t_vec), rot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autocal_core::synthetic;
    use nalgebra::Rotation3;

    #[test]
    fn recovers_pose_from_exact_homography() {
        let k = synthetic::camera_matrix(800.0, 780.0, 640.0, 360.0);

        let rot = Rotation3::from_euler_angles(0.1, -0.05, 0.2);
        let t = Vector3::new(0.1, -0.05, 1.0);
        let iso_gt = Isometry3::from_parts(Translation3::from(t), rot.into());

        let r_mat = iso_gt.rotation.to_rotation_matrix();
        let r = r_mat.matrix();
        let mut h = Matrix3::zeros();
        h.set_column(0, &(k * r.column(0)));
        h.set_column(1, &(k * r.column(1)));
        h.set_column(2, &(k * iso_gt.translation.vector));

        let iso = pose_from_homography(&k, &h).unwrap();

        assert!((iso.translation.vector - iso_gt.translation.vector).norm() < 1e-9);
        let r_diff = iso.rotation.to_rotation_matrix().matrix().transpose() * r;
        let angle = ((r_diff.trace() - 1.0) * 0.5).clamp(-1.0, 1.0).acos();
        assert!(angle < 1e-9, "rotation error too large: {angle}");
    }

    #[test]
    fn negated_homography_still_puts_board_in_front() {
        let k = synthetic::camera_matrix(800.0, 780.0, 640.0, 360.0);
        let rot = Rotation3::from_euler_angles(0.2, 0.1, -0.1);
        let t = Vector3::new(0.0, 0.05, 0.8);
        let r_mat = rot.matrix();
        let mut h = Matrix3::zeros();
        h.set_column(0, &(k * r_mat.column(0)));
        h.set_column(1, &(k * r_mat.column(1)));
        h.set_column(2, &(k * t));
        h = -h;

        let iso = pose_from_homography(&k, &h).unwrap();
        assert!(iso.translation.z > 0.0);
        assert!((iso.translation.vector - t).norm() < 1e-9);
    }
}
