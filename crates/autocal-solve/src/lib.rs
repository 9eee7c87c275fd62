//! Planar intrinsic calibration: Zhang's closed-form initialization followed
//! by joint Levenberg-Marquardt refinement of intrinsics, Brown-Conrady
//! distortion and per-view board poses.

mod homography;
mod pose;
mod projection;
mod refine;
mod solver;
mod zhang;

pub use homography::dlt_homography;
pub use pose::pose_from_homography;
pub use projection::{project_point, Distortion, Intrinsics};
pub use solver::{solve, SolveError};
pub use zhang::intrinsics_from_homographies;
