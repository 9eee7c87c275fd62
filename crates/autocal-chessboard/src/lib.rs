//! Planar checkerboard detection for automatic intrinsic calibration.
//!
//! The crate turns a camera frame into the board's inner corners in a
//! canonical, reproducible order:
//!
//! 1. grayscale conversion and contrast-limited adaptive histogram
//!    equalization ([`clahe`]),
//! 2. ChESS corner candidate search,
//! 3. lattice indexing of the candidates into the expected grid
//!    ([`index_grid`]),
//! 4. sub-pixel refinement of the ordered corners ([`refine_corners`]).
//!
//! [`PatternDetector`] bundles the pipeline behind a single `detect` call;
//! [`annotate`] renders the outcome for operator feedback.

mod clahe;
mod detector;
mod lattice;
mod refine;

pub use clahe::clahe;
pub use detector::{annotate, PatternDetector};
pub use lattice::{index_grid, LatticeParams};
pub use refine::refine_corners;
