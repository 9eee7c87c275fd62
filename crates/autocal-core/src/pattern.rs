use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest usable inner-corner count per axis.
pub const MIN_INNER_CORNERS: u32 = 3;
/// Largest supported inner-corner count per axis.
pub const MAX_INNER_CORNERS: u32 = 15;

/// Errors produced by [`PatternSpec`] validation.
#[derive(Debug, Clone, Copy, Error, PartialEq)]
pub enum SpecError {
    #[error("inner corner grid ({cols}x{rows}) outside [{MIN_INNER_CORNERS}, {MAX_INNER_CORNERS}] per axis")]
    InvalidGrid { cols: u32, rows: u32 },

    #[error("square size must be positive and finite, got {0}")]
    InvalidSquareSize(f64),
}

/// Geometry of a planar checkerboard calibration target.
///
/// `cols` and `rows` count *inner* corners (squares minus one per axis);
/// `square_size` is the square edge length in world units (typically meters).
/// The spec is immutable for the lifetime of an acquisition run; swapping it
/// requires discarding accumulated samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    cols: u32,
    rows: u32,
    square_size: f64,
}

impl PatternSpec {
    /// Validate and build a pattern spec.
    pub fn new(cols: u32, rows: u32, square_size: f64) -> Result<Self, SpecError> {
        let in_range =
            |n: u32| -> bool { (MIN_INNER_CORNERS..=MAX_INNER_CORNERS).contains(&n) };
        if !in_range(cols) || !in_range(rows) {
            return Err(SpecError::InvalidGrid { cols, rows });
        }
        if !(square_size.is_finite() && square_size > 0.0) {
            return Err(SpecError::InvalidSquareSize(square_size));
        }
        Ok(Self {
            cols,
            rows,
            square_size,
        })
    }

    #[inline]
    pub fn cols(&self) -> u32 {
        self.cols
    }

    #[inline]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    #[inline]
    pub fn square_size(&self) -> f64 {
        self.square_size
    }

    /// Total number of inner corners.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.cols as usize * self.rows as usize
    }

    /// Board-local 3D coordinates of every inner corner.
    ///
    /// Points lie on the z=0 plane, spaced by `square_size`, in row-major
    /// order over the grid (x varies fastest). Detected image points must be
    /// delivered in the same order.
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        let mut pts = Vec::with_capacity(self.point_count());
        for row in 0..self.rows {
            for col in 0..self.cols {
                pts.push(Point3::new(
                    col as f64 * self.square_size,
                    row as f64 * self.square_size,
                    0.0,
                ));
            }
        }
        pts
    }
}

impl Default for PatternSpec {
    /// The common 10x7-square board: 9x6 inner corners, 10 mm squares.
    fn default() -> Self {
        Self {
            cols: 9,
            rows: 6,
            square_size: 0.01,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rejects_out_of_range_grids() {
        assert!(matches!(
            PatternSpec::new(2, 6, 0.01),
            Err(SpecError::InvalidGrid { cols: 2, rows: 6 })
        ));
        assert!(matches!(
            PatternSpec::new(9, 16, 0.01),
            Err(SpecError::InvalidGrid { .. })
        ));
        assert!(PatternSpec::new(3, 3, 0.01).is_ok());
        assert!(PatternSpec::new(15, 15, 0.01).is_ok());
    }

    #[test]
    fn rejects_bad_square_size() {
        assert!(matches!(
            PatternSpec::new(9, 6, 0.0),
            Err(SpecError::InvalidSquareSize(_))
        ));
        assert!(matches!(
            PatternSpec::new(9, 6, -0.01),
            Err(SpecError::InvalidSquareSize(_))
        ));
        assert!(matches!(
            PatternSpec::new(9, 6, f64::NAN),
            Err(SpecError::InvalidSquareSize(_))
        ));
    }

    #[test]
    fn object_grid_is_planar_and_row_major() {
        let spec = PatternSpec::new(9, 6, 0.025).unwrap();
        let pts = spec.object_points();
        assert_eq!(pts.len(), 54);

        for p in &pts {
            assert_eq!(p.z, 0.0);
        }
        // x varies fastest, spaced by square_size
        assert_relative_eq!(pts[0].x, 0.0);
        assert_relative_eq!(pts[1].x, 0.025);
        assert_relative_eq!(pts[1].y, 0.0);
        // start of second row
        assert_relative_eq!(pts[9].x, 0.0);
        assert_relative_eq!(pts[9].y, 0.025);
        // last corner
        assert_relative_eq!(pts[53].x, 8.0 * 0.025);
        assert_relative_eq!(pts[53].y, 5.0 * 0.025);
    }

    #[test]
    fn grid_is_deterministic() {
        let spec = PatternSpec::new(5, 4, 0.5).unwrap();
        assert_eq!(spec.object_points(), spec.object_points());
    }
}
