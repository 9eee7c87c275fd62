//! Full chessboard detection pipeline.

use autocal_core::PatternSpec;
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor, ThresholdMode};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use log::{debug, warn};
use nalgebra::Point2;

use crate::{
    clahe::clahe,
    lattice::{index_grid, LatticeParams},
    refine::refine_corners,
};

/// Contrast equalization settings applied ahead of corner search.
const CLAHE_CLIP_LIMIT: f64 = 2.0;
const CLAHE_TILES: u32 = 8;

/// Detects the full inner-corner grid of a planar chessboard target.
///
/// The pipeline follows a fixed recipe: grayscale conversion, contrast-limited
/// adaptive histogram equalization, corner candidate search, lattice
/// indexing, then sub-pixel refinement of the ordered grid. Detection is
/// all-or-nothing: a frame yields either every inner corner in canonical
/// row-major order, or nothing.
#[derive(Debug, Clone)]
pub struct PatternDetector {
    spec: PatternSpec,
    lattice: LatticeParams,
}

impl PatternDetector {
    pub fn new(spec: PatternSpec) -> Self {
        Self {
            spec,
            lattice: LatticeParams::default(),
        }
    }

    pub fn spec(&self) -> &PatternSpec {
        &self.spec
    }

    /// Run detection on one frame. Returns the inner corners in canonical
    /// row-major order, or `None` when the full grid is not visible.
    pub fn detect(&self, frame: &DynamicImage) -> Option<Vec<Point2<f64>>> {
        let gray = frame.to_luma8();
        self.detect_gray(&gray)
    }

    pub fn detect_gray(&self, gray: &GrayImage) -> Option<Vec<Point2<f64>>> {
        let equalized = clahe(gray, CLAHE_CLIP_LIMIT, CLAHE_TILES, CLAHE_TILES);

        let raw = detect_raw_corners(&equalized);
        debug!(
            "detector: {} candidates for {}x{} grid",
            raw.len(),
            self.spec.cols(),
            self.spec.rows()
        );
        if raw.len() < self.spec.point_count() {
            return None;
        }

        let candidates: Vec<Point2<f64>> = raw
            .iter()
            .map(|c| Point2::new(c.x as f64, c.y as f64))
            .collect();
        let mut grid = index_grid(
            &candidates,
            self.spec.cols() as usize,
            self.spec.rows() as usize,
            &self.lattice,
        )?;

        refine_corners(&equalized, &mut grid);
        Some(grid)
    }
}

fn detect_raw_corners(img: &GrayImage) -> Vec<CornerDescriptor> {
    let mut chess_cfg = ChessConfig::single_scale();
    chess_cfg.threshold_mode = ThresholdMode::Relative;
    chess_cfg.threshold_value = 0.2;
    chess_cfg.nms_radius = 2;
    // A failed corner search is a detection miss, not a fault.
    match find_chess_corners_image(img, &chess_cfg) {
        Ok(corners) => corners,
        Err(err) => {
            warn!("corner search failed: {err}");
            Vec::new()
        }
    }
}

const FOUND_COLOR: Rgb<u8> = Rgb([40, 200, 60]);
const MISSED_COLOR: Rgb<u8> = Rgb([220, 50, 50]);
const BANNER_HEIGHT: u32 = 8;

/// Draw the detection outcome onto `frame` for operator feedback. Purely
/// cosmetic; detection results never depend on this.
pub fn annotate(frame: &mut RgbImage, corners: Option<&[Point2<f64>]>) {
    let color = if corners.is_some() {
        FOUND_COLOR
    } else {
        MISSED_COLOR
    };

    // Status banner along the top edge.
    let band = BANNER_HEIGHT.min(frame.height());
    for y in 0..band {
        for x in 0..frame.width() {
            frame.put_pixel(x, y, color);
        }
    }

    let Some(corners) = corners else {
        return;
    };
    for pair in corners.windows(2) {
        draw_segment(frame, pair[0], pair[1], FOUND_COLOR);
    }
    for c in corners {
        draw_cross(frame, *c, 4, FOUND_COLOR);
    }
}

fn draw_cross(img: &mut RgbImage, at: Point2<f64>, arm: i32, color: Rgb<u8>) {
    let (cx, cy) = (at.x.round() as i64, at.y.round() as i64);
    for d in -(arm as i64)..=arm as i64 {
        put_checked(img, cx + d, cy, color);
        put_checked(img, cx, cy + d, color);
    }
}

fn draw_segment(img: &mut RgbImage, a: Point2<f64>, b: Point2<f64>, color: Rgb<u8>) {
    let steps = (b - a).norm().ceil().max(1.0) as usize;
    for s in 0..=steps {
        let t = s as f64 / steps as f64;
        let x = (a.x + t * (b.x - a.x)).round() as i64;
        let y = (a.y + t * (b.y - a.y)).round() as i64;
        put_checked(img, x, y, color);
    }
}

fn put_checked(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotate_paints_red_banner_on_miss() {
        let mut img = RgbImage::from_pixel(32, 24, Rgb([0, 0, 0]));
        annotate(&mut img, None);
        assert_eq!(*img.get_pixel(10, 2), MISSED_COLOR);
        assert_eq!(*img.get_pixel(10, 20), Rgb([0, 0, 0]));
    }

    #[test]
    fn annotate_marks_corners_on_hit() {
        let mut img = RgbImage::from_pixel(64, 48, Rgb([0, 0, 0]));
        let corners = vec![Point2::new(20.0, 25.0), Point2::new(40.0, 30.0)];
        annotate(&mut img, Some(&corners));
        assert_eq!(*img.get_pixel(10, 2), FOUND_COLOR);
        assert_eq!(*img.get_pixel(20, 25), FOUND_COLOR);
        assert_eq!(*img.get_pixel(40, 30), FOUND_COLOR);
    }
}
