//! End-to-end detection on rendered checkerboards.

use autocal_chessboard::PatternDetector;
use autocal_core::PatternSpec;
use image::{DynamicImage, GrayImage, Luma};
use nalgebra::{Matrix3, Point2, Vector3};

/// Map board coordinates (units of one square) into the image.
fn project(h: &Matrix3<f64>, u: f64, v: f64) -> Point2<f64> {
    let p = h * Vector3::new(u, v, 1.0);
    Point2::new(p.x / p.z, p.y / p.z)
}

/// Render a `(cols+1) x (rows+1)`-square board under homography `h`.
/// 3x3 supersampling gives anti-aliased edges comparable to a real camera.
fn render_board(w: u32, h_px: u32, cols: u32, rows: u32, h: &Matrix3<f64>) -> GrayImage {
    let h_inv = h.try_inverse().expect("invertible board homography");
    let squares_u = (cols + 1) as f64;
    let squares_v = (rows + 1) as f64;

    GrayImage::from_fn(w, h_px, |x, y| {
        let mut acc = 0.0f64;
        for sy in 0..3 {
            for sx in 0..3 {
                let px = x as f64 + (sx as f64 + 0.5) / 3.0;
                let py = y as f64 + (sy as f64 + 0.5) / 3.0;
                let b = h_inv * Vector3::new(px, py, 1.0);
                let (u, v) = (b.x / b.z, b.y / b.z);
                let val = if u < 0.0 || v < 0.0 || u >= squares_u || v >= squares_v {
                    230.0 // board margin
                } else if (u.floor() as i64 + v.floor() as i64) % 2 == 0 {
                    245.0
                } else {
                    20.0
                };
                acc += val;
            }
        }
        Luma([(acc / 9.0).round() as u8])
    })
}

fn assert_detects_grid(h: &Matrix3<f64>, spec: PatternSpec, tol: f64) {
    let img = render_board(640, 480, spec.cols(), spec.rows(), h);
    let detector = PatternDetector::new(spec);
    let got = detector
        .detect(&DynamicImage::ImageLuma8(img))
        .expect("full grid should be found");
    assert_eq!(got.len(), spec.point_count());

    // Inner corners sit at integer board coordinates 1..=cols, 1..=rows.
    let mut expected = Vec::new();
    for r in 1..=spec.rows() {
        for c in 1..=spec.cols() {
            expected.push(project(h, c as f64, r as f64));
        }
    }

    let mut used = vec![false; expected.len()];
    for p in &got {
        let (k, d) = expected
            .iter()
            .enumerate()
            .map(|(k, q)| (k, (p - q).norm()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap();
        assert!(d < tol, "corner {p:?} is {d:.2} px from nearest expected");
        assert!(!used[k], "two detections matched the same corner");
        used[k] = true;
    }
}

#[test]
fn detects_fronto_parallel_board() {
    let h = Matrix3::new(
        44.0, 0.0, 110.0, //
        0.0, 44.0, 75.0, //
        0.0, 0.0, 1.0,
    );
    let spec = PatternSpec::new(9, 6, 0.01).unwrap();
    assert_detects_grid(&h, spec, 1.5);
}

#[test]
fn detects_tilted_board() {
    let h = Matrix3::new(
        40.0, 6.0, 130.0, //
        -4.0, 43.0, 90.0, //
        2.0e-4, -1.5e-4, 1.0,
    );
    let spec = PatternSpec::new(9, 6, 0.01).unwrap();
    assert_detects_grid(&h, spec, 1.5);
}

#[test]
fn repeated_detection_is_stable() {
    let h = Matrix3::new(
        42.0, 3.0, 120.0, //
        -2.0, 41.0, 85.0, //
        1.0e-4, 5.0e-5, 1.0,
    );
    let spec = PatternSpec::new(7, 5, 0.02).unwrap();
    let img = DynamicImage::ImageLuma8(render_board(640, 480, spec.cols(), spec.rows(), &h));
    let detector = PatternDetector::new(spec);

    let a = detector.detect(&img).expect("first pass");
    let b = detector.detect(&img).expect("second pass");
    assert_eq!(a, b, "same frame must yield identical ordered corners");
}

#[test]
fn blank_frame_yields_none() {
    let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(320, 240, Luma([128])));
    let detector = PatternDetector::new(PatternSpec::default());
    assert!(detector.detect(&img).is_none());
}

#[test]
fn partially_visible_board_yields_none() {
    // Board pushed far enough left that a column of corners leaves the frame.
    let h = Matrix3::new(
        44.0, 0.0, -150.0, //
        0.0, 44.0, 75.0, //
        0.0, 0.0, 1.0,
    );
    let spec = PatternSpec::new(9, 6, 0.01).unwrap();
    let img = DynamicImage::ImageLuma8(render_board(640, 480, spec.cols(), spec.rows(), &h));
    let detector = PatternDetector::new(spec);
    assert!(detector.detect(&img).is_none());
}
