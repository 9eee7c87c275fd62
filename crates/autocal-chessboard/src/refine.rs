//! Sub-pixel corner refinement.
//!
//! Iterates the classic saddle-point condition: at a checkerboard corner the
//! image gradient at every pixel of a small window is orthogonal to the
//! offset from the true corner. Each iteration solves the 2x2 weighted
//! normal equations over an 11x11 window and moves the estimate until the
//! shift drops below the termination epsilon.

use image::GrayImage;
use nalgebra::{Matrix2, Point2, Vector2};

/// Half-width of the refinement window; the full window is 11x11.
const HALF_WIN: i32 = 5;
const MAX_ITERS: usize = 30;
const EPSILON: f64 = 1e-3;

/// Refine each corner in place. Corners whose window would leave the image,
/// or whose normal matrix is degenerate, keep their initial position.
pub fn refine_corners(img: &GrayImage, corners: &mut [Point2<f64>]) {
    for c in corners.iter_mut() {
        *c = refine_corner(img, *c);
    }
}

fn refine_corner(img: &GrayImage, start: Point2<f64>) -> Point2<f64> {
    let mut pos = start;
    for _ in 0..MAX_ITERS {
        let Some(next) = refine_step(img, pos) else {
            return pos;
        };
        let shift = (next - pos).norm();
        pos = next;
        if shift < EPSILON {
            break;
        }
    }
    pos
}

fn refine_step(img: &GrayImage, center: Point2<f64>) -> Option<Point2<f64>> {
    let (w, h) = (img.width() as f64, img.height() as f64);
    // Gradients are sampled bilinearly one pixel out from the window edge.
    let margin = (HALF_WIN + 2) as f64;
    if center.x < margin || center.y < margin || center.x > w - 1.0 - margin
        || center.y > h - 1.0 - margin
    {
        return None;
    }

    let sigma = HALF_WIN as f64 * 0.5;
    let mut a = Matrix2::zeros();
    let mut b = Vector2::zeros();

    for dy in -HALF_WIN..=HALF_WIN {
        for dx in -HALF_WIN..=HALF_WIN {
            let px = center.x + dx as f64;
            let py = center.y + dy as f64;
            let gx = (sample(img, px + 1.0, py) - sample(img, px - 1.0, py)) * 0.5;
            let gy = (sample(img, px, py + 1.0) - sample(img, px, py - 1.0)) * 0.5;
            let weight =
                (-((dx * dx + dy * dy) as f64) / (2.0 * sigma * sigma)).exp();

            let g = Vector2::new(gx, gy);
            a += weight * g * g.transpose();
            b += weight * (g.x * px + g.y * py) * g;
        }
    }

    let inv = a.try_inverse()?;
    let solved = inv * b;
    Some(Point2::new(solved.x, solved.y))
}

/// Bilinear intensity sample; caller keeps coordinates in bounds.
fn sample(img: &GrayImage, x: f64, y: f64) -> f64 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as u32, y0 as u32);
    let at = |xx: u32, yy: u32| img.get_pixel(xx, yy).0[0] as f64;

    let top = at(x0, y0) * (1.0 - fx) + at(x0 + 1, y0) * fx;
    let bot = at(x0, y0 + 1) * (1.0 - fx) + at(x0 + 1, y0 + 1) * fx;
    top * (1.0 - fy) + bot * fy
}
