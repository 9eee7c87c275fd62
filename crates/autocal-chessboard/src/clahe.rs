//! Contrast-limited adaptive histogram equalization.
//!
//! Stabilizes corner detection under uneven lighting. Per-tile histograms are
//! clipped at `clip_limit` times the uniform-bin level, the excess is spread
//! over the whole histogram, and the resulting per-tile lookup tables are
//! blended bilinearly across tile centers.

use image::GrayImage;

const BINS: usize = 256;

fn tile_of(coord: u32, extent: u32, tiles: u32) -> usize {
    let idx = (coord as u64 * tiles as u64 / extent as u64) as usize;
    idx.min(tiles as usize - 1)
}

fn build_lut(hist: &[u32; BINS], area: u32, clip_limit: f64) -> [u8; BINS] {
    let clip = ((clip_limit * area as f64 / BINS as f64).max(1.0)) as u32;

    let mut clipped = [0u32; BINS];
    let mut excess = 0u32;
    for (dst, &count) in clipped.iter_mut().zip(hist.iter()) {
        if count > clip {
            *dst = clip;
            excess += count - clip;
        } else {
            *dst = count;
        }
    }

    let per_bin = excess / BINS as u32;
    let remainder = (excess % BINS as u32) as usize;
    for (i, bin) in clipped.iter_mut().enumerate() {
        *bin += per_bin;
        if i < remainder {
            *bin += 1;
        }
    }

    let scale = 255.0 / area as f64;
    let mut lut = [0u8; BINS];
    let mut cdf = 0u32;
    for (v, bin) in clipped.iter().enumerate() {
        cdf += bin;
        lut[v] = (cdf as f64 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Equalize `src` with an 8-bit CLAHE pass.
///
/// `tiles_x`/`tiles_y` partition the image; images smaller than the tile grid
/// fall back to a single tile.
pub fn clahe(src: &GrayImage, clip_limit: f64, tiles_x: u32, tiles_y: u32) -> GrayImage {
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return src.clone();
    }
    let tiles_x = tiles_x.clamp(1, w.max(1));
    let tiles_y = tiles_y.clamp(1, h.max(1));
    let nt = (tiles_x * tiles_y) as usize;

    // Per-tile histograms.
    let mut hists = vec![[0u32; BINS]; nt];
    let mut areas = vec![0u32; nt];
    for (x, y, p) in src.enumerate_pixels() {
        let t = tile_of(y, h, tiles_y) * tiles_x as usize + tile_of(x, w, tiles_x);
        hists[t][p.0[0] as usize] += 1;
        areas[t] += 1;
    }

    let luts: Vec<[u8; BINS]> = hists
        .iter()
        .zip(&areas)
        .map(|(hist, &area)| build_lut(hist, area.max(1), clip_limit))
        .collect();

    // Bilinear blend between the four surrounding tile LUTs.
    let tile_w = w as f64 / tiles_x as f64;
    let tile_h = h as f64 / tiles_y as f64;
    let max_tx = tiles_x as i64 - 1;
    let max_ty = tiles_y as i64 - 1;

    let mut out = GrayImage::new(w, h);
    for (x, y, p) in src.enumerate_pixels() {
        let gx = (x as f64 + 0.5) / tile_w - 0.5;
        let gy = (y as f64 + 0.5) / tile_h - 0.5;
        let ix = gx.floor() as i64;
        let iy = gy.floor() as i64;
        let fx = gx - ix as f64;
        let fy = gy - iy as f64;

        let x0 = ix.clamp(0, max_tx) as usize;
        let x1 = (ix + 1).clamp(0, max_tx) as usize;
        let y0 = iy.clamp(0, max_ty) as usize;
        let y1 = (iy + 1).clamp(0, max_ty) as usize;

        let v = p.0[0] as usize;
        let tx = tiles_x as usize;
        let l00 = luts[y0 * tx + x0][v] as f64;
        let l10 = luts[y0 * tx + x1][v] as f64;
        let l01 = luts[y1 * tx + x0][v] as f64;
        let l11 = luts[y1 * tx + x1][v] as f64;

        let top = l00 + fx * (l10 - l00);
        let bottom = l01 + fx * (l11 - l01);
        let blended = top + fy * (bottom - top);
        out.put_pixel(x, y, image::Luma([blended.round().clamp(0.0, 255.0) as u8]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn std_dev(img: &GrayImage) -> f64 {
        let n = (img.width() * img.height()) as f64;
        let mean = img.pixels().map(|p| p.0[0] as f64).sum::<f64>() / n;
        let var = img
            .pixels()
            .map(|p| (p.0[0] as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        var.sqrt()
    }

    #[test]
    fn constant_image_stays_uniform() {
        let img = GrayImage::from_pixel(64, 48, image::Luma([128]));
        let out = clahe(&img, 2.0, 8, 8);
        assert_eq!(out.dimensions(), (64, 48));
        let first = out.get_pixel(0, 0).0[0];
        assert!(out.pixels().all(|p| p.0[0] == first));
    }

    #[test]
    fn low_contrast_gradient_gains_contrast() {
        let img = GrayImage::from_fn(128, 128, |x, _| image::Luma([(100 + x / 16) as u8]));
        let out = clahe(&img, 2.0, 8, 8);
        assert!(std_dev(&out) > std_dev(&img));
    }

    #[test]
    fn small_image_does_not_panic() {
        let img = GrayImage::from_pixel(3, 3, image::Luma([7]));
        let out = clahe(&img, 2.0, 8, 8);
        assert_eq!(out.dimensions(), (3, 3));
    }
}
