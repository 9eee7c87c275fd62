//! Persistence of calibration results.
//!
//! Three artifacts are written side by side in the output directory:
//!
//! * `calibration.json` — the [`CalibrationReport`] schema, pretty-printed;
//!   the machine-readable source of truth, read back by [`load`].
//! * `calibration.npz` — a stored (uncompressed) ZIP of `camera_matrix.npy`
//!   and `dist_coeffs.npy`, NPY v1.0 little-endian f64, loadable with
//!   `numpy.load`.
//! * `calibration.txt` — fixed-width human-readable tables.

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use autocal_core::{CalibrationReport, CalibrationResult};
use log::info;
use thiserror::Error;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

pub const JSON_NAME: &str = "calibration.json";
pub const NPZ_NAME: &str = "calibration.npz";
pub const TXT_NAME: &str = "calibration.txt";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no stored calibration at {}", .0.display())]
    NotFound(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("calibration report (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive write failed: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Write all three artifacts under `dir`, creating it if needed.
pub fn persist(result: &CalibrationResult, dir: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(dir)?;
    let report = result.to_report();

    let json_path = dir.join(JSON_NAME);
    let mut json = serde_json::to_string_pretty(&report)?;
    json.push('\n');
    fs::write(&json_path, json)?;

    write_npz(result, &dir.join(NPZ_NAME))?;
    fs::write(dir.join(TXT_NAME), render_text(&report))?;

    info!("calibration artifacts written to {}", dir.display());
    Ok(())
}

/// Read `calibration.json` back from `dir`.
pub fn load(dir: &Path) -> Result<CalibrationReport, StoreError> {
    let path = dir.join(JSON_NAME);
    if !path.exists() {
        return Err(StoreError::NotFound(path));
    }
    let raw = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_npz(result: &CalibrationResult, path: &Path) -> Result<(), StoreError> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    zip.start_file("camera_matrix.npy", opts)?;
    zip.write_all(&npy_f64((3, 3), &result.camera_matrix_flat()))?;

    zip.start_file("dist_coeffs.npy", opts)?;
    zip.write_all(&npy_f64((1, 5), &result.dist_coeffs))?;

    zip.finish()?;
    Ok(())
}

/// Serialize a row-major f64 matrix as NPY v1.0.
fn npy_f64(shape: (usize, usize), data: &[f64]) -> Vec<u8> {
    debug_assert_eq!(shape.0 * shape.1, data.len());
    let dict = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': ({}, {}), }}",
        shape.0, shape.1
    );
    // Header (dict + padding + newline) aligns the payload to 64 bytes.
    let unpadded = 10 + dict.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    let header_len = (dict.len() + padding + 1) as u16;

    let mut out = Vec::with_capacity(10 + header_len as usize + data.len() * 8);
    out.extend_from_slice(b"\x93NUMPY");
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out.resize(out.len() + padding, b' ');
    out.push(b'\n');
    for v in data {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn render_text(report: &CalibrationReport) -> String {
    let mut out = String::new();
    out.push_str("camera calibration results\n");
    out.push_str(&"=".repeat(50));
    out.push_str("\n\n");
    out.push_str(&format!(
        "chessboard size: [{}, {}, {}]\n",
        report.chessboard_size[0], report.chessboard_size[1], report.chessboard_size[2]
    ));
    out.push_str(&format!(
        "image size: [{}, {}]\n",
        report.image_size[0], report.image_size[1]
    ));
    out.push_str(&format!(
        "calibration images: {}\n",
        report.calibration_images
    ));
    out.push_str(&format!(
        "field of view: [{:.2}, {:.2}] deg\n",
        report.fov[0], report.fov[1]
    ));
    out.push_str(&format!(
        "reprojection error: {:.6}\n\n",
        report.reprojection_error
    ));

    out.push_str("camera matrix:\n");
    for row in &report.camera_matrix {
        out.push_str(&fixed_width_row(row));
    }
    out.push_str("\ndistortion coefficients:\n");
    out.push_str(&fixed_width_row(&report.dist_coeffs));
    out
}

/// One `%10.5f`-style table row.
fn fixed_width_row(values: &[f64]) -> String {
    let cells: Vec<String> = values.iter().map(|v| format!("{v:10.5}")).collect();
    let mut row = cells.join(" ");
    row.push('\n');
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use autocal_core::PatternSpec;
    use nalgebra::Matrix3;
    use std::io::Read;
    use zip::ZipArchive;

    fn sample_result() -> CalibrationResult {
        CalibrationResult {
            camera_matrix: Matrix3::new(
                612.3456789012345,
                0.0,
                319.987654321098,
                0.0,
                611.123456789012,
                239.512345678901,
                0.0,
                0.0,
                1.0,
            ),
            dist_coeffs: [-0.123456789012345, 0.0567890123, 1.2e-4, -3.4e-4, 0.00123],
            rvecs: vec![],
            tvecs: vec![],
            reprojection_error: 0.034567,
            sample_count: 17,
            pattern_spec: PatternSpec::default(),
            image_size: (640, 480),
            fov: (55.123, 43.456),
        }
    }

    fn parse_npy(bytes: &[u8]) -> (String, Vec<f64>) {
        assert_eq!(&bytes[..6], b"\x93NUMPY");
        assert_eq!(&bytes[6..8], &[1, 0]);
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        let header = String::from_utf8(bytes[10..10 + header_len].to_vec()).unwrap();
        let data = &bytes[10 + header_len..];
        assert_eq!(data.len() % 8, 0);
        let values = data
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        (header, values)
    }

    #[test]
    fn json_round_trips_losslessly() {
        let dir = tempfile::tempdir().unwrap();
        let result = sample_result();
        persist(&result, dir.path()).unwrap();

        let back = load(dir.path()).unwrap();
        let report = result.to_report();
        for r in 0..3 {
            for c in 0..3 {
                assert_abs_diff_eq!(
                    back.camera_matrix[r][c],
                    report.camera_matrix[r][c],
                    epsilon = 1e-9
                );
            }
        }
        for (a, b) in back.dist_coeffs.iter().zip(&report.dist_coeffs) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-9);
        }
        assert_eq!(back.calibration_images, 17);
        assert_eq!(back.image_size, [640, 480]);
    }

    #[test]
    fn npz_holds_numpy_readable_arrays() {
        let dir = tempfile::tempdir().unwrap();
        let result = sample_result();
        persist(&result, dir.path()).unwrap();

        let file = File::open(dir.path().join(NPZ_NAME)).unwrap();
        let mut archive = ZipArchive::new(file).unwrap();

        let mut buf = Vec::new();
        archive
            .by_name("camera_matrix.npy")
            .unwrap()
            .read_to_end(&mut buf)
            .unwrap();
        let (header, values) = parse_npy(&buf);
        assert!(header.contains("'<f8'"));
        assert!(header.contains("(3, 3)"));
        assert_eq!(values, result.camera_matrix_flat());

        buf.clear();
        archive
            .by_name("dist_coeffs.npy")
            .unwrap()
            .read_to_end(&mut buf)
            .unwrap();
        let (header, values) = parse_npy(&buf);
        assert!(header.contains("(1, 5)"));
        assert_eq!(values, result.dist_coeffs);
    }

    #[test]
    fn text_report_uses_fixed_width_tables() {
        let dir = tempfile::tempdir().unwrap();
        persist(&sample_result(), dir.path()).unwrap();

        let txt = fs::read_to_string(dir.path().join(TXT_NAME)).unwrap();
        assert!(txt.contains("camera matrix:"));
        assert!(txt.contains(" 612.34568"));
        assert!(txt.contains("distortion coefficients:"));
        assert!(txt.contains("  -0.12346"));
    }

    #[test]
    fn load_from_empty_dir_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load(dir.path()), Err(StoreError::NotFound(_))));
    }
}
