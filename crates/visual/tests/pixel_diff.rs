//! Pixel diff tests against PNG files on disk

use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};
use tempfile::TempDir;
use test_case::test_case;

use vybe_visual::diff::{compare_files, DiffOptions};
use vybe_visual::error::VisualError;

fn write_png(dir: &Path, name: &str, img: &RgbaImage) -> PathBuf {
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(rgba))
}

#[test]
fn test_same_file_compared_with_itself() {
    let temp = TempDir::new().unwrap();
    let shot = write_png(temp.path(), "shot.png", &solid(64, 32, [12, 34, 56, 255]));
    let diff_out = temp.path().join("diff.png");

    let result = compare_files(&shot, &shot, Some(&diff_out), &DiffOptions::default()).unwrap();
    assert_eq!(result.pixels_different, 0);
    assert_eq!(result.percent_difference, 0.0);
    assert_eq!(result.total_pixels, 64 * 32);
    assert_eq!(result.reference_sha256, result.candidate_sha256);
    assert!(result.diff_image_path.is_none());
    assert!(!diff_out.exists());
}

#[test]
fn test_black_against_white() {
    let temp = TempDir::new().unwrap();
    let black = write_png(temp.path(), "black.png", &solid(100, 100, [0, 0, 0, 255]));
    let white = write_png(temp.path(), "white.png", &solid(100, 100, [255, 255, 255, 255]));
    let diff_out = temp.path().join("out/diff.png");

    let result = compare_files(&black, &white, Some(&diff_out), &DiffOptions::default()).unwrap();
    assert_eq!(result.pixels_different, 10_000);
    assert_eq!(result.total_pixels, 10_000);
    assert_eq!(result.percent_difference, 100.0);
    assert_eq!(result.diff_image_path.as_deref(), Some(diff_out.as_path()));

    let diff = image::open(&diff_out).unwrap().to_rgba8();
    assert_eq!(diff.dimensions(), (100, 100));
    assert_eq!(diff.get_pixel(50, 50), &Rgba([255, 0, 0, 255]));
}

#[test]
fn test_single_pixel_change() {
    let temp = TempDir::new().unwrap();
    let base = solid(100, 100, [255, 255, 255, 255]);
    let mut changed = base.clone();
    changed.put_pixel(40, 60, Rgba([0, 0, 0, 255]));

    let reference = write_png(temp.path(), "reference.png", &base);
    let candidate = write_png(temp.path(), "candidate.png", &changed);

    let result = compare_files(&reference, &candidate, None, &DiffOptions::default()).unwrap();
    assert_eq!(result.pixels_different, 1);
    assert!((result.percent_difference - 0.01).abs() < 1e-12);
    assert!(result.diff_image_path.is_none());
}

#[test_case(0.0, 1 ; "zero threshold counts any change")]
#[test_case(0.1, 0 ; "default threshold ignores a faint change")]
#[test_case(1.0, 0 ; "maximum threshold ignores everything but extremes")]
fn test_threshold_on_faint_change(threshold: f64, expected: u64) {
    let temp = TempDir::new().unwrap();
    let base = solid(10, 10, [100, 100, 100, 255]);
    let mut changed = base.clone();
    changed.put_pixel(5, 5, Rgba([103, 100, 100, 255]));

    let reference = write_png(temp.path(), "reference.png", &base);
    let candidate = write_png(temp.path(), "candidate.png", &changed);

    let options = DiffOptions {
        threshold,
        ..DiffOptions::default()
    };
    let result = compare_files(&reference, &candidate, None, &options).unwrap();
    assert_eq!(result.pixels_different, expected);
}

#[test]
fn test_dimension_mismatch_is_an_error() {
    let temp = TempDir::new().unwrap();
    let reference = write_png(temp.path(), "reference.png", &solid(1440, 10, [0, 0, 0, 255]));
    let candidate = write_png(temp.path(), "candidate.png", &solid(1440, 12, [0, 0, 0, 255]));

    let err = compare_files(&reference, &candidate, None, &DiffOptions::default()).unwrap_err();
    match err {
        VisualError::DimensionMismatch { reference, candidate } => {
            assert_eq!(reference, (1440, 10));
            assert_eq!(candidate, (1440, 12));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_missing_file_is_io_error() {
    let temp = TempDir::new().unwrap();
    let reference = write_png(temp.path(), "reference.png", &solid(4, 4, [0, 0, 0, 255]));
    let err = compare_files(&reference, &temp.path().join("nope.png"), None, &DiffOptions::default()).unwrap_err();
    assert!(matches!(err, VisualError::Io(_)));
}

#[test]
fn test_diff_image_skipped_when_disabled() {
    let temp = TempDir::new().unwrap();
    let reference = write_png(temp.path(), "reference.png", &solid(8, 8, [0, 0, 0, 255]));
    let candidate = write_png(temp.path(), "candidate.png", &solid(8, 8, [255, 255, 255, 255]));
    let diff_out = temp.path().join("diff.png");

    let options = DiffOptions {
        write_diff_image: false,
        ..DiffOptions::default()
    };
    let result = compare_files(&reference, &candidate, Some(&diff_out), &options).unwrap();
    assert_eq!(result.pixels_different, 64);
    assert!(result.diff_image_path.is_none());
    assert!(!diff_out.exists());
}
