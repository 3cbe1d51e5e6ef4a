//! Pixel diff stage
//!
//! Pixels are compared in YIQ space, which tracks perceived colour
//! difference far better than per-channel tolerances. A pixel counts as
//! different when its YIQ delta exceeds `35215 * threshold^2` (35215 being
//! the largest possible delta). With `include_aa` off, pixels that look like
//! anti-aliasing on either image are painted in the AA colour but not
//! counted.

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{VisualError, VisualResult};
use crate::paths;

const MAX_YIQ_DELTA: f64 = 35215.0;

/// Pixel diff options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
    /// Perceptual threshold as a fraction of the channel range (0.0 - 1.0)
    pub threshold: f64,

    /// Count anti-aliased pixels as differences
    pub include_aa: bool,

    /// Opacity of the unchanged, grayscaled original in the diff image
    pub alpha: f64,

    pub aa_color: [u8; 3],

    pub diff_color: [u8; 3],

    /// Colour for pixels where the candidate is darker than the reference
    pub diff_color_alt: Option<[u8; 3]>,

    /// Draw only differing pixels on a transparent background
    pub diff_mask: bool,

    /// Write a diff image next to the screenshots when pixels differ
    pub write_diff_image: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            include_aa: false,
            alpha: 0.1,
            aa_color: [255, 255, 0],
            diff_color: [255, 0, 0],
            diff_color_alt: None,
            diff_mask: false,
            write_diff_image: true,
        }
    }
}

/// Result of comparing a reference and a candidate screenshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// `pixels_different / total_pixels * 100`, unrounded
    pub percent_difference: f64,

    pub pixels_different: u64,

    /// Always `width * height`
    pub total_pixels: u64,

    pub width: u32,

    pub height: u32,

    /// Path to the diff image (if generated)
    pub diff_image_path: Option<PathBuf>,

    pub reference_sha256: String,

    pub candidate_sha256: String,
}

impl ComparisonResult {
    /// Whether the difference is within a percentage budget
    pub fn within(&self, max_percent: f64) -> bool {
        self.percent_difference <= max_percent
    }
}

/// Raw output of [`diff_images`]
#[derive(Debug, Clone)]
pub struct PixelDiff {
    pub pixels_different: u64,
    pub total_pixels: u64,
    pub width: u32,
    pub height: u32,
    pub image: Option<RgbaImage>,
}

impl PixelDiff {
    pub fn percent_difference(&self) -> f64 {
        percent_of(self.pixels_different, self.total_pixels)
    }
}

/// Difference percentage; an empty image has no difference
pub fn percent_of(pixels_different: u64, total_pixels: u64) -> f64 {
    if total_pixels == 0 {
        0.0
    } else {
        pixels_different as f64 / total_pixels as f64 * 100.0
    }
}

/// Compare two equally sized images, optionally rendering a diff image
pub fn diff_images(
    reference: &RgbaImage,
    candidate: &RgbaImage,
    options: &DiffOptions,
    render: bool,
) -> VisualResult<PixelDiff> {
    if reference.dimensions() != candidate.dimensions() {
        return Err(VisualError::DimensionMismatch {
            reference: reference.dimensions(),
            candidate: candidate.dimensions(),
        });
    }

    let (width, height) = reference.dimensions();
    let total_pixels = u64::from(width) * u64::from(height);
    let mut canvas = render.then(|| RgbaImage::new(width, height));

    let img1 = reference.as_raw().as_slice();
    let img2 = candidate.as_raw().as_slice();
    let (w, h) = (width as usize, height as usize);

    if img1 == img2 {
        if let Some(out) = canvas.as_mut() {
            if !options.diff_mask {
                for (x, y, pixel) in reference.enumerate_pixels() {
                    out.put_pixel(x, y, gray_pixel(pixel, options.alpha));
                }
            }
        }
        return Ok(PixelDiff {
            pixels_different: 0,
            total_pixels,
            width,
            height,
            image: canvas,
        });
    }

    let max_delta = MAX_YIQ_DELTA * options.threshold * options.threshold;
    let mut pixels_different = 0u64;

    for y in 0..h {
        for x in 0..w {
            let pos = (y * w + x) * 4;
            let delta = color_delta(img1, img2, pos, pos, false);

            if delta.abs() > max_delta {
                let aa = !options.include_aa
                    && (antialiased(img1, x, y, w, h, img2) || antialiased(img2, x, y, w, h, img1));
                if aa {
                    if let Some(out) = canvas.as_mut() {
                        if !options.diff_mask {
                            out.put_pixel(x as u32, y as u32, solid(options.aa_color));
                        }
                    }
                } else {
                    if let Some(out) = canvas.as_mut() {
                        let color = match options.diff_color_alt {
                            Some(alt) if delta < 0.0 => alt,
                            _ => options.diff_color,
                        };
                        out.put_pixel(x as u32, y as u32, solid(color));
                    }
                    pixels_different += 1;
                }
            } else if let Some(out) = canvas.as_mut() {
                if !options.diff_mask {
                    out.put_pixel(x as u32, y as u32, gray_pixel(reference.get_pixel(x as u32, y as u32), options.alpha));
                }
            }
        }
    }

    Ok(PixelDiff {
        pixels_different,
        total_pixels,
        width,
        height,
        image: canvas,
    })
}

/// Compare two screenshot files, writing a diff image to `diff_out` when pixels differ
pub fn compare_files(
    reference: &Path,
    candidate: &Path,
    diff_out: Option<&Path>,
    options: &DiffOptions,
) -> VisualResult<ComparisonResult> {
    let reference_bytes = std::fs::read(reference)?;
    let candidate_bytes = std::fs::read(candidate)?;
    let reference_sha256 = sha256_hex(&reference_bytes);
    let candidate_sha256 = sha256_hex(&candidate_bytes);

    let reference_img = image::load_from_memory(&reference_bytes)?.to_rgba8();

    // Quick hash comparison
    if reference_sha256 == candidate_sha256 {
        debug!(
            "Screenshots match exactly (same hash): {} / {}",
            reference.display(),
            candidate.display()
        );
        let (width, height) = reference_img.dimensions();
        return Ok(ComparisonResult {
            percent_difference: 0.0,
            pixels_different: 0,
            total_pixels: u64::from(width) * u64::from(height),
            width,
            height,
            diff_image_path: None,
            reference_sha256,
            candidate_sha256,
        });
    }

    let candidate_img = image::load_from_memory(&candidate_bytes)?.to_rgba8();
    let render = diff_out.is_some() && options.write_diff_image;
    let diff = diff_images(&reference_img, &candidate_img, options, render)?;

    let diff_image_path = match (diff_out, diff.image.as_ref()) {
        (Some(path), Some(image)) if diff.pixels_different > 0 => {
            paths::ensure_parent_dir(path)?;
            image.save(path)?;
            Some(path.to_path_buf())
        }
        _ => None,
    };

    let percent_difference = diff.percent_difference();
    if diff.pixels_different > 0 {
        warn!(
            "{} of {} pixels differ ({:.4}%) between {} and {}",
            diff.pixels_different,
            diff.total_pixels,
            percent_difference,
            reference.display(),
            candidate.display()
        );
    }

    Ok(ComparisonResult {
        percent_difference,
        pixels_different: diff.pixels_different,
        total_pixels: diff.total_pixels,
        width: diff.width,
        height: diff.height,
        diff_image_path,
        reference_sha256,
        candidate_sha256,
    })
}

/// Hex SHA-256 of a byte buffer
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Signed YIQ distance between pixel `k` of `img1` and pixel `m` of `img2`.
/// Negative when the first pixel is brighter. With `y_only`, returns the
/// signed brightness difference instead.
fn color_delta(img1: &[u8], img2: &[u8], k: usize, m: usize, y_only: bool) -> f64 {
    let (mut r1, mut g1, mut b1, a1) = channels(img1, k);
    let (mut r2, mut g2, mut b2, a2) = channels(img2, m);

    if a1 == a2 && r1 == r2 && g1 == g2 && b1 == b2 {
        return 0.0;
    }

    if a1 < 255.0 {
        let a = a1 / 255.0;
        r1 = blend(r1, a);
        g1 = blend(g1, a);
        b1 = blend(b1, a);
    }
    if a2 < 255.0 {
        let a = a2 / 255.0;
        r2 = blend(r2, a);
        g2 = blend(g2, a);
        b2 = blend(b2, a);
    }

    let y1 = rgb2y(r1, g1, b1);
    let y2 = rgb2y(r2, g2, b2);
    let y = y1 - y2;

    if y_only {
        return y;
    }

    let i = rgb2i(r1, g1, b1) - rgb2i(r2, g2, b2);
    let q = rgb2q(r1, g1, b1) - rgb2q(r2, g2, b2);
    let delta = 0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q;

    if y1 > y2 {
        -delta
    } else {
        delta
    }
}

/// Whether the pixel at (x1, y1) of `img` sits on an anti-aliased edge:
/// its neighbourhood has both brighter and darker pixels, few identical
/// ones, and the extreme neighbours lie inside flat regions on both images.
fn antialiased(img: &[u8], x1: usize, y1: usize, width: usize, height: usize, other: &[u8]) -> bool {
    let x0 = x1.saturating_sub(1);
    let y0 = y1.saturating_sub(1);
    let x2 = (x1 + 1).min(width - 1);
    let y2 = (y1 + 1).min(height - 1);
    let pos = (y1 * width + x1) * 4;

    let mut zeroes = usize::from(x1 == x0 || x1 == x2 || y1 == y0 || y1 == y2);
    let mut min = 0.0;
    let mut max = 0.0;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (0, 0, 0, 0);

    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }

            let delta = color_delta(img, img, pos, (y * width + x) * 4, true);
            if delta == 0.0 {
                zeroes += 1;
                if zeroes > 2 {
                    return false;
                }
            } else if delta < min {
                min = delta;
                min_x = x;
                min_y = y;
            } else if delta > max {
                max = delta;
                max_x = x;
                max_y = y;
            }
        }
    }

    if min == 0.0 || max == 0.0 {
        return false;
    }

    (has_many_siblings(img, min_x, min_y, width, height)
        && has_many_siblings(other, min_x, min_y, width, height))
        || (has_many_siblings(img, max_x, max_y, width, height)
            && has_many_siblings(other, max_x, max_y, width, height))
}

/// More than two identical neighbours (image edges count as one)
fn has_many_siblings(img: &[u8], x1: usize, y1: usize, width: usize, height: usize) -> bool {
    let x0 = x1.saturating_sub(1);
    let y0 = y1.saturating_sub(1);
    let x2 = (x1 + 1).min(width - 1);
    let y2 = (y1 + 1).min(height - 1);
    let pos = (y1 * width + x1) * 4;

    let mut zeroes = usize::from(x1 == x0 || x1 == x2 || y1 == y0 || y1 == y2);

    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }
            let pos2 = (y * width + x) * 4;
            if img[pos..pos + 4] == img[pos2..pos2 + 4] {
                zeroes += 1;
            }
            if zeroes > 2 {
                return true;
            }
        }
    }

    false
}

fn channels(img: &[u8], k: usize) -> (f64, f64, f64, f64) {
    (
        f64::from(img[k]),
        f64::from(img[k + 1]),
        f64::from(img[k + 2]),
        f64::from(img[k + 3]),
    )
}

fn rgb2y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.29889531 + g * 0.58662247 + b * 0.11448223
}

fn rgb2i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.59597799 - g * 0.27417610 - b * 0.32180189
}

fn rgb2q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.21147017 - g * 0.52261711 + b * 0.31114694
}

/// Blend a channel onto white
fn blend(c: f64, a: f64) -> f64 {
    255.0 + (c - 255.0) * a
}

fn solid([r, g, b]: [u8; 3]) -> Rgba<u8> {
    Rgba([r, g, b, 255])
}

fn gray_pixel(pixel: &Rgba<u8>, alpha: f64) -> Rgba<u8> {
    let [r, g, b, a] = pixel.0;
    let luma = rgb2y(f64::from(r), f64::from(g), f64::from(b));
    let value = blend(luma, alpha * f64::from(a) / 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba([value, value, value, 255])
}
