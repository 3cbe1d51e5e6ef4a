//! Output layout under the snapshot directory
//!
//! ```text
//! <output_dir>/
//!   summary.md, summary.json
//!   <page_key>/
//!     <viewport>-reference.png
//!     <viewport>-candidate.png
//!     <viewport>-diff.png
//!     report.md, report.json
//! ```

use std::path::{Path, PathBuf};

use crate::capture::Side;

pub const SUMMARY_STEM: &str = "summary";
pub const PAGE_REPORT_STEM: &str = "report";

pub fn page_dir(output_dir: &Path, page_key: &str) -> PathBuf {
    output_dir.join(page_key)
}

pub fn screenshot_path(output_dir: &Path, page_key: &str, viewport_label: &str, side: Side) -> PathBuf {
    page_dir(output_dir, page_key).join(format!("{}-{}.png", viewport_label, side.as_str()))
}

pub fn diff_image_path(output_dir: &Path, page_key: &str, viewport_label: &str) -> PathBuf {
    page_dir(output_dir, page_key).join(format!("{}-diff.png", viewport_label))
}

/// Create the parent directory of `path`.
///
/// Concurrent visits share page directories, so an `AlreadyExists` race
/// is not an error.
pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

pub fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    match std::fs::create_dir_all(dir) {
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        other => other,
    }
}
