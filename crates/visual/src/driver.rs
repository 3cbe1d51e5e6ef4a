//! Browser driver seam
//!
//! The pipeline only needs "visit this target, write a screenshot, maybe
//! extract styles". [`crate::playwright::PlaywrightDriver`] does that with a
//! real browser; tests substitute drivers that write synthetic images.

use std::path::{Path, PathBuf};

use crate::capture::{CaptureOptions, CaptureTarget};
use crate::config::SelectorSet;
use crate::error::VisualResult;
use crate::styles::StyleSnapshot;

/// Everything a driver needs for one page visit
#[derive(Debug, Clone, Copy)]
pub struct VisitRequest<'a> {
    pub target: &'a CaptureTarget,
    pub options: &'a CaptureOptions,
    pub screenshot_path: &'a Path,
    /// Run style extraction with this selector set
    pub selectors: Option<&'a SelectorSet>,
}

/// Outcome of one page visit
#[derive(Debug, Clone)]
pub struct PageVisit {
    pub screenshot_path: PathBuf,
    /// Whether stable paint was reached before the budget ran out
    pub stable: bool,
    pub styles: Option<StyleSnapshot>,
}

/// Drives a browser through a single capture
#[async_trait::async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Driver name for logs
    fn name(&self) -> &'static str;

    /// Navigate, capture and optionally extract styles. Navigation
    /// failures and timeouts are returned as errors; there is no retry.
    async fn visit(&self, request: VisitRequest<'_>) -> VisualResult<PageVisit>;
}
