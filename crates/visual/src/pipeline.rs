//! Pipeline runner: capture both sides, diff, compare styles, emit reports

use chrono::Utc;
use futures::StreamExt;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::capture::{CaptureOptions, CaptureTarget, Side};
use crate::config::{AuditConfig, PageSpec, Viewport};
use crate::diff::compare_files;
use crate::driver::{BrowserDriver, VisitRequest};
use crate::error::VisualResult;
use crate::paths;
use crate::report::{ComparisonReport, PageReport, ReportPaths, RunAccumulator, ViewportReport};
use crate::server;
use crate::styles::compare_snapshots;

/// Outcome of a full run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub report: ComparisonReport,
    pub summary: ReportPaths,
    pub page_reports: Vec<ReportPaths>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn passed(&self) -> bool {
        self.report.passed()
    }
}

/// Runs the comparison pipeline for every configured page and viewport
pub struct AuditRunner<D> {
    config: AuditConfig,
    driver: D,
}

impl<D: BrowserDriver> AuditRunner<D> {
    /// Create a runner; the configuration is validated up front
    pub fn new(config: AuditConfig, driver: D) -> VisualResult<Self> {
        config.validate()?;
        Ok(Self { config, driver })
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Check both servers answer before any browser is started
    pub async fn preflight(&self) -> VisualResult<()> {
        server::preflight(
            &self.config.reference_url,
            &self.config.candidate_url,
            Duration::from_millis(self.config.preflight_timeout_ms),
        )
        .await
    }

    /// Compare every page and write per-page and summary reports
    pub async fn run(&self) -> VisualResult<RunSummary> {
        let start = Instant::now();
        paths::ensure_dir(&self.config.output_dir)?;

        info!(
            "Comparing {} page(s) x {} viewport(s) with the {} driver",
            self.config.pages.len(),
            self.config.viewports.len(),
            self.driver.name()
        );

        let mut accumulator = RunAccumulator::new("summary", &self.config);
        let mut pages = futures::stream::iter(self.config.pages.iter())
            .map(|page| self.run_page(page))
            .buffered(self.config.max_concurrent_pages);

        while let Some(page) = pages.next().await {
            if page.passes(self.config.max_difference_percent) {
                info!("✓ {}", page.key);
            } else {
                error!("✗ {}", page.key);
            }
            accumulator.record(page);
        }

        let report = accumulator.finish(Utc::now());

        let mut page_reports = Vec::with_capacity(report.pages.len());
        for page in &report.pages {
            let dir = paths::page_dir(&self.config.output_dir, &page.key);
            page_reports.push(report.for_page(page).write(&dir, paths::PAGE_REPORT_STEM)?);
        }
        let summary = report.write(&self.config.output_dir, paths::SUMMARY_STEM)?;

        let duration = start.elapsed();
        info!(
            "Visual comparison: {} passed, {} failed ({} ms)",
            report.pages.len() - report.failed_pages(),
            report.failed_pages(),
            duration.as_millis()
        );

        Ok(RunSummary {
            report,
            summary,
            page_reports,
            duration,
        })
    }

    /// Run every viewport of one page. The first failure stops the page and
    /// is recorded on its report; other pages are unaffected.
    pub async fn run_page(&self, page: &PageSpec) -> PageReport {
        let mut report = PageReport {
            key: page.key.clone(),
            reference_url: page.reference_url(&self.config.reference_url),
            candidate_url: page.candidate_url(&self.config.candidate_url),
            viewports: Vec::new(),
            error: None,
        };

        for viewport in &self.config.viewports {
            match self.compare_viewport(page, viewport).await {
                Ok(result) => report.viewports.push(result),
                Err(e) => {
                    error!("{} @ {}: {}", page.key, viewport.label, e);
                    report.error = Some(format!("{}: {}", viewport.label, e));
                    break;
                }
            }
        }

        report
    }

    /// Capture both sides concurrently, then diff, then compare styles
    pub async fn compare_viewport(&self, page: &PageSpec, viewport: &Viewport) -> VisualResult<ViewportReport> {
        let output_dir = &self.config.output_dir;
        let options = CaptureOptions::from(&self.config.capture);
        let selectors = self.config.capture.extract_styles.then_some(&self.config.selectors);

        let reference = CaptureTarget::for_page(&self.config, page, Side::Reference, viewport);
        let candidate = CaptureTarget::for_page(&self.config, page, Side::Candidate, viewport);
        let reference_path = paths::screenshot_path(output_dir, &page.key, &viewport.label, Side::Reference);
        let candidate_path = paths::screenshot_path(output_dir, &page.key, &viewport.label, Side::Candidate);

        debug!("{} @ {}: capturing both sides", page.key, viewport.label);
        let (reference_visit, candidate_visit) = tokio::try_join!(
            self.driver.visit(VisitRequest {
                target: &reference,
                options: &options,
                screenshot_path: &reference_path,
                selectors,
            }),
            self.driver.visit(VisitRequest {
                target: &candidate,
                options: &options,
                screenshot_path: &candidate_path,
                selectors,
            }),
        )?;

        let diff_path = paths::diff_image_path(output_dir, &page.key, &viewport.label);
        let result = {
            let reference_shot = reference_visit.screenshot_path.clone();
            let candidate_shot = candidate_visit.screenshot_path.clone();
            let diff_options = self.config.diff.clone();
            tokio::task::spawn_blocking(move || {
                let result = compare_files(&reference_shot, &candidate_shot, Some(&diff_path), &diff_options)?;
                if result.diff_image_path.is_none() {
                    remove_stale(&diff_path)?;
                }
                Ok::<_, crate::error::VisualError>(result)
            })
            .await??
        };

        let styles = match (&reference_visit.styles, &candidate_visit.styles) {
            (Some(reference), Some(candidate)) => Some(compare_snapshots(reference, candidate)),
            _ => None,
        };

        let stable = reference_visit.stable && candidate_visit.stable;
        if !stable {
            warn!("{} @ {}: captured before paint settled", page.key, viewport.label);
        }

        info!(
            "{} @ {}: {:.4}% different ({} / {} pixels)",
            page.key, viewport.label, result.percent_difference, result.pixels_different, result.total_pixels
        );

        Ok(ViewportReport {
            viewport: viewport.clone(),
            reference_screenshot: reference_visit.screenshot_path,
            candidate_screenshot: candidate_visit.screenshot_path,
            result,
            stable,
            styles,
        })
    }
}

/// Drop a diff image left by an earlier run
fn remove_stale(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
