//! Report emission: Markdown for people, JSON for machines
//!
//! Reports are written once per run and replace whatever was at the same
//! path. For a fixed input the output only varies in `generated_at`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::{AuditConfig, Viewport};
use crate::diff::ComparisonResult;
use crate::error::VisualResult;
use crate::paths;
use crate::styles::{CountPair, ElementOutcome, StyleComparison};

/// One viewport of one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportReport {
    pub viewport: Viewport,
    pub reference_screenshot: PathBuf,
    pub candidate_screenshot: PathBuf,
    pub result: ComparisonResult,
    /// Both sides reached stable paint before capture
    pub stable: bool,
    pub styles: Option<StyleComparison>,
}

impl ViewportReport {
    pub fn passes(&self, max_difference_percent: f64) -> bool {
        self.result.within(max_difference_percent)
    }
}

/// All viewports of one page, or the error that stopped it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    pub key: String,
    pub reference_url: String,
    pub candidate_url: String,
    pub viewports: Vec<ViewportReport>,
    pub error: Option<String>,
}

impl PageReport {
    pub fn passes(&self, max_difference_percent: f64) -> bool {
        self.error.is_none() && self.viewports.iter().all(|v| v.passes(max_difference_percent))
    }
}

/// A complete comparison report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub selector_set_version: u32,
    pub threshold: f64,
    pub max_difference_percent: f64,
    pub pages: Vec<PageReport>,
}

/// Where a report was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub markdown: PathBuf,
    pub json: PathBuf,
}

impl ComparisonReport {
    pub fn passed(&self) -> bool {
        self.pages.iter().all(|p| p.passes(self.max_difference_percent))
    }

    pub fn failed_pages(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| !p.passes(self.max_difference_percent))
            .count()
    }

    /// A report narrowed to a single page, sharing this run's settings
    pub fn for_page(&self, page: &PageReport) -> Self {
        Self {
            title: page.key.clone(),
            generated_at: self.generated_at,
            selector_set_version: self.selector_set_version,
            threshold: self.threshold,
            max_difference_percent: self.max_difference_percent,
            pages: vec![page.clone()],
        }
    }

    pub fn to_json(&self) -> VisualResult<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    pub fn to_markdown(&self) -> String {
        let budget = self.max_difference_percent;
        let mut md = String::new();

        let _ = writeln!(md, "# Visual comparison: {}", self.title);
        md.push('\n');
        let _ = writeln!(
            md,
            "- Generated: {}",
            self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let _ = writeln!(md, "- Selector set: v{}", self.selector_set_version);
        let _ = writeln!(md, "- Perceptual threshold: {}", self.threshold);
        let _ = writeln!(md, "- Difference budget: {:.2}%", budget);
        let _ = writeln!(md, "- Verdict: {}", verdict(self.passed()));
        md.push('\n');

        md.push_str("## Overview\n\n");
        md.push_str("| Page | Viewport | Difference | Result |\n");
        md.push_str("|------|----------|------------|--------|\n");
        for page in &self.pages {
            if let Some(error) = &page.error {
                let _ = writeln!(md, "| {} | - | error: {} | FAIL |", page.key, escape_cell(error));
            }
            for v in &page.viewports {
                let _ = writeln!(
                    md,
                    "| {} | {} | {:.4}% | {} |",
                    page.key,
                    v.viewport.label,
                    v.result.percent_difference,
                    verdict(v.passes(budget))
                );
            }
        }

        for page in &self.pages {
            md.push('\n');
            render_page(&mut md, page, budget);
        }

        md
    }

    /// Write `<stem>.md` and `<stem>.json` into `dir`, replacing earlier runs
    pub fn write(&self, dir: &Path, stem: &str) -> VisualResult<ReportPaths> {
        paths::ensure_dir(dir)?;

        let markdown = dir.join(format!("{stem}.md"));
        let json = dir.join(format!("{stem}.json"));
        std::fs::write(&markdown, self.to_markdown())?;
        std::fs::write(&json, self.to_json()?)?;

        info!("Report written to: {}", markdown.display());
        Ok(ReportPaths { markdown, json })
    }
}

fn render_page(md: &mut String, page: &PageReport, budget: f64) {
    let _ = writeln!(md, "## Page: {}", page.key);
    md.push('\n');
    let _ = writeln!(md, "- Reference: {}", page.reference_url);
    let _ = writeln!(md, "- Candidate: {}", page.candidate_url);

    if let Some(error) = &page.error {
        let _ = writeln!(md, "- Error: {}", error);
    }

    if page.viewports.is_empty() {
        return;
    }

    md.push_str("\n### Pixel difference\n\n");
    md.push_str("| Viewport | Size | Difference | Pixels different | Stable paint | Diff image | Result |\n");
    md.push_str("|----------|------|------------|------------------|--------------|------------|--------|\n");
    for v in &page.viewports {
        let r = &v.result;
        let _ = writeln!(
            md,
            "| {} | {}x{} | {:.4}% | {} / {} | {} | {} | {} |",
            v.viewport.label,
            r.width,
            r.height,
            r.percent_difference,
            r.pixels_different,
            r.total_pixels,
            if v.stable { "yes" } else { "no" },
            r.diff_image_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
            verdict(v.passes(budget)),
        );
    }

    for v in &page.viewports {
        if let Some(styles) = &v.styles {
            let _ = writeln!(md, "\n### Styles ({})\n", v.viewport.label);
            render_styles(md, styles);
        }
    }
}

fn render_styles(md: &mut String, styles: &StyleComparison) {
    md.push_str("| Metric | Reference | Candidate | Same |\n");
    md.push_str("|--------|-----------|-----------|------|\n");
    for (label, pair) in [
        ("Gradients", styles.gradients),
        ("Shadows", styles.shadows),
        ("Background colors", styles.background_colors),
    ] {
        render_count(md, label, pair);
    }
    md.push('\n');

    for element in &styles.elements {
        match &element.outcome {
            ElementOutcome::Match => {
                let _ = writeln!(md, "- PASS `{}`: styles match", element.name);
            }
            ElementOutcome::Differs { properties } => {
                let listed: Vec<String> = properties
                    .iter()
                    .map(|p| format!("{} (`{}` vs `{}`)", p.property, p.reference, p.candidate))
                    .collect();
                let _ = writeln!(md, "- FAIL `{}`: {}", element.name, listed.join("; "));
            }
            ElementOutcome::Skipped {
                reference_missing,
                candidate_missing,
            } => {
                let side = match (reference_missing, candidate_missing) {
                    (true, true) => "both pages",
                    (true, false) => "reference",
                    _ => "candidate",
                };
                let _ = writeln!(md, "- SKIP `{}`: not found on {}", element.name, side);
            }
        }
    }
}

fn render_count(md: &mut String, label: &str, pair: CountPair) {
    let _ = writeln!(
        md,
        "| {} | {} | {} | {} |",
        label,
        pair.reference,
        pair.candidate,
        if pair.matches() { "yes" } else { "no" }
    );
}

fn verdict(pass: bool) -> &'static str {
    if pass {
        "PASS"
    } else {
        "FAIL"
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Collects page results for one run.
///
/// Created per run and handed through the pipeline explicitly; nothing
/// survives between runs except the files written from it.
#[derive(Debug, Clone)]
pub struct RunAccumulator {
    title: String,
    selector_set_version: u32,
    threshold: f64,
    max_difference_percent: f64,
    pages: Vec<PageReport>,
}

impl RunAccumulator {
    pub fn new(title: impl Into<String>, config: &AuditConfig) -> Self {
        Self {
            title: title.into(),
            selector_set_version: config.selectors.version,
            threshold: config.diff.threshold,
            max_difference_percent: config.max_difference_percent,
            pages: Vec::new(),
        }
    }

    pub fn record(&mut self, page: PageReport) {
        self.pages.push(page);
    }

    pub fn finish(self, generated_at: DateTime<Utc>) -> ComparisonReport {
        ComparisonReport {
            title: self.title,
            generated_at,
            selector_set_version: self.selector_set_version,
            threshold: self.threshold,
            max_difference_percent: self.max_difference_percent,
            pages: self.pages,
        }
    }
}
