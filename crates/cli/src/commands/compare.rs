//! Compare command

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tracing::{debug, info};

use vybe_visual::config::STORY_PAGES_ENV;
use vybe_visual::report::{PageReport, ViewportReport};
use vybe_visual::{AuditConfig, AuditRunner, Browser, PlaywrightConfig, PlaywrightDriver};

use crate::output::{print_error, print_info, print_list, print_warning, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct CompareArgs {
    /// Reference server base URL (overrides DEMO_URL)
    #[arg(long)]
    reference_url: Option<String>,

    /// Candidate server base URL (overrides NEXTJS_URL)
    #[arg(long)]
    candidate_url: Option<String>,

    /// Only compare these page keys (overrides STORY_PAGES)
    #[arg(long, value_delimiter = ',')]
    pages: Vec<String>,

    /// Output directory for screenshots and reports
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Perceptual threshold (0.0 - 1.0)
    #[arg(long)]
    threshold: Option<f64>,

    /// Maximum difference percentage for a viewport to pass
    #[arg(long)]
    max_diff: Option<f64>,

    /// Count anti-aliased pixels as differences
    #[arg(long)]
    include_aa: bool,

    /// Capture the full scrollable page instead of the viewport
    #[arg(long)]
    full_page: bool,

    /// Skip computed style extraction
    #[arg(long)]
    no_styles: bool,

    /// Number of pages compared at the same time
    #[arg(long)]
    concurrency: Option<usize>,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long, default_value = "chromium")]
    browser: String,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Directory whose node_modules provides playwright
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Do not wait for the servers before capturing
    #[arg(long)]
    skip_preflight: bool,
}

/// One row of the result table
#[derive(Serialize)]
pub struct ViewportRow {
    pub page: String,
    pub viewport: String,
    pub difference: String,
    pub pixels: String,
    pub stable: bool,
    pub styles: String,
    pub passed: bool,
}

impl ViewportRow {
    fn from_viewport(page: &PageReport, v: &ViewportReport, budget: f64) -> Self {
        let styles = v
            .styles
            .as_ref()
            .map(|s| format!("{} match, {} differ, {} skipped", s.matched(), s.differing(), s.skipped()))
            .unwrap_or_else(|| "-".to_string());

        Self {
            page: page.key.clone(),
            viewport: v.viewport.label.clone(),
            difference: format!("{:.4}%", v.result.percent_difference),
            pixels: format!("{} / {}", v.result.pixels_different, v.result.total_pixels),
            stable: v.stable,
            styles,
            passed: v.passes(budget),
        }
    }

    fn from_error(page: &PageReport, error: &str) -> Self {
        Self {
            page: page.key.clone(),
            viewport: "-".to_string(),
            difference: format!("error: {error}"),
            pixels: "-".to_string(),
            stable: false,
            styles: "-".to_string(),
            passed: false,
        }
    }
}

impl TableDisplay for ViewportRow {
    fn headers() -> Vec<&'static str> {
        vec!["Page", "Viewport", "Difference", "Pixels", "Stable", "Styles", "Result"]
    }

    fn row(&self) -> Vec<String> {
        let result = if self.passed {
            "✓ PASS".green().to_string()
        } else {
            "✗ FAIL".red().to_string()
        };

        vec![
            self.page.clone(),
            self.viewport.clone(),
            self.difference.clone(),
            self.pixels.clone(),
            if self.stable { "yes".to_string() } else { "no".yellow().to_string() },
            self.styles.clone(),
            result,
        ]
    }
}

/// Resolve configuration: file, then environment, then flags.
///
/// `--pages` replaces `STORY_PAGES` rather than narrowing it further.
fn resolve_config<F>(args: &CompareArgs, config_path: &Path, env: F) -> Result<AuditConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = AuditConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    if args.pages.is_empty() {
        config.apply_overrides(env)?;
    } else {
        config.apply_overrides(|key| if key == STORY_PAGES_ENV { None } else { env(key) })?;
    }

    if let Some(url) = &args.reference_url {
        config.reference_url = url.clone();
    }
    if let Some(url) = &args.candidate_url {
        config.candidate_url = url.clone();
    }
    if !args.pages.is_empty() {
        config.select_pages(&args.pages)?;
    }
    if let Some(output) = &args.output {
        config.output_dir = output.clone();
    }
    if let Some(threshold) = args.threshold {
        config.diff.threshold = threshold;
    }
    if let Some(max_diff) = args.max_diff {
        config.max_difference_percent = max_diff;
    }
    if let Some(concurrency) = args.concurrency {
        config.max_concurrent_pages = concurrency;
    }
    config.diff.include_aa |= args.include_aa;
    config.capture.full_page |= args.full_page;
    if args.no_styles {
        config.capture.extract_styles = false;
    }

    Ok(config)
}

pub async fn execute(args: CompareArgs, config_path: &Path, format: OutputFormat) -> Result<bool> {
    let config = resolve_config(&args, config_path, |key| std::env::var(key).ok())?;
    debug!(
        "Resolved config: reference={} candidate={} output={}",
        config.reference_url,
        config.candidate_url,
        config.output_dir.display()
    );

    let driver = PlaywrightDriver::new(PlaywrightConfig {
        browser: args.browser.parse::<Browser>()?,
        headless: !args.headed,
        node_binary: PathBuf::from("node"),
        project_dir: args.project_dir.clone(),
        script_timeout: Duration::from_millis(config.capture.script_timeout_ms),
    })
    .context("run `npm install playwright` in the project directory")?;

    let runner = AuditRunner::new(config, driver)?;
    let pages: Vec<&str> = runner.config().pages.iter().map(|p| p.key.as_str()).collect();
    info!(
        "Comparing {} against {} for pages [{}]",
        runner.config().candidate_url,
        runner.config().reference_url,
        pages.join(", ")
    );

    if !args.skip_preflight {
        runner.preflight().await?;
    }

    let summary = runner.run().await?;
    let report = &summary.report;
    let budget = report.max_difference_percent;

    let mut rows = Vec::new();
    for page in &report.pages {
        if let Some(error) = &page.error {
            rows.push(ViewportRow::from_error(page, error));
        }
        rows.extend(page.viewports.iter().map(|v| ViewportRow::from_viewport(page, v, budget)));
    }
    print_list(&rows, format);

    if rows.iter().any(|r| !r.stable && r.viewport != "-") {
        print_warning("Some captures were taken before paint settled");
    }
    print_info(&format!("Summary: {}", summary.summary.markdown.display()));

    if summary.passed() {
        println!(
            "{} {} page(s) within {:.2}% ({:.1}s)",
            "✓".green(),
            report.pages.len(),
            budget,
            summary.duration.as_secs_f64()
        );
    } else {
        print_error(&format!(
            "{} of {} page(s) failed the {:.2}% budget",
            report.failed_pages(),
            report.pages.len(),
            budget
        ));
    }

    Ok(summary.passed())
}
