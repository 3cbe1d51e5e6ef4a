//! Diff command

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use vybe_visual::{compare_files, AuditConfig, ComparisonResult};

use crate::output::{print_error, print_item, print_success, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct DiffArgs {
    /// Reference screenshot (PNG)
    reference: PathBuf,

    /// Candidate screenshot (PNG)
    candidate: PathBuf,

    /// Where to write the diff image
    #[arg(long)]
    out: Option<PathBuf>,

    /// Perceptual threshold (0.0 - 1.0)
    #[arg(long)]
    threshold: Option<f64>,

    /// Count anti-aliased pixels as differences
    #[arg(long)]
    include_aa: bool,

    /// Maximum difference percentage to pass
    #[arg(long)]
    max_diff: Option<f64>,
}

#[derive(Serialize)]
pub struct DiffDisplay {
    #[serde(flatten)]
    pub result: ComparisonResult,
    pub passed: bool,
}

impl TableDisplay for DiffDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Size", "Difference", "Pixels different", "Diff image", "Result"]
    }

    fn row(&self) -> Vec<String> {
        let r = &self.result;
        vec![
            format!("{}x{}", r.width, r.height),
            format!("{:.4}%", r.percent_difference),
            format!("{} / {}", r.pixels_different, r.total_pixels),
            r.diff_image_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
            if self.passed { "PASS" } else { "FAIL" }.to_string(),
        ]
    }
}

pub async fn execute(args: DiffArgs, config_path: &Path, format: OutputFormat) -> Result<bool> {
    let config = AuditConfig::load(config_path)?;

    let mut options = config.diff.clone();
    if let Some(threshold) = args.threshold {
        options.threshold = threshold;
    }
    options.include_aa |= args.include_aa;
    let budget = args.max_diff.unwrap_or(config.max_difference_percent);

    let result = tokio::task::spawn_blocking(move || {
        compare_files(&args.reference, &args.candidate, args.out.as_deref(), &options)
    })
    .await??;

    let display = DiffDisplay {
        passed: result.within(budget),
        result,
    };
    print_item(&display, format);

    if display.passed {
        print_success(&format!("Within the {:.2}% budget", budget));
    } else {
        print_error(&format!(
            "{:.4}% differs, budget is {:.2}%",
            display.result.percent_difference, budget
        ));
    }

    Ok(display.passed)
}
