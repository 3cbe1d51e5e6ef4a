//! Report emission tests

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use vybe_visual::config::{AuditConfig, Viewport};
use vybe_visual::diff::{percent_of, ComparisonResult};
use vybe_visual::report::{ComparisonReport, PageReport, RunAccumulator, ViewportReport};

fn page(key: &str, pixels_different: u64) -> PageReport {
    PageReport {
        key: key.to_string(),
        reference_url: format!("http://localhost:8080/pages/{key}.html"),
        candidate_url: format!("http://localhost:3000/{key}"),
        viewports: vec![ViewportReport {
            viewport: Viewport::new("desktop", 1440, 900),
            reference_screenshot: format!("visual-snapshots/{key}/desktop-reference.png").into(),
            candidate_screenshot: format!("visual-snapshots/{key}/desktop-candidate.png").into(),
            result: ComparisonResult {
                percent_difference: percent_of(pixels_different, 1440 * 900),
                pixels_different,
                total_pixels: 1440 * 900,
                width: 1440,
                height: 900,
                diff_image_path: None,
                reference_sha256: "00".repeat(32),
                candidate_sha256: "11".repeat(32),
            },
            stable: true,
            styles: None,
        }],
        error: None,
    }
}

fn report(generated_at: chrono::DateTime<Utc>) -> ComparisonReport {
    let mut accumulator = RunAccumulator::new("summary", &AuditConfig::default());
    accumulator.record(page("home", 0));
    accumulator.record(page("pricing", 64_800));
    accumulator.finish(generated_at)
}

fn without_timestamps(text: &str) -> String {
    text.lines()
        .filter(|line| !line.contains("Generated:") && !line.contains("\"generated_at\""))
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn test_rewrite_replaces_previous_report() {
    let temp = TempDir::new().unwrap();
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    let first = report(at).write(temp.path(), "summary").unwrap();
    let markdown = std::fs::read(&first.markdown).unwrap();
    let json = std::fs::read(&first.json).unwrap();

    let second = report(at).write(temp.path(), "summary").unwrap();
    assert_eq!(first, second);
    assert_eq!(std::fs::read(&second.markdown).unwrap(), markdown);
    assert_eq!(std::fs::read(&second.json).unwrap(), json);
}

#[test]
fn test_only_timestamp_varies_between_runs() {
    let earlier = report(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
    let later = report(Utc.with_ymd_and_hms(2026, 3, 2, 8, 30, 0).unwrap());

    assert_ne!(earlier.to_markdown(), later.to_markdown());
    assert_eq!(
        without_timestamps(&earlier.to_markdown()),
        without_timestamps(&later.to_markdown())
    );
    assert_eq!(
        without_timestamps(&earlier.to_json().unwrap()),
        without_timestamps(&later.to_json().unwrap())
    );
}

#[test]
fn test_summary_verdict_follows_budget() {
    let report = report(Utc::now());
    // 64_800 of 1_296_000 pixels is 5%
    assert!(!report.passed());
    assert_eq!(report.failed_pages(), 1);

    let markdown = report.to_markdown();
    assert!(markdown.contains("- Verdict: FAIL"));
    assert!(markdown.contains("| home | desktop | 0.0000% | PASS |"));
    assert!(markdown.contains("| pricing | desktop | 5.0000% | FAIL |"));

    let single = report.for_page(&report.pages[0]);
    assert!(single.passed());
    assert!(single.to_markdown().contains("# Visual comparison: home"));
}

#[test]
fn test_json_is_machine_readable() {
    let report = report(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
    let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    assert_eq!(value["pages"][1]["key"], "pricing");
    assert_eq!(value["pages"][1]["viewports"][0]["result"]["pixels_different"], 64_800);
    assert_eq!(value["pages"][0]["viewports"][0]["viewport"]["label"], "desktop");
    assert_eq!(value["max_difference_percent"], 1.0);
}
