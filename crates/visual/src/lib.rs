//! Vybe Visual Regression
//!
//! Compares a static reference build of the site against the live candidate
//! app, page by page and viewport by viewport:
//! - Captures both sides in isolated browser contexts via Playwright
//! - Extracts computed styles for a versioned set of tracked selectors
//! - Diffs screenshots pixel by pixel with anti-aliasing detection
//! - Emits Markdown and JSON reports per page plus a run summary
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    AuditRunner (pipeline)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  preflight() -> both servers reachable                      │
//! │  for page (bounded concurrency, config order):              │
//! │    for viewport:                                            │
//! │      ├── visit(reference) ┐ concurrent                      │
//! │      ├── visit(candidate) ┘ -> PNG + StyleSnapshot          │
//! │      ├── compare_files()      -> ComparisonResult + diff   │
//! │      └── compare_snapshots()  -> StyleComparison            │
//! │  RunAccumulator -> ComparisonReport                         │
//! │    ├── <output>/<page>/report.{md,json}                     │
//! │    └── <output>/summary.{md,json}                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod capture;
pub mod config;
pub mod diff;
pub mod driver;
pub mod error;
pub mod paths;
pub mod pipeline;
pub mod playwright;
pub mod report;
pub mod server;
pub mod styles;

pub use capture::{CaptureOptions, CaptureTarget, Side};
pub use config::{AuditConfig, PageSpec, SelectorSet, Viewport};
pub use diff::{compare_files, ComparisonResult, DiffOptions};
pub use driver::{BrowserDriver, PageVisit, VisitRequest};
pub use error::{VisualError, VisualResult};
pub use pipeline::{AuditRunner, RunSummary};
pub use playwright::{Browser, PlaywrightConfig, PlaywrightDriver};
pub use report::{ComparisonReport, PageReport, ViewportReport};
pub use styles::{compare_snapshots, StyleComparison, StyleSnapshot};
