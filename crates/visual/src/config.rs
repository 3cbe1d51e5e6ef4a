//! Audit configuration
//!
//! One TOML document describes both servers, the pages and viewports to
//! compare, and the versioned selector set every style extraction uses.
//! Precedence is: built-in defaults, then the config file, then the
//! `DEMO_URL` / `NEXTJS_URL` / `STORY_PAGES` environment, then CLI flags.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::diff::DiffOptions;
use crate::error::{VisualError, VisualResult};

/// Overrides the reference (static demo) base URL
pub const DEMO_URL_ENV: &str = "DEMO_URL";

/// Overrides the candidate (application) base URL
pub const NEXTJS_URL_ENV: &str = "NEXTJS_URL";

/// Comma-separated page keys to restrict a run to
pub const STORY_PAGES_ENV: &str = "STORY_PAGES";

/// Top-level audit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Base URL of the server hosting the static reference pages
    pub reference_url: String,

    /// Base URL of the application under test
    pub candidate_url: String,

    /// Root directory for screenshots and reports
    pub output_dir: PathBuf,

    /// A viewport passes when its difference percentage is at or below this
    pub max_difference_percent: f64,

    /// Number of pages compared at the same time
    pub max_concurrent_pages: usize,

    /// How long to wait for both servers before a run (0 = single probe)
    pub preflight_timeout_ms: u64,

    /// Browser capture settings
    pub capture: CaptureSettings,

    /// Pixel diff settings
    pub diff: DiffOptions,

    /// Elements tracked by style extraction
    pub selectors: SelectorSet,

    /// Viewports every page is captured at
    pub viewports: Vec<Viewport>,

    /// Pages to compare
    pub pages: Vec<PageSpec>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            reference_url: "http://localhost:8080".to_string(),
            candidate_url: "http://localhost:3000".to_string(),
            output_dir: PathBuf::from("visual-snapshots"),
            max_difference_percent: 1.0,
            max_concurrent_pages: 1,
            preflight_timeout_ms: 5_000,
            capture: CaptureSettings::default(),
            diff: DiffOptions::default(),
            selectors: SelectorSet::default(),
            viewports: Viewport::defaults(),
            pages: PageSpec::defaults(),
        }
    }
}

impl AuditConfig {
    /// Load configuration from file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> VisualResult<Self> {
        if path.exists() {
            debug!("Loading audit config from {}", path.display());
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> VisualResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `DEMO_URL`, `NEXTJS_URL` and `STORY_PAGES` from the process environment
    pub fn apply_env(&mut self) -> VisualResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply environment-style overrides from an arbitrary lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> VisualResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(DEMO_URL_ENV).filter(|v| !v.trim().is_empty()) {
            debug!("{} overrides reference URL: {}", DEMO_URL_ENV, url);
            self.reference_url = url.trim().to_string();
        }

        if let Some(url) = lookup(NEXTJS_URL_ENV).filter(|v| !v.trim().is_empty()) {
            debug!("{} overrides candidate URL: {}", NEXTJS_URL_ENV, url);
            self.candidate_url = url.trim().to_string();
        }

        if let Some(pages) = lookup(STORY_PAGES_ENV) {
            let keys = parse_page_keys(&pages);
            if !keys.is_empty() {
                self.select_pages(&keys)?;
            }
        }

        Ok(())
    }

    /// Restrict the configured pages to the given keys, keeping configured order
    pub fn select_pages(&mut self, keys: &[String]) -> VisualResult<()> {
        let known: HashSet<&str> = self.pages.iter().map(|p| p.key.as_str()).collect();
        for key in keys {
            if !known.contains(key.as_str()) {
                warn!("Unknown page key '{}' ignored", key);
            }
        }

        self.pages.retain(|page| keys.iter().any(|k| k == &page.key));

        if self.pages.is_empty() {
            return Err(VisualError::InvalidConfig(format!(
                "page selection [{}] matched no configured pages",
                keys.join(", ")
            )));
        }
        Ok(())
    }

    /// Check the configuration for values the pipeline cannot work with
    pub fn validate(&self) -> VisualResult<()> {
        for (name, url) in [("reference_url", &self.reference_url), ("candidate_url", &self.candidate_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(VisualError::InvalidConfig(format!(
                    "{name} must be an http(s) URL, got '{url}'"
                )));
            }
        }

        if self.viewports.is_empty() {
            return Err(VisualError::InvalidConfig("at least one viewport is required".into()));
        }
        let mut labels = HashSet::new();
        for viewport in &self.viewports {
            if !is_path_segment(&viewport.label) {
                return Err(VisualError::InvalidConfig(format!(
                    "viewport label '{}' must be a non-empty path segment",
                    viewport.label
                )));
            }
            if viewport.width == 0 || viewport.height == 0 {
                return Err(VisualError::InvalidConfig(format!(
                    "viewport '{}' has a zero dimension",
                    viewport.label
                )));
            }
            if !labels.insert(viewport.label.as_str()) {
                return Err(VisualError::InvalidConfig(format!(
                    "duplicate viewport label '{}'",
                    viewport.label
                )));
            }
        }

        if self.pages.is_empty() {
            return Err(VisualError::InvalidConfig("at least one page is required".into()));
        }
        let mut keys = HashSet::new();
        for page in &self.pages {
            if !is_path_segment(&page.key) {
                return Err(VisualError::InvalidConfig(format!(
                    "page key '{}' must be a non-empty path segment",
                    page.key
                )));
            }
            if !keys.insert(page.key.as_str()) {
                return Err(VisualError::InvalidConfig(format!("duplicate page key '{}'", page.key)));
            }
        }

        if !(0.0..=1.0).contains(&self.diff.threshold) {
            return Err(VisualError::InvalidConfig(format!(
                "diff threshold must be within 0.0..=1.0, got {}",
                self.diff.threshold
            )));
        }

        if self.max_concurrent_pages == 0 {
            return Err(VisualError::InvalidConfig("max_concurrent_pages must be at least 1".into()));
        }

        self.selectors.validate()
    }
}

/// Page keys and viewport labels become file name components under the
/// output directory and must not leave it
fn is_path_segment(value: &str) -> bool {
    !value.is_empty() && value != "." && value != ".." && !value.contains(|c: char| c == '/' || c == '\\')
}

/// Split a comma-separated page list, dropping blanks
pub fn parse_page_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

/// Readiness signal to wait for after navigation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    /// No in-flight network requests for 500ms
    #[default]
    NetworkIdle,
    /// DOMContentLoaded fired
    DomContentLoaded,
}

impl WaitUntil {
    /// Playwright `waitUntil` value
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitUntil::NetworkIdle => "networkidle",
            WaitUntil::DomContentLoaded => "domcontentloaded",
        }
    }
}

/// Stable paint polling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StablePaint {
    pub enabled: bool,
    /// Upper bound on polling; reaching it is reported, not fatal
    pub max_wait_ms: u64,
}

impl Default for StablePaint {
    fn default() -> Self {
        Self {
            enabled: true,
            max_wait_ms: 5_000,
        }
    }
}

/// How pages are loaded and captured
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub wait_until: WaitUntil,
    /// Capture the full scrollable page instead of the viewport
    pub full_page: bool,
    /// Fixed delay after stable paint, for transitions the signature cannot see
    pub settle_delay_ms: u64,
    pub stable_paint: StablePaint,
    /// In-browser navigation timeout
    pub navigation_timeout_ms: u64,
    /// Wall-clock limit for one browser visit, including browser start-up
    pub script_timeout_ms: u64,
    /// Run style extraction alongside every capture
    pub extract_styles: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            wait_until: WaitUntil::NetworkIdle,
            full_page: false,
            settle_delay_ms: 0,
            stable_paint: StablePaint::default(),
            navigation_timeout_ms: 30_000,
            script_timeout_ms: 60_000,
            extract_styles: true,
        }
    }
}

/// Browser viewport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    /// Used in screenshot file names
    pub label: String,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            width,
            height,
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("desktop", 1440, 900),
            Self::new("tablet", 768, 1024),
            Self::new("mobile", 375, 812),
        ]
    }
}

/// A logical page present on both servers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpec {
    /// Stable identifier, also the output subdirectory name
    pub key: String,
    /// Path on the reference server
    pub reference_path: String,
    /// Path on the candidate server
    pub candidate_path: String,
}

impl PageSpec {
    pub fn new(key: &str, reference_path: &str, candidate_path: &str) -> Self {
        Self {
            key: key.to_string(),
            reference_path: reference_path.to_string(),
            candidate_path: candidate_path.to_string(),
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("home", "/pages/home.html", "/"),
            Self::new("apps", "/pages/apps/browse.html", "/apps"),
            Self::new("guides", "/pages/guides.html", "/guides"),
            Self::new("pricing", "/pages/pricing.html", "/pricing"),
            Self::new("profile", "/pages/profile.html", "/profile"),
        ]
    }

    pub fn reference_url(&self, base: &str) -> String {
        join_url(base, &self.reference_path)
    }

    pub fn candidate_url(&self, base: &str) -> String {
        join_url(base, &self.candidate_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// One tracked element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedSelector {
    pub name: String,
    pub selector: String,
}

/// The selector set shared by every style extraction.
///
/// Bump `version` whenever entries change so reports taken with different
/// sets are not compared as if they tracked the same elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorSet {
    pub version: u32,
    pub entries: Vec<NamedSelector>,
}

impl Default for SelectorSet {
    fn default() -> Self {
        let entries = [
            ("nav", "nav, header nav, [role=navigation]"),
            ("hero", ".hero, [data-section=hero], main > section:first-of-type"),
            ("heading", "h1"),
            ("buttons", ".btn, button, a[role=button]"),
            ("cards", ".card, [data-card]"),
            ("footer", "footer"),
            ("logo", ".logo, [data-logo]"),
        ]
        .into_iter()
        .map(|(name, selector)| NamedSelector {
            name: name.to_string(),
            selector: selector.to_string(),
        })
        .collect();

        Self { version: 1, entries }
    }
}

impl SelectorSet {
    pub fn validate(&self) -> VisualResult<()> {
        if self.entries.is_empty() {
            return Err(VisualError::InvalidConfig("selector set is empty".into()));
        }
        let mut names = HashSet::new();
        for entry in &self.entries {
            if entry.name.trim().is_empty() || entry.selector.trim().is_empty() {
                return Err(VisualError::InvalidConfig(format!(
                    "selector entry '{}' needs both a name and a selector",
                    entry.name
                )));
            }
            if !names.insert(entry.name.as_str()) {
                return Err(VisualError::InvalidConfig(format!(
                    "duplicate selector name '{}'",
                    entry.name
                )));
            }
        }
        Ok(())
    }
}
