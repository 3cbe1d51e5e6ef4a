//! Playwright browser automation
//!
//! Every visit becomes one generated Node script: launch, isolated context,
//! capture statements, optional style extraction, then a single JSON line on
//! stdout describing the outcome.

use serde::Deserialize;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use crate::capture::{self, js_string};
use crate::config::SelectorSet;
use crate::driver::{BrowserDriver, PageVisit, VisitRequest};
use crate::error::{VisualError, VisualResult};
use crate::paths;
use crate::styles::{self, StyleSnapshot};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = VisualError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(VisualError::InvalidConfig(format!("unknown browser '{other}'"))),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    /// Node executable
    pub node_binary: PathBuf,
    /// Directory whose `node_modules` provides `playwright`
    pub project_dir: PathBuf,
    /// Wall-clock limit for one visit; the browser is killed when it expires
    pub script_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            node_binary: PathBuf::from("node"),
            project_dir: PathBuf::from("."),
            script_timeout: Duration::from_secs(60),
        }
    }
}

/// Browser driver backed by Playwright under Node
pub struct PlaywrightDriver {
    config: PlaywrightConfig,
}

/// The JSON line every generated script prints
#[derive(Debug, Deserialize)]
struct ScriptOutcome {
    ok: bool,
    #[serde(default)]
    stable: Option<bool>,
    #[serde(default)]
    styles: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

impl PlaywrightDriver {
    /// Create a driver, failing early when Playwright cannot be resolved
    pub fn new(config: PlaywrightConfig) -> VisualResult<Self> {
        Self::check_playwright_installed(&config)?;
        Ok(Self { config })
    }

    /// Create a driver without probing the Node installation
    pub fn unchecked(config: PlaywrightConfig) -> Self {
        Self { config }
    }

    fn check_playwright_installed(config: &PlaywrightConfig) -> VisualResult<()> {
        let status = Command::new(&config.node_binary)
            .args(["-e", "require.resolve('playwright', { paths: [process.cwd()] })"])
            .current_dir(&config.project_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(VisualError::PlaywrightNotFound),
        }
    }

    /// Build the Node script for one visit
    pub fn build_script(&self, request: &VisitRequest<'_>) -> String {
        let mut script = String::new();

        script.push_str(&format!(
            r#"
const {{ {browser} }} = require(require.resolve('playwright', {{ paths: [process.cwd()] }}));
{stable_paint}
(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  try {{
"#,
            browser = self.config.browser.as_str(),
            headless = self.config.headless,
            stable_paint = capture::STABLE_PAINT_JS,
        ));

        script.push_str(&capture::capture_statements(
            request.target,
            request.options,
            request.screenshot_path,
        ));

        match request.selectors {
            Some(selectors) => {
                script.push_str(&format!(
                    "    const styles = await page.evaluate({}, {});\n",
                    styles::EXTRACT_STYLES_JS,
                    selector_entries_js(selectors),
                ));
            }
            None => script.push_str("    const styles = null;\n"),
        }

        script.push_str(
            r#"    await context.close();
    console.log(JSON.stringify({ ok: true, stable, styles }));
  } catch (error) {
    console.log(JSON.stringify({ ok: false, error: String(error && error.message || error) }));
    process.exitCode = 1;
  } finally {
    await browser.close();
  }
})();
"#,
        );

        script
    }

    /// Execute a script and return its outcome line
    async fn run_script(&self, script: &str, what: &str) -> VisualResult<ScriptOutcome> {
        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join("visit.js");
        std::fs::write(&script_path, script)?;

        debug!("Running Playwright script: {}", script_path.display());

        let child = TokioCommand::new(&self.config.node_binary)
            .arg(&script_path)
            .current_dir(&self.config.project_dir)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.config.script_timeout, child).await {
            Ok(output) => output?,
            Err(_) => return Err(timeout_error(what, self.config.script_timeout)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_outcome(&stdout) {
            Some(outcome) => Ok(outcome),
            None => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(VisualError::Playwright(format!(
                    "Script failed ({}):\nstdout: {}\nstderr: {}",
                    output.status, stdout, stderr
                )))
            }
        }
    }
}

#[async_trait::async_trait]
impl BrowserDriver for PlaywrightDriver {
    fn name(&self) -> &'static str {
        "playwright"
    }

    async fn visit(&self, request: VisitRequest<'_>) -> VisualResult<PageVisit> {
        let target = request.target;
        paths::ensure_parent_dir(request.screenshot_path)?;

        info!(
            "Capturing {} {} at {}x{}",
            target.label, target.url, target.viewport.width, target.viewport.height
        );

        // Node runs from project_dir, so relative paths must be resolved here
        let absolute = if request.screenshot_path.is_absolute() {
            request.screenshot_path.to_path_buf()
        } else {
            std::env::current_dir()?.join(request.screenshot_path)
        };
        let script = self.build_script(&VisitRequest {
            screenshot_path: &absolute,
            ..request
        });
        let outcome = self
            .run_script(&script, &format!("{} capture of {}", target.label, target.url))
            .await?;

        if !outcome.ok {
            return Err(VisualError::Navigation {
                url: target.url.clone(),
                reason: outcome.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        let stable = outcome.stable.unwrap_or(true);
        if !stable {
            warn!("{} never reached stable paint before capture", target.url);
        }

        let styles = match (request.selectors, outcome.styles) {
            (Some(selectors), Some(value)) if !value.is_null() => {
                Some(StyleSnapshot::from_page_output(value, selectors)?)
            }
            _ => None,
        };

        Ok(PageVisit {
            screenshot_path: request.screenshot_path.to_path_buf(),
            stable,
            styles,
        })
    }
}

fn timeout_error(what: &str, limit: Duration) -> VisualError {
    VisualError::Timeout {
        what: what.to_string(),
        millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
    }
}

fn selector_entries_js(selectors: &SelectorSet) -> String {
    let entries: Vec<String> = selectors
        .entries
        .iter()
        .map(|e| format!("{{ name: {}, selector: {} }}", js_string(&e.name), js_string(&e.selector)))
        .collect();
    format!("[{}]", entries.join(", "))
}

/// Last stdout line that parses as an outcome; page console noise is ignored
fn parse_outcome(stdout: &str) -> Option<ScriptOutcome> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str(line).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureOptions, CaptureTarget, Side};
    use crate::config::Viewport;
    use std::path::Path;

    fn driver() -> PlaywrightDriver {
        PlaywrightDriver::unchecked(PlaywrightConfig::default())
    }

    #[test]
    fn test_build_script_with_styles() {
        let target = CaptureTarget::new(Side::Candidate, "http://localhost:3000/apps", Viewport::new("tablet", 768, 1024));
        let options = CaptureOptions::default();
        let selectors = SelectorSet::default();
        let request = VisitRequest {
            target: &target,
            options: &options,
            screenshot_path: Path::new("visual-snapshots/apps/tablet-candidate.png"),
            selectors: Some(&selectors),
        };

        let script = driver().build_script(&request);
        assert!(script.contains("const { chromium } = require("));
        assert!(script.contains("chromium.launch({ headless: true })"));
        assert!(script.contains("async function waitForStablePaint"));
        assert!(script.contains(r#"{ name: "nav", selector: "nav, header nav, [role=navigation]" }"#));
        assert!(script.contains("console.log(JSON.stringify({ ok: true, stable, styles }))"));
        assert!(script.contains("await browser.close()"));
    }

    #[test]
    fn test_build_script_without_styles() {
        let target = CaptureTarget::new(Side::Reference, "http://localhost:8080/", Viewport::new("mobile", 375, 812));
        let options = CaptureOptions::default();
        let request = VisitRequest {
            target: &target,
            options: &options,
            screenshot_path: Path::new("shot.png"),
            selectors: None,
        };
        let script = driver().build_script(&request);
        assert!(script.contains("const styles = null;"));
        assert!(!script.contains("page.evaluate((entries)"));
    }

    #[test]
    fn test_parse_outcome_skips_console_noise() {
        let stdout = "[page] hello\n{\"not\": \"it\"\n{\"ok\":false,\"error\":\"net::ERR_CONNECTION_REFUSED\"}\n";
        let outcome = parse_outcome(stdout).unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.error.as_deref(), Some("net::ERR_CONNECTION_REFUSED"));

        assert!(parse_outcome("no json here").is_none());
    }

    #[test]
    fn test_sub_second_timeout_is_reported_in_millis() {
        let err = timeout_error("reference capture of http://localhost:8080/", Duration::from_millis(250));
        match &err {
            VisualError::Timeout { millis, .. } => assert_eq!(*millis, 250),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().starts_with("Timeout after 250 ms"));
    }

    #[test]
    fn test_browser_from_str() {
        assert_eq!("webkit".parse::<Browser>().unwrap(), Browser::Webkit);
        assert!("lynx".parse::<Browser>().is_err());
    }
}
