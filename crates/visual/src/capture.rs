//! Capture stage: navigation, readiness, stable paint and screenshot
//!
//! The stage is expressed as Playwright statements that the driver splices
//! into a generated script. Each visit gets its own browser context, so
//! cookies and storage never leak between captures.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::config::{AuditConfig, CaptureSettings, PageSpec, Viewport, WaitUntil};

/// Which side of a comparison a capture belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Reference,
    Candidate,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Reference => "reference",
            Side::Candidate => "candidate",
        }
    }
}

/// One side of a comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureTarget {
    pub label: String,
    pub url: String,
    pub viewport: Viewport,
}

impl CaptureTarget {
    pub fn new(side: Side, url: impl Into<String>, viewport: Viewport) -> Self {
        Self {
            label: side.as_str().to_string(),
            url: url.into(),
            viewport,
        }
    }

    /// Target for `page` on the given side's server
    pub fn for_page(config: &AuditConfig, page: &PageSpec, side: Side, viewport: &Viewport) -> Self {
        let url = match side {
            Side::Reference => page.reference_url(&config.reference_url),
            Side::Candidate => page.candidate_url(&config.candidate_url),
        };
        Self::new(side, url, viewport.clone())
    }
}

/// Resolved capture behaviour for one visit
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOptions {
    pub wait_until: WaitUntil,
    pub full_page: bool,
    pub settle_delay: Duration,
    /// `None` disables stable paint polling
    pub stable_paint: Option<Duration>,
    pub navigation_timeout: Duration,
}

impl From<&CaptureSettings> for CaptureOptions {
    fn from(settings: &CaptureSettings) -> Self {
        Self {
            wait_until: settings.wait_until,
            full_page: settings.full_page,
            settle_delay: Duration::from_millis(settings.settle_delay_ms),
            stable_paint: settings
                .stable_paint
                .enabled
                .then(|| Duration::from_millis(settings.stable_paint.max_wait_ms)),
            navigation_timeout: Duration::from_millis(settings.navigation_timeout_ms),
        }
    }
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::from(&CaptureSettings::default())
    }
}

/// Polls a paint signature once per animation frame until two consecutive
/// frames agree or the budget runs out. Resolves to whether it stabilised.
pub(crate) const STABLE_PAINT_JS: &str = r#"
async function waitForStablePaint(page, maxWaitMs) {
  const deadline = Date.now() + maxWaitMs;
  let previous = null;
  while (Date.now() < deadline) {
    const signature = await page.evaluate(() => new Promise((resolve) => {
      requestAnimationFrame(() => {
        const running = typeof document.getAnimations === 'function'
          ? document.getAnimations().filter((a) => a.playState === 'running').length
          : 0;
        const parts = [String(running), String(document.documentElement.scrollHeight)];
        for (const el of document.querySelectorAll('body *')) {
          const cs = getComputedStyle(el);
          parts.push(cs.opacity + ';' + cs.transform + ';' + cs.color + ';' + cs.backgroundColor);
        }
        resolve(parts.join('|'));
      });
    }));
    if (signature === previous) return true;
    previous = signature;
  }
  return false;
}
"#;

/// Playwright statements for one capture. Expects `browser` in scope and
/// leaves `context`, `page` and `stable` defined.
pub(crate) fn capture_statements(target: &CaptureTarget, options: &CaptureOptions, screenshot_path: &Path) -> String {
    let url = js_string(&target.url);
    let path = js_string(&screenshot_path.to_string_lossy());

    let mut js = format!(
        r#"
    const context = await browser.newContext({{
      viewport: {{ width: {width}, height: {height} }}
    }});
    const page = await context.newPage();
    const response = await page.goto({url}, {{ waitUntil: '{wait_until}', timeout: {timeout} }});
    if (response && response.status() >= 400) {{
      throw new Error('HTTP ' + response.status() + ' from ' + {url});
    }}
    let stable = true;
"#,
        width = target.viewport.width,
        height = target.viewport.height,
        url = url,
        wait_until = options.wait_until.as_str(),
        timeout = options.navigation_timeout.as_millis(),
    );

    if let Some(max_wait) = options.stable_paint {
        js.push_str(&format!(
            "    stable = await waitForStablePaint(page, {});\n",
            max_wait.as_millis()
        ));
    }

    if !options.settle_delay.is_zero() {
        js.push_str(&format!(
            "    await page.waitForTimeout({});\n",
            options.settle_delay.as_millis()
        ));
    }

    js.push_str(&format!(
        "    await page.screenshot({{ path: {}, fullPage: {} }});\n",
        path, options.full_page
    ));

    js
}

/// Quote a value as a JavaScript string literal
pub(crate) fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> CaptureTarget {
        CaptureTarget::new(
            Side::Reference,
            "http://localhost:8080/pages/home.html",
            Viewport::new("desktop", 1440, 900),
        )
    }

    #[test]
    fn test_target_for_page_uses_side_server() {
        let config = AuditConfig::default();
        let page = &config.pages[1];
        let viewport = &config.viewports[2];

        let reference = CaptureTarget::for_page(&config, page, Side::Reference, viewport);
        assert_eq!(reference.label, "reference");
        assert_eq!(reference.url, "http://localhost:8080/pages/apps/browse.html");

        let candidate = CaptureTarget::for_page(&config, page, Side::Candidate, viewport);
        assert_eq!(candidate.label, "candidate");
        assert_eq!(candidate.url, "http://localhost:3000/apps");
        assert_eq!(candidate.viewport.width, 375);
    }

    #[test]
    fn test_capture_statements_default() {
        let js = capture_statements(&target(), &CaptureOptions::default(), Path::new("out/home/desktop-reference.png"));
        assert!(js.contains("viewport: { width: 1440, height: 900 }"));
        assert!(js.contains(r#"page.goto("http://localhost:8080/pages/home.html", { waitUntil: 'networkidle', timeout: 30000 })"#));
        assert!(js.contains("stable = await waitForStablePaint(page, 5000);"));
        assert!(!js.contains("waitForTimeout"));
        assert!(js.contains(r#"page.screenshot({ path: "out/home/desktop-reference.png", fullPage: false })"#));
    }

    #[test]
    fn test_capture_statements_settle_and_full_page() {
        let mut settings = CaptureSettings::default();
        settings.wait_until = WaitUntil::DomContentLoaded;
        settings.full_page = true;
        settings.settle_delay_ms = 750;
        settings.stable_paint.enabled = false;

        let js = capture_statements(&target(), &CaptureOptions::from(&settings), Path::new("shot.png"));
        assert!(js.contains("waitUntil: 'domcontentloaded'"));
        assert!(js.contains("await page.waitForTimeout(750);"));
        assert!(!js.contains("waitForStablePaint(page"));
        assert!(js.contains("fullPage: true"));
    }

    #[test]
    fn test_urls_are_quoted_safely() {
        let mut target = target();
        target.url = "http://localhost:8080/it's \"quoted\"".to_string();
        let js = capture_statements(&target, &CaptureOptions::default(), Path::new("shot.png"));
        assert!(js.contains(r#""http://localhost:8080/it's \"quoted\"""#));
    }
}
