//! Style extraction stage and style comparison

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::config::SelectorSet;
use crate::error::{VisualError, VisualResult};

/// Page function evaluated with the selector entries as its argument.
/// Unmatched or invalid selectors produce `null` for their slot.
pub(crate) const EXTRACT_STYLES_JS: &str = r#"(entries) => {
  const pick = (cs) => ({
    background_color: cs.backgroundColor,
    background_image: cs.backgroundImage,
    backdrop_filter: cs.backdropFilter || cs.webkitBackdropFilter || 'none',
    color: cs.color,
    font_family: cs.fontFamily,
    font_size: cs.fontSize,
    font_weight: cs.fontWeight,
    line_height: cs.lineHeight,
    box_shadow: cs.boxShadow,
    filter: cs.filter,
    padding: cs.padding,
    margin: cs.margin,
    border_radius: cs.borderRadius,
    transform: cs.transform,
    opacity: cs.opacity,
  });
  const elements = {};
  for (const { name, selector } of entries) {
    let el = null;
    try { el = document.querySelector(selector); } catch (e) { el = null; }
    elements[name] = el ? pick(getComputedStyle(el)) : null;
  }
  const gradients = new Set();
  const backgroundColors = new Set();
  const shadows = new Set();
  for (const el of document.querySelectorAll('*')) {
    const cs = getComputedStyle(el);
    const image = cs.backgroundImage;
    if (image && image !== 'none' && image.includes('gradient')) gradients.add(image);
    const color = cs.backgroundColor;
    if (color) backgroundColors.add(color);
    const shadow = cs.boxShadow;
    if (shadow && shadow !== 'none') shadows.add(shadow);
  }
  return {
    elements,
    scan: {
      gradients: [...gradients],
      background_colors: [...backgroundColors],
      shadows: [...shadows],
    },
  };
}"#;

/// Computed style of one tracked element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementStyle {
    pub background_color: String,
    pub background_image: String,
    pub backdrop_filter: String,
    pub color: String,
    pub font_family: String,
    pub font_size: String,
    pub font_weight: String,
    pub line_height: String,
    pub box_shadow: String,
    pub filter: String,
    pub padding: String,
    pub margin: String,
    pub border_radius: String,
    pub transform: String,
    pub opacity: String,
}

impl ElementStyle {
    /// Property name / value pairs in a fixed order
    pub fn properties(&self) -> [(&'static str, &str); 15] {
        [
            ("background-color", self.background_color.as_str()),
            ("background-image", self.background_image.as_str()),
            ("backdrop-filter", self.backdrop_filter.as_str()),
            ("color", self.color.as_str()),
            ("font-family", self.font_family.as_str()),
            ("font-size", self.font_size.as_str()),
            ("font-weight", self.font_weight.as_str()),
            ("line-height", self.line_height.as_str()),
            ("box-shadow", self.box_shadow.as_str()),
            ("filter", self.filter.as_str()),
            ("padding", self.padding.as_str()),
            ("margin", self.margin.as_str()),
            ("border-radius", self.border_radius.as_str()),
            ("transform", self.transform.as_str()),
            ("opacity", self.opacity.as_str()),
        ]
    }

    /// Properties whose strings differ
    pub fn diff(&self, candidate: &ElementStyle) -> Vec<PropertyDiff> {
        self.properties()
            .into_iter()
            .zip(candidate.properties())
            .filter(|((_, a), (_, b))| a != b)
            .map(|((property, reference), (_, candidate))| PropertyDiff {
                property: property.to_string(),
                reference: reference.to_string(),
                candidate: candidate.to_string(),
            })
            .collect()
    }
}

/// Distinct decorative values found anywhere in the document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentScan {
    pub gradients: BTreeSet<String>,
    pub background_colors: BTreeSet<String>,
    pub shadows: BTreeSet<String>,
}

/// A tracked slot; `style` is `None` when nothing matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedElement {
    pub name: String,
    pub style: Option<ElementStyle>,
}

/// Styles captured from one page visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleSnapshot {
    pub selector_set_version: u32,
    /// In selector set order
    pub elements: Vec<TrackedElement>,
    pub scan: DocumentScan,
}

#[derive(Debug, Deserialize)]
struct PageOutput {
    #[serde(default)]
    elements: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    scan: DocumentScan,
}

impl StyleSnapshot {
    /// Build a snapshot from the value returned by [`EXTRACT_STYLES_JS`].
    ///
    /// Every selector set entry gets a slot; names the page output lacks
    /// are treated as unmatched.
    pub fn from_page_output(value: serde_json::Value, selectors: &SelectorSet) -> VisualResult<Self> {
        let output: PageOutput = serde_json::from_value(value)
            .map_err(|e| VisualError::ScriptOutput(format!("style extraction result: {e}")))?;
        let mut raw = output.elements;

        let mut elements = Vec::with_capacity(selectors.entries.len());
        for entry in &selectors.entries {
            let style = match raw.remove(&entry.name) {
                None | Some(serde_json::Value::Null) => {
                    debug!("Selector '{}' ({}) matched no element", entry.name, entry.selector);
                    None
                }
                Some(value) => Some(serde_json::from_value(value).map_err(|e| {
                    VisualError::ScriptOutput(format!("style record for '{}': {e}", entry.name))
                })?),
            };
            elements.push(TrackedElement {
                name: entry.name.clone(),
                style,
            });
        }

        let mut scan = output.scan;
        scan.background_colors.retain(|color| !is_transparent(color));

        Ok(Self {
            selector_set_version: selectors.version,
            elements,
            scan,
        })
    }

    pub fn get(&self, name: &str) -> Option<&ElementStyle> {
        self.elements
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.style.as_ref())
    }

    pub fn matched_count(&self) -> usize {
        self.elements.iter().filter(|e| e.style.is_some()).count()
    }
}

/// A computed colour with zero alpha paints nothing
fn is_transparent(color: &str) -> bool {
    let color = color.trim();
    if color.eq_ignore_ascii_case("transparent") {
        return true;
    }

    let args = match color.strip_suffix(')').and_then(|c| c.split_once('(')) {
        Some((_, args)) => args,
        None => return false,
    };
    let alpha = match args.rsplit_once('/') {
        Some((_, alpha)) => Some(alpha),
        None => args.split(',').nth(3),
    };

    alpha
        .map(|a| a.trim())
        .and_then(|a| a.strip_suffix('%').unwrap_or(a).parse::<f64>().ok())
        .map_or(false, |a| a == 0.0)
}

/// One property that differs between the two sides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDiff {
    pub property: String,
    pub reference: String,
    pub candidate: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ElementOutcome {
    Match,
    Differs { properties: Vec<PropertyDiff> },
    /// At least one side had no matching element
    Skipped {
        reference_missing: bool,
        candidate_missing: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementComparison {
    pub name: String,
    pub outcome: ElementOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountPair {
    pub reference: usize,
    pub candidate: usize,
}

impl CountPair {
    fn of(reference: &BTreeSet<String>, candidate: &BTreeSet<String>) -> Self {
        Self {
            reference: reference.len(),
            candidate: candidate.len(),
        }
    }

    pub fn matches(&self) -> bool {
        self.reference == self.candidate
    }
}

/// Style comparison between a reference and a candidate snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleComparison {
    pub selector_set_version: u32,
    pub elements: Vec<ElementComparison>,
    pub gradients: CountPair,
    pub shadows: CountPair,
    pub background_colors: CountPair,
}

impl StyleComparison {
    pub fn matched(&self) -> usize {
        self.count(|o| matches!(o, ElementOutcome::Match))
    }

    pub fn differing(&self) -> usize {
        self.count(|o| matches!(o, ElementOutcome::Differs { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ElementOutcome::Skipped { .. }))
    }

    /// No compared element differs
    pub fn all_match(&self) -> bool {
        self.differing() == 0
    }

    fn count(&self, pred: impl Fn(&ElementOutcome) -> bool) -> usize {
        self.elements.iter().filter(|e| pred(&e.outcome)).count()
    }
}

/// Compare two snapshots element by element, in reference order
pub fn compare_snapshots(reference: &StyleSnapshot, candidate: &StyleSnapshot) -> StyleComparison {
    if reference.selector_set_version != candidate.selector_set_version {
        warn!(
            "Comparing snapshots from selector set v{} and v{}",
            reference.selector_set_version, candidate.selector_set_version
        );
    }

    let mut names: Vec<&str> = reference.elements.iter().map(|e| e.name.as_str()).collect();
    for element in &candidate.elements {
        if !names.contains(&element.name.as_str()) {
            names.push(element.name.as_str());
        }
    }

    let elements = names
        .into_iter()
        .map(|name| {
            let outcome = match (reference.get(name), candidate.get(name)) {
                (Some(a), Some(b)) => {
                    let properties = a.diff(b);
                    if properties.is_empty() {
                        ElementOutcome::Match
                    } else {
                        ElementOutcome::Differs { properties }
                    }
                }
                (a, b) => ElementOutcome::Skipped {
                    reference_missing: a.is_none(),
                    candidate_missing: b.is_none(),
                },
            };
            ElementComparison {
                name: name.to_string(),
                outcome,
            }
        })
        .collect();

    StyleComparison {
        selector_set_version: reference.selector_set_version,
        elements,
        gradients: CountPair::of(&reference.scan.gradients, &candidate.scan.gradients),
        shadows: CountPair::of(&reference.scan.shadows, &candidate.scan.shadows),
        background_colors: CountPair::of(&reference.scan.background_colors, &candidate.scan.background_colors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn style(color: &str) -> serde_json::Value {
        json!({
            "background_color": "rgb(10, 10, 20)",
            "background_image": "linear-gradient(rgb(1, 2, 3), rgb(4, 5, 6))",
            "backdrop_filter": "blur(12px)",
            "color": color,
            "font_family": "Inter, sans-serif",
            "font_size": "16px",
            "font_weight": "600",
            "line_height": "24px",
            "box_shadow": "none",
            "filter": "none",
            "padding": "8px 16px",
            "margin": "0px",
            "border_radius": "8px",
            "transform": "none",
            "opacity": "1",
        })
    }

    fn snapshot(elements: serde_json::Value, gradients: &[&str]) -> StyleSnapshot {
        StyleSnapshot::from_page_output(
            json!({
                "elements": elements,
                "scan": { "gradients": gradients, "background_colors": ["rgb(10, 10, 20)"], "shadows": [] },
            }),
            &SelectorSet::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_unmatched_selectors_become_none() {
        let snap = snapshot(json!({ "nav": style("rgb(255, 255, 255)"), "hero": null }), &[]);
        assert_eq!(snap.elements.len(), SelectorSet::default().entries.len());
        assert!(snap.get("nav").is_some());
        assert!(snap.get("hero").is_none());
        assert!(snap.get("footer").is_none());
        assert_eq!(snap.matched_count(), 1);
        assert_eq!(snap.elements[0].name, "nav");
    }

    #[test]
    fn test_malformed_output_is_script_error() {
        let err = StyleSnapshot::from_page_output(json!({ "elements": { "nav": 5 } }), &SelectorSet::default())
            .unwrap_err();
        assert!(matches!(err, VisualError::ScriptOutput(_)));
    }

    #[test]
    fn test_identical_snapshots_match() {
        let a = snapshot(json!({ "nav": style("rgb(255, 255, 255)") }), &["linear-gradient(red, blue)"]);
        let comparison = compare_snapshots(&a, &a.clone());
        assert_eq!(comparison.matched(), 1);
        assert_eq!(comparison.differing(), 0);
        assert_eq!(comparison.skipped(), SelectorSet::default().entries.len() - 1);
        assert!(comparison.all_match());
        assert!(comparison.gradients.matches());
    }

    #[test]
    fn test_differing_properties_are_listed() {
        let a = snapshot(json!({ "nav": style("rgb(255, 255, 255)") }), &["linear-gradient(red, blue)"]);
        let b = snapshot(json!({ "nav": style("rgb(200, 200, 200)") }), &[]);
        let comparison = compare_snapshots(&a, &b);

        let nav = &comparison.elements[0];
        assert_eq!(nav.name, "nav");
        match &nav.outcome {
            ElementOutcome::Differs { properties } => {
                assert_eq!(properties.len(), 1);
                assert_eq!(properties[0].property, "color");
                assert_eq!(properties[0].reference, "rgb(255, 255, 255)");
                assert_eq!(properties[0].candidate, "rgb(200, 200, 200)");
            }
            other => panic!("expected differences, got {other:?}"),
        }
        assert_eq!(comparison.gradients, CountPair { reference: 1, candidate: 0 });
        assert!(!comparison.all_match());
    }

    #[test]
    fn test_one_sided_element_is_skipped() {
        let a = snapshot(json!({ "hero": style("red") }), &[]);
        let b = snapshot(json!({}), &[]);
        let comparison = compare_snapshots(&a, &b);
        let hero = comparison.elements.iter().find(|e| e.name == "hero").unwrap();
        assert_eq!(
            hero.outcome,
            ElementOutcome::Skipped {
                reference_missing: false,
                candidate_missing: true
            }
        );
    }

    #[test]
    fn test_zero_alpha_backgrounds_are_dropped() {
        let value = json!({
            "elements": {},
            "scan": {
                "gradients": [],
                "background_colors": [
                    "rgb(255, 255, 255)",
                    "rgba(255, 255, 255, 0)",
                    "rgba(0, 0, 0, 0)",
                    "rgba(10, 20, 30, 0.5)",
                    "color(srgb 1 0 0 / 0)",
                    "transparent",
                ],
                "shadows": [],
            }
        });
        let snapshot = StyleSnapshot::from_page_output(value, &SelectorSet::default()).unwrap();
        let colors: Vec<&str> = snapshot.scan.background_colors.iter().map(String::as_str).collect();
        assert_eq!(colors, ["rgb(255, 255, 255)", "rgba(10, 20, 30, 0.5)"]);
    }

    #[test]
    fn test_extraction_script_covers_every_property() {
        for (property, _) in ElementStyle::default().properties() {
            let field = property.replace('-', "_");
            assert!(EXTRACT_STYLES_JS.contains(&format!("{field}:")), "missing {field}");
        }
    }
}
