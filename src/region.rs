//! Region specifications and region resolution.
//!
//! A request carries either selector regions (located by CSS selector chains)
//! or offset regions (fixed vertical bands of a full-page screenshot), never
//! both. The kind of each region is decided from its fields when the JSON is
//! parsed, and the request-level kind is decided once by [`RegionPlan`].

use std::collections::HashSet;
use std::fmt;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::capture::CaptureError;
use crate::session::ManagedPage;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    #[error("region has an empty name")]
    EmptyName,

    #[error("region '{0}' mixes selector and offset fields")]
    Ambiguous(String),

    #[error("region '{0}' has neither a selector nor offset fields")]
    Shapeless(String),

    #[error("region '{name}' is missing {field}")]
    MissingField { name: String, field: &'static str },

    #[error("offset region '{0}' must have a positive height")]
    ZeroHeight(String),

    #[error("regions mix selector and offset kinds (first is {first}, '{name}' is {other})")]
    MixedKinds {
        first: &'static str,
        other: &'static str,
        name: String,
    },

    #[error("region name '{0}' appears more than once")]
    Duplicate(String),

    #[error("no regions given")]
    Empty,
}

/// Ordered list of CSS selectors tried until one matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorChain {
    raw: String,
    selectors: Vec<String>,
}

impl SelectorChain {
    /// Split a comma-separated list, trimming entries and dropping empty ones
    pub fn parse(raw: &str) -> Self {
        let selectors = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        Self {
            raw: raw.trim().to_string(),
            selectors,
        }
    }

    pub fn selectors(&self) -> &[String] {
        &self.selectors
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }
}

impl fmt::Display for SelectorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.selectors.is_empty() {
            f.write_str("(no selector)")
        } else {
            f.write_str(&self.raw)
        }
    }
}

/// Region located by CSS selector on each page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorRegion {
    pub name: String,
    pub description: Option<String>,
    /// Chain shared by both pages unless overridden per side
    pub selector: Option<String>,
    pub live_selector: Option<String>,
    pub test_selector: Option<String>,
}

impl SelectorRegion {
    pub fn new(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            selector: Some(selector.into()),
            live_selector: None,
            test_selector: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_sides(mut self, live: impl Into<String>, test: impl Into<String>) -> Self {
        self.live_selector = Some(live.into());
        self.test_selector = Some(test.into());
        self
    }

    /// Chain used on the live page: `liveSelector`, else `selector`
    pub fn live_chain(&self) -> SelectorChain {
        SelectorChain::parse(
            self.live_selector
                .as_deref()
                .or(self.selector.as_deref())
                .unwrap_or_default(),
        )
    }

    /// Chain used on the test page; a self-comparison reuses the live chain
    pub fn test_chain(&self, same_url: bool) -> SelectorChain {
        if same_url {
            return self.live_chain();
        }
        SelectorChain::parse(
            self.test_selector
                .as_deref()
                .or(self.selector.as_deref())
                .unwrap_or_default(),
        )
    }
}

/// Legacy region: a horizontal band at fixed offsets of each full-page capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetRegion {
    pub name: String,
    pub description: Option<String>,
    pub live_y_start: u32,
    pub test_y_start: u32,
    pub height: u32,
}

impl OffsetRegion {
    pub fn new(name: impl Into<String>, live_y_start: u32, test_y_start: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            description: None,
            live_y_start,
            test_y_start,
            height,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One region of a comparison request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RegionWire", into = "RegionWire")]
pub enum RegionSpec {
    Selector(SelectorRegion),
    Offset(OffsetRegion),
}

impl RegionSpec {
    pub fn name(&self) -> &str {
        match self {
            RegionSpec::Selector(r) => &r.name,
            RegionSpec::Offset(r) => &r.name,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            RegionSpec::Selector(r) => r.description.as_deref(),
            RegionSpec::Offset(r) => r.description.as_deref(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RegionSpec::Selector(_) => "selector",
            RegionSpec::Offset(_) => "offset",
        }
    }
}

impl From<SelectorRegion> for RegionSpec {
    fn from(region: SelectorRegion) -> Self {
        RegionSpec::Selector(region)
    }
}

impl From<OffsetRegion> for RegionSpec {
    fn from(region: OffsetRegion) -> Self {
        RegionSpec::Offset(region)
    }
}

/// JSON shape of a region; the variant is chosen by which fields are present
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegionWire {
    #[serde(default)]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    live_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    test_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    live_y_start: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    test_y_start: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
}

impl TryFrom<RegionWire> for RegionSpec {
    type Error = RegionError;

    fn try_from(wire: RegionWire) -> Result<Self, Self::Error> {
        if wire.name.trim().is_empty() {
            return Err(RegionError::EmptyName);
        }
        let has_selector =
            wire.selector.is_some() || wire.live_selector.is_some() || wire.test_selector.is_some();
        let has_offset =
            wire.live_y_start.is_some() || wire.test_y_start.is_some() || wire.height.is_some();

        match (has_selector, has_offset) {
            (true, true) => Err(RegionError::Ambiguous(wire.name)),
            (false, false) => Err(RegionError::Shapeless(wire.name)),
            (true, false) => {
                if wire.selector.is_none() {
                    let field = if wire.live_selector.is_none() {
                        Some("selector or liveSelector")
                    } else if wire.test_selector.is_none() {
                        Some("selector or testSelector")
                    } else {
                        None
                    };
                    if let Some(field) = field {
                        return Err(RegionError::MissingField {
                            name: wire.name,
                            field,
                        });
                    }
                }
                Ok(RegionSpec::Selector(SelectorRegion {
                    name: wire.name,
                    description: wire.description,
                    selector: wire.selector,
                    live_selector: wire.live_selector,
                    test_selector: wire.test_selector,
                }))
            }
            (false, true) => {
                let missing = |field| RegionError::MissingField {
                    name: wire.name.clone(),
                    field,
                };
                let live_y_start = wire.live_y_start.ok_or_else(|| missing("liveYStart"))?;
                let test_y_start = wire.test_y_start.ok_or_else(|| missing("testYStart"))?;
                let height = wire.height.ok_or_else(|| missing("height"))?;
                if height == 0 {
                    return Err(RegionError::ZeroHeight(wire.name));
                }
                Ok(RegionSpec::Offset(OffsetRegion {
                    name: wire.name,
                    description: wire.description,
                    live_y_start,
                    test_y_start,
                    height,
                }))
            }
        }
    }
}

impl From<RegionSpec> for RegionWire {
    fn from(spec: RegionSpec) -> Self {
        match spec {
            RegionSpec::Selector(r) => RegionWire {
                name: r.name,
                description: r.description,
                selector: r.selector,
                live_selector: r.live_selector,
                test_selector: r.test_selector,
                ..Default::default()
            },
            RegionSpec::Offset(r) => RegionWire {
                name: r.name,
                description: r.description,
                live_y_start: Some(r.live_y_start),
                test_y_start: Some(r.test_y_start),
                height: Some(r.height),
                ..Default::default()
            },
        }
    }
}

/// The regions of one request, all of a single kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionPlan {
    Selector(Vec<SelectorRegion>),
    Offset(Vec<OffsetRegion>),
}

impl RegionPlan {
    /// Split a region list into a single-kind plan.
    ///
    /// The first region decides the kind; any region of the other kind and
    /// any repeated name is rejected.
    pub fn from_specs(specs: &[RegionSpec]) -> Result<Self, RegionError> {
        let first = specs.first().ok_or(RegionError::Empty)?;

        let mut seen = HashSet::new();
        for spec in specs {
            if !seen.insert(spec.name()) {
                return Err(RegionError::Duplicate(spec.name().to_string()));
            }
            if spec.kind() != first.kind() {
                return Err(RegionError::MixedKinds {
                    first: first.kind(),
                    other: spec.kind(),
                    name: spec.name().to_string(),
                });
            }
        }

        let plan = match first {
            RegionSpec::Selector(_) => RegionPlan::Selector(
                specs
                    .iter()
                    .filter_map(|s| match s {
                        RegionSpec::Selector(r) => Some(r.clone()),
                        RegionSpec::Offset(_) => None,
                    })
                    .collect(),
            ),
            RegionSpec::Offset(_) => RegionPlan::Offset(
                specs
                    .iter()
                    .filter_map(|s| match s {
                        RegionSpec::Offset(r) => Some(r.clone()),
                        RegionSpec::Selector(_) => None,
                    })
                    .collect(),
            ),
        };
        Ok(plan)
    }

    pub fn len(&self) -> usize {
        match self {
            RegionPlan::Selector(r) => r.len(),
            RegionPlan::Offset(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Captured element screenshot, still encoded
#[derive(Debug, Clone)]
pub struct RegionCapture {
    /// The selector of the chain that matched
    pub selector: String,
    pub png: Vec<u8>,
}

/// Outcome of resolving a selector chain on one page
#[derive(Debug)]
pub enum Resolution {
    Found(RegionCapture),
    /// No selector produced a capture; holds the last capture failure, if any
    NotFound(Option<CaptureError>),
}

/// Try each selector of `chain` in order; the first element that captures wins.
///
/// A selector whose element exists but cannot be captured (hidden, zero-size,
/// detached) does not stop the chain.
pub fn resolve(page: &mut ManagedPage, chain: &SelectorChain, region: &str) -> Resolution {
    let mut last_error = None;
    for selector in chain.selectors() {
        match page.capture_element(selector) {
            Ok(Some(png)) => {
                debug!(region, selector = selector.as_str(), "selector matched");
                return Resolution::Found(RegionCapture {
                    selector: selector.clone(),
                    png,
                });
            }
            Ok(None) => debug!(region, selector = selector.as_str(), "selector did not match"),
            Err(e) => {
                warn!(region, selector = selector.as_str(), error = %e, "selector matched but capture failed");
                last_error = Some(e);
            }
        }
    }
    Resolution::NotFound(last_error)
}

/// Copy a `width` x `height` block starting at (`x`, `y`).
///
/// Source coordinates past the edge clamp to the last row or column, so a
/// band that runs off a short page repeats the final row.
pub fn crop_clamped(img: &RgbaImage, x: u32, y: u32, width: u32, height: u32) -> Option<RgbaImage> {
    if img.width() == 0 || img.height() == 0 || width == 0 || height == 0 {
        return None;
    }
    let max_x = img.width() - 1;
    let max_y = img.height() - 1;
    Some(RgbaImage::from_fn(width, height, |cx, cy| {
        let sx = x.saturating_add(cx).min(max_x);
        let sy = y.saturating_add(cy).min(max_y);
        *img.get_pixel(sx, sy)
    }))
}

/// Crop two images to their common top-left area
pub fn crop_to_common(a: &RgbaImage, b: &RgbaImage) -> Option<(RgbaImage, RgbaImage)> {
    let width = a.width().min(b.width());
    let height = a.height().min(b.height());
    Some((
        crop_clamped(a, 0, 0, width, height)?,
        crop_clamped(b, 0, 0, width, height)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_selector_chain_parse() {
        let chain = SelectorChain::parse(" #footer, .footer_links ,, footer ");
        assert_eq!(chain.selectors(), &["#footer", ".footer_links", "footer"]);
        assert_eq!(chain.to_string(), "#footer, .footer_links ,, footer");

        let empty = SelectorChain::parse(" , ");
        assert!(empty.is_empty());
        assert_eq!(empty.to_string(), "(no selector)");
    }

    #[test]
    fn test_side_chains() {
        let region = SelectorRegion::new("hero", ".a, .b").with_sides(".live", ".test");
        assert_eq!(region.live_chain().selectors(), &[".live"]);
        assert_eq!(region.test_chain(false).selectors(), &[".test"]);
        assert_eq!(region.test_chain(true).selectors(), &[".live"]);

        let shared = SelectorRegion::new("footer", ".footer");
        assert_eq!(shared.test_chain(false).selectors(), &[".footer"]);
    }

    #[test]
    fn test_deserialize_selector_region() {
        let spec: RegionSpec = serde_json::from_str(
            r#"{"name":"hero","selector":".a","testSelector":".b","description":"Hero"}"#,
        )
        .unwrap();
        let RegionSpec::Selector(region) = spec else {
            panic!("expected selector region");
        };
        assert_eq!(region.description.as_deref(), Some("Hero"));
        assert_eq!(region.test_chain(false).selectors(), &[".b"]);
        assert_eq!(region.live_chain().selectors(), &[".a"]);
    }

    #[test]
    fn test_deserialize_offset_region() {
        let spec: RegionSpec =
            serde_json::from_str(r#"{"name":"top","liveYStart":0,"testYStart":40,"height":300}"#)
                .unwrap();
        assert_eq!(spec, RegionSpec::Offset(OffsetRegion::new("top", 0, 40, 300)));
    }

    #[test]
    fn test_deserialize_rejects_malformed_regions() {
        for json in [
            r#"{"name":"x","selector":".a","height":10}"#,
            r#"{"name":"x"}"#,
            r#"{"name":"","selector":".a"}"#,
            r#"{"name":"x","liveYStart":0,"height":10}"#,
            r#"{"name":"x","liveYStart":0,"testYStart":0,"height":0}"#,
            r#"{"name":"x","liveSelector":".a"}"#,
        ] {
            assert!(serde_json::from_str::<RegionSpec>(json).is_err(), "{json}");
        }
    }

    #[test]
    fn test_serialize_uses_camel_case() {
        let spec = RegionSpec::from(SelectorRegion::new("a", ".a").with_sides(".l", ".t"));
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name":"a","selector":".a","liveSelector":".l","testSelector":".t"})
        );
    }

    #[test]
    fn test_plan_rejects_mixed_and_duplicate() {
        let mixed = vec![
            RegionSpec::from(SelectorRegion::new("a", ".a")),
            RegionSpec::from(OffsetRegion::new("b", 0, 0, 10)),
        ];
        assert!(matches!(
            RegionPlan::from_specs(&mixed),
            Err(RegionError::MixedKinds { first: "selector", .. })
        ));

        let dup = vec![
            RegionSpec::from(SelectorRegion::new("a", ".a")),
            RegionSpec::from(SelectorRegion::new("a", ".b")),
        ];
        assert_eq!(
            RegionPlan::from_specs(&dup),
            Err(RegionError::Duplicate("a".to_string()))
        );
        assert_eq!(RegionPlan::from_specs(&[]), Err(RegionError::Empty));
    }

    #[test]
    fn test_plan_keeps_order() {
        let specs = vec![
            RegionSpec::from(OffsetRegion::new("c", 0, 0, 1)),
            RegionSpec::from(OffsetRegion::new("a", 0, 0, 1)),
        ];
        let RegionPlan::Offset(regions) = RegionPlan::from_specs(&specs).unwrap() else {
            panic!("expected offset plan");
        };
        let names: Vec<_> = regions.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a"]);
    }

    #[test]
    fn test_crop_clamped_repeats_last_row() {
        let img = RgbaImage::from_fn(4, 3, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        let crop = crop_clamped(&img, 2, 1, 4, 4).unwrap();
        assert_eq!(crop.dimensions(), (4, 4));
        assert_eq!(crop.get_pixel(0, 0).0, [2, 1, 0, 255]);
        assert_eq!(crop.get_pixel(3, 0).0, [3, 1, 0, 255]);
        assert_eq!(crop.get_pixel(1, 3).0, [3, 2, 0, 255]);

        assert!(crop_clamped(&img, 0, 0, 0, 4).is_none());
    }

    #[test]
    fn test_crop_to_common_uses_minimum() {
        let a = RgbaImage::new(10, 4);
        let b = RgbaImage::new(6, 8);
        let (ca, cb) = crop_to_common(&a, &b).unwrap();
        assert_eq!(ca.dimensions(), (6, 4));
        assert_eq!(cb.dimensions(), (6, 4));
    }
}
