// Request and response model for region comparisons

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::defaults::default_regions;
use crate::capture::{CaptureError, Viewport};
use crate::diff::Status;
use crate::region::{RegionError, RegionPlan, RegionSpec};
use crate::store::ArtifactRole;

/// Which page of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Live,
    Test,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Live => "live",
            Side::Test => "test",
        }
    }

    pub fn role(&self) -> ArtifactRole {
        match self {
            Side::Live => ArtifactRole::Live,
            Side::Test => ArtifactRole::Test,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type for comparison operations
pub type CompareResult<T> = Result<T, CompareError>;

/// Whole-request failures. Per-region faults never surface here.
#[derive(Debug, Error)]
pub enum CompareError {
    #[error("both liveUrl and testUrl are required ({0} is missing)")]
    MissingUrl(Side),

    #[error("{side}Url is not an absolute URL: '{url}'")]
    InvalidUrl { side: Side, url: String },

    #[error("threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("viewport must have a non-zero size, got {0}")]
    InvalidViewport(Viewport),

    #[error("regions mix {first} and {other} kinds ('{name}')")]
    MixedRegionKinds {
        first: &'static str,
        other: &'static str,
        name: String,
    },

    #[error("region name '{0}' appears more than once")]
    DuplicateRegion(String),

    #[error("invalid regions: {0}")]
    InvalidRegions(RegionError),

    #[error("{side} page failed: {source}")]
    Session {
        side: Side,
        #[source]
        source: CaptureError,
    },

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

impl CompareError {
    /// Caller-fixable problems detected before any browser is launched
    pub fn is_request_error(&self) -> bool {
        !matches!(self, CompareError::Session { .. } | CompareError::Capture(_))
    }
}

impl From<RegionError> for CompareError {
    fn from(e: RegionError) -> Self {
        match e {
            RegionError::MixedKinds { first, other, name } => {
                CompareError::MixedRegionKinds { first, other, name }
            }
            RegionError::Duplicate(name) => CompareError::DuplicateRegion(name),
            other => CompareError::InvalidRegions(other),
        }
    }
}

/// Input of one comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRequest {
    #[serde(default)]
    pub live_url: String,
    #[serde(default)]
    pub test_url: String,
    /// Evaluation and report order; defaults to the built-in region set
    #[serde(default = "default_regions")]
    pub regions: Vec<RegionSpec>,
    /// Differ sensitivity in [0, 1]
    #[serde(default = "crate::config::default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub viewport: Viewport,
}

impl ComparisonRequest {
    /// Request with the configured threshold, viewport and the default regions
    pub fn new(live_url: impl Into<String>, test_url: impl Into<String>) -> Self {
        Self {
            live_url: live_url.into(),
            test_url: test_url.into(),
            regions: default_regions(),
            threshold: crate::config::default_threshold(),
            viewport: Viewport::default(),
        }
    }

    pub fn regions<I, R>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RegionSpec>,
    {
        self.regions = regions.into_iter().map(Into::into).collect();
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    /// Whether both sides point at the same page
    pub fn is_self_comparison(&self) -> bool {
        self.live_url.trim() == self.test_url.trim()
    }

    /// Check every precondition and decide the region kind
    pub fn validate(&self) -> CompareResult<RegionPlan> {
        for (side, url) in [(Side::Live, &self.live_url), (Side::Test, &self.test_url)] {
            let url = url.trim();
            if url.is_empty() {
                return Err(CompareError::MissingUrl(side));
            }
            if !is_absolute_url(url) {
                return Err(CompareError::InvalidUrl {
                    side,
                    url: url.to_string(),
                });
            }
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(CompareError::InvalidThreshold(self.threshold));
        }
        if !self.viewport.is_valid() {
            return Err(CompareError::InvalidViewport(self.viewport));
        }
        Ok(RegionPlan::from_specs(&self.regions)?)
    }
}

/// `scheme://rest` with an RFC 3986 scheme and a non-empty remainder
pub fn is_absolute_url(url: &str) -> bool {
    let Some((scheme, rest)) = url.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    let scheme_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    scheme_ok && !rest.is_empty() && !url.chars().any(char::is_whitespace)
}

/// Verdict and artifacts for one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionResult {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Percentage of changed pixels, two decimals; 100 for ERROR
    pub diff: f64,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Computed percentage kept when artifacts failed to persist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measured_diff: Option<f64>,
    /// Artifacts that could not be written
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_artifacts: Vec<ArtifactRole>,
}

impl RegionResult {
    /// ERROR entry: diff forced to 100, no artifacts
    pub fn error(name: impl Into<String>, description: Option<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description,
            diff: 100.0,
            status: Status::Error,
            diff_image: None,
            live_image: None,
            test_image: None,
            width: None,
            height: None,
            error: Some(error.into()),
            measured_diff: None,
            missing_artifacts: Vec::new(),
        }
    }

    /// Classified entry for a computed diff
    pub fn measured(
        name: impl Into<String>,
        description: Option<String>,
        diff: f64,
        status: Status,
        size: (u32, u32),
    ) -> Self {
        Self {
            name: name.into(),
            description,
            diff,
            status,
            diff_image: None,
            live_image: None,
            test_image: None,
            width: Some(size.0),
            height: Some(size.1),
            error: None,
            measured_diff: None,
            missing_artifacts: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }
}

/// Output of one comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResponse {
    /// Same order as the request's regions
    pub results: Vec<RegionResult>,
    pub summary: String,
    /// Full-page captures of the offset path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_screenshot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_screenshot: Option<String>,
}

impl ComparisonResponse {
    pub fn new(results: Vec<RegionResult>) -> Self {
        let summary = Tally::of(&results).to_string();
        Self {
            results,
            summary,
            live_screenshot: None,
            test_screenshot: None,
        }
    }

    pub fn tally(&self) -> Tally {
        Tally::of(&self.results)
    }
}

/// Status counts behind the summary line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub passed: usize,
    pub close: usize,
    /// FAIL and ERROR together
    pub need_work: usize,
}

impl Tally {
    pub fn of(results: &[RegionResult]) -> Self {
        results.iter().fold(Self::default(), |mut t, r| {
            match r.status {
                Status::Pass => t.passed += 1,
                Status::Close => t.close += 1,
                Status::Fail | Status::Error => t.need_work += 1,
            }
            t
        })
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} close, {} need work",
            self.passed, self.close, self.need_work
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{OffsetRegion, SelectorRegion};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_defaults_from_json() {
        let req: ComparisonRequest =
            serde_json::from_str(r#"{"liveUrl":"https://a.example/","testUrl":"https://b.example/"}"#)
                .unwrap();
        assert_eq!(req.regions.len(), 4);
        assert_eq!(req.regions[0].name(), "hero-carousel");
        assert_eq!(req.threshold, crate::config::default_threshold());
        assert_eq!(req.viewport, crate::config::default_request_viewport());
    }

    #[test]
    fn test_validate_missing_and_relative_urls() {
        let err = ComparisonRequest::new("", "https://b.example/").validate().unwrap_err();
        assert!(matches!(err, CompareError::MissingUrl(Side::Live)));
        assert!(err.is_request_error());

        let err = ComparisonRequest::new("https://a.example/", "/relative")
            .validate()
            .unwrap_err();
        assert!(matches!(err, CompareError::InvalidUrl { side: Side::Test, .. }));
    }

    #[test]
    fn test_validate_threshold_and_viewport() {
        let base = ComparisonRequest::new("https://a.example/", "https://b.example/");
        assert!(matches!(
            base.clone().threshold(1.5).validate(),
            Err(CompareError::InvalidThreshold(_))
        ));
        assert!(matches!(
            base.clone().viewport(Viewport::new(0, 900)).validate(),
            Err(CompareError::InvalidViewport(_))
        ));
        assert!(matches!(base.validate(), Ok(RegionPlan::Selector(_))));
    }

    #[test]
    fn test_validate_rejects_mixed_regions() {
        let req = ComparisonRequest::new("https://a.example/", "https://b.example/").regions([
            RegionSpec::from(SelectorRegion::new("a", ".a")),
            RegionSpec::from(OffsetRegion::new("b", 0, 0, 10)),
        ]);
        let err = req.validate().unwrap_err();
        assert!(matches!(err, CompareError::MixedRegionKinds { .. }));
        assert!(err.is_request_error());
    }

    #[test]
    fn test_is_absolute_url() {
        assert!(is_absolute_url("https://a.example/"));
        assert!(is_absolute_url("file:///tmp/page.html"));
        assert!(!is_absolute_url("a.example"));
        assert!(!is_absolute_url("://a.example"));
        assert!(!is_absolute_url("https://"));
        assert!(!is_absolute_url("https://a b"));
    }

    #[test]
    fn test_summary_counts_error_as_need_work() {
        let results = vec![
            RegionResult::measured("a", None, 0.0, Status::Pass, (1, 1)),
            RegionResult::measured("b", None, 12.5, Status::Close, (1, 1)),
            RegionResult::measured("c", None, 40.0, Status::Fail, (1, 1)),
            RegionResult::error("d", None, "Element not found: test (.d)"),
        ];
        let response = ComparisonResponse::new(results);
        assert_eq!(response.summary, "1 passed, 1 close, 2 need work");
    }

    #[test]
    fn test_error_result_json_shape() {
        let result = RegionResult::error("footer", Some("Footer".into()), "Element not found: test (.footer)");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "footer",
                "description": "Footer",
                "diff": 100.0,
                "status": "ERROR",
                "error": "Element not found: test (.footer)"
            })
        );
    }
}
