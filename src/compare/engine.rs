//! The comparison orchestrator.
//!
//! Selector path: one browser, the live page loaded once and every region
//! captured from it, the page closed, then the same for the test page. Only
//! after both sides are captured is each region decoded, cropped, diffed and
//! persisted, one region at a time.
//!
//! Offset path: one page visits both URLs in turn, each is scroll-primed and
//! captured whole, and every region is a band cut out of the two captures.
//!
//! Session failures (launch, navigation) abort the request after the browser
//! is closed. Everything that goes wrong for a single region becomes an
//! ERROR entry for that region only.

use std::sync::Arc;

use image::RgbaImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::measure::{Measurement, measure_band, measure_png};
use super::types::{
    CompareError, CompareResult, ComparisonRequest, ComparisonResponse, RegionResult, Side,
};
use crate::capture::{BrowserLauncher, CaptureResult};
use crate::codec::{CodecError, decode_png, encode_image};
use crate::region::{
    OffsetRegion, RegionCapture, RegionPlan, Resolution, SelectorChain, SelectorRegion, resolve,
};
use crate::session::{BrowserGuard, ManagedPage, PageTiming};
use crate::store::{ArtifactRole, ArtifactStore, PNG_CONTENT_TYPE, RunKeys, StoreError};

/// Runs comparison requests against a browser launcher and an artifact store
#[derive(Clone)]
pub struct Comparator {
    launcher: Arc<dyn BrowserLauncher>,
    store: Arc<dyn ArtifactStore>,
    timing: PageTiming,
}

/// Capture outcome of one region on one side
#[derive(Debug)]
struct SideCapture {
    chain: SelectorChain,
    outcome: Resolution,
}

/// Why one artifact of a region is missing
#[derive(Debug, Error)]
enum ArtifactFailure {
    #[error("not stored: {0}")]
    Store(#[from] StoreError),

    #[error("not encoded: {0}")]
    Encode(#[from] CodecError),
}

/// Keys written for a region and the roles that failed
#[derive(Debug, Default)]
struct Persisted {
    live: Option<String>,
    test: Option<String>,
    diff: Option<String>,
    failures: Vec<(ArtifactRole, ArtifactFailure)>,
}

impl Comparator {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            launcher,
            store,
            timing: PageTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: PageTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Compare the live and test pages region by region.
    ///
    /// Fails only for invalid requests and session-level faults; the browser
    /// is closed before any error is returned.
    pub fn compare(&self, request: &ComparisonRequest) -> CompareResult<ComparisonResponse> {
        let plan = request.validate()?;
        let keys = RunKeys::now();
        info!(
            live = request.live_url.trim(),
            test = request.test_url.trim(),
            regions = plan.len(),
            threshold = request.threshold,
            "starting comparison"
        );

        let mut browser =
            BrowserGuard::launch(self.launcher.as_ref(), request.viewport, self.timing)?;
        let outcome = match &plan {
            RegionPlan::Selector(regions) => {
                self.compare_selectors(&mut browser, request, regions, &keys)
            }
            RegionPlan::Offset(regions) => {
                self.compare_offsets(&mut browser, request, regions, &keys)
            }
        };
        if let Err(e) = browser.close() {
            warn!(error = %e, "failed to close browser");
        }

        let response = outcome?;
        info!(summary = %response.summary, "comparison finished");
        Ok(response)
    }

    fn compare_selectors(
        &self,
        browser: &mut BrowserGuard,
        request: &ComparisonRequest,
        regions: &[SelectorRegion],
        keys: &RunKeys,
    ) -> CompareResult<ComparisonResponse> {
        let same_url = request.is_self_comparison();
        if same_url {
            debug!("self-comparison: test page uses live selectors");
        }

        let live = self.capture_side(browser, Side::Live, request.live_url.trim(), regions, |r| {
            r.live_chain()
        })?;
        let test = self.capture_side(browser, Side::Test, request.test_url.trim(), regions, |r| {
            r.test_chain(same_url)
        })?;

        let results = regions
            .iter()
            .zip(live)
            .zip(test)
            .map(|((region, live), test)| {
                self.evaluate_selector_region(region, live, test, request.threshold, keys)
            })
            .collect();
        Ok(ComparisonResponse::new(results))
    }

    /// Load one page and resolve every region's chain against it, then close the page
    fn capture_side(
        &self,
        browser: &mut BrowserGuard,
        side: Side,
        url: &str,
        regions: &[SelectorRegion],
        chain_for: impl Fn(&SelectorRegion) -> SelectorChain,
    ) -> CompareResult<Vec<SideCapture>> {
        let session_err = |source| CompareError::Session { side, source };

        let mut page = browser.open_page().map_err(session_err)?;
        page.load(url, &[]).map_err(session_err)?;
        info!(%side, url, "page settled");

        let captures = regions
            .iter()
            .map(|region| {
                let chain = chain_for(region);
                let outcome = resolve(&mut page, &chain, &region.name);
                SideCapture { chain, outcome }
            })
            .collect();

        if let Err(e) = page.close() {
            warn!(%side, error = %e, "failed to close page");
        }
        Ok(captures)
    }

    fn evaluate_selector_region(
        &self,
        region: &SelectorRegion,
        live: SideCapture,
        test: SideCapture,
        threshold: f64,
        keys: &RunKeys,
    ) -> RegionResult {
        let name = region.name.as_str();
        let description = region.description.clone();

        let (live, test) = match (into_capture(Side::Live, live), into_capture(Side::Test, test)) {
            (Ok(live), Ok(test)) => (live, test),
            (Err(message), _) | (_, Err(message)) => {
                warn!(region = name, "{}", message);
                return RegionResult::error(name, description, message);
            }
        };

        let measurement = match measure_png(&live.png, &test.png, threshold) {
            Ok(m) => m,
            Err(e) => {
                warn!(region = name, error = %e, "region could not be measured");
                return RegionResult::error(name, description, e.to_string());
            }
        };
        debug!(
            region = name,
            live = live.selector.as_str(),
            test = test.selector.as_str(),
            diff = measurement.percent(),
            "region measured"
        );

        // Element captures are stored as taken; the diff covers the cropped overlap.
        let persisted = self.persist(
            name,
            keys,
            [(ArtifactRole::Live, live.png), (ArtifactRole::Test, test.png)],
            &measurement,
        );
        finish(name, description, &measurement, persisted)
    }

    fn compare_offsets(
        &self,
        browser: &mut BrowserGuard,
        request: &ComparisonRequest,
        regions: &[OffsetRegion],
        keys: &RunKeys,
    ) -> CompareResult<ComparisonResponse> {
        let mut page = browser
            .open_page()
            .map_err(|source| CompareError::Session { side: Side::Live, source })?;
        let live_png = capture_full_page(&mut page, request.live_url.trim())
            .map_err(|source| CompareError::Session { side: Side::Live, source })?;
        let test_png = capture_full_page(&mut page, request.test_url.trim())
            .map_err(|source| CompareError::Session { side: Side::Test, source })?;
        if let Err(e) = page.close() {
            warn!(error = %e, "failed to close page");
        }

        let live_key = self.store_page(keys, Side::Live, &live_png);
        let test_key = self.store_page(keys, Side::Test, &test_png);

        let decoded = (decode_png(&live_png), decode_png(&test_png));
        let results = match decoded {
            (Ok(live), Ok(test)) => regions
                .iter()
                .map(|region| {
                    self.evaluate_offset_region(region, &live, &test, request.threshold, keys)
                })
                .collect(),
            (Err(e), _) => page_unusable(regions, Side::Live, &e.to_string()),
            (_, Err(e)) => page_unusable(regions, Side::Test, &e.to_string()),
        };

        let mut response = ComparisonResponse::new(results);
        response.live_screenshot = live_key;
        response.test_screenshot = test_key;
        Ok(response)
    }

    fn evaluate_offset_region(
        &self,
        region: &OffsetRegion,
        live_page: &RgbaImage,
        test_page: &RgbaImage,
        threshold: f64,
        keys: &RunKeys,
    ) -> RegionResult {
        let name = region.name.as_str();
        let description = region.description.clone();
        let measurement = match measure_band(live_page, test_page, region, threshold) {
            Ok(m) => m,
            Err(e) => {
                warn!(region = name, error = %e, "band could not be measured");
                return RegionResult::error(name, description, e.to_string());
            }
        };

        let live = encode_image(&measurement.live);
        let test = encode_image(&measurement.test);
        let (live, test) = match (live, test) {
            (Ok(live), Ok(test)) => (live, test),
            (Err(e), _) | (_, Err(e)) => {
                return RegionResult::error(name, description, e.to_string());
            }
        };
        let persisted = self.persist(
            name,
            keys,
            [(ArtifactRole::Live, live), (ArtifactRole::Test, test)],
            &measurement,
        );
        finish(name, description, &measurement, persisted)
    }

    /// Store a full-page capture; a failed write leaves the key out of the response
    fn store_page(&self, keys: &RunKeys, side: Side, png: &[u8]) -> Option<String> {
        let key = keys.page(side.as_str());
        match self.store.put(&key, png, PNG_CONTENT_TYPE) {
            Ok(()) => Some(key),
            Err(e) => {
                warn!(%side, key = key.as_str(), error = %e, "failed to store full page");
                None
            }
        }
    }

    /// Write the live, test and diff images of one region.
    ///
    /// Every write is attempted; failures are collected instead of short-circuiting.
    fn persist(
        &self,
        name: &str,
        keys: &RunKeys,
        captures: [(ArtifactRole, Vec<u8>); 2],
        measurement: &Measurement,
    ) -> Persisted {
        let mut failures: Vec<(ArtifactRole, ArtifactFailure)> = Vec::new();
        let mut put = |role: ArtifactRole, bytes: &[u8]| -> Option<String> {
            let key = keys.region(name, role);
            match self.store.put(&key, bytes, PNG_CONTENT_TYPE) {
                Ok(()) => {
                    debug!(region = name, key = key.as_str(), "artifact stored");
                    Some(key)
                }
                Err(e) => {
                    warn!(region = name, key = key.as_str(), error = %e, "artifact not stored");
                    failures.push((role, e.into()));
                    None
                }
            }
        };

        let mut live = None;
        let mut test = None;
        for (role, bytes) in captures {
            let key = put(role, &bytes);
            match role {
                ArtifactRole::Live => live = key,
                _ => test = key,
            }
        }
        let (diff, encode_failure) = match measurement.diff_png() {
            Ok(bytes) => (put(ArtifactRole::Diff, &bytes), None),
            Err(e) => (None, Some(e)),
        };
        if let Some(e) = encode_failure {
            warn!(region = name, error = %e, "diff image not encoded");
            failures.push((ArtifactRole::Diff, e.into()));
        }

        Persisted {
            live,
            test,
            diff,
            failures,
        }
    }
}

/// Navigate, settle, scroll-prime and capture the whole document
fn capture_full_page(page: &mut ManagedPage, url: &str) -> CaptureResult<Vec<u8>> {
    page.load(url, &[])?;
    page.prime_scroll()?;
    let png = page.capture_page(true)?;
    info!(url, bytes = png.len(), "full page captured");
    Ok(png)
}

/// A found capture, or the message of the ERROR entry it turns into
fn into_capture(side: Side, capture: SideCapture) -> Result<RegionCapture, String> {
    match capture.outcome {
        Resolution::Found(found) => Ok(found),
        Resolution::NotFound(None) => Err(format!("Element not found: {} ({})", side, capture.chain)),
        Resolution::NotFound(Some(e)) => {
            Err(format!("{} capture failed ({}): {}", side, capture.chain, e))
        }
    }
}

/// Every region fails with the same message when a full-page capture cannot be decoded
fn page_unusable(regions: &[OffsetRegion], side: Side, cause: &str) -> Vec<RegionResult> {
    let message = format!("{} screenshot unusable: {}", side, cause);
    warn!(error = %message, "full page capture unusable");
    regions
        .iter()
        .map(|r| RegionResult::error(&r.name, r.description.clone(), message.clone()))
        .collect()
}

/// Build the result of a measured region, downgrading to ERROR when artifacts are missing
fn finish(
    name: &str,
    description: Option<String>,
    measurement: &Measurement,
    persisted: Persisted,
) -> RegionResult {
    let mut result = RegionResult::measured(
        name,
        description,
        measurement.percent(),
        measurement.status(),
        measurement.size(),
    );
    result.live_image = persisted.live;
    result.test_image = persisted.test;
    result.diff_image = persisted.diff;

    if !persisted.failures.is_empty() {
        let message = persisted
            .failures
            .iter()
            .map(|(role, e)| format!("{} image {}", role, e))
            .collect::<Vec<_>>()
            .join("; ");
        result.measured_diff = Some(result.diff);
        result.diff = 100.0;
        result.status = crate::diff::Status::Error;
        result.error = Some(message);
        result.missing_artifacts = persisted.failures.into_iter().map(|(role, _)| role).collect();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{MockFramebuffer, MockLauncher, MockSite, Rect};
    use crate::diff::Status;
    use crate::store::MemoryStore;

    fn site(color: [u8; 3]) -> MockSite {
        let mut canvas = MockFramebuffer::new(200, 400);
        canvas.draw_rect(0, 300, 200, 100, color);
        MockSite::new(canvas).element(".footer", Rect::new(0, 300, 200, 100))
    }

    fn comparator(launcher: MockLauncher, store: Arc<MemoryStore>) -> Comparator {
        Comparator::new(Arc::new(launcher), store).with_timing(PageTiming::immediate())
    }

    #[test]
    fn test_partial_store_failure_keeps_measurement() {
        let launcher = MockLauncher::new()
            .site("https://a.example/", site([0, 0, 0]))
            .site("https://b.example/", site([0, 0, 0]));
        let store = Arc::new(MemoryStore::new().fail_puts_matching("-test.png"));
        let request = ComparisonRequest::new("https://a.example/", "https://b.example/")
            .regions([SelectorRegion::new("footer", ".footer")]);

        let response = comparator(launcher, Arc::clone(&store)).compare(&request).unwrap();
        let result = &response.results[0];
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.diff, 100.0);
        assert_eq!(result.measured_diff, Some(0.0));
        assert_eq!(result.missing_artifacts, vec![ArtifactRole::Test]);
        assert!(result.live_image.is_some());
        assert!(result.test_image.is_none());
        assert!(result.diff_image.is_some());
        assert!(result.error.as_deref().unwrap_or_default().contains("test image not stored"));
    }

    #[test]
    fn test_finish_without_failures_keeps_status() {
        let img = RgbaImage::new(2, 2);
        let measurement = crate::compare::measure::measure(img.clone(), img, 0.35).unwrap();
        let result = finish("a", None, &measurement, Persisted::default());
        assert_eq!(result.status, Status::Pass);
        assert!(result.error.is_none());
        assert_eq!(result.width, Some(2));
    }

    #[test]
    fn test_diff_encode_failure_is_not_a_store_error() {
        let img = RgbaImage::new(2, 2);
        let measurement = crate::compare::measure::measure(img.clone(), img, 0.35).unwrap();
        let persisted = Persisted {
            live: Some("regions/1-a-live.png".to_string()),
            test: Some("regions/1-a-test.png".to_string()),
            diff: None,
            failures: vec![(
                ArtifactRole::Diff,
                CodecError::Encode("writer closed".to_string()).into(),
            )],
        };

        let result = finish("a", None, &measurement, persisted);
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.measured_diff, Some(0.0));
        assert_eq!(result.missing_artifacts, vec![ArtifactRole::Diff]);
        assert_eq!(
            result.error.as_deref(),
            Some("diff image not encoded: failed to encode PNG: writer closed")
        );
    }
}
