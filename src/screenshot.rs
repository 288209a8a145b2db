//! Single-page screenshot operation.
//!
//! Captures one URL (whole document, viewport, or one element) and stores
//! the PNG under `screenshots/{timestamp}-{suffix}.png`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::capture::{BrowserLauncher, CaptureError, Viewport};
use crate::codec::{CodecError, decode_png};
use crate::compare::is_absolute_url;
use crate::session::{BrowserGuard, ManagedPage, PageTiming};
use crate::store::{ArtifactStore, PNG_CONTENT_TYPE, RunKeys, StoreError};

static SCREENSHOT_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum ScreenshotError {
    #[error("url is required")]
    MissingUrl,

    #[error("not an absolute URL: '{0}'")]
    InvalidUrl(String),

    #[error("viewport must have a non-zero size, got {0}")]
    InvalidViewport(Viewport),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn default_full_page() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub viewport: Viewport,
    /// Capture only the first element matching this selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default = "default_full_page")]
    pub full_page: bool,
    /// Hidden in addition to the overlay deny list
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hide_selectors: Vec<String>,
}

impl ScreenshotRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            viewport: Viewport::default(),
            selector: None,
            full_page: true,
            hide_selectors: Vec::new(),
        }
    }

    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn full_page(mut self, full_page: bool) -> Self {
        self.full_page = full_page;
        self
    }

    pub fn hide(mut self, selector: impl Into<String>) -> Self {
        self.hide_selectors.push(selector.into());
        self
    }

    pub fn viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotResponse {
    /// Store key of the PNG
    pub screenshot: String,
    pub width: u32,
    pub height: u32,
}

/// Capture one page or element and store it
pub fn take_screenshot(
    launcher: &dyn BrowserLauncher,
    store: &dyn ArtifactStore,
    timing: PageTiming,
    request: &ScreenshotRequest,
) -> Result<ScreenshotResponse, ScreenshotError> {
    let url = request.url.trim();
    if url.is_empty() {
        return Err(ScreenshotError::MissingUrl);
    }
    if !is_absolute_url(url) {
        return Err(ScreenshotError::InvalidUrl(url.to_string()));
    }
    if !request.viewport.is_valid() {
        return Err(ScreenshotError::InvalidViewport(request.viewport));
    }

    let mut browser = BrowserGuard::launch(launcher, request.viewport, timing)?;
    let captured = browser
        .open_page()
        .and_then(|mut page| {
            let png = capture(&mut page, url, request);
            if let Err(e) = page.close() {
                warn!(error = %e, "failed to close page");
            }
            png
        });
    if let Err(e) = browser.close() {
        warn!(error = %e, "failed to close browser");
    }
    let png = captured?;

    let image = decode_png(&png)?;
    let suffix = format!(
        "{}-{}",
        std::process::id(),
        SCREENSHOT_SEQ.fetch_add(1, Ordering::Relaxed)
    );
    let key = RunKeys::now().page(&suffix);
    store.put(&key, &png, PNG_CONTENT_TYPE)?;
    info!(url, key = key.as_str(), width = image.width(), height = image.height(), "screenshot stored");

    Ok(ScreenshotResponse {
        screenshot: key,
        width: image.width(),
        height: image.height(),
    })
}

fn capture(
    page: &mut ManagedPage,
    url: &str,
    request: &ScreenshotRequest,
) -> Result<Vec<u8>, CaptureError> {
    let hide: Vec<&str> = request.hide_selectors.iter().map(String::as_str).collect();
    page.load(url, &hide)?;
    if request.full_page {
        page.prime_scroll()?;
    }

    match request.selector.as_deref().map(str::trim) {
        Some(selector) if !selector.is_empty() => {
            if !page.wait_for_element(selector)? {
                return Err(CaptureError::ElementNotFound(selector.to_string()));
            }
            page.capture_element(selector)?
                .ok_or_else(|| CaptureError::ElementNotFound(selector.to_string()))
        }
        _ => page.capture_page(request.full_page),
    }
}
