//! Page scraping: title, images, main content and candidate sections.
//!
//! The section list is what a caller picks comparison regions from, so a
//! scrape can be turned straight into selector regions with
//! [`ScrapeResponse::suggested_regions`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::capture::{BrowserLauncher, CaptureError, Viewport};
use crate::compare::is_absolute_url;
use crate::region::{RegionSpec, SelectorRegion};
use crate::session::{BrowserGuard, ManagedPage, PageTiming};
use crate::store::{ArtifactStore, PNG_CONTENT_TYPE, RunKeys, StoreError, sanitize_name};

/// Characters of outer HTML kept per section
const SECTION_HTML_LIMIT: usize = 500;

/// Selector patterns for major page sections, in report order
pub const SECTION_PATTERNS: [&str; 8] = [
    "section",
    "[class*=\"hero\"]",
    "[class*=\"carousel\"]",
    "[class*=\"card\"]",
    "[class*=\"footer\"]",
    "[class*=\"nav\"]",
    "header",
    "footer",
];

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("url is required")]
    MissingUrl,

    #[error("not an absolute URL: '{0}'")]
    InvalidUrl(String),

    #[error("viewport must have a non-zero size, got {0}")]
    InvalidViewport(Viewport),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("page content could not be read: {0}")]
    Content(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub viewport: Viewport,
}

impl ScrapeRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            viewport: Viewport::default(),
        }
    }

    pub fn viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedImage {
    pub src: String,
    #[serde(default)]
    pub alt: String,
}

/// A candidate section: a selector for it and the start of its markup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedSection {
    pub selector: String,
    pub html: String,
}

/// What the in-page script reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContent {
    #[serde(default)]
    pub title: String,
    /// Inner HTML of `<main>`, else of `<body>`
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub images: Vec<ScrapedImage>,
    #[serde(default)]
    pub sections: Vec<ScrapedSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResponse {
    pub url: String,
    pub title: String,
    pub html: String,
    pub images: Vec<ScrapedImage>,
    pub sections: Vec<ScrapedSection>,
    /// Store key of the full-page PNG
    pub screenshot: String,
}

impl ScrapeResponse {
    /// One selector region per distinct section selector, in page order
    pub fn suggested_regions(&self) -> Vec<RegionSpec> {
        let mut names = HashSet::new();
        let mut seen = HashSet::new();
        self.sections
            .iter()
            .filter(|s| seen.insert(s.selector.as_str()))
            .map(|s| {
                let base = sanitize_name(s.selector.trim_start_matches(['.', '#']));
                let mut name = base.clone();
                let mut n = 2;
                while !names.insert(name.clone()) {
                    name = format!("{}-{}", base, n);
                    n += 1;
                }
                SelectorRegion::new(name, s.selector.clone()).into()
            })
            .collect()
    }
}

/// Script run in the page; evaluates to a [`PageContent`]-shaped object
fn content_script() -> String {
    let patterns = serde_json::to_string(&SECTION_PATTERNS).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"(() => {{
  const images = Array.from(document.querySelectorAll('img')).map(img => ({{ src: img.src, alt: img.alt || '' }}));
  const main = document.querySelector('main');
  const html = main ? main.innerHTML : (document.body ? document.body.innerHTML : '');
  const sections = [];
  for (const pattern of {patterns}) {{
    document.querySelectorAll(pattern).forEach((el, idx) => {{
      const cls = typeof el.className === 'string' ? el.className.trim() : '';
      const selector = el.id ? '#' + el.id : cls ? '.' + cls.split(/\s+/)[0] : pattern + ':nth-of-type(' + (idx + 1) + ')';
      sections.push({{ selector, html: el.outerHTML.slice(0, {SECTION_HTML_LIMIT}) }});
    }});
  }}
  return {{ title: document.title, images, html, sections }};
}})()"#
    )
}

/// Read title, images, main content and sections from a settled page
pub fn extract(page: &mut ManagedPage) -> Result<PageContent, ScrapeError> {
    let value = page.evaluate_json(&content_script())?;
    Ok(serde_json::from_value(value)?)
}

/// Load one page, scrape its content and store a full-page screenshot
pub fn take_scrape(
    launcher: &dyn BrowserLauncher,
    store: &dyn ArtifactStore,
    timing: PageTiming,
    request: &ScrapeRequest,
) -> Result<ScrapeResponse, ScrapeError> {
    let url = request.url.trim();
    if url.is_empty() {
        return Err(ScrapeError::MissingUrl);
    }
    if !is_absolute_url(url) {
        return Err(ScrapeError::InvalidUrl(url.to_string()));
    }
    if !request.viewport.is_valid() {
        return Err(ScrapeError::InvalidViewport(request.viewport));
    }

    let mut browser = BrowserGuard::launch(launcher, request.viewport, timing)?;
    let scraped = browser
        .open_page()
        .map_err(ScrapeError::from)
        .and_then(|mut page| {
            let scraped = scrape_page(&mut page, url);
            if let Err(e) = page.close() {
                warn!(error = %e, "failed to close page");
            }
            scraped
        });
    if let Err(e) = browser.close() {
        warn!(error = %e, "failed to close browser");
    }
    let (content, png) = scraped?;

    let key = RunKeys::now().page("scrape");
    store.put(&key, &png, PNG_CONTENT_TYPE)?;
    info!(
        url,
        key = key.as_str(),
        images = content.images.len(),
        sections = content.sections.len(),
        "page scraped"
    );

    Ok(ScrapeResponse {
        url: url.to_string(),
        title: content.title,
        html: content.html,
        images: content.images,
        sections: content.sections,
        screenshot: key,
    })
}

fn scrape_page(page: &mut ManagedPage, url: &str) -> Result<(PageContent, Vec<u8>), ScrapeError> {
    page.load(url, &[])?;
    let content = extract(page)?;
    let png = page.capture_page(true)?;
    Ok((content, png))
}
