//! In-memory browser for exercising the comparison pipeline without Chrome.
//!
//! Each URL maps to a [`MockSite`]: a full-page [`MockFramebuffer`] plus a
//! list of selectors with their bounding boxes. Selector matching is exact
//! string equality, standing in for `document.querySelector`. Every browser
//! and page operation is appended to a shared journal so tests can assert
//! lifecycle guarantees (pages closed, browser closed, capture order).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::backend::{BrowserHandle, BrowserLauncher, MockFramebuffer, PageHandle};
use super::types::{CaptureError, CaptureResult, Rect, Viewport};
use crate::codec::encode_image;

/// A fake page served by the mock browser
#[derive(Debug, Clone)]
pub struct MockSite {
    canvas: MockFramebuffer,
    elements: Vec<MockElement>,
    overlays: Vec<String>,
    navigation: MockNavigation,
    script_result: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
struct MockElement {
    selector: String,
    rect: Rect,
    corrupt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockNavigation {
    Ok,
    Timeout,
    Fail,
}

impl MockSite {
    /// A site rendering the given canvas as its full page
    pub fn new(canvas: MockFramebuffer) -> Self {
        Self {
            canvas,
            elements: Vec::new(),
            overlays: Vec::new(),
            navigation: MockNavigation::Ok,
            script_result: None,
        }
    }

    /// Register an element matched by `selector` with the given bounding box
    pub fn element(mut self, selector: impl Into<String>, rect: Rect) -> Self {
        self.elements.push(MockElement {
            selector: selector.into(),
            rect,
            corrupt: false,
        });
        self
    }

    /// Register an element whose screenshot comes back as undecodable bytes
    pub fn corrupt_element(mut self, selector: impl Into<String>) -> Self {
        self.elements.push(MockElement {
            selector: selector.into(),
            rect: Rect::new(0, 0, 1, 1),
            corrupt: true,
        });
        self
    }

    /// Register an overlay that overlay suppression should hide
    pub fn overlay(mut self, selector: impl Into<String>) -> Self {
        self.overlays.push(selector.into());
        self
    }

    /// Value every script evaluated on this site returns
    pub fn evaluates_to(mut self, value: serde_json::Value) -> Self {
        self.script_result = Some(value);
        self
    }

    /// Make navigation to this site exceed its deadline
    pub fn timing_out(mut self) -> Self {
        self.navigation = MockNavigation::Timeout;
        self
    }

    /// Make navigation to this site fail outright
    pub fn unreachable(mut self) -> Self {
        self.navigation = MockNavigation::Fail;
        self
    }
}

/// Journal entry recorded by the mock browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Launched(Viewport),
    PageOpened(usize),
    Navigated { page: usize, url: String },
    Hidden { page: usize, count: usize },
    ElementCaptured { page: usize, selector: String },
    PageCaptured { page: usize, full_page: bool },
    Scrolled { page: usize, y: u32 },
    Evaluated(usize),
    PageClosed(usize),
    BrowserClosed,
}

/// Launcher for [`MockBrowser`] instances sharing one site map and journal
#[derive(Debug, Clone, Default)]
pub struct MockLauncher {
    sites: Arc<HashMap<String, MockSite>>,
    journal: Arc<Mutex<Vec<MockEvent>>>,
    fail_launch: bool,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `site` at `url`
    pub fn site(mut self, url: impl Into<String>, site: MockSite) -> Self {
        Arc::make_mut(&mut self.sites).insert(url.into(), site);
        self
    }

    /// Make every launch fail
    pub fn failing(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    /// Snapshot of everything recorded so far
    pub fn events(&self) -> Vec<MockEvent> {
        self.journal.lock().map(|j| j.clone()).unwrap_or_default()
    }
}

impl BrowserLauncher for MockLauncher {
    fn launch(&self, viewport: Viewport) -> CaptureResult<Box<dyn BrowserHandle>> {
        if self.fail_launch {
            return Err(CaptureError::Launch("mock launcher configured to fail".to_string()));
        }
        record(&self.journal, MockEvent::Launched(viewport));
        Ok(Box::new(MockBrowser {
            sites: Arc::clone(&self.sites),
            journal: Arc::clone(&self.journal),
            next_page: 0,
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// A running mock browser
pub struct MockBrowser {
    sites: Arc<HashMap<String, MockSite>>,
    journal: Arc<Mutex<Vec<MockEvent>>>,
    next_page: usize,
}

impl BrowserHandle for MockBrowser {
    fn new_page(&mut self) -> CaptureResult<Box<dyn PageHandle>> {
        let id = self.next_page;
        self.next_page += 1;
        record(&self.journal, MockEvent::PageOpened(id));
        Ok(Box::new(MockPage {
            id,
            sites: Arc::clone(&self.sites),
            journal: Arc::clone(&self.journal),
            current: None,
            hidden: Vec::new(),
        }))
    }

    fn close(&mut self) -> CaptureResult<()> {
        record(&self.journal, MockEvent::BrowserClosed);
        Ok(())
    }
}

/// A page inside a [`MockBrowser`]
pub struct MockPage {
    id: usize,
    sites: Arc<HashMap<String, MockSite>>,
    journal: Arc<Mutex<Vec<MockEvent>>>,
    current: Option<MockSite>,
    hidden: Vec<String>,
}

impl MockPage {
    fn site(&self) -> CaptureResult<&MockSite> {
        self.current
            .as_ref()
            .ok_or_else(|| CaptureError::Script("no document loaded".to_string()))
    }

    fn find(&self, selector: &str) -> CaptureResult<Option<&MockElement>> {
        let site = self.site()?;
        Ok(site
            .elements
            .iter()
            .find(|el| el.selector == selector && !self.hidden.contains(&el.selector)))
    }
}

impl PageHandle for MockPage {
    fn navigate(&mut self, url: &str, timeout: Duration) -> CaptureResult<()> {
        let site = self.sites.get(url).ok_or_else(|| CaptureError::Navigation {
            url: url.to_string(),
            reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
        })?;
        match site.navigation {
            MockNavigation::Timeout => {
                return Err(CaptureError::NavigationTimeout {
                    url: url.to_string(),
                    timeout,
                });
            }
            MockNavigation::Fail => {
                return Err(CaptureError::Navigation {
                    url: url.to_string(),
                    reason: "net::ERR_CONNECTION_REFUSED".to_string(),
                });
            }
            MockNavigation::Ok => {}
        }
        self.current = Some(site.clone());
        self.hidden.clear();
        record(
            &self.journal,
            MockEvent::Navigated {
                page: self.id,
                url: url.to_string(),
            },
        );
        Ok(())
    }

    fn hide_matching(&mut self, selectors: &[&str]) -> CaptureResult<usize> {
        let matched: Vec<String> = self
            .site()?
            .overlays
            .iter()
            .filter(|overlay| selectors.contains(&overlay.as_str()))
            .cloned()
            .collect();
        let count = matched.len();
        self.hidden.extend(matched);
        record(&self.journal, MockEvent::Hidden { page: self.id, count });
        Ok(count)
    }

    fn element_screenshot(&mut self, selector: &str) -> CaptureResult<Option<Vec<u8>>> {
        let Some(element) = self.find(selector)? else {
            return Ok(None);
        };
        let bytes = if element.corrupt {
            b"\x89PNG truncated".to_vec()
        } else {
            let crop = self.site()?.canvas.crop(element.rect)?;
            encode_image(&crop)?
        };
        record(
            &self.journal,
            MockEvent::ElementCaptured {
                page: self.id,
                selector: selector.to_string(),
            },
        );
        Ok(Some(bytes))
    }

    fn wait_for_selector(&mut self, selector: &str, _timeout: Duration) -> CaptureResult<bool> {
        Ok(self.find(selector)?.is_some())
    }

    fn scroll_height(&mut self) -> CaptureResult<u32> {
        Ok(self.site()?.canvas.height())
    }

    fn scroll_to(&mut self, y: u32) -> CaptureResult<()> {
        record(&self.journal, MockEvent::Scrolled { page: self.id, y });
        Ok(())
    }

    fn screenshot(&mut self, full_page: bool) -> CaptureResult<Vec<u8>> {
        let canvas = &self.site()?.canvas;
        let bytes = if full_page {
            canvas.to_png()?
        } else {
            // Viewport captures are not sized by the mock; the top band stands in.
            let height = canvas.height().min(900);
            encode_image(&canvas.crop(Rect::new(0, 0, canvas.width(), height))?)?
        };
        record(
            &self.journal,
            MockEvent::PageCaptured {
                page: self.id,
                full_page,
            },
        );
        Ok(bytes)
    }

    fn evaluate_json(&mut self, _expression: &str) -> CaptureResult<serde_json::Value> {
        let value = self
            .site()?
            .script_result
            .clone()
            .ok_or_else(|| CaptureError::Script("script returned undefined".to_string()))?;
        record(&self.journal, MockEvent::Evaluated(self.id));
        Ok(value)
    }

    fn close(&mut self) -> CaptureResult<()> {
        record(&self.journal, MockEvent::PageClosed(self.id));
        Ok(())
    }
}

fn record(journal: &Mutex<Vec<MockEvent>>, event: MockEvent) {
    if let Ok(mut events) = journal.lock() {
        events.push(event);
    }
}
