//! Page session management with guaranteed release.
//!
//! Provides the lifecycle around one browser instance and its pages:
//! - [`BrowserGuard`] owns a launched browser and closes it on every exit path
//! - [`ManagedPage`] walks a page through Created -> Navigated -> Settled -> Closed
//! - Overlay suppression and scroll priming with configurable timings

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::capture::{
    BrowserHandle, BrowserLauncher, CaptureError, CaptureResult, PageHandle, PageState, Viewport,
};
use crate::config::Config;

/// Cookie/consent/modal patterns hidden before any capture
pub const OVERLAY_DENY_LIST: &[&str] = &[
    "[class*=\"cookie\"]",
    "[id*=\"cookie\"]",
    ".onetrust-pc-dark-filter",
    "#onetrust-banner-sdk",
    "[class*=\"consent\"]",
    "[class*=\"gdpr\"]",
    "[class*=\"banner\"]",
    "[class*=\"popup\"]",
    "[class*=\"modal\"]",
];

/// Delays and deadlines applied while driving a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTiming {
    /// Deadline for a navigation to finish
    pub navigation_timeout: Duration,
    /// Pause after navigation before overlays are hidden
    pub settle_delay: Duration,
    /// Deadline for an element to appear (screenshot operation)
    pub element_timeout: Duration,
    /// Scroll-priming increment in pixels
    pub scroll_step: u32,
    /// Pause after each scroll increment
    pub scroll_pause: Duration,
    /// Pause after returning to the top of the page
    pub scroll_return_pause: Duration,
}

impl PageTiming {
    pub fn from_config(config: &Config) -> Self {
        Self {
            navigation_timeout: Duration::from_secs(config.page.nav_timeout),
            settle_delay: Duration::from_millis(config.page.settle_ms),
            element_timeout: Duration::from_secs(config.page.element_timeout),
            scroll_step: config.page.scroll_step.max(1),
            scroll_pause: Duration::from_millis(config.page.scroll_pause_ms),
            scroll_return_pause: Duration::from_millis(500),
        }
    }

    /// No pauses at all; deadlines stay at their configured values
    pub fn immediate() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            scroll_pause: Duration::ZERO,
            scroll_return_pause: Duration::ZERO,
            ..Self::from_config(&Config::defaults())
        }
    }
}

impl Default for PageTiming {
    fn default() -> Self {
        Self::from_config(crate::config::get())
    }
}

/// A launched browser that is closed when the guard goes away
pub struct BrowserGuard {
    browser: Option<Box<dyn BrowserHandle>>,
    timing: PageTiming,
    launcher: String,
}

impl BrowserGuard {
    /// Launch a browser at the given viewport
    pub fn launch(
        launcher: &dyn BrowserLauncher,
        viewport: Viewport,
        timing: PageTiming,
    ) -> CaptureResult<Self> {
        let browser = launcher.launch(viewport)?;
        info!(launcher = launcher.name(), %viewport, "browser launched");
        Ok(Self {
            browser: Some(browser),
            timing,
            launcher: launcher.name().to_string(),
        })
    }

    /// Open a fresh page in the Created state
    pub fn open_page(&mut self) -> CaptureResult<ManagedPage> {
        let browser = self
            .browser
            .as_mut()
            .ok_or_else(|| CaptureError::OpenPage("browser already closed".to_string()))?;
        let page = browser.new_page()?;
        Ok(ManagedPage::new(page, self.timing))
    }

    /// Close the browser now, surfacing the close error
    pub fn close(mut self) -> CaptureResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> CaptureResult<()> {
        match self.browser.take() {
            Some(mut browser) => {
                debug!(launcher = %self.launcher, "closing browser");
                browser.close()
            }
            None => Ok(()),
        }
    }
}

impl Drop for BrowserGuard {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "failed to close browser");
        }
    }
}

/// One page with an explicit lifecycle; closed on drop if still open
pub struct ManagedPage {
    page: Box<dyn PageHandle>,
    state: PageState,
    timing: PageTiming,
    url: Option<String>,
}

impl ManagedPage {
    pub fn new(page: Box<dyn PageHandle>, timing: PageTiming) -> Self {
        Self {
            page,
            state: PageState::Created,
            timing,
            url: None,
        }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    /// URL of the last successful navigation
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Load `url`, bounded by the navigation deadline
    pub fn navigate(&mut self, url: &str) -> CaptureResult<()> {
        self.require_open("created, navigated or settled")?;
        debug!(url, "navigating");
        self.page.navigate(url, self.timing.navigation_timeout)?;
        self.state = PageState::Navigated;
        self.url = Some(url.to_string());
        Ok(())
    }

    /// Wait out the settle delay, then hide overlays.
    ///
    /// Overlay suppression is best-effort: a script failure is logged and the
    /// page still counts as settled.
    pub fn settle(&mut self, extra_hide: &[&str]) -> CaptureResult<()> {
        if self.state != PageState::Navigated {
            return Err(CaptureError::InvalidState {
                expected: "navigated",
                actual: self.state,
            });
        }
        if !self.timing.settle_delay.is_zero() {
            thread::sleep(self.timing.settle_delay);
        }

        let selectors: Vec<&str> = OVERLAY_DENY_LIST
            .iter()
            .copied()
            .chain(extra_hide.iter().copied())
            .collect();
        match self.page.hide_matching(&selectors) {
            Ok(0) => {}
            Ok(count) => debug!(count, "hid overlays"),
            Err(e) => warn!(error = %e, "overlay suppression failed"),
        }

        self.state = PageState::Settled;
        Ok(())
    }

    /// Navigate and settle in one step
    pub fn load(&mut self, url: &str, extra_hide: &[&str]) -> CaptureResult<()> {
        self.navigate(url)?;
        self.settle(extra_hide)
    }

    /// Scroll top to bottom in fixed steps to trigger lazy content, then return to the top
    pub fn prime_scroll(&mut self) -> CaptureResult<()> {
        self.require_settled()?;
        let height = self.page.scroll_height()?;
        let step = self.timing.scroll_step.max(1);
        // One step past the end so the final band is also scrolled into view.
        for i in 0..=height.div_ceil(step) {
            self.page.scroll_to(i.saturating_mul(step))?;
            pause(self.timing.scroll_pause);
        }
        self.page.scroll_to(0)?;
        pause(self.timing.scroll_return_pause);
        Ok(())
    }

    /// PNG of the first element matching `selector`, `None` when nothing matches
    pub fn capture_element(&mut self, selector: &str) -> CaptureResult<Option<Vec<u8>>> {
        self.require_settled()?;
        self.page.element_screenshot(selector)
    }

    /// Wait up to the element deadline for `selector`
    pub fn wait_for_element(&mut self, selector: &str) -> CaptureResult<bool> {
        self.require_settled()?;
        self.page
            .wait_for_selector(selector, self.timing.element_timeout)
    }

    /// PNG of the full document or of the viewport
    pub fn capture_page(&mut self, full_page: bool) -> CaptureResult<Vec<u8>> {
        self.require_settled()?;
        self.page.screenshot(full_page)
    }

    /// Evaluate a script against the settled document
    pub fn evaluate_json(&mut self, expression: &str) -> CaptureResult<serde_json::Value> {
        self.require_settled()?;
        self.page.evaluate_json(expression)
    }

    /// Release the page now, surfacing the close error
    pub fn close(mut self) -> CaptureResult<()> {
        self.release()
    }

    fn release(&mut self) -> CaptureResult<()> {
        if self.state == PageState::Closed {
            return Ok(());
        }
        self.state = PageState::Closed;
        self.page.close()
    }

    fn require_settled(&self) -> CaptureResult<()> {
        if self.state == PageState::Settled {
            Ok(())
        } else {
            Err(CaptureError::InvalidState {
                expected: "settled",
                actual: self.state,
            })
        }
    }

    fn require_open(&self, expected: &'static str) -> CaptureResult<()> {
        if self.state == PageState::Closed {
            Err(CaptureError::InvalidState {
                expected,
                actual: self.state,
            })
        } else {
            Ok(())
        }
    }
}

impl Drop for ManagedPage {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "failed to close page");
        }
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}
