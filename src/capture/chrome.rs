//! Headless Chrome backend over the DevTools protocol.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptionsBuilder, Tab};
use tracing::debug;

use super::backend::{BrowserHandle, BrowserLauncher, PageHandle};
use super::types::{CaptureError, CaptureResult, Viewport};
use crate::config::BrowserSettings;

/// Headroom on top of the navigation deadline before Chrome is considered idle
const IDLE_HEADROOM: Duration = Duration::from_secs(30);

/// Launches a local Chrome/Chromium for each comparison request
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    /// Explicit browser binary; autodetected when `None`
    pub chrome_path: Option<PathBuf>,
    /// Run without a visible window
    pub headless: bool,
    /// How long the browser may go without DevTools traffic before it is dropped
    pub idle_timeout: Duration,
}

impl ChromeLauncher {
    pub fn new() -> Self {
        Self::from_settings(&crate::config::get().browser)
    }

    /// Build a launcher from browser settings, sized for the configured navigation deadline
    pub fn from_settings(settings: &BrowserSettings) -> Self {
        let nav = Duration::from_secs(crate::config::get().page.nav_timeout);
        Self {
            chrome_path: settings.chrome_path.clone(),
            headless: settings.headless,
            idle_timeout: nav + IDLE_HEADROOM,
        }
    }
}

impl Default for ChromeLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserLauncher for ChromeLauncher {
    fn launch(&self, viewport: Viewport) -> CaptureResult<Box<dyn BrowserHandle>> {
        let options = LaunchOptionsBuilder::default()
            .headless(self.headless)
            .path(self.chrome_path.clone())
            .window_size(Some((viewport.width, viewport.height)))
            .idle_browser_timeout(self.idle_timeout)
            .args(vec![
                OsStr::new("--force-device-scale-factor=1"),
                OsStr::new("--hide-scrollbars"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--no-sandbox"),
            ])
            .build()
            .map_err(|e| CaptureError::Launch(e.to_string()))?;

        let browser = Browser::new(options).map_err(|e| CaptureError::Launch(e.to_string()))?;
        debug!(%viewport, "chrome launched");
        Ok(Box::new(ChromeBrowser {
            browser: Some(browser),
        }))
    }

    fn name(&self) -> &str {
        "chrome"
    }
}

/// A running Chrome process
pub struct ChromeBrowser {
    browser: Option<Browser>,
}

impl BrowserHandle for ChromeBrowser {
    fn new_page(&mut self) -> CaptureResult<Box<dyn PageHandle>> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| CaptureError::OpenPage("browser already closed".to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| CaptureError::OpenPage(e.to_string()))?;
        Ok(Box::new(ChromePage { tab }))
    }

    fn close(&mut self) -> CaptureResult<()> {
        // Dropping the handle terminates the child process.
        drop(self.browser.take());
        Ok(())
    }
}

/// One Chrome tab
pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    fn eval(&self, script: &str) -> CaptureResult<Option<serde_json::Value>> {
        self.tab
            .evaluate(script, false)
            .map(|obj| obj.value)
            .map_err(|e| CaptureError::Script(e.to_string()))
    }

    fn has_element(&self, selector: &str) -> CaptureResult<bool> {
        let script = format!(
            "(() => {{ try {{ return document.querySelector({}) !== null; }} catch (e) {{ return false; }} }})()",
            js_string(selector)
        );
        Ok(self
            .eval(&script)?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    fn document_size(&self) -> CaptureResult<(u32, u32)> {
        let value = self.eval(
            "JSON.stringify([document.documentElement.scrollWidth, document.documentElement.scrollHeight])",
        )?;
        let raw = value
            .as_ref()
            .and_then(|v| v.as_str())
            .ok_or_else(|| CaptureError::Script("document size unavailable".to_string()))?;
        let [width, height]: [u32; 2] =
            serde_json::from_str(raw).map_err(|e| CaptureError::Script(e.to_string()))?;
        Ok((width.max(1), height.max(1)))
    }
}

impl PageHandle for ChromePage {
    fn navigate(&mut self, url: &str, timeout: Duration) -> CaptureResult<()> {
        let started = Instant::now();
        self.tab.set_default_timeout(timeout);
        let outcome = self
            .tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated());
        match outcome {
            Ok(_) => Ok(()),
            Err(_) if started.elapsed() >= timeout => Err(CaptureError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            }),
            Err(e) => Err(CaptureError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn hide_matching(&mut self, selectors: &[&str]) -> CaptureResult<usize> {
        let list = serde_json::to_string(selectors).map_err(|e| CaptureError::Script(e.to_string()))?;
        let script = format!(
            "(() => {{ let n = 0; for (const sel of {list}) {{ let els; try {{ els = document.querySelectorAll(sel); }} catch (e) {{ continue; }} els.forEach(el => {{ el.style.display = 'none'; n++; }}); }} return n; }})()"
        );
        let hidden = self.eval(&script)?.and_then(|v| v.as_u64()).unwrap_or(0);
        Ok(hidden as usize)
    }

    fn element_screenshot(&mut self, selector: &str) -> CaptureResult<Option<Vec<u8>>> {
        if !self.has_element(selector)? {
            return Ok(None);
        }
        let element = self
            .tab
            .find_element(selector)
            .map_err(|e| CaptureError::Screenshot(e.to_string()))?;
        let png = element
            .capture_screenshot(CaptureScreenshotFormatOption::Png)
            .map_err(|e| CaptureError::Screenshot(e.to_string()))?;
        Ok(Some(png))
    }

    fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> CaptureResult<bool> {
        Ok(self
            .tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .is_ok())
    }

    fn scroll_height(&mut self) -> CaptureResult<u32> {
        let height = self
            .eval("document.body ? document.body.scrollHeight : 0")?
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        Ok(u32::try_from(height).unwrap_or(u32::MAX))
    }

    fn scroll_to(&mut self, y: u32) -> CaptureResult<()> {
        self.eval(&format!("window.scrollTo(0, {y})"))?;
        Ok(())
    }

    fn screenshot(&mut self, full_page: bool) -> CaptureResult<Vec<u8>> {
        let document = if full_page {
            Some(self.document_size()?)
        } else {
            None
        };
        let data = self
            .tab
            .call_method(screenshot_params(document))
            .map_err(|e| CaptureError::Screenshot(e.to_string()))?
            .data;
        BASE64_STANDARD
            .decode(data)
            .map_err(|e| CaptureError::Screenshot(e.to_string()))
    }

    fn evaluate_json(&mut self, expression: &str) -> CaptureResult<serde_json::Value> {
        // Objects only come back by reference, so serialize inside the page.
        let script = format!("JSON.stringify({expression})");
        let raw = self
            .eval(&script)?
            .and_then(|v| v.as_str().map(String::from))
            .ok_or_else(|| CaptureError::Script("script returned undefined".to_string()))?;
        serde_json::from_str(&raw).map_err(|e| CaptureError::Script(e.to_string()))
    }

    fn close(&mut self) -> CaptureResult<()> {
        self.tab
            .close(true)
            .map(|_| ())
            .map_err(|e| CaptureError::Script(e.to_string()))
    }
}

/// PNG capture of the viewport, or of the whole document when its size is given.
///
/// `Tab::capture_screenshot` never sets captureBeyondViewport, so content
/// below the fold would come back blank without calling CDP directly.
fn screenshot_params(document: Option<(u32, u32)>) -> Page::CaptureScreenshot {
    Page::CaptureScreenshot {
        format: Some(CaptureScreenshotFormatOption::Png),
        quality: None,
        clip: document.map(|(width, height)| Page::Viewport {
            x: 0.0,
            y: 0.0,
            width: f64::from(width),
            height: f64::from(height),
            scale: 1.0,
        }),
        from_surface: Some(true),
        capture_beyond_viewport: Some(document.is_some()),
        optimize_for_speed: None,
    }
}

/// Quote a string as a JavaScript string literal
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(js_string(".a"), "\".a\"");
        assert_eq!(js_string("[data-x=\"y\"]"), "\"[data-x=\\\"y\\\"]\"");
    }

    #[test]
    fn test_full_page_params_capture_beyond_viewport() {
        let params = screenshot_params(Some((1280, 5000)));
        assert_eq!(params.capture_beyond_viewport, Some(true));
        let clip = params.clip.expect("full page capture is clipped to the document");
        assert_eq!((clip.width, clip.height), (1280.0, 5000.0));

        let params = screenshot_params(None);
        assert_eq!(params.capture_beyond_viewport, Some(false));
        assert!(params.clip.is_none());
    }

    #[test]
    fn test_launcher_idle_timeout_covers_navigation() {
        let launcher = ChromeLauncher::from_settings(&BrowserSettings::defaults());
        let nav = Duration::from_secs(crate::config::get().page.nav_timeout);
        assert!(launcher.idle_timeout > nav);
        assert_eq!(launcher.name(), "chrome");
    }
}
