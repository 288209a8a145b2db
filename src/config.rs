//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for Chromecat, supporting:
//! - Environment variables for all configurable values
//! - Defaults matching the comparison service's fixed behaviour
//! - A process-global snapshot read once on first access
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `CHROMECAT_THRESHOLD` | Differ sensitivity when a request omits it | `0.35` |
//! | `CHROMECAT_VIEWPORT` | Viewport preset or `WxH` | `desktop` (1280x900) |
//! | `CHROMECAT_NAV_TIMEOUT` | Navigation deadline in seconds | `60` |
//! | `CHROMECAT_SETTLE_MS` | Settle delay after navigation (ms) | `2000` |
//! | `CHROMECAT_ELEMENT_TIMEOUT` | Element wait for screenshots (seconds) | `10` |
//! | `CHROMECAT_SCROLL_STEP` | Scroll-priming increment (px) | `500` |
//! | `CHROMECAT_SCROLL_PAUSE_MS` | Pause after each scroll increment (ms) | `300` |
//! | `CHROMECAT_ARTIFACT_DIR` | Filesystem artifact store root | `/tmp/chromecat/artifacts` |
//! | `CHROMECAT_STORE_URL` | HTTP object store base URL | unset |
//! | `CHROMECAT_STORE_TOKEN` | Bearer token for the HTTP store | unset |
//! | `CHROMECAT_CHROME_PATH` | Chrome/Chromium binary | autodetect |
//! | `CHROMECAT_HEADLESS` | Run the browser headless | `true` |
//!
//! # Example
//!
//! ```bash
//! # Compare on a phone-sized viewport with a stricter differ
//! export CHROMECAT_VIEWPORT="mobile"
//! export CHROMECAT_THRESHOLD="0.1"
//!
//! # Push artifacts to an object store instead of the local disk
//! export CHROMECAT_STORE_URL="http://127.0.0.1:9000/chromecat"
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::capture::Viewport;

// ============================================================================
// Default Values
// ============================================================================

/// Default differ sensitivity (lower = more sensitive)
pub const DEFAULT_THRESHOLD: f64 = 0.35;

/// Default viewport width (pixels)
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;

/// Default viewport height (pixels)
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 900;

/// Default navigation deadline (seconds)
pub const DEFAULT_NAV_TIMEOUT: u64 = 60;

/// Default settle delay after navigation (milliseconds)
pub const DEFAULT_SETTLE_MS: u64 = 2000;

/// Default element wait for the screenshot operation (seconds)
pub const DEFAULT_ELEMENT_TIMEOUT: u64 = 10;

/// Default scroll-priming increment (pixels)
pub const DEFAULT_SCROLL_STEP: u32 = 500;

/// Default pause after each scroll increment (milliseconds)
pub const DEFAULT_SCROLL_PAUSE_MS: u64 = 300;

/// Default artifact directory for the filesystem store
pub const DEFAULT_ARTIFACT_DIR: &str = "/tmp/chromecat/artifacts";

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_THRESHOLD: &str = "CHROMECAT_THRESHOLD";
pub const ENV_VIEWPORT: &str = "CHROMECAT_VIEWPORT";
pub const ENV_NAV_TIMEOUT: &str = "CHROMECAT_NAV_TIMEOUT";
pub const ENV_SETTLE_MS: &str = "CHROMECAT_SETTLE_MS";
pub const ENV_ELEMENT_TIMEOUT: &str = "CHROMECAT_ELEMENT_TIMEOUT";
pub const ENV_SCROLL_STEP: &str = "CHROMECAT_SCROLL_STEP";
pub const ENV_SCROLL_PAUSE_MS: &str = "CHROMECAT_SCROLL_PAUSE_MS";
pub const ENV_ARTIFACT_DIR: &str = "CHROMECAT_ARTIFACT_DIR";
pub const ENV_STORE_URL: &str = "CHROMECAT_STORE_URL";
pub const ENV_STORE_TOKEN: &str = "CHROMECAT_STORE_TOKEN";
pub const ENV_CHROME_PATH: &str = "CHROMECAT_CHROME_PATH";
pub const ENV_HEADLESS: &str = "CHROMECAT_HEADLESS";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for Chromecat
#[derive(Debug, Clone)]
pub struct Config {
    /// Comparison defaults
    pub compare: CompareSettings,
    /// Page lifecycle timings
    pub page: PageSettings,
    /// Artifact store location
    pub store: StoreSettings,
    /// Browser launch settings
    pub browser: BrowserSettings,
}

/// Defaults applied to requests that omit them
#[derive(Debug, Clone)]
pub struct CompareSettings {
    /// Differ sensitivity in [0, 1]
    pub threshold: f64,
    /// Viewport used when the request has none
    pub viewport: Viewport,
}

/// Page lifecycle timings
#[derive(Debug, Clone)]
pub struct PageSettings {
    /// Navigation deadline (seconds)
    pub nav_timeout: u64,
    /// Settle delay after navigation (milliseconds)
    pub settle_ms: u64,
    /// Element wait for the screenshot operation (seconds)
    pub element_timeout: u64,
    /// Scroll-priming increment (pixels)
    pub scroll_step: u32,
    /// Pause after each scroll increment (milliseconds)
    pub scroll_pause_ms: u64,
}

/// Artifact store settings
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Root directory of the filesystem store
    pub artifact_dir: PathBuf,
    /// Base URL of an HTTP object store; takes precedence over the directory
    pub url: Option<String>,
    /// Bearer token sent to the HTTP store
    pub token: Option<String>,
}

/// Browser launch settings
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    /// Explicit browser binary
    pub chrome_path: Option<PathBuf>,
    /// Run without a visible window
    pub headless: bool,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            compare: CompareSettings::from_env(),
            page: PageSettings::from_env(),
            store: StoreSettings::from_env(),
            browser: BrowserSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            compare: CompareSettings::defaults(),
            page: PageSettings::defaults(),
            store: StoreSettings::defaults(),
            browser: BrowserSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl CompareSettings {
    pub fn from_env() -> Self {
        let threshold = env_parse(ENV_THRESHOLD)
            .filter(|t: &f64| (0.0..=1.0).contains(t))
            .unwrap_or(DEFAULT_THRESHOLD);
        let viewport = env::var(ENV_VIEWPORT)
            .ok()
            .and_then(|s| parse_viewport(&s))
            .unwrap_or_else(default_viewport);
        Self { threshold, viewport }
    }

    pub fn defaults() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            viewport: default_viewport(),
        }
    }
}

impl PageSettings {
    pub fn from_env() -> Self {
        Self {
            nav_timeout: env_parse(ENV_NAV_TIMEOUT).unwrap_or(DEFAULT_NAV_TIMEOUT),
            settle_ms: env_parse(ENV_SETTLE_MS).unwrap_or(DEFAULT_SETTLE_MS),
            element_timeout: env_parse(ENV_ELEMENT_TIMEOUT).unwrap_or(DEFAULT_ELEMENT_TIMEOUT),
            scroll_step: env_parse(ENV_SCROLL_STEP)
                .filter(|step: &u32| *step > 0)
                .unwrap_or(DEFAULT_SCROLL_STEP),
            scroll_pause_ms: env_parse(ENV_SCROLL_PAUSE_MS).unwrap_or(DEFAULT_SCROLL_PAUSE_MS),
        }
    }

    pub fn defaults() -> Self {
        Self {
            nav_timeout: DEFAULT_NAV_TIMEOUT,
            settle_ms: DEFAULT_SETTLE_MS,
            element_timeout: DEFAULT_ELEMENT_TIMEOUT,
            scroll_step: DEFAULT_SCROLL_STEP,
            scroll_pause_ms: DEFAULT_SCROLL_PAUSE_MS,
        }
    }
}

impl StoreSettings {
    pub fn from_env() -> Self {
        Self {
            artifact_dir: env::var(ENV_ARTIFACT_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_ARTIFACT_DIR)),
            url: env::var(ENV_STORE_URL).ok().filter(|s| !s.trim().is_empty()),
            token: env::var(ENV_STORE_TOKEN).ok().filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn defaults() -> Self {
        Self {
            artifact_dir: PathBuf::from(DEFAULT_ARTIFACT_DIR),
            url: None,
            token: None,
        }
    }
}

impl BrowserSettings {
    pub fn from_env() -> Self {
        Self {
            chrome_path: env::var(ENV_CHROME_PATH).ok().map(PathBuf::from),
            headless: env::var(ENV_HEADLESS)
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(true),
        }
    }

    pub fn defaults() -> Self {
        Self {
            chrome_path: None,
            headless: true,
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn default_viewport() -> Viewport {
    Viewport::new(DEFAULT_VIEWPORT_WIDTH, DEFAULT_VIEWPORT_HEIGHT)
}

/// Parse a viewport string into a [`Viewport`]
/// Supports: "desktop" (1280x900), "laptop" (1366x768), "tablet" (768x1024), "mobile" (375x812), or "WxH"
pub fn parse_viewport(size: &str) -> Option<Viewport> {
    let (width, height) = match size.trim().to_lowercase().as_str() {
        "desktop" => (1280, 900),
        "laptop" => (1366, 768),
        "tablet" => (768, 1024),
        "mobile" => (375, 812),
        custom => {
            let (w, h) = custom.split_once('x')?;
            (w.trim().parse().ok()?, h.trim().parse().ok()?)
        }
    };
    if width == 0 || height == 0 {
        return None;
    }
    Some(Viewport::new(width, height))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Get the configured default threshold (convenience function)
pub fn default_threshold() -> f64 {
    get().compare.threshold
}

/// Get the configured default viewport (convenience function)
pub fn default_request_viewport() -> Viewport {
    get().compare.viewport
}
