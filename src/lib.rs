//! Chromecat - region-by-region visual regression of a live page against a rebuild.
//!
//! This crate provides:
//! - Browser capture through headless Chrome, or an in-memory mock for tests
//! - Page sessions with overlay suppression, settle delays and guaranteed release
//! - CSS-selector and fixed-offset region resolution
//! - Anti-aliasing aware pixel diffing with PASS / CLOSE / FAIL / ERROR verdicts
//! - Artifact storage on disk, in memory, or in an HTTP object store
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chromecat::{ChromeLauncher, Comparator, ComparisonRequest, FsStore};
//!
//! let comparator = Comparator::new(
//!     Arc::new(ChromeLauncher::new()),
//!     Arc::new(FsStore::new("/tmp/chromecat/artifacts")),
//! );
//! let request = ComparisonRequest::new("https://www.example.com/", "https://main--site.example.net/");
//! let response = comparator.compare(&request).unwrap();
//! println!("{}", response.summary);
//! ```

pub mod batch;
pub mod capture;
pub mod codec;
pub mod compare;
pub mod config;
pub mod diff;
pub mod region;
pub mod scrape;
pub mod screenshot;
pub mod session;
pub mod store;
pub mod telemetry;

// Re-export capture backends
pub use capture::{
    BrowserLauncher, CaptureError, ChromeLauncher, MockFramebuffer, MockLauncher, MockSite,
    Rect, Viewport,
};

// Re-export the comparison surface
pub use compare::{
    Comparator, CompareError, ComparisonRequest, ComparisonResponse, RegionResult,
    default_regions, diff_png_files,
};
pub use diff::{DiffOptions, PixelDiff, Status, classify, diff_images, diff_pixels};
pub use region::{OffsetRegion, RegionSpec, SelectorRegion};

// Re-export sessions and storage
pub use session::{BrowserGuard, ManagedPage, PageTiming};
pub use store::{ArtifactStore, FsStore, HttpStore, MemoryStore};

// Re-export auxiliary operations
pub use batch::{BatchItem, run_batch};
pub use scrape::{ScrapeRequest, ScrapeResponse, take_scrape};
pub use screenshot::{ScreenshotRequest, ScreenshotResponse, take_screenshot};
