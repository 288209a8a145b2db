//! Browser capture: capability traits and their backends.

pub mod backend;
pub mod chrome;
pub mod mock;
pub mod types;

pub use backend::{BrowserHandle, BrowserLauncher, MockFramebuffer, PageHandle};
pub use chrome::{ChromeBrowser, ChromeLauncher, ChromePage};
pub use mock::{MockBrowser, MockEvent, MockLauncher, MockPage, MockSite};
pub use types::{CaptureError, CaptureResult, PageState, Rect, Viewport};
