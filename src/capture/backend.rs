//! Browser capability abstraction for page capture.
//!
//! This module provides a unified interface for different browsers:
//! - Headless Chrome over the DevTools protocol (`chrome`)
//! - An in-memory mock browser serving pages drawn on a [`MockFramebuffer`] (`mock`)
//!
//! The traits expose raw capabilities only. Timing policy (settle delays,
//! scroll pauses, overlay suppression) lives in [`crate::session`].

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{Rgba, RgbaImage};
use std::time::Duration;

use super::types::{CaptureError, CaptureResult, Rect, Viewport};
use crate::codec::{decode_png, encode_image};

/// Starts browser instances; one instance serves one comparison request.
pub trait BrowserLauncher: Send + Sync {
    /// Launch a browser whose pages render at the given viewport
    fn launch(&self, viewport: Viewport) -> CaptureResult<Box<dyn BrowserHandle>>;

    /// Identifier for logs (e.g., "chrome", "mock")
    fn name(&self) -> &str;
}

/// A running browser instance
pub trait BrowserHandle {
    /// Open a new blank page
    fn new_page(&mut self) -> CaptureResult<Box<dyn PageHandle>>;

    /// Shut the browser down. Called exactly once.
    fn close(&mut self) -> CaptureResult<()>;
}

/// A single page (tab) inside a browser
pub trait PageHandle {
    /// Load a URL and wait until the navigation completes or `timeout` elapses
    fn navigate(&mut self, url: &str, timeout: Duration) -> CaptureResult<()>;

    /// Set `display: none` on every element matching any selector; returns the count hidden
    fn hide_matching(&mut self, selectors: &[&str]) -> CaptureResult<usize>;

    /// PNG of the first element matching `selector`, or `None` when nothing matches
    fn element_screenshot(&mut self, selector: &str) -> CaptureResult<Option<Vec<u8>>>;

    /// Wait for `selector` to appear; `false` when the timeout elapses
    fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> CaptureResult<bool>;

    /// Height of the scrollable document in pixels
    fn scroll_height(&mut self) -> CaptureResult<u32>;

    /// Scroll the window to the given vertical offset
    fn scroll_to(&mut self, y: u32) -> CaptureResult<()>;

    /// PNG of the whole document (`full_page`) or of the current viewport
    fn screenshot(&mut self, full_page: bool) -> CaptureResult<Vec<u8>>;

    /// Evaluate a JavaScript expression and return its value as JSON
    fn evaluate_json(&mut self, expression: &str) -> CaptureResult<serde_json::Value>;

    /// Release the page. Called exactly once.
    fn close(&mut self) -> CaptureResult<()>;
}

/// A virtual RGBA canvas used to draw fake pages and test fixtures
///
/// Provides a small drawing API:
/// - `fill()` - Fill entire buffer with a color
/// - `draw_rect()` - Draw a filled rectangle
/// - `draw_text()` - Draw text using font8x8 glyphs
/// - `get_pixel()` / `set_pixel()` - Direct pixel access
/// - `crop()` - Cut out a region the way an element screenshot would
#[derive(Debug, Clone)]
pub struct MockFramebuffer {
    image: RgbaImage,
}

impl MockFramebuffer {
    /// Create a new framebuffer with the given dimensions, initialized to opaque white
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_color(width, height, [255, 255, 255])
    }

    /// Create a framebuffer initialized to a specific color
    pub fn with_color(width: u32, height: u32, color: [u8; 3]) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, opaque(color)),
        }
    }

    /// Load a framebuffer from PNG image bytes
    pub fn from_png_bytes(data: &[u8]) -> CaptureResult<Self> {
        Ok(Self {
            image: decode_png(data)?,
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Fill the entire framebuffer with a color
    pub fn fill(&mut self, color: [u8; 3]) {
        for px in self.image.pixels_mut() {
            *px = opaque(color);
        }
    }

    /// Draw a filled rectangle, clipped to the canvas
    pub fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 3]) {
        for py in y..y.saturating_add(h).min(self.height()) {
            for px in x..x.saturating_add(w).min(self.width()) {
                self.set_pixel(px, py, color);
            }
        }
    }

    /// Draw text using font8x8 glyphs
    ///
    /// Each character is 8x8 pixels. Text does not wrap.
    pub fn draw_text(&mut self, x: u32, y: u32, text: &str, fg: [u8; 3], bg: [u8; 3]) {
        let mut cursor_x = x;
        for ch in text.chars() {
            if cursor_x >= self.width() {
                break;
            }
            self.draw_char(cursor_x, y, ch, fg, bg);
            cursor_x += 8;
        }
    }

    fn draw_char(&mut self, x: u32, y: u32, ch: char, fg: [u8; 3], bg: [u8; 3]) {
        let glyph = BASIC_FONTS.get(ch).unwrap_or([0u8; 8]);
        for (row_idx, row) in glyph.iter().enumerate() {
            let py = y + row_idx as u32;
            for bit in 0..8 {
                // font8x8 stores LSB as leftmost pixel
                let color = if (row >> bit) & 1 == 1 { fg } else { bg };
                self.set_pixel(x + bit, py, color);
            }
        }
    }

    /// Get the color of a pixel; out-of-bounds reads are black
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        if x >= self.width() || y >= self.height() {
            return [0, 0, 0, 255];
        }
        self.image.get_pixel(x, y).0
    }

    /// Set the color of a pixel; out-of-bounds writes are ignored
    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        if x < self.width() && y < self.height() {
            self.image.put_pixel(x, y, opaque(color));
        }
    }

    /// Copy out a rectangle, clipped to the canvas
    pub fn crop(&self, rect: Rect) -> CaptureResult<RgbaImage> {
        let x = rect.x.min(self.width());
        let y = rect.y.min(self.height());
        let w = rect.width.min(self.width() - x);
        let h = rect.height.min(self.height() - y);
        if w == 0 || h == 0 {
            return Err(CaptureError::Screenshot(format!(
                "element box {}x{} at ({}, {}) is empty",
                rect.width, rect.height, rect.x, rect.y
            )));
        }
        Ok(image::imageops::crop_imm(&self.image, x, y, w, h).to_image())
    }

    /// Borrow the underlying image
    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    /// Encode the framebuffer as PNG bytes
    pub fn to_png(&self) -> CaptureResult<Vec<u8>> {
        Ok(encode_image(&self.image)?)
    }
}

fn opaque(color: [u8; 3]) -> Rgba<u8> {
    Rgba([color[0], color[1], color[2], 255])
}
