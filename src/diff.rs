//! Anti-aliasing aware per-pixel comparison and region classification.
//!
//! Pixels are compared in YIQ space. A pixel counts as changed when its
//! weighted color distance exceeds `35215 * threshold²`, unless it looks like
//! an anti-aliased edge in either image, in which case it is painted yellow
//! in the diff output and left out of the count.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::rgba_len;

/// Maximum possible YIQ delta between two colors
const MAX_YIQ_DELTA: f64 = 35215.0;

/// Color of a counted difference
pub const DIFF_COLOR: [u8; 3] = [255, 0, 0];

/// Color of a detected anti-aliasing pixel
pub const AA_COLOR: [u8; 3] = [255, 255, 0];

/// Opacity of unchanged pixels in the diff image
const FADE_ALPHA: f64 = 0.1;

/// Upper bound (exclusive) of the PASS band, in percent
pub const PASS_BELOW: f64 = 10.0;

/// Upper bound (exclusive) of the CLOSE band, in percent
pub const CLOSE_BELOW: f64 = 20.0;

/// Result type for diff operations
pub type DiffResult<T> = Result<T, DiffError>;

#[derive(Debug, Error)]
pub enum DiffError {
    #[error("{side} buffer has {actual} bytes, expected {expected} for {width}x{height}")]
    BufferSize {
        side: &'static str,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("images differ in size: {0}x{1} vs {2}x{3}")]
    DimensionMismatch(u32, u32, u32, u32),

    #[error("threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f64),
}

/// Verdict for one compared region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Close,
    Fail,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Close => "CLOSE",
            Status::Fail => "FAIL",
            Status::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a rounded diff percentage. ERROR is never produced here.
pub fn classify(diff_percent: f64) -> Status {
    if diff_percent < PASS_BELOW {
        Status::Pass
    } else if diff_percent < CLOSE_BELOW {
        Status::Close
    } else {
        Status::Fail
    }
}

/// Round a percentage to two decimal places, halves away from zero
pub fn round_percent(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Options for a pixel comparison
#[derive(Debug, Clone, Copy)]
pub struct DiffOptions {
    /// Matching threshold in [0, 1]; lower is more sensitive
    pub threshold: f64,
    /// Count anti-aliased pixels as differences
    pub include_aa: bool,
}

impl DiffOptions {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            include_aa: false,
        }
    }

    pub fn include_aa(mut self, include: bool) -> Self {
        self.include_aa = include;
        self
    }
}

/// Outcome of comparing two equal-sized buffers
#[derive(Debug, Clone)]
pub struct PixelDiff {
    /// Number of pixels counted as different
    pub changed_pixels: u64,
    /// Total pixels compared
    pub total_pixels: u64,
    /// Visualisation of the differences, same size as the inputs
    pub diff_image: RgbaImage,
}

impl PixelDiff {
    /// Share of changed pixels in percent, rounded to two decimals
    pub fn percent(&self) -> f64 {
        if self.total_pixels == 0 {
            return 0.0;
        }
        round_percent(self.changed_pixels as f64 / self.total_pixels as f64 * 100.0)
    }

    pub fn status(&self) -> Status {
        classify(self.percent())
    }

    pub fn width(&self) -> u32 {
        self.diff_image.width()
    }

    pub fn height(&self) -> u32 {
        self.diff_image.height()
    }
}

/// Compare two images of identical dimensions.
pub fn diff_images(a: &RgbaImage, b: &RgbaImage, options: &DiffOptions) -> DiffResult<PixelDiff> {
    if a.dimensions() != b.dimensions() {
        return Err(DiffError::DimensionMismatch(
            a.width(),
            a.height(),
            b.width(),
            b.height(),
        ));
    }
    diff_pixels(a.as_raw(), b.as_raw(), a.width(), a.height(), options)
}

/// Compare two raw RGBA buffers of `width * height * 4` bytes each.
pub fn diff_pixels(
    a: &[u8],
    b: &[u8],
    width: u32,
    height: u32,
    options: &DiffOptions,
) -> DiffResult<PixelDiff> {
    let expected = rgba_len(width, height);
    for (side, buf) in [("first", a), ("second", b)] {
        if buf.len() != expected {
            return Err(DiffError::BufferSize {
                side,
                width,
                height,
                expected,
                actual: buf.len(),
            });
        }
    }
    if !(0.0..=1.0).contains(&options.threshold) {
        return Err(DiffError::InvalidThreshold(options.threshold));
    }

    let mut out = vec![0u8; expected];
    let total_pixels = width as u64 * height as u64;

    // Identical buffers: only the faded background is needed.
    if a == b {
        for pos in (0..expected).step_by(4) {
            draw_gray_pixel(a, pos, &mut out);
        }
        return Ok(finish(0, total_pixels, width, height, out));
    }

    let max_delta = MAX_YIQ_DELTA * options.threshold * options.threshold;
    let w = width as usize;
    let h = height as usize;
    let mut changed = 0u64;

    for y in 0..h {
        for x in 0..w {
            let pos = (y * w + x) * 4;
            let delta = color_delta(a, b, pos, pos, false);

            if delta.abs() > max_delta {
                let anti_aliased = !options.include_aa
                    && (is_antialiased(a, x, y, w, h, b) || is_antialiased(b, x, y, w, h, a));
                if anti_aliased {
                    draw_pixel(&mut out, pos, AA_COLOR);
                } else {
                    draw_pixel(&mut out, pos, DIFF_COLOR);
                    changed += 1;
                }
            } else {
                draw_gray_pixel(a, pos, &mut out);
            }
        }
    }

    Ok(finish(changed, total_pixels, width, height, out))
}

fn finish(changed: u64, total: u64, width: u32, height: u32, out: Vec<u8>) -> PixelDiff {
    // Length was checked against width/height above.
    let diff_image = RgbaImage::from_raw(width, height, out).unwrap_or_else(|| RgbaImage::new(width, height));
    PixelDiff {
        changed_pixels: changed,
        total_pixels: total,
        diff_image,
    }
}

/// Whether the pixel at (x1, y1) sits on an anti-aliased edge of `img`,
/// judged by its darkest/brightest neighbours also being flat in both images.
fn is_antialiased(img: &[u8], x1: usize, y1: usize, w: usize, h: usize, other: &[u8]) -> bool {
    let x0 = x1.saturating_sub(1);
    let y0 = y1.saturating_sub(1);
    let x2 = (x1 + 1).min(w - 1);
    let y2 = (y1 + 1).min(h - 1);
    let pos = (y1 * w + x1) * 4;

    let mut zeroes = u32::from(x1 == x0 || x1 == x2 || y1 == y0 || y1 == y2);
    let mut min = 0.0;
    let mut max = 0.0;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (0, 0, 0, 0);

    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }
            let delta = color_delta(img, img, pos, (y * w + x) * 4, true);
            if delta == 0.0 {
                zeroes += 1;
                if zeroes > 2 {
                    return false;
                }
            } else if delta < min {
                min = delta;
                min_x = x;
                min_y = y;
            } else if delta > max {
                max = delta;
                max_x = x;
                max_y = y;
            }
        }
    }

    if min == 0.0 || max == 0.0 {
        return false;
    }

    (has_many_siblings(img, min_x, min_y, w, h) && has_many_siblings(other, min_x, min_y, w, h))
        || (has_many_siblings(img, max_x, max_y, w, h)
            && has_many_siblings(other, max_x, max_y, w, h))
}

/// Whether at least three neighbours of (x1, y1) share its exact color
fn has_many_siblings(img: &[u8], x1: usize, y1: usize, w: usize, h: usize) -> bool {
    let x0 = x1.saturating_sub(1);
    let y0 = y1.saturating_sub(1);
    let x2 = (x1 + 1).min(w - 1);
    let y2 = (y1 + 1).min(h - 1);
    let pos = (y1 * w + x1) * 4;

    let mut zeroes = u32::from(x1 == x0 || x1 == x2 || y1 == y0 || y1 == y2);

    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }
            let pos2 = (y * w + x) * 4;
            if img[pos..pos + 4] == img[pos2..pos2 + 4] {
                zeroes += 1;
            }
            if zeroes > 2 {
                return true;
            }
        }
    }
    false
}

/// Squared YIQ distance between two pixels, signed by which one is brighter.
/// With `y_only` the signed luma difference is returned instead.
fn color_delta(a: &[u8], b: &[u8], k: usize, m: usize, y_only: bool) -> f64 {
    let pa = &a[k..k + 4];
    let pb = &b[m..m + 4];
    if pa == pb {
        return 0.0;
    }

    let (r1, g1, b1) = blend_pixel(pa);
    let (r2, g2, b2) = blend_pixel(pb);

    let y1 = rgb2y(r1, g1, b1);
    let y2 = rgb2y(r2, g2, b2);
    let y = y1 - y2;

    if y_only {
        return y;
    }

    let i = rgb2i(r1, g1, b1) - rgb2i(r2, g2, b2);
    let q = rgb2q(r1, g1, b1) - rgb2q(r2, g2, b2);
    let delta = 0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q;

    if y1 > y2 { -delta } else { delta }
}

/// Composite a pixel over white according to its alpha
fn blend_pixel(px: &[u8]) -> (f64, f64, f64) {
    let (r, g, b, a) = (px[0] as f64, px[1] as f64, px[2] as f64, px[3] as f64);
    if px[3] < 255 {
        let alpha = a / 255.0;
        (blend(r, alpha), blend(g, alpha), blend(b, alpha))
    } else {
        (r, g, b)
    }
}

fn rgb2y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.29889531 + g * 0.58662247 + b * 0.11448223
}

fn rgb2i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.59597799 - g * 0.27417610 - b * 0.32180189
}

fn rgb2q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.21147017 - g * 0.52261711 + b * 0.31114694
}

fn blend(c: f64, a: f64) -> f64 {
    255.0 + (c - 255.0) * a
}

fn draw_pixel(out: &mut [u8], pos: usize, color: [u8; 3]) {
    out[pos] = color[0];
    out[pos + 1] = color[1];
    out[pos + 2] = color[2];
    out[pos + 3] = 255;
}

fn draw_gray_pixel(img: &[u8], pos: usize, out: &mut [u8]) {
    let luma = rgb2y(img[pos] as f64, img[pos + 1] as f64, img[pos + 2] as f64);
    let val = blend(luma, FADE_ALPHA * img[pos + 3] as f64 / 255.0) as u8;
    draw_pixel(out, pos, [val, val, val]);
}
