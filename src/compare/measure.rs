//! Crop-and-diff of a capture pair, shared by both comparison paths and the
//! local file diff.

use std::path::{Path, PathBuf};

use image::RgbaImage;
use thiserror::Error;

use crate::codec::{CodecError, decode_png, encode_image};
use crate::diff::{DiffError, DiffOptions, PixelDiff, Status, diff_images};
use crate::region::{OffsetRegion, crop_clamped, crop_to_common};

/// Largest band, in pixels, an offset region may cut out of a page
pub const MAX_BAND_PIXELS: u64 = 1 << 26;

#[derive(Debug, Error)]
pub enum MeasureError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error("capture is empty ({0}x{1})")]
    Empty(u32, u32),

    #[error("band {width}x{height} exceeds the {} pixel limit", MAX_BAND_PIXELS)]
    TooLarge { width: u32, height: u32 },
}

/// Cropped pair and their pixel diff
#[derive(Debug, Clone)]
pub struct Measurement {
    pub live: RgbaImage,
    pub test: RgbaImage,
    pub diff: PixelDiff,
}

impl Measurement {
    pub fn percent(&self) -> f64 {
        self.diff.percent()
    }

    pub fn status(&self) -> Status {
        self.diff.status()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.diff.width(), self.diff.height())
    }

    pub fn diff_png(&self) -> Result<Vec<u8>, CodecError> {
        encode_image(&self.diff.diff_image)
    }
}

/// Crop both captures to their common top-left area and diff them
pub fn measure(live: RgbaImage, test: RgbaImage, threshold: f64) -> Result<Measurement, MeasureError> {
    let (live, test) = if live.dimensions() == test.dimensions() {
        (live, test)
    } else {
        crop_to_common(&live, &test)
            .ok_or_else(|| MeasureError::Empty(live.width().min(test.width()), live.height().min(test.height())))?
    };
    if live.width() == 0 || live.height() == 0 {
        return Err(MeasureError::Empty(live.width(), live.height()));
    }
    let diff = diff_images(&live, &test, &DiffOptions::new(threshold))?;
    Ok(Measurement { live, test, diff })
}

/// Decode two PNGs and [`measure`] them
pub fn measure_png(live: &[u8], test: &[u8], threshold: f64) -> Result<Measurement, MeasureError> {
    measure(decode_png(live)?, decode_png(test)?, threshold)
}

/// Cut an offset region's band out of both full-page captures and diff it
pub fn measure_band(
    live_page: &RgbaImage,
    test_page: &RgbaImage,
    region: &OffsetRegion,
    threshold: f64,
) -> Result<Measurement, MeasureError> {
    let width = live_page.width().min(test_page.width());
    if u64::from(width) * u64::from(region.height) > MAX_BAND_PIXELS {
        return Err(MeasureError::TooLarge {
            width,
            height: region.height,
        });
    }
    let empty = || MeasureError::Empty(width, region.height);
    let live = crop_clamped(live_page, 0, region.live_y_start, width, region.height).ok_or_else(empty)?;
    let test = crop_clamped(test_page, 0, region.test_y_start, width, region.height).ok_or_else(empty)?;
    let diff = diff_images(&live, &test, &DiffOptions::new(threshold))?;
    Ok(Measurement { live, test, diff })
}

/// Diff two PNG files on disk
pub fn diff_png_files(live: &Path, test: &Path, threshold: f64) -> Result<Measurement, MeasureError> {
    let read = |path: &Path| {
        std::fs::read(path).map_err(|source| MeasureError::Read {
            path: path.to_path_buf(),
            source,
        })
    };
    measure_png(&read(live)?, &read(test)?, threshold)
}
