//! PNG encode/decode to and from raw RGBA buffers.

use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use thiserror::Error;

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while converting between PNG bytes and pixel buffers
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to encode PNG: {0}")]
    Encode(String),

    #[error("buffer size mismatch for {width}x{height}: expected {expected} bytes, got {actual}")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Decode PNG bytes into an RGBA image.
///
/// Any format `image` can sniff is accepted; the result is always 8-bit RGBA.
pub fn decode_png(data: &[u8]) -> CodecResult<RgbaImage> {
    image::load_from_memory(data)
        .map(|img| img.to_rgba8())
        .map_err(|e| CodecError::Decode(e.to_string()))
}

/// Encode a raw RGBA buffer as PNG bytes.
pub fn encode_png(width: u32, height: u32, rgba: &[u8]) -> CodecResult<Vec<u8>> {
    let expected = rgba_len(width, height);
    if rgba.len() != expected || width == 0 || height == 0 {
        return Err(CodecError::BufferSize {
            width,
            height,
            expected,
            actual: rgba.len(),
        });
    }
    let img = RgbaImage::from_raw(width, height, rgba.to_vec()).ok_or(CodecError::BufferSize {
        width,
        height,
        expected,
        actual: rgba.len(),
    })?;
    encode_image(&img)
}

/// Encode an RGBA image as PNG bytes.
pub fn encode_image(img: &RgbaImage) -> CodecResult<Vec<u8>> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Byte length of an RGBA buffer with the given dimensions
pub fn rgba_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}
