//! Image decoding and encoding.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces an 8-bit
//! RGB [`RawImage`]; encodes results back to JPEG or PNG in memory. Any
//! alpha channel is dropped on decode.

use image::ImageEncoder;

use crate::raster::RawImage;
use crate::types::PipelineError;

/// JPEG quality used for [`encode_jpeg`].
pub const JPEG_QUALITY: u8 = 95;

/// Decode raw image bytes into an RGB raster.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::DecodeFailure`] if the image format is
/// unrecognized or the data is corrupt.
#[must_use = "returns the decoded image"]
pub fn decode(bytes: &[u8]) -> Result<RawImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(RawImage::from(img.to_rgb8()))
}

/// Encode a raster as a baseline JPEG at [`JPEG_QUALITY`].
///
/// # Errors
///
/// Returns [`PipelineError::Encode`] if the encoder rejects the image.
pub fn encode_jpeg(raw: &RawImage) -> Result<Vec<u8>, PipelineError> {
    let mut bytes = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
    encoder
        .write_image(
            raw.as_raw(),
            raw.width(),
            raw.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| PipelineError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Encode a raster as a lossless PNG.
///
/// # Errors
///
/// Returns [`PipelineError::Encode`] if PNG encoding fails.
pub fn encode_png(raw: &RawImage) -> Result<Vec<u8>, PipelineError> {
    let mut bytes = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut bytes);
    encoder
        .write_image(
            raw.as_raw(),
            raw.width(),
            raw.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| PipelineError::Encode(e.to_string()))?;
    Ok(bytes)
}
