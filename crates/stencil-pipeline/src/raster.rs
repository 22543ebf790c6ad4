//! 8-bit RGB rasters and their conversion to and from [`PixelBuffer`].
//!
//! Samples enter the pipeline scaled by `1/255` and leave it as
//! `floor(value * 255)`, saturated into `0..=255`. Gradient magnitudes can
//! exceed 1.0, so saturation is what keeps strong edges white.

use crate::grid::{Pixel, PixelBuffer, try_alloc};
use crate::parallel::{self, ExecutionStrategy};
use crate::types::{Dimensions, PipelineError};

/// Interleaved 8-bit RGB image, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RawImage {
    /// Wrap interleaved RGB samples.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] if `data.len()` is
    /// not `width * height * 3`.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, PipelineError> {
        let dims = Dimensions::new(height as usize, width as usize);
        if dims.cell_count().checked_mul(3) != Some(data.len()) {
            return Err(PipelineError::DimensionMismatch {
                expected: dims,
                actual: Dimensions::new(1, data.len() / 3),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Shape in rows and columns.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.height as usize, self.width as usize)
    }

    /// Interleaved RGB samples.
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    /// The `[r, g, b]` samples at `(x, y)`, or `None` if out of range.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        let s = &self.data[offset..offset + 3];
        Some([s[0], s[1], s[2]])
    }
}

impl From<image::RgbImage> for RawImage {
    fn from(image: image::RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }
}

/// Scale an 8-bit sample into `[0, 1]`.
fn unit(sample: u8) -> f64 {
    f64::from(sample) / 255.0
}

/// Truncate a `[0, 1]` intensity back to 8 bits.
///
/// Float-to-int `as` casts saturate, and NaN maps to 0.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quantize(value: f64) -> u8 {
    (value * 255.0).floor() as u8
}

/// Convert an 8-bit raster into a [`PixelBuffer`].
///
/// # Errors
///
/// Returns [`PipelineError::AllocationFailure`] if the buffer cannot be
/// allocated, or a strategy error.
pub fn to_pixel_buffer(
    raw: &RawImage,
    strategy: ExecutionStrategy,
) -> Result<PixelBuffer, PipelineError> {
    let Dimensions { rows, cols } = raw.dimensions();
    let mut buffer = PixelBuffer::try_filled(rows, cols, Pixel::ZERO)?;
    let samples = raw.as_raw();
    parallel::fill_cells(strategy, cols, buffer.try_as_mut_slice()?, |i| {
        let s = &samples[i * 3..i * 3 + 3];
        Pixel::new(unit(s[0]), unit(s[1]), unit(s[2]))
    })?;
    Ok(buffer)
}

/// Convert a [`PixelBuffer`] back into an 8-bit raster.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] if the buffer is larger
/// than a raster can address, [`PipelineError::AllocationFailure`] if
/// the samples cannot be allocated, or a strategy error.
pub fn to_raw_image(
    buffer: &PixelBuffer,
    strategy: ExecutionStrategy,
) -> Result<RawImage, PipelineError> {
    let too_large = |_| {
        PipelineError::InvalidParameter(format!(
            "{} buffer exceeds raster limits",
            buffer.dimensions()
        ))
    };
    let width = u32::try_from(buffer.cols()).map_err(too_large)?;
    let height = u32::try_from(buffer.rows()).map_err(too_large)?;

    let mut samples: Vec<[u8; 3]> = try_alloc(buffer.len())?;
    samples.resize(buffer.len(), [0; 3]);
    let src = buffer.as_slice();
    parallel::fill_cells(strategy, buffer.cols(), &mut samples, |i| {
        let p = src[i];
        [quantize(p.red), quantize(p.green), quantize(p.blue)]
    })?;

    RawImage::new(width, height, samples.into_flattened())
}
