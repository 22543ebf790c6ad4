//! stencil-pipeline: Parallel stencil convolution pipeline (sans-IO).
//!
//! Turns an RGB raster into an edge-magnitude raster through:
//! Gaussian blur -> grayscale -> Prewitt X/Y -> gradient magnitude.
//!
//! Every stage is a pure map over its output cells and runs data-parallel
//! under the configured [`ExecutionStrategy`]. Stages are separated by
//! barriers: a stage starts only after the previous one has completed.
//!
//! This crate has **no file I/O**. It operates on in-memory byte slices
//! and rasters; reading the input and writing `out.jpg` lives in the
//! `stencil` binary.

pub mod codec;
pub mod diagnostics;
pub mod gradient;
pub mod grid;
pub mod kernel;
pub mod parallel;
pub mod raster;
pub mod reduce;
pub mod stencil;
pub mod types;

pub use grid::{Grid, Pixel, PixelBuffer, ScalarField};
pub use kernel::Kernel;
pub use parallel::ExecutionStrategy;
pub use raster::RawImage;
pub use stencil::{BoundaryPolicy, ChannelMode};
pub use types::{Dimensions, PipelineConfig, PipelineError, StagedResult};

/// Run the full pipeline on a decoded raster.
///
/// Intermediate buffers are released as soon as the next stage has
/// consumed them. Use [`process_staged`] to keep them.
///
/// # Pipeline steps
///
/// 1. Generate and normalize the Gaussian kernel
/// 2. Scale the raster into a floating-point buffer
/// 3. Gaussian blur, per channel
/// 4. Grayscale projection (channel mean)
/// 5. Prewitt X and Prewitt Y on the grayscale field
/// 6. Gradient magnitude, written to all three channels
/// 7. Quantize back to 8 bits
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] for a bad kernel or
/// execution parameter, before any image buffer is allocated.
/// Returns [`PipelineError::AllocationFailure`] if a stage buffer cannot
/// be allocated, or [`PipelineError::ThreadPool`] if a fixed pool cannot
/// be built.
pub fn process(raw: &RawImage, config: &PipelineConfig) -> Result<RawImage, PipelineError> {
    let strategy = config.execution;
    let boundary = config.boundary;
    strategy.validate()?;

    // 1. Kernel.
    let blur_kernel = kernel::gaussian_with(config.blur_radius, config.blur_sigma, strategy)?;

    // 2-3. Ingest and blur.
    let blurred = {
        let input = raster::to_pixel_buffer(raw, strategy)?;
        stencil::convolve(&blur_kernel, &input, boundary, strategy)?
    };

    // 4-5. Grayscale and gradients.
    let gradients = {
        let gray = gradient::to_grayscale(&blurred, strategy)?;
        drop(blurred);
        gradient::prewitt(&gray, boundary, strategy)?
    };

    // 6-7. Magnitude and egress.
    let magnitude = gradient::combine(&gradients.x, &gradients.y, strategy)?;
    drop(gradients);
    raster::to_raw_image(&magnitude, strategy)
}

/// Run the full pipeline and keep every intermediate stage.
///
/// Produces the same output as [`process`]. Runs the same stage chain as
/// [`diagnostics::process_staged_with_diagnostics`], without timing it.
///
/// # Errors
///
/// Same as [`process`].
pub fn process_staged(
    raw: &RawImage,
    config: &PipelineConfig,
) -> Result<StagedResult, PipelineError> {
    diagnostics::run_stages(raw, config, &diagnostics::Untimed).map(|(staged, _)| staged)
}

/// Decode image bytes, run the pipeline, and encode the result as JPEG.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] or
/// [`PipelineError::DecodeFailure`] if `image_bytes` cannot be decoded,
/// [`PipelineError::Encode`] if the output cannot be encoded, or any
/// error of [`process`].
pub fn process_bytes(
    image_bytes: &[u8],
    config: &PipelineConfig,
) -> Result<Vec<u8>, PipelineError> {
    let raw = codec::decode(image_bytes)?;
    let output = process(&raw, config)?;
    codec::encode_jpeg(&output)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// A raster whose left half is black and right half white.
    fn sharp_edge(width: u32, height: u32) -> RawImage {
        let img = image::RgbImage::from_fn(width, height, |x, _y| {
            if x < width / 2 {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        });
        RawImage::from(img)
    }

    fn sharp_edge_png(width: u32, height: u32) -> Vec<u8> {
        let raw = sharp_edge(width, height);
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            raw.as_raw(),
            raw.width(),
            raw.height(),
            image::ExtendedColorType::Rgb8,
        )
        .ok();
        buf
    }

    #[test]
    fn process_keeps_dimensions() {
        let raw = sharp_edge(13, 9);
        let out = process(&raw, &PipelineConfig::default()).unwrap();
        assert_eq!(out.dimensions(), raw.dimensions());
    }

    #[test]
    fn process_matches_staged_output() {
        let raw = sharp_edge(12, 8);
        let config = PipelineConfig::default();
        let direct = process(&raw, &config).unwrap();
        let staged = process_staged(&raw, &config).unwrap();
        assert_eq!(direct, staged.output);
        assert_eq!(staged.dimensions, Dimensions::new(8, 12));
        assert_eq!(staged.blurred.dimensions(), staged.dimensions);
        assert_eq!(staged.gradient_x.dimensions(), staged.dimensions);
    }

    #[test]
    fn staged_gradients_are_the_prewitt_pair_of_the_grayscale() {
        let raw = sharp_edge(9, 7);
        let config = PipelineConfig {
            boundary: BoundaryPolicy::Replicate,
            ..PipelineConfig::default()
        };
        let staged = process_staged(&raw, &config).unwrap();
        let expected =
            gradient::prewitt(&staged.grayscale, config.boundary, config.execution).unwrap();
        assert_eq!(staged.gradient_x, expected.x);
        assert_eq!(staged.gradient_y, expected.y);
        let magnitude =
            gradient::combine(&expected.x, &expected.y, config.execution).unwrap();
        assert_eq!(staged.magnitude, magnitude);
    }

    #[test]
    fn process_output_is_achromatic() {
        let raw = sharp_edge(10, 10);
        let out = process(&raw, &PipelineConfig::default()).unwrap();
        for px in out.as_raw().chunks_exact(3) {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
        }
    }

    #[test]
    fn sharp_edge_is_bright_only_near_the_boundary() {
        let raw = sharp_edge(16, 16);
        let out = process(&raw, &PipelineConfig::default()).unwrap();
        // The step sits between columns 7 and 8.
        assert!(out.pixel(7, 8).unwrap()[0] > 160);
        assert!(out.pixel(8, 8).unwrap()[0] > 160);
        assert_eq!(out.pixel(2, 8), Some([0; 3]));
    }

    #[test]
    fn invalid_radius_fails_before_processing() {
        let config = PipelineConfig {
            blur_radius: 0,
            ..PipelineConfig::default()
        };
        let result = process(&sharp_edge(4, 4), &config);
        assert!(matches!(result, Err(PipelineError::InvalidParameter(_))));
    }

    #[test]
    fn invalid_sigma_fails_before_processing() {
        let config = PipelineConfig {
            blur_sigma: 0.0,
            ..PipelineConfig::default()
        };
        let result = process_staged(&sharp_edge(4, 4), &config);
        assert!(matches!(result, Err(PipelineError::InvalidParameter(_))));
    }

    #[test]
    fn process_bytes_produces_jpeg() {
        let jpeg = process_bytes(&sharp_edge_png(20, 10), &PipelineConfig::default()).unwrap();
        let decoded = codec::decode(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 10));
    }

    #[test]
    fn process_bytes_empty_input() {
        let result = process_bytes(&[], &PipelineConfig::default());
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn process_bytes_corrupt_input() {
        let result = process_bytes(&[0xFF, 0xFE, 0x00, 0x01], &PipelineConfig::default());
        assert!(result.unwrap_err().is_decode_failure());
    }
}
