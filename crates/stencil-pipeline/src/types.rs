//! Shared types for the stencil pipeline.

use std::fmt;

use image::error::{DecodingError, ImageFormatHint};
use serde::{Deserialize, Serialize};

use crate::grid::{PixelBuffer, ScalarField};
use crate::parallel::ExecutionStrategy;
use crate::raster::RawImage;
use crate::stencil::BoundaryPolicy;

/// Grid shape in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Number of rows (image height).
    pub rows: usize,
    /// Number of columns (image width).
    pub cols: usize,
}

impl Dimensions {
    /// Create a new shape.
    #[must_use]
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Total number of cells.
    #[must_use]
    pub const fn cell_count(self) -> usize {
        self.rows.saturating_mul(self.cols)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// Configuration for the blur and edge-magnitude pipeline.
///
/// The defaults reproduce the reference run: a radius-3 Gaussian with a
/// standard deviation of 32, out-of-range neighbors skipped, executed on
/// the global rayon pool one row per task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Gaussian blur kernel radius. The kernel is `2r+1` cells wide.
    pub blur_radius: usize,

    /// Gaussian blur standard deviation.
    pub blur_sigma: f64,

    /// Treatment of kernel cells that fall outside the image. Applies to
    /// the blur and to both gradient stencils.
    pub boundary: BoundaryPolicy,

    /// How each data-parallel stage partitions its index space.
    pub execution: ExecutionStrategy,
}

impl PipelineConfig {
    /// Default Gaussian radius.
    pub const DEFAULT_BLUR_RADIUS: usize = 3;

    /// Default Gaussian standard deviation.
    pub const DEFAULT_BLUR_SIGMA: f64 = 32.0;

    /// Default boundary treatment.
    pub const DEFAULT_BOUNDARY: BoundaryPolicy = BoundaryPolicy::Skip;

    /// Default partitioning: one output row per task.
    pub const DEFAULT_EXECUTION: ExecutionStrategy = ExecutionStrategy::ParallelRows(1);
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            blur_radius: Self::DEFAULT_BLUR_RADIUS,
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            boundary: Self::DEFAULT_BOUNDARY,
            execution: Self::DEFAULT_EXECUTION,
        }
    }
}

/// Result of running the pipeline with every intermediate stage kept.
///
/// Holding a `StagedResult` pins every stage's raster in memory. Callers
/// that only need the output image should use [`crate::process`].
#[derive(Debug, Clone)]
pub struct StagedResult {
    /// Gaussian-blurred input.
    pub blurred: PixelBuffer,
    /// Grayscale projection of `blurred`.
    pub grayscale: ScalarField,
    /// Prewitt-X response of `grayscale`.
    pub gradient_x: ScalarField,
    /// Prewitt-Y response of `grayscale`.
    pub gradient_y: ScalarField,
    /// Achromatic gradient magnitude.
    pub magnitude: PixelBuffer,
    /// `magnitude` quantized to 8 bits.
    pub output: RawImage,
    /// Shape shared by every stage.
    pub dimensions: Dimensions,
}

/// Errors that can occur while building kernels or running the pipeline.
///
/// Every variant is fatal: a failed stage leaves nothing for the next
/// stage to consume, so the whole run is aborted.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. `DecodeFailure` travels as its
/// `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A kernel or execution parameter is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    DecodeFailure(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// A buffer could not be allocated.
    #[error("failed to allocate a buffer of {cells} cells")]
    AllocationFailure {
        /// Requested cell count.
        cells: usize,
    },

    /// A stencil was asked to write into storage it does not own
    /// exclusively, such as its own input.
    #[error("stencil output shares storage with another buffer")]
    AliasingViolation,

    /// Two grids that must share a shape do not.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Shape required by the operation.
        expected: Dimensions,
        /// Shape that was supplied.
        actual: Dimensions,
    },

    /// A dedicated thread pool could not be built.
    #[error("failed to build thread pool: {0}")]
    ThreadPool(String),

    /// Failed to encode the output image.
    #[error("failed to encode image: {0}")]
    Encode(String),
}

/// Serde-compatible mirror of [`PipelineError`].
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    InvalidParameter(String),
    DecodeFailure(String),
    EmptyInput,
    AllocationFailure { cells: usize },
    AliasingViolation,
    DimensionMismatch {
        expected: Dimensions,
        actual: Dimensions,
    },
    ThreadPool(String),
    Encode(String),
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::InvalidParameter(s) => PipelineErrorProxy::InvalidParameter(s.clone()),
            Self::DecodeFailure(e) => PipelineErrorProxy::DecodeFailure(e.to_string()),
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::AllocationFailure { cells } => {
                PipelineErrorProxy::AllocationFailure { cells: *cells }
            }
            Self::AliasingViolation => PipelineErrorProxy::AliasingViolation,
            Self::DimensionMismatch { expected, actual } => PipelineErrorProxy::DimensionMismatch {
                expected: *expected,
                actual: *actual,
            },
            Self::ThreadPool(s) => PipelineErrorProxy::ThreadPool(s.clone()),
            Self::Encode(s) => PipelineErrorProxy::Encode(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            PipelineErrorProxy::InvalidParameter(s) => Self::InvalidParameter(s),
            // The typed decoder error is gone; keep its message under an
            // unknown format so the variant still classifies as a decode failure.
            PipelineErrorProxy::DecodeFailure(msg) => {
                Self::DecodeFailure(image::ImageError::Decoding(DecodingError::new(
                    ImageFormatHint::Unknown,
                    msg,
                )))
            }
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            PipelineErrorProxy::AllocationFailure { cells } => Self::AllocationFailure { cells },
            PipelineErrorProxy::AliasingViolation => Self::AliasingViolation,
            PipelineErrorProxy::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            PipelineErrorProxy::ThreadPool(s) => Self::ThreadPool(s),
            PipelineErrorProxy::Encode(s) => Self::Encode(s),
        })
    }
}

impl PipelineError {
    /// Returns `true` if the error came from reading the input image.
    #[must_use]
    pub const fn is_decode_failure(&self) -> bool {
        matches!(self, Self::DecodeFailure(_) | Self::EmptyInput)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_display() {
        assert_eq!(Dimensions::new(4, 7).to_string(), "4x7");
    }

    #[test]
    fn dimensions_cell_count_saturates() {
        assert_eq!(Dimensions::new(3, 5).cell_count(), 15);
        assert_eq!(Dimensions::new(usize::MAX, 2).cell_count(), usize::MAX);
    }

    #[test]
    fn default_config_matches_constants() {
        let config = PipelineConfig::default();
        assert_eq!(config.blur_radius, PipelineConfig::DEFAULT_BLUR_RADIUS);
        assert!((config.blur_sigma - PipelineConfig::DEFAULT_BLUR_SIGMA).abs() < f64::EPSILON);
        assert_eq!(config.boundary, BoundaryPolicy::Skip);
        assert_eq!(config.execution, ExecutionStrategy::ParallelRows(1));
    }

    #[test]
    fn config_json_roundtrip() {
        let config = PipelineConfig {
            blur_radius: 5,
            blur_sigma: 1.5,
            boundary: BoundaryPolicy::Replicate,
            execution: ExecutionStrategy::Fixed(2),
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn config_json_fills_missing_fields_with_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"blur_radius": 2}"#).unwrap();
        assert_eq!(config.blur_radius, 2);
        assert_eq!(config.boundary, PipelineConfig::DEFAULT_BOUNDARY);
        assert_eq!(config.execution, PipelineConfig::DEFAULT_EXECUTION);
    }

    #[test]
    fn config_json_uses_variant_names() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"boundary": "Replicate", "execution": {"ParallelRows": 8}}"#,
        )
        .unwrap();
        assert_eq!(config.boundary, BoundaryPolicy::Replicate);
        assert_eq!(config.execution, ExecutionStrategy::ParallelRows(8));
        assert_eq!(config.blur_radius, PipelineConfig::DEFAULT_BLUR_RADIUS);
    }

    #[test]
    fn decode_failure_classification() {
        assert!(PipelineError::EmptyInput.is_decode_failure());
        assert!(!PipelineError::AliasingViolation.is_decode_failure());
        assert!(!PipelineError::InvalidParameter("radius".into()).is_decode_failure());
    }

    #[test]
    fn error_serde_round_trip_keeps_fields() {
        let err = PipelineError::DimensionMismatch {
            expected: Dimensions::new(4, 4),
            actual: Dimensions::new(4, 5),
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: PipelineError = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            back,
            PipelineError::DimensionMismatch { expected, actual }
                if expected == Dimensions::new(4, 4) && actual == Dimensions::new(4, 5)
        ));

        let json = serde_json::to_string(&PipelineError::AliasingViolation).unwrap();
        let back: PipelineError = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, PipelineError::AliasingViolation));
    }

    #[test]
    fn decode_failure_survives_serde_as_decode_failure() {
        let err = PipelineError::DecodeFailure(image::ImageError::Decoding(DecodingError::new(
            ImageFormatHint::Unknown,
            "truncated header",
        )));
        let json = serde_json::to_string(&err).unwrap();
        let back: PipelineError = serde_json::from_str(&json).unwrap();
        assert!(back.is_decode_failure());
        assert!(back.to_string().contains("truncated header"));
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = PipelineError::DimensionMismatch {
            expected: Dimensions::new(2, 2),
            actual: Dimensions::new(3, 3),
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 2x2, got 3x3");
        let err = PipelineError::AllocationFailure { cells: 12 };
        assert!(err.to_string().contains("12 cells"));
    }
}
