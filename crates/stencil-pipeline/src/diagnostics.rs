//! Pipeline diagnostics: timing and metrics for each stage.
//!
//! [`process_staged_with_diagnostics`] decodes encoded bytes, then runs
//! the stage chain shared with [`process_staged`](crate::process_staged)
//! and records how long each stage took.
//!
//! Timestamps come from a caller-supplied [`Clock`] so the library stays
//! free of platform time sources. Durations are serialized as fractional
//! seconds (`f64`) for JSON compatibility, since `std::time::Duration`
//! does not implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::grid::{Pixel, PixelBuffer};
use crate::parallel::ExecutionStrategy;
use crate::raster::RawImage;
use crate::stencil::{self, BoundaryPolicy, ChannelMode, Sample};
use crate::types::{PipelineConfig, PipelineError, StagedResult};
use crate::{codec, gradient, kernel, raster};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of monotonic timestamps.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// Current point in time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// A [`Clock`] that never advances, for runs nobody is timing.
pub(crate) struct Untimed;

impl Clock for Untimed {
    type Instant = ();

    fn now(&self) {}

    fn elapsed(&self, _since: &()) -> Duration {
        Duration::ZERO
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 0: image decoding.
    pub decode: StageDiagnostics,
    /// Stage 1: Gaussian kernel generation and normalization.
    pub kernel: StageDiagnostics,
    /// Stage 2: 8-bit samples to floating point.
    pub ingest: StageDiagnostics,
    /// Stage 3: Gaussian blur.
    pub blur: StageDiagnostics,
    /// Stage 4: grayscale projection.
    pub grayscale: StageDiagnostics,
    /// Stage 5: Prewitt X and Prewitt Y.
    pub gradients: StageDiagnostics,
    /// Stage 6: gradient magnitude.
    pub magnitude: StageDiagnostics,
    /// Stage 7: floating point back to 8 bits.
    pub egress: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary of the run.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Image decoding metrics.
    Decode {
        /// Size of the input image bytes.
        input_bytes: usize,
        /// Decoded image width in pixels.
        width: u32,
        /// Decoded image height in pixels.
        height: u32,
    },
    /// Kernel generation metrics.
    Kernel {
        /// Kernel radius.
        radius: usize,
        /// Standard deviation.
        sigma: f64,
        /// Side length, `2r+1`.
        dim: usize,
    },
    /// A pure per-cell conversion (ingest, grayscale, egress).
    Map {
        /// Number of cells written.
        cells: usize,
    },
    /// A stencil application.
    Stencil {
        /// Side length of the kernel.
        kernel_dim: usize,
        /// Values convolved per cell.
        mode: ChannelMode,
        /// Number of cells written.
        cells: usize,
    },
    /// Gradient magnitude metrics.
    Magnitude {
        /// Largest magnitude in the image.
        max: f64,
        /// Pixels whose magnitude saturates to 255 on egress.
        saturated: usize,
    },
}

/// High-level summary for the entire pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Partitioning used by every stage.
    pub execution: ExecutionStrategy,
    /// Boundary treatment used by every stencil.
    pub boundary: BoundaryPolicy,
}

impl PipelineDiagnostics {
    /// Stages in execution order with their display names.
    #[must_use]
    pub fn stages(&self) -> [(&'static str, &StageDiagnostics); 8] {
        [
            ("Decode", &self.decode),
            ("Kernel", &self.kernel),
            ("Ingest", &self.ingest),
            ("Blur", &self.blur),
            ("Grayscale", &self.grayscale),
            ("Gradients", &self.gradients),
            ("Magnitude", &self.magnitude),
            ("Egress", &self.egress),
        ]
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Execution: {:?}  |  Boundary: {:?}",
            self.summary.execution, self.summary.boundary,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
        } => format!("{input_bytes} bytes -> {width}x{height}"),
        StageMetrics::Kernel { radius, sigma, dim } => {
            format!("r={radius} sigma={sigma:.2} ({dim}x{dim})")
        }
        StageMetrics::Map { cells } => format!("{cells} cells"),
        StageMetrics::Stencil {
            kernel_dim,
            mode,
            cells,
        } => format!("{kernel_dim}x{kernel_dim} {mode}, {cells} cells"),
        StageMetrics::Magnitude { max, saturated } => {
            format!("max={max:.3} saturated={saturated}")
        }
    }
}

/// Largest magnitude and number of saturating pixels.
fn magnitude_stats(magnitude: &PixelBuffer) -> (f64, usize) {
    magnitude.iter().fold((0.0_f64, 0), |(max, saturated), p| {
        (max.max(p.red), saturated + usize::from(p.red >= 1.0))
    })
}

/// Run `f` and measure it.
fn timed<C: Clock, T>(
    clock: &C,
    f: impl FnOnce() -> Result<T, PipelineError>,
) -> Result<(T, Duration), PipelineError> {
    let start = clock.now();
    let value = f()?;
    Ok((value, clock.elapsed(&start)))
}

fn stencil_metrics<T: Sample>(kernel_dim: usize, cells: usize) -> StageMetrics {
    StageMetrics::Stencil {
        kernel_dim,
        mode: T::MODE,
        cells,
    }
}

/// Durations of the stages that follow decoding.
pub(crate) struct StageTimes {
    kernel: Duration,
    ingest: Duration,
    blur: Duration,
    grayscale: Duration,
    gradients: Duration,
    magnitude: Duration,
    egress: Duration,
    kernel_radius: usize,
    kernel_dim: usize,
}

/// Run every stage after decoding, keeping each intermediate and timing
/// each stage with `clock`.
///
/// Parameters are validated inside the kernel stage, before any image
/// buffer is allocated.
pub(crate) fn run_stages<C: Clock>(
    raw: &RawImage,
    config: &PipelineConfig,
    clock: &C,
) -> Result<(StagedResult, StageTimes), PipelineError> {
    let strategy = config.execution;
    let boundary = config.boundary;
    let dimensions = raw.dimensions();

    let (blur_kernel, kernel_time) = timed(clock, || {
        strategy.validate()?;
        kernel::gaussian_with(config.blur_radius, config.blur_sigma, strategy)
    })?;
    log::debug!(
        "blur kernel {d}x{d} (sigma {sigma})",
        d = blur_kernel.dim(),
        sigma = config.blur_sigma
    );

    let (input, ingest_time) = timed(clock, || raster::to_pixel_buffer(raw, strategy))?;
    let (blurred, blur_time) = timed(clock, || {
        stencil::convolve(&blur_kernel, &input, boundary, strategy)
    })?;
    drop(input);

    let (grayscale, grayscale_time) =
        timed(clock, || gradient::to_grayscale(&blurred, strategy))?;
    let (gradients, gradients_time) =
        timed(clock, || gradient::prewitt(&grayscale, boundary, strategy))?;
    let (magnitude, magnitude_time) = timed(clock, || {
        gradient::combine(&gradients.x, &gradients.y, strategy)
    })?;
    let (output, egress_time) = timed(clock, || raster::to_raw_image(&magnitude, strategy))?;
    log::debug!("pipeline finished on {dimensions} image ({strategy:?}, {boundary:?})");

    let staged = StagedResult {
        blurred,
        grayscale,
        gradient_x: gradients.x,
        gradient_y: gradients.y,
        magnitude,
        output,
        dimensions,
    };
    let times = StageTimes {
        kernel: kernel_time,
        ingest: ingest_time,
        blur: blur_time,
        grayscale: grayscale_time,
        gradients: gradients_time,
        magnitude: magnitude_time,
        egress: egress_time,
        kernel_radius: blur_kernel.radius(),
        kernel_dim: blur_kernel.dim(),
    };
    Ok((staged, times))
}

/// Decode `image_bytes` and run the full pipeline, timing every stage.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] or
/// [`PipelineError::DecodeFailure`] if the bytes cannot be decoded, or
/// any error of [`process_staged`](crate::process_staged).
pub fn process_staged_with_diagnostics<C: Clock>(
    image_bytes: &[u8],
    config: &PipelineConfig,
    clock: &C,
) -> Result<(StagedResult, PipelineDiagnostics), PipelineError> {
    let run_start = clock.now();

    let (raw, decode_time) = timed(clock, || codec::decode(image_bytes))?;
    log::debug!(
        "decoded {} bytes into {} raster",
        image_bytes.len(),
        raw.dimensions()
    );

    let (staged, times) = run_stages(&raw, config, clock)?;
    let total_duration = clock.elapsed(&run_start);

    let cells = staged.dimensions.cell_count();
    let (max, saturated) = magnitude_stats(&staged.magnitude);
    let diagnostics = PipelineDiagnostics {
        decode: StageDiagnostics {
            duration: decode_time,
            metrics: StageMetrics::Decode {
                input_bytes: image_bytes.len(),
                width: raw.width(),
                height: raw.height(),
            },
        },
        kernel: StageDiagnostics {
            duration: times.kernel,
            metrics: StageMetrics::Kernel {
                radius: times.kernel_radius,
                sigma: config.blur_sigma,
                dim: times.kernel_dim,
            },
        },
        ingest: StageDiagnostics {
            duration: times.ingest,
            metrics: StageMetrics::Map { cells },
        },
        blur: StageDiagnostics {
            duration: times.blur,
            metrics: stencil_metrics::<Pixel>(times.kernel_dim, cells),
        },
        grayscale: StageDiagnostics {
            duration: times.grayscale,
            metrics: StageMetrics::Map { cells },
        },
        gradients: StageDiagnostics {
            duration: times.gradients,
            metrics: stencil_metrics::<f64>(kernel::prewitt_x().dim(), cells),
        },
        magnitude: StageDiagnostics {
            duration: times.magnitude,
            metrics: StageMetrics::Magnitude { max, saturated },
        },
        egress: StageDiagnostics {
            duration: times.egress,
            metrics: StageMetrics::Map { cells },
        },
        total_duration,
        summary: PipelineSummary {
            image_width: raw.width(),
            image_height: raw.height(),
            pixel_count: u64::from(raw.width()) * u64::from(raw.height()),
            execution: config.execution,
            boundary: config.boundary,
        },
    };
    log::debug!(
        "pipeline finished in {:.3}ms",
        duration_ms(diagnostics.total_duration)
    );

    Ok((staged, diagnostics))
}
