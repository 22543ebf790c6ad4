//! Square convolution kernels.
//!
//! A [`Kernel`] is a `(2r+1) × (2r+1)` matrix of weights stored in
//! row-major order, indexed so that cell `(r, r)` sits over the output
//! pixel. Two families are provided:
//!
//! - [`gaussian`]: a sampled 2D normal distribution, normalized to sum
//!   to one so that blurring preserves mean intensity.
//! - [`prewitt_x`] / [`prewitt_y`]: the fixed, unnormalized 3×3
//!   directional derivative operators.

use crate::grid::try_alloc;
use crate::parallel::{self, ExecutionStrategy};
use crate::reduce;
use crate::types::PipelineError;

/// Horizontal Prewitt operator: every row is `(-1, 0, +1)`.
const PREWITT_X: [f64; 9] = [-1.0, 0.0, 1.0, -1.0, 0.0, 1.0, -1.0, 0.0, 1.0];

/// Vertical Prewitt operator: rows `(+1, +1, +1)`, `(0, 0, 0)`, `(-1, -1, -1)`.
const PREWITT_Y: [f64; 9] = [1.0, 1.0, 1.0, 0.0, 0.0, 0.0, -1.0, -1.0, -1.0];

/// A square matrix of weights with odd side length `2r+1`, `r >= 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    radius: usize,
    weights: Vec<f64>,
}

/// Side length and cell count of a radius-`radius` kernel.
fn kernel_shape(radius: usize) -> Result<(usize, usize), PipelineError> {
    if radius < 1 {
        return Err(PipelineError::InvalidParameter(format!(
            "kernel radius must be >= 1, got {radius}"
        )));
    }
    radius
        .checked_mul(2)
        .and_then(|d| d.checked_add(1))
        .and_then(|dim| dim.checked_mul(dim).map(|cells| (dim, cells)))
        .ok_or_else(|| {
            PipelineError::InvalidParameter(format!("kernel radius {radius} is too large"))
        })
}

impl Kernel {
    /// Build a kernel from row-major weights.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidParameter`] if `radius` is zero or
    /// `weights` does not hold exactly `(2r+1)²` values.
    pub fn from_weights(radius: usize, weights: Vec<f64>) -> Result<Self, PipelineError> {
        let (dim, cells) = kernel_shape(radius)?;
        if weights.len() != cells {
            return Err(PipelineError::InvalidParameter(format!(
                "a {dim}x{dim} kernel needs {cells} weights, got {}",
                weights.len()
            )));
        }
        Ok(Self { radius, weights })
    }

    /// Distance from the center cell to the kernel edge.
    #[must_use]
    pub const fn radius(&self) -> usize {
        self.radius
    }

    /// Side length, always odd.
    #[must_use]
    pub const fn dim(&self) -> usize {
        2 * self.radius + 1
    }

    /// Row-major weights.
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Weight at `(row, col)` of the kernel matrix.
    #[must_use]
    pub fn at(&self, row: usize, col: usize) -> Option<f64> {
        let dim = self.dim();
        (row < dim && col < dim).then(|| self.weights[row * dim + col])
    }

    pub(crate) fn weights_mut(&mut self) -> &mut [f64] {
        &mut self.weights
    }
}

/// Generate a normalized Gaussian kernel on the default partitioning.
///
/// See [`gaussian_with`].
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] if `radius < 1` or
/// `sigma` is not a positive finite number.
pub fn gaussian(radius: usize, sigma: f64) -> Result<Kernel, PipelineError> {
    gaussian_with(radius, sigma, ExecutionStrategy::default())
}

/// Generate a normalized Gaussian kernel.
///
/// Each cell at offset `(dx, dy)` from the center is sampled from
/// `exp(-(dx/σ)²/2 - (dy/σ)²/2)`, then the whole kernel is divided by its
/// sum so that the weights add up to one. The `1/2πσ²` factor of the
/// normal density cancels in that division and is left out. Offsets are
/// scaled by `σ` before squaring, so the center weight is always exactly
/// one and the sum stays finite and nonzero for every positive `σ`. Cell
/// generation and the sum both run under `strategy`.
///
/// Parameters are checked before anything is allocated.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] if `radius < 1` or
/// `sigma` is not a positive finite number.
pub fn gaussian_with(
    radius: usize,
    sigma: f64,
    strategy: ExecutionStrategy,
) -> Result<Kernel, PipelineError> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(PipelineError::InvalidParameter(format!(
            "gaussian standard deviation must be > 0, got {sigma}"
        )));
    }
    let (dim, cells) = kernel_shape(radius)?;

    #[allow(clippy::cast_precision_loss)]
    let center = radius as f64;

    let mut weights = try_alloc(cells)?;
    weights.resize(cells, 0.0);
    parallel::fill_cells(strategy, dim, &mut weights, |i| {
        #[allow(clippy::cast_precision_loss)]
        let (dy, dx) = ((i / dim) as f64 - center, (i % dim) as f64 - center);
        let (u, v) = (dx / sigma, dy / sigma);
        (-0.5 * u.mul_add(u, v * v)).exp()
    })?;

    let kernel = Kernel { radius, weights };
    let total = reduce::sum(&kernel, strategy)?;
    reduce::normalize(kernel, total)
}

/// The 3×3 horizontal Prewitt kernel.
#[must_use]
pub fn prewitt_x() -> Kernel {
    Kernel {
        radius: 1,
        weights: PREWITT_X.to_vec(),
    }
}

/// The 3×3 vertical Prewitt kernel.
#[must_use]
pub fn prewitt_y() -> Kernel {
    Kernel {
        radius: 1,
        weights: PREWITT_Y.to_vec(),
    }
}
