//! Stencil application: correlate a [`Kernel`] with a grid.
//!
//! For every output cell `(i, j)` the engine accumulates
//! `Σ kernel[kr][kc] · input[i + kr - r][j + kc - r]` over the kernel
//! window. The kernel is not flipped.
//!
//! # Boundary policy
//!
//! Under [`BoundaryPolicy::Skip`], the default, window cells that fall
//! outside the input are skipped. Their weights are not redistributed,
//! so cells within `r` of an edge receive a smaller total weight than
//! interior cells: an all-ones 3×3 kernel on an all-ones grid yields 9
//! in the interior, 6 along an edge and 4 in a corner.
//! [`BoundaryPolicy::Replicate`] instead reads the nearest edge cell, so
//! every output cell sees the full kernel weight.
//!
//! # Channel modes
//!
//! The element type selects the [`ChannelMode`]. A [`PixelBuffer`]
//! is convolved per channel; a [`ScalarField`] holds one value per cell.
//!
//! [`PixelBuffer`]: crate::grid::PixelBuffer
//! [`ScalarField`]: crate::grid::ScalarField

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grid::{Grid, Pixel};
use crate::kernel::Kernel;
use crate::parallel::{self, ExecutionStrategy};
use crate::types::PipelineError;

/// How many values a stencil reads and writes per cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelMode {
    /// Each of the three RGB channels is convolved independently.
    PerChannel,
    /// A single scalar per cell.
    Scalar,
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerChannel => f.write_str("per-channel"),
            Self::Scalar => f.write_str("scalar"),
        }
    }
}

/// What a stencil reads where its window extends past the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoundaryPolicy {
    /// Omit out-of-range window cells; their weight is lost.
    ///
    /// Example: `... | a b c` contributes nothing left of `a`.
    #[default]
    Skip,

    /// Clamp out-of-range coordinates to the nearest edge cell.
    ///
    /// Example: `a a a | a b c`.
    Replicate,
}

/// A cell value a stencil can accumulate.
pub trait Sample: Copy + Send + Sync {
    /// Channel mode implied by this cell type.
    const MODE: ChannelMode;

    /// Additive identity.
    const ZERO: Self;

    /// Return `acc + weight * self`.
    #[must_use]
    fn accumulate(self, weight: f64, acc: Self) -> Self;
}

impl Sample for f64 {
    const MODE: ChannelMode = ChannelMode::Scalar;
    const ZERO: Self = 0.0;

    fn accumulate(self, weight: f64, acc: Self) -> Self {
        weight.mul_add(self, acc)
    }
}

impl Sample for Pixel {
    const MODE: ChannelMode = ChannelMode::PerChannel;
    const ZERO: Self = Self::splat(0.0);

    fn accumulate(self, weight: f64, acc: Self) -> Self {
        Self::new(
            weight.mul_add(self.red, acc.red),
            weight.mul_add(self.green, acc.green),
            weight.mul_add(self.blue, acc.blue),
        )
    }
}

/// Apply `kernel` to `input`, overwriting every cell of `output`.
///
/// `output` must be exclusively owned by the caller: it may not be
/// `input` itself, nor a clone sharing storage with any other grid.
/// Each output cell only reads `input` and `kernel`, so the cells are
/// computed in parallel under `strategy` without synchronization, and
/// the result is identical for every strategy.
///
/// # Errors
///
/// Returns [`PipelineError::AliasingViolation`] if `output` shares
/// storage with `input` or with any other grid,
/// [`PipelineError::DimensionMismatch`] if the shapes differ, and
/// [`PipelineError::InvalidParameter`] or [`PipelineError::ThreadPool`]
/// for a bad `strategy`.
pub fn apply<T: Sample>(
    kernel: &Kernel,
    input: &Grid<T>,
    output: &mut Grid<T>,
    boundary: BoundaryPolicy,
    strategy: ExecutionStrategy,
) -> Result<(), PipelineError> {
    if input.shares_storage(output) {
        return Err(PipelineError::AliasingViolation);
    }
    input.ensure_same_shape(output)?;

    let (rows, cols) = (input.rows(), input.cols());
    let src = input.as_slice();
    let dst = output.try_as_mut_slice()?;
    match boundary {
        BoundaryPolicy::Skip => parallel::fill_cells(strategy, cols, dst, |i| {
            skip_cell(kernel, src, rows, cols, i / cols, i % cols)
        })?,
        BoundaryPolicy::Replicate => parallel::fill_cells(strategy, cols, dst, |i| {
            replicate_cell(kernel, src, rows, cols, i / cols, i % cols)
        })?,
    }

    log::debug!(
        "applied {}x{} {} stencil to {rows}x{cols} grid ({boundary:?})",
        kernel.dim(),
        kernel.dim(),
        T::MODE,
    );
    Ok(())
}

/// Allocate an output grid and apply `kernel` to `input`.
///
/// # Errors
///
/// Returns [`PipelineError::AllocationFailure`] if the output cannot be
/// allocated, plus any error of [`apply`].
pub fn convolve<T: Sample>(
    kernel: &Kernel,
    input: &Grid<T>,
    boundary: BoundaryPolicy,
    strategy: ExecutionStrategy,
) -> Result<Grid<T>, PipelineError> {
    let mut output = Grid::try_filled(input.rows(), input.cols(), T::ZERO)?;
    apply(kernel, input, &mut output, boundary, strategy)?;
    Ok(output)
}

/// Weighted sum of the window centered on `(row, col)`, clipped to the
/// grid. `rows` and `cols` are non-zero whenever a cell exists.
fn skip_cell<T: Sample>(
    kernel: &Kernel,
    src: &[T],
    rows: usize,
    cols: usize,
    row: usize,
    col: usize,
) -> T {
    let r = kernel.radius();
    let dim = kernel.dim();
    let weights = kernel.weights();

    let row_range = row.saturating_sub(r)..=(row + r).min(rows - 1);
    let col_lo = col.saturating_sub(r);
    let col_hi = (col + r).min(cols - 1);

    let mut acc = T::ZERO;
    for y in row_range {
        let k_row = y + r - row;
        let src_row = &src[y * cols..(y + 1) * cols];
        let w_row = &weights[k_row * dim..(k_row + 1) * dim];
        for x in col_lo..=col_hi {
            acc = src_row[x].accumulate(w_row[x + r - col], acc);
        }
    }
    acc
}

/// Weighted sum of the window centered on `(row, col)` with every
/// coordinate clamped into the grid.
fn replicate_cell<T: Sample>(
    kernel: &Kernel,
    src: &[T],
    rows: usize,
    cols: usize,
    row: usize,
    col: usize,
) -> T {
    let r = kernel.radius();
    let dim = kernel.dim();
    let weights = kernel.weights();

    let mut acc = T::ZERO;
    for (k_row, w_row) in weights.chunks_exact(dim).enumerate() {
        let y = (row + k_row).saturating_sub(r).min(rows - 1);
        let src_row = &src[y * cols..(y + 1) * cols];
        for (k_col, &w) in w_row.iter().enumerate() {
            let x = (col + k_col).saturating_sub(r).min(cols - 1);
            acc = src_row[x].accumulate(w, acc);
        }
    }
    acc
}
