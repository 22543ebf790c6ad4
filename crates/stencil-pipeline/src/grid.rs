//! Dense 2D grids: the containers passed between pipeline stages.
//!
//! A [`Grid`] stores `rows * cols` cells in row-major order
//! (`index = row * cols + col`). Two instantiations are used throughout
//! the crate:
//!
//! - [`PixelBuffer`]: a grid of RGB [`Pixel`] intensity triples.
//! - [`ScalarField`]: a grid of single `f64` values (grayscale intensity
//!   or a directional gradient estimate).
//!
//! Storage is reference-counted. Cloning a grid is cheap and the clone
//! shares its cells with the original, which keeps a buffer immutable
//! once it has been handed to the next stage. A grid can only be written
//! while it is the sole owner of its storage; see
//! [`Grid::try_as_mut_slice`].

use std::fmt;
use std::sync::Arc;

use crate::types::{Dimensions, PipelineError};

/// A single RGB sample with each channel conceptually in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pixel {
    /// Red channel intensity.
    pub red: f64,
    /// Green channel intensity.
    pub green: f64,
    /// Blue channel intensity.
    pub blue: f64,
}

impl Pixel {
    /// A pixel with all channels at zero.
    pub const ZERO: Self = Self::splat(0.0);

    /// Create a pixel from its three channel intensities.
    #[must_use]
    pub const fn new(red: f64, green: f64, blue: f64) -> Self {
        Self { red, green, blue }
    }

    /// Create an achromatic pixel with every channel set to `value`.
    #[must_use]
    pub const fn splat(value: f64) -> Self {
        Self::new(value, value, value)
    }

    /// Arithmetic mean of the three channels.
    #[must_use]
    pub fn intensity(self) -> f64 {
        (self.red + self.green + self.blue) / 3.0
    }
}

/// A rows × cols grid of cells stored in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    rows: usize,
    cols: usize,
    data: Arc<Vec<T>>,
}

/// Grid of RGB intensity triples.
pub type PixelBuffer = Grid<Pixel>;

/// Grid of scalar intensities.
pub type ScalarField = Grid<f64>;

/// Reserve exactly `cells` slots, reporting allocator failure as a
/// [`PipelineError::AllocationFailure`] instead of aborting.
pub(crate) fn try_alloc<T>(cells: usize) -> Result<Vec<T>, PipelineError> {
    let mut data = Vec::new();
    data.try_reserve_exact(cells)
        .map_err(|_| PipelineError::AllocationFailure { cells })?;
    Ok(data)
}

/// Number of cells in a `rows × cols` grid, or an allocation failure if
/// the product overflows `usize`.
pub(crate) fn cell_count(rows: usize, cols: usize) -> Result<usize, PipelineError> {
    rows.checked_mul(cols)
        .ok_or(PipelineError::AllocationFailure { cells: usize::MAX })
}

impl<T: Clone> Grid<T> {
    /// Allocate a grid with every cell set to `value`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::AllocationFailure`] if the cells cannot
    /// be allocated.
    pub fn try_filled(rows: usize, cols: usize, value: T) -> Result<Self, PipelineError> {
        let cells = cell_count(rows, cols)?;
        let mut data = try_alloc(cells)?;
        data.resize(cells, value);
        Ok(Self {
            rows,
            cols,
            data: Arc::new(data),
        })
    }
}

impl<T> Grid<T> {
    /// Wrap an existing row-major vector of cells.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] if `data.len()` is not
    /// `rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self, PipelineError> {
        let cells = cell_count(rows, cols)?;
        if data.len() != cells {
            return Err(PipelineError::DimensionMismatch {
                expected: Dimensions::new(rows, cols),
                actual: Dimensions::new(1, data.len()),
            });
        }
        Ok(Self {
            rows,
            cols,
            data: Arc::new(data),
        })
    }

    /// Build a grid by evaluating `f(row, col)` for every cell.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::AllocationFailure`] if the cells cannot
    /// be allocated.
    pub fn try_from_fn(
        rows: usize,
        cols: usize,
        mut f: impl FnMut(usize, usize) -> T,
    ) -> Result<Self, PipelineError> {
        let mut data = try_alloc(cell_count(rows, cols)?)?;
        for row in 0..rows {
            for col in 0..cols {
                data.push(f(row, col));
            }
        }
        Ok(Self {
            rows,
            cols,
            data: Arc::new(data),
        })
    }

    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Grid shape as [`Dimensions`].
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.rows, self.cols)
    }

    /// Total number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the grid has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Linear index of `(row, col)`, or `None` if it lies outside the grid.
    #[must_use]
    pub const fn index(&self, row: usize, col: usize) -> Option<usize> {
        if row < self.rows && col < self.cols {
            Some(row * self.cols + col)
        } else {
            None
        }
    }

    /// The cell at `(row, col)`, or `None` if out of range.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        self.index(row, col).map(|i| &self.data[i])
    }

    /// All cells in row-major order.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Iterate over all cells in row-major order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    /// Returns `true` if both grids are backed by the same storage.
    #[must_use]
    pub fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Mutable access to the cells.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::AliasingViolation`] if the storage is
    /// shared with another grid (for example a clone handed to a
    /// different stage).
    pub fn try_as_mut_slice(&mut self) -> Result<&mut [T], PipelineError> {
        Arc::get_mut(&mut self.data)
            .map(Vec::as_mut_slice)
            .ok_or(PipelineError::AliasingViolation)
    }

    /// Fail unless `other` has the same shape as `self`.
    pub(crate) fn ensure_same_shape<U>(&self, other: &Grid<U>) -> Result<(), PipelineError> {
        if self.rows == other.rows && self.cols == other.cols {
            Ok(())
        } else {
            Err(PipelineError::DimensionMismatch {
                expected: self.dimensions(),
                actual: other.dimensions(),
            })
        }
    }
}

impl<'a, T> IntoIterator for &'a Grid<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for Pixel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4}, {:.4})", self.red, self.green, self.blue)
    }
}
