//! Partitioning of the data-parallel stages.
//!
//! Every stage of the pipeline is a flat map over an output index
//! space: cell `i` of the destination is a pure function of `i` and of
//! immutable inputs. [`fill_cells`] runs such a map under a chosen
//! [`ExecutionStrategy`]; because no cell depends on another, the result
//! is the same for every strategy. [`sum`] is the one reduction, built
//! from per-task partial sums merged at the join.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::types::PipelineError;

/// Controls how a stage's index space is split across workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStrategy {
    /// Run sequentially on the current thread.
    ///
    /// Useful for small images, debugging, or as a reference when
    /// comparing partitionings.
    Serial,

    /// Use the global rayon pool and let it split at cell granularity.
    ParallelElements,

    /// Use the global rayon pool with tiles of `n` whole rows.
    ///
    /// Rows are contiguous in memory, so this is usually the most
    /// cache-friendly choice.
    ParallelRows(usize),

    /// Run on a local thread pool with `n` threads.
    ///
    /// # Warning
    /// Builds a new pool on every call. Intended for benchmarking and
    /// for pinning the worker count.
    Fixed(usize),
}

impl Default for ExecutionStrategy {
    fn default() -> Self {
        Self::ParallelRows(1)
    }
}

impl ExecutionStrategy {
    /// Check the strategy's parameter.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidParameter`] for a zero row tile or
    /// a zero thread count.
    pub fn validate(self) -> Result<(), PipelineError> {
        match self {
            Self::ParallelRows(0) => Err(PipelineError::InvalidParameter(
                "row tile must contain at least one row".to_owned(),
            )),
            Self::Fixed(0) => Err(PipelineError::InvalidParameter(
                "thread count must be > 0".to_owned(),
            )),
            _ => Ok(()),
        }
    }
}

fn build_pool(threads: usize) -> Result<rayon::ThreadPool, PipelineError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| PipelineError::ThreadPool(e.to_string()))
}

/// Write `f(i)` into `dst[i]` for every cell.
///
/// `cols` is the row length of the grid behind `dst` and sizes the tiles
/// of [`ExecutionStrategy::ParallelRows`].
pub(crate) fn fill_cells<T, F>(
    strategy: ExecutionStrategy,
    cols: usize,
    dst: &mut [T],
    f: F,
) -> Result<(), PipelineError>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    strategy.validate()?;
    if dst.is_empty() {
        return Ok(());
    }

    match strategy {
        ExecutionStrategy::Serial => {
            dst.iter_mut().enumerate().for_each(|(i, cell)| *cell = f(i));
        }
        ExecutionStrategy::ParallelElements => {
            dst.par_iter_mut()
                .enumerate()
                .for_each(|(i, cell)| *cell = f(i));
        }
        ExecutionStrategy::ParallelRows(rows) => {
            let tile = rows.checked_mul(cols.max(1)).ok_or_else(|| {
                PipelineError::InvalidParameter(format!("row tile of {rows} rows is too large"))
            })?;
            dst.par_chunks_mut(tile)
                .enumerate()
                .for_each(|(t, chunk)| {
                    let base = t * tile;
                    chunk
                        .iter_mut()
                        .enumerate()
                        .for_each(|(k, cell)| *cell = f(base + k));
                });
        }
        ExecutionStrategy::Fixed(threads) => {
            build_pool(threads)?.install(|| {
                dst.par_iter_mut()
                    .enumerate()
                    .for_each(|(i, cell)| *cell = f(i));
            });
        }
    }
    Ok(())
}

/// Sum `values` by merging per-task partial sums.
///
/// `stride` is the row length of the data and sizes the partial sums of
/// [`ExecutionStrategy::ParallelRows`]. Different strategies may add in
/// a different order, so results agree to rounding, not bit for bit.
pub(crate) fn sum(
    strategy: ExecutionStrategy,
    stride: usize,
    values: &[f64],
) -> Result<f64, PipelineError> {
    strategy.validate()?;

    let total: f64 = match strategy {
        ExecutionStrategy::Serial => values.iter().sum(),
        ExecutionStrategy::ParallelElements => values.par_iter().sum(),
        ExecutionStrategy::ParallelRows(rows) => {
            let tile = rows.saturating_mul(stride.max(1));
            values
                .par_chunks(tile)
                .map(|chunk| chunk.iter().sum::<f64>())
                .sum()
        }
        ExecutionStrategy::Fixed(threads) => {
            build_pool(threads)?.install(|| values.par_iter().sum())
        }
    };
    Ok(total)
}
