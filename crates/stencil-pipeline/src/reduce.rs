//! Kernel sum and normalization.
//!
//! The sum is computed from per-task partial sums merged at the join,
//! never through a shared accumulator. Floating-point addition is not
//! associative, so two partitionings can differ in the last bits; the
//! normalized kernels still agree to well within `1e-12`.

use crate::kernel::Kernel;
use crate::parallel::{self, ExecutionStrategy};
use crate::types::PipelineError;

/// Sum every cell of `kernel`, partitioned according to `strategy`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] for an invalid strategy
/// or [`PipelineError::ThreadPool`] if a fixed pool cannot be built.
pub fn sum(kernel: &Kernel, strategy: ExecutionStrategy) -> Result<f64, PipelineError> {
    let total = parallel::sum(strategy, kernel.dim(), kernel.weights())?;
    log::trace!(
        "kernel sum over {}x{} cells = {total:e} ({strategy:?})",
        kernel.dim(),
        kernel.dim()
    );
    Ok(total)
}

/// Divide every cell of `kernel` by `sum`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] if `sum` is zero,
/// subnormal, infinite or NaN, since dividing by it would not produce a
/// usable kernel.
pub fn normalize(mut kernel: Kernel, sum: f64) -> Result<Kernel, PipelineError> {
    if !sum.is_normal() {
        return Err(PipelineError::InvalidParameter(format!(
            "cannot normalize a kernel whose weights sum to {sum}"
        )));
    }
    kernel.weights_mut().iter_mut().for_each(|w| *w /= sum);
    Ok(kernel)
}
