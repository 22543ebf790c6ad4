//! Grayscale projection and gradient-magnitude composition.
//!
//! Edge detection runs on a single intensity channel: the blurred
//! buffer is projected once with [`to_grayscale`], both Prewitt
//! stencils read that same field, and [`combine`] folds their two
//! responses into an achromatic magnitude image.

use crate::grid::{Grid, Pixel, PixelBuffer, ScalarField};
use crate::kernel;
use crate::parallel::{self, ExecutionStrategy};
use crate::stencil::{self, BoundaryPolicy};
use crate::types::PipelineError;

/// The two directional derivative estimates of a grayscale field.
#[derive(Debug, Clone)]
pub struct Gradients {
    /// Prewitt-X response.
    pub x: ScalarField,
    /// Prewitt-Y response.
    pub y: ScalarField,
}

/// Project every pixel onto the mean of its three channels.
///
/// # Errors
///
/// Returns [`PipelineError::AllocationFailure`] if the field cannot be
/// allocated, or a strategy error.
pub fn to_grayscale(
    buffer: &PixelBuffer,
    strategy: ExecutionStrategy,
) -> Result<ScalarField, PipelineError> {
    let mut field = ScalarField::try_filled(buffer.rows(), buffer.cols(), 0.0)?;
    let src = buffer.as_slice();
    parallel::fill_cells(strategy, buffer.cols(), field.try_as_mut_slice()?, |i| {
        src[i].intensity()
    })?;
    Ok(field)
}

/// Apply both Prewitt stencils to `gray`.
///
/// Under [`BoundaryPolicy::Skip`] a uniform field still produces a
/// response along its border, because the missing neighbors count as
/// zero. [`BoundaryPolicy::Replicate`] yields exactly zero everywhere.
///
/// # Errors
///
/// Any error of [`stencil::convolve`].
pub fn prewitt(
    gray: &ScalarField,
    boundary: BoundaryPolicy,
    strategy: ExecutionStrategy,
) -> Result<Gradients, PipelineError> {
    Ok(Gradients {
        x: stencil::convolve(&kernel::prewitt_x(), gray, boundary, strategy)?,
        y: stencil::convolve(&kernel::prewitt_y(), gray, boundary, strategy)?,
    })
}

/// Combine two directional fields into `sqrt(x² + y²)`, written to all
/// three channels of the output.
///
/// # Errors
///
/// Returns [`PipelineError::DimensionMismatch`] if the fields differ in
/// shape, [`PipelineError::AllocationFailure`] if the output cannot be
/// allocated, or a strategy error.
pub fn combine(
    x: &ScalarField,
    y: &ScalarField,
    strategy: ExecutionStrategy,
) -> Result<PixelBuffer, PipelineError> {
    x.ensure_same_shape(y)?;
    let mut out: PixelBuffer = Grid::try_filled(x.rows(), x.cols(), Pixel::ZERO)?;
    let (xs, ys) = (x.as_slice(), y.as_slice());
    parallel::fill_cells(strategy, x.cols(), out.try_as_mut_slice()?, |i| {
        Pixel::splat(xs[i].hypot(ys[i]))
    })?;
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn grayscale_is_channel_mean() {
        let buffer = PixelBuffer::try_from_fn(2, 2, |r, c| {
            if r == c {
                Pixel::new(0.3, 0.6, 0.9)
            } else {
                Pixel::new(1.0, 0.0, 0.5)
            }
        })
        .unwrap();
        let gray = to_grayscale(&buffer, ExecutionStrategy::ParallelElements).unwrap();
        assert_relative_eq!(*gray.get(0, 0).unwrap(), 0.6, epsilon = 1e-12);
        assert_relative_eq!(*gray.get(0, 1).unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn combine_is_euclidean_norm_and_achromatic() {
        let x = ScalarField::from_vec(1, 3, vec![3.0, 0.0, -5.0]).unwrap();
        let y = ScalarField::from_vec(1, 3, vec![4.0, -2.0, 12.0]).unwrap();
        let out = combine(&x, &y, ExecutionStrategy::Serial).unwrap();
        let expected = [5.0, 2.0, 13.0];
        for (p, e) in out.iter().zip(expected) {
            assert_relative_eq!(p.red, e, epsilon = 1e-12);
            assert_eq!(p.red, p.green);
            assert_eq!(p.red, p.blue);
        }
    }

    #[test]
    fn uniform_field_has_zero_gradient_everywhere_when_replicated() {
        let gray = ScalarField::try_filled(6, 7, 0.42).unwrap();
        let g = prewitt(&gray, BoundaryPolicy::Replicate, ExecutionStrategy::default()).unwrap();
        let magnitude = combine(&g.x, &g.y, ExecutionStrategy::default()).unwrap();
        for p in &magnitude {
            assert_relative_eq!(p.red, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn uniform_field_under_skip_is_zero_inside_and_rings_at_the_border() {
        let v = 0.42;
        let gray = ScalarField::try_filled(6, 7, v).unwrap();
        let g = prewitt(&gray, BoundaryPolicy::Skip, ExecutionStrategy::default()).unwrap();
        let magnitude = combine(&g.x, &g.y, ExecutionStrategy::default()).unwrap();
        for row in 1..5 {
            for col in 1..6 {
                assert_relative_eq!(magnitude.get(row, col).unwrap().red, 0.0, epsilon = 1e-12);
            }
        }
        // Corner: two rows of +v on the right and two columns of -v below.
        assert_relative_eq!(*g.x.get(0, 0).unwrap(), 2.0 * v, epsilon = 1e-12);
        assert_relative_eq!(*g.y.get(0, 0).unwrap(), -2.0 * v, epsilon = 1e-12);
        assert_relative_eq!(
            magnitude.get(0, 0).unwrap().red,
            2.0 * std::f64::consts::SQRT_2 * v,
            epsilon = 1e-12
        );
    }

    #[test]
    fn step_edge_is_detected() {
        let gray = ScalarField::try_from_fn(5, 6, |_, c| if c < 3 { 0.0 } else { 1.0 }).unwrap();
        let g = prewitt(&gray, BoundaryPolicy::Skip, ExecutionStrategy::Serial).unwrap();
        let magnitude = combine(&g.x, &g.y, ExecutionStrategy::Serial).unwrap();
        assert_relative_eq!(magnitude.get(2, 2).unwrap().red, 3.0, epsilon = 1e-12);
        assert_relative_eq!(magnitude.get(2, 0).unwrap().red, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn combine_rejects_mismatched_fields() {
        let x = ScalarField::try_filled(2, 3, 0.0).unwrap();
        let y = ScalarField::try_filled(3, 2, 0.0).unwrap();
        assert!(matches!(
            combine(&x, &y, ExecutionStrategy::Serial),
            Err(PipelineError::DimensionMismatch { .. })
        ));
    }
}
