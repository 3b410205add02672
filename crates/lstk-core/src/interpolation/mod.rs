//! Sampling volumes at continuous voxel indices.

pub mod linear;
pub mod nearest;
pub mod trait_;

pub use linear::LinearInterpolator;
pub use nearest::NearestNeighborInterpolator;
pub use trait_::Interpolator;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::volume::Interpolation;

/// Sample `data` at `indices` with the interpolator selected by `mode`.
///
/// [`Interpolation::Label`] samples with nearest neighbour so class values are
/// never blended.
pub fn sample<B: Backend>(mode: Interpolation, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
    match mode {
        Interpolation::Linear => LinearInterpolator::new().interpolate(data, indices),
        Interpolation::Nearest | Interpolation::Label => {
            NearestNeighborInterpolator::new().interpolate(data, indices)
        }
    }
}
