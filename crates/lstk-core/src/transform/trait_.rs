//! Transform trait for spatial coordinate transformations.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Maps physical points of one space to physical points of another.
///
/// For resampling, the transform runs from the *output* grid's space to the
/// *input* volume's space: every output voxel asks where it came from.
pub trait Transform<B: Backend> {
    /// Apply the transform to `[N, 3]` points.
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2>;
}
