//! Interpolator trait.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Samples a volume at non-integer voxel positions.
pub trait Interpolator<B: Backend> {
    /// Interpolate `data` (`[Z, Y, X]`) at `indices`.
    ///
    /// # Arguments
    /// * `data` - volume tensor
    /// * `indices` - `[N, 3]` continuous indices in `(x, y, z)` order
    ///
    /// # Returns
    /// `[N]` sampled values. Indices outside the volume are clamped to the
    /// nearest edge voxel; callers that need a fill value mask them out.
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1>;
}
