//! Resample image filter.
//!
//! Resamples an image onto a target [`Grid`] by mapping each output voxel
//! through a transform into the input image and interpolating there.

use burn::tensor::backend::Backend;
use burn::tensor::{Bool, Shape, Tensor};
use tracing::debug;

use crate::image::{Grid, Image};
use crate::interpolation::sample;
use crate::transform::Transform;
use crate::volume::Interpolation;

/// Resample image filter.
///
/// The transform maps output physical space to input physical space. For a
/// registration result (fixed → moving) that means: resample the moving image
/// onto the fixed grid with the registration transform as-is.
pub struct ResampleImageFilter<'a, B: Backend, T: Transform<B>> {
    grid: Grid,
    transform: &'a T,
    interpolation: Interpolation,
    default_value: f32,
    _backend: std::marker::PhantomData<B>,
}

impl<'a, B: Backend, T: Transform<B>> ResampleImageFilter<'a, B, T> {
    pub fn new(grid: Grid, transform: &'a T, interpolation: Interpolation) -> Self {
        Self {
            grid,
            transform,
            interpolation,
            default_value: 0.0,
            _backend: std::marker::PhantomData,
        }
    }

    /// Value for output voxels whose source lies outside the input volume.
    pub fn with_default_value(mut self, value: f32) -> Self {
        self.default_value = value;
        self
    }

    pub fn apply(&self, input: &Image<B>) -> Image<B> {
        let device = input.data().device();

        let output_indices = self.grid.index_tensor::<B>(&device);
        let output_points = self.grid.index_to_world_tensor(output_indices);
        let input_points = self.transform.transform_points(output_points);
        let input_indices = input.world_to_index_tensor(input_points);

        let inside = inside_mask(&input_indices, input.shape());
        debug!(
            from = ?input.shape(),
            to = ?self.grid.shape(),
            interpolation = ?self.interpolation,
            "resampling image"
        );
        let sampled = sample(self.interpolation, input.data(), input_indices);
        let values = sampled.mask_fill(inside.bool_not(), self.default_value);

        let data = values.reshape(Shape::new(self.grid.shape()));
        Image::new(
            data,
            *self.grid.origin(),
            *self.grid.spacing(),
            *self.grid.direction(),
        )
    }
}

/// Resample `input` onto `grid` with a zero fill value.
pub fn resample_to_grid<B: Backend, T: Transform<B>>(
    input: &Image<B>,
    grid: &Grid,
    transform: &T,
    interpolation: Interpolation,
) -> Image<B> {
    ResampleImageFilter::new(*grid, transform, interpolation).apply(input)
}

/// `[N]` bool tensor: continuous index within half a voxel of the volume.
fn inside_mask<B: Backend>(indices: &Tensor<B, 2>, shape: [usize; 3]) -> Tensor<B, 1, Bool> {
    let [d, h, w] = shape;
    let n = indices.dims()[0];
    let device = indices.device();
    let mut inside = Tensor::<B, 1>::ones([n], &device);
    // (x, y, z) columns against (w, h, d)
    for (axis, extent) in [w, h, d].into_iter().enumerate() {
        let c = indices.clone().narrow(1, axis, 1).squeeze::<1>(1);
        let lo = c.clone().greater_equal_elem(-0.5).float();
        let hi = c.lower_elem(extent as f64 - 0.5).float();
        inside = inside * lo * hi;
    }
    inside.greater_elem(0.5)
}
