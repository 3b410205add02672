//! Image type with physical metadata.
//!
//! An [`Image`] pairs voxel data held in a burn tensor with the [`Grid`] that
//! places those voxels in physical space.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use crate::error::{CoreError, Result};
use crate::image::Grid;
use crate::spatial::{Direction3, Point3, Spacing3};

/// 3-D medical image with physical metadata.
///
/// Tensor layout is `[Z, Y, X]`, the transpose of NIfTI's `[X, Y, Z]`; the
/// reader and writer in `lstk-io` permute at the boundary.
///
/// # Examples
/// ```rust
/// use lstk_core::Image;
/// use lstk_core::spatial::{Point3, Spacing3, Direction3};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([4, 4, 4], &device);
/// let image = Image::new(data, Point3::origin(), Spacing3::uniform(1.0), Direction3::identity());
/// assert_eq!(image.shape(), [4, 4, 4]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend> {
    data: Tensor<B, 3>,
    origin: Point3,
    spacing: Spacing3,
    direction: Direction3,
}

impl<B: Backend> Image<B> {
    /// Create a new image with the given data and metadata.
    pub fn new(data: Tensor<B, 3>, origin: Point3, spacing: Spacing3, direction: Direction3) -> Self {
        Self {
            data,
            origin,
            spacing,
            direction,
        }
    }

    /// Create an image on `grid`. The tensor shape must equal the grid shape.
    pub fn from_grid(data: Tensor<B, 3>, grid: &Grid) -> Result<Self> {
        let dims = data.dims();
        if dims != grid.shape() {
            return Err(CoreError::grid_mismatch(
                "image construction",
                format!("tensor shape {:?} vs grid shape {:?}", dims, grid.shape()),
            ));
        }
        Ok(Self::new(data, *grid.origin(), *grid.spacing(), *grid.direction()))
    }

    /// Create an image on `grid` from voxel values in `[Z, Y, X]` order.
    pub fn from_voxels(values: Vec<f32>, grid: &Grid, device: &B::Device) -> Result<Self> {
        if values.len() != grid.len() {
            return Err(CoreError::grid_mismatch(
                "image construction",
                format!("{} voxel values for a grid of {}", values.len(), grid.len()),
            ));
        }
        let data = Tensor::<B, 3>::from_data(TensorData::new(values, Shape::new(grid.shape())), device);
        Ok(Self::new(data, *grid.origin(), *grid.spacing(), *grid.direction()))
    }

    /// Get the image data tensor.
    pub fn data(&self) -> &Tensor<B, 3> {
        &self.data
    }

    /// Consume the image and return its tensor.
    pub fn into_tensor(self) -> Tensor<B, 3> {
        self.data
    }

    pub fn origin(&self) -> &Point3 {
        &self.origin
    }

    pub fn spacing(&self) -> &Spacing3 {
        &self.spacing
    }

    pub fn direction(&self) -> &Direction3 {
        &self.direction
    }

    /// Image shape in `[Z, Y, X]` order.
    pub fn shape(&self) -> [usize; 3] {
        self.data.dims()
    }

    /// The sampling grid of this image.
    pub fn grid(&self) -> Grid {
        Grid::new(self.shape(), self.origin, self.spacing, self.direction)
    }

    /// Copy the voxel values to host memory in `[Z, Y, X]` order.
    pub fn voxels(&self) -> Result<Vec<f32>> {
        let data = self.data.to_data();
        data.as_slice::<f32>()
            .map(|s| s.to_vec())
            .map_err(|e| CoreError::TensorData(format!("{e:?}")))
    }

    /// Replace the voxel values, keeping the grid.
    pub fn with_voxels(&self, values: Vec<f32>) -> Result<Self> {
        Self::from_voxels(values, &self.grid(), &self.data.device())
    }

    /// Map `[N, 3]` physical points to continuous `(x, y, z)` indices.
    pub fn world_to_index_tensor(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        self.grid().world_to_index_tensor(points)
    }
}
