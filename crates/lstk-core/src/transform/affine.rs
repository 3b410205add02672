//! Affine transform (linear map plus translation).

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use nalgebra::Matrix4;

use super::trait_::Transform;
use crate::error::{CoreError, Result};

/// Affine transform `T(x) = A x + t` in physical (RAS, millimetre) space.
///
/// Stored as plain tensors; these transforms come from registration output
/// files and are never optimised here.
#[derive(Debug, Clone)]
pub struct AffineTransform<B: Backend> {
    matrix: Tensor<B, 2>,
    translation: Tensor<B, 1>,
    homogeneous: Matrix4<f64>,
}

impl<B: Backend> AffineTransform<B> {
    /// Build from a 4×4 homogeneous matrix whose last row is `[0, 0, 0, 1]`.
    pub fn from_matrix(matrix: &Matrix4<f64>, device: &B::Device) -> Result<Self> {
        let last = matrix.row(3);
        let expected = [0.0, 0.0, 0.0, 1.0];
        if last.iter().zip(expected).any(|(a, b)| (a - b).abs() > 1e-6) {
            return Err(CoreError::invalid_parameter(format!(
                "affine matrix last row must be [0 0 0 1], got {last}"
            )));
        }

        Ok(Self::from_homogeneous(matrix, device))
    }

    pub fn identity(device: &B::Device) -> Self {
        Self::from_homogeneous(&Matrix4::identity(), device)
    }

    fn from_homogeneous(matrix: &Matrix4<f64>, device: &B::Device) -> Self {
        let mut a = Vec::with_capacity(9);
        for r in 0..3 {
            for c in 0..3 {
                a.push(matrix[(r, c)] as f32);
            }
        }
        let t: Vec<f32> = (0..3).map(|r| matrix[(r, 3)] as f32).collect();

        Self {
            matrix: Tensor::from_data(TensorData::new(a, Shape::new([3, 3])), device),
            translation: Tensor::from_data(TensorData::new(t, Shape::new([3])), device),
            homogeneous: *matrix,
        }
    }

    /// The homogeneous 4×4 matrix this transform was built from.
    pub fn homogeneous(&self) -> &Matrix4<f64> {
        &self.homogeneous
    }

    /// The inverse transform, if the matrix is invertible.
    pub fn inverse(&self) -> Result<Self> {
        let inv = self
            .homogeneous
            .try_inverse()
            .ok_or_else(|| CoreError::invalid_parameter("affine matrix is singular"))?;
        Self::from_matrix(&inv, &self.matrix.device())
    }
}

impl<B: Backend> Transform<B> for AffineTransform<B> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        // row vectors: y = x @ A^T + t
        let t = self.translation.clone().reshape([1, 3]);
        points.matmul(self.matrix.clone().transpose()) + t
    }
}
