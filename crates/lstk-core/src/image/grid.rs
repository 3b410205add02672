//! Sampling grids.
//!
//! A [`Grid`] is everything about a volume except its voxel values: shape,
//! origin, spacing and direction. Two volumes "share a grid" when a voxel index
//! maps to the same physical point in both.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use nalgebra::{Matrix3, Matrix4, Vector3 as NaVector3};

use crate::error::{CoreError, Result};
use crate::spatial::{Direction, Direction3, Point3, Spacing3, Vector3};

const SPACING_EPSILON: f64 = 1e-9;
const DIRECTION_EPSILON: f64 = 1e-6;

/// Sampling grid of a 3-D volume.
///
/// `shape` is in tensor order `[Z, Y, X]`; `spacing[i]` and column `i` of the
/// direction matrix belong to index axis `i` in `(x, y, z)` order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    shape: [usize; 3],
    origin: Point3,
    spacing: Spacing3,
    direction: Direction3,
}

impl Grid {
    pub fn new(shape: [usize; 3], origin: Point3, spacing: Spacing3, direction: Direction3) -> Self {
        Self {
            shape,
            origin,
            spacing,
            direction,
        }
    }

    /// Build a grid from a 4×4 voxel-to-world affine (NIfTI sform layout).
    ///
    /// Column norms become the spacing; normalized columns become the
    /// direction. Zero-length columns fall back to the matching unit axis.
    /// Columns that are linearly dependent leave no invertible orientation and
    /// are rejected with [`CoreError::InvalidParameter`].
    pub fn from_affine(shape: [usize; 3], affine: &Matrix4<f64>) -> Result<Self> {
        let origin = Point3::new([affine[(0, 3)], affine[(1, 3)], affine[(2, 3)]]);

        let mut spacing = [0.0; 3];
        let mut columns = [NaVector3::zeros(); 3];
        for (axis, column) in columns.iter_mut().enumerate() {
            let col = NaVector3::new(affine[(0, axis)], affine[(1, axis)], affine[(2, axis)]);
            let norm = col.norm();
            spacing[axis] = norm;
            *column = if norm > SPACING_EPSILON {
                col / norm
            } else {
                let mut unit = NaVector3::zeros();
                unit[axis] = 1.0;
                unit
            };
        }

        let orientation = Matrix3::from_columns(&columns);
        if orientation.determinant().abs() < DIRECTION_EPSILON {
            return Err(CoreError::invalid_parameter(format!(
                "affine axes are not independent (direction determinant {:.3e})",
                orientation.determinant()
            )));
        }
        Ok(Self::new(shape, origin, Spacing3::new(spacing), Direction(orientation)))
    }

    /// The 4×4 voxel-to-world affine `[D·diag(S) | O]`.
    pub fn affine(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        for r in 0..3 {
            for c in 0..3 {
                m[(r, c)] = self.direction[(r, c)] * self.spacing[c];
            }
            m[(r, 3)] = self.origin[r];
        }
        m
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
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

    /// Number of voxels.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Physical volume of one voxel in mm³.
    pub fn voxel_volume(&self) -> f64 {
        self.spacing.voxel_volume()
    }

    /// Physical position of a voxel given as `(x, y, z)` indices.
    pub fn index_to_world(&self, index: [f64; 3]) -> Point3 {
        let scaled = Vector3::new([
            index[0] * self.spacing[0],
            index[1] * self.spacing[1],
            index[2] * self.spacing[2],
        ]);
        self.origin + self.direction * scaled
    }

    /// Compare two grids: identical shape and affine entries within `tolerance`.
    pub fn approx_eq(&self, other: &Grid, tolerance: f64) -> bool {
        if self.shape != other.shape {
            return false;
        }
        let a = self.affine();
        let b = other.affine();
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tolerance)
    }

    /// Describe how two grids differ, for error messages.
    pub fn describe_difference(&self, other: &Grid) -> String {
        if self.shape != other.shape {
            format!("shape {:?} vs {:?}", self.shape, other.shape)
        } else {
            let a = self.affine();
            let b = other.affine();
            let max = a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y).abs())
                .fold(0.0, f64::max);
            format!("affine differs by up to {max:.3e}")
        }
    }

    /// Continuous `(x, y, z)` indices of every voxel as a `[N, 3]` tensor,
    /// enumerated in `[Z, Y, X]` storage order.
    pub fn index_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let [d, h, w] = self.shape;
        let total = d * h * w;

        let mut indices = Vec::with_capacity(total * 3);
        for z in 0..d {
            for y in 0..h {
                for x in 0..w {
                    indices.push(x as f32);
                    indices.push(y as f32);
                    indices.push(z as f32);
                }
            }
        }

        Tensor::<B, 1>::from_data(TensorData::new(indices, Shape::new([total * 3])), device)
            .reshape([total, 3])
    }

    /// Map `[N, 3]` continuous indices to physical points.
    pub fn index_to_world_tensor<B: Backend>(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = indices.device();

        // P = O + I @ M with M_rc = S_r * D_cr
        let mut m_data = Vec::with_capacity(9);
        for r in 0..3 {
            for c in 0..3 {
                m_data.push((self.spacing[r] * self.direction[(c, r)]) as f32);
            }
        }
        let m = Tensor::<B, 2>::from_data(TensorData::new(m_data, Shape::new([3, 3])), &device);

        indices.matmul(m) + self.origin_tensor(&device)
    }

    /// Map `[N, 3]` physical points to continuous indices.
    pub fn world_to_index_tensor<B: Backend>(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();

        // I = (P - O) @ T with T_rc = (D^-1)_cr / S_c
        // grids read from disk are checked in `from_affine`
        let inv_dir = self
            .direction
            .0
            .try_inverse()
            .map(Direction)
            .unwrap_or_else(Direction3::identity);
        let mut t_data = Vec::with_capacity(9);
        for r in 0..3 {
            for c in 0..3 {
                t_data.push((inv_dir[(c, r)] / self.spacing[c]) as f32);
            }
        }
        let t = Tensor::<B, 2>::from_data(TensorData::new(t_data, Shape::new([3, 3])), &device);

        (points - self.origin_tensor(&device)).matmul(t)
    }

    fn origin_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let origin: Vec<f32> = (0..3).map(|i| self.origin[i] as f32).collect();
        Tensor::<B, 1>::from_data(TensorData::new(origin, Shape::new([3])), device).reshape([1, 3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn oblique_grid() -> Grid {
        let mut direction = Direction3::identity();
        direction[(0, 0)] = -1.0;
        direction[(1, 1)] = -1.0;
        Grid::new(
            [4, 5, 6],
            Point3::new([10.0, -20.0, 5.0]),
            Spacing3::new([0.5, 1.0, 2.0]),
            direction,
        )
    }

    #[test]
    fn test_affine_roundtrip() {
        let grid = oblique_grid();
        let rebuilt = Grid::from_affine(grid.shape(), &grid.affine()).unwrap();
        assert!(grid.approx_eq(&rebuilt, 1e-12));
    }

    #[test]
    fn test_collinear_affine_columns_are_rejected() {
        let mut affine = oblique_grid().affine();
        for r in 0..3 {
            affine[(r, 1)] = 2.0 * affine[(r, 0)];
        }
        let err = Grid::from_affine([4, 5, 6], &affine).unwrap_err();
        assert!(matches!(err, CoreError::InvalidParameter(_)));
        assert!(!err.is_tag_mismatch());
    }

    #[test]
    fn test_zero_length_column_falls_back_to_unit_axis() {
        let mut affine = Matrix4::identity();
        affine[(2, 2)] = 0.0;
        let grid = Grid::from_affine([1, 2, 2], &affine).unwrap();
        assert_eq!(grid.spacing()[2], 0.0);
        assert_eq!(grid.direction()[(2, 2)], 1.0);
    }

    #[test]
    fn test_index_to_world_uses_spacing_per_axis() {
        let grid = oblique_grid();
        let p = grid.index_to_world([2.0, 1.0, 1.0]);
        // x axis flipped with 0.5 mm spacing, y flipped with 1 mm, z 2 mm
        assert!((p[0] - 9.0).abs() < 1e-12);
        assert!((p[1] - (-21.0)).abs() < 1e-12);
        assert!((p[2] - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_tensor_mapping_roundtrip() {
        let device = Default::default();
        let grid = oblique_grid();
        let indices = grid.index_tensor::<Backend>(&device);
        let world = grid.index_to_world_tensor(indices.clone());
        let back = grid.world_to_index_tensor(world);

        let a = indices.into_data();
        let b = back.into_data();
        let a = a.as_slice::<f32>().unwrap();
        let b = b.as_slice::<f32>().unwrap();
        assert_eq!(a.len(), 4 * 5 * 6 * 3);
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-3);
        }
    }

    #[test]
    fn test_shape_difference_is_reported() {
        let a = oblique_grid();
        let b = Grid::new([4, 5, 7], *a.origin(), *a.spacing(), *a.direction());
        assert!(!a.approx_eq(&b, 1e-6));
        assert!(a.describe_difference(&b).contains("shape"));
    }
}
