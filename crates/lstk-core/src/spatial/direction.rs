//! Axis orientation of a voxel grid.

use nalgebra::SMatrix;
use super::Vector;

/// Direction cosines: column `i` is the unit physical direction of index axis `i`.
///
/// Radiological data often flips x and y relative to RAS, which shows up as
/// negative diagonal entries here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Direction<const D: usize>(pub SMatrix<f64, D, D>);

impl<const D: usize> Direction<D> {
    pub fn identity() -> Self {
        Self(SMatrix::identity())
    }
}

impl<const D: usize> std::ops::Index<(usize, usize)> for Direction<D> {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        &self.0[(row, col)]
    }
}

impl<const D: usize> std::ops::IndexMut<(usize, usize)> for Direction<D> {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        &mut self.0[(row, col)]
    }
}

/// Rotates an index-axis offset into physical space.
impl<const D: usize> std::ops::Mul<Vector<D>> for Direction<D> {
    type Output = Vector<D>;

    fn mul(self, offset: Vector<D>) -> Vector<D> {
        Vector(self.0 * offset.0)
    }
}
