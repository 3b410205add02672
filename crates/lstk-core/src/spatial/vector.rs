//! Physical displacements, in millimetres.

use nalgebra::SVector;

/// Offset between two physical positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector<const D: usize>(pub SVector<f64, D>);

impl<const D: usize> Vector<D> {
    pub fn new(components: [f64; D]) -> Self {
        Self(components.into())
    }

    /// Length in millimetres.
    pub fn norm(&self) -> f64 {
        self.0.norm()
    }
}

impl<const D: usize> std::ops::Index<usize> for Vector<D> {
    type Output = f64;

    fn index(&self, axis: usize) -> &f64 {
        &self.0[axis]
    }
}
