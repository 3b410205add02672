//! Positions in scanner space.

use nalgebra::Point as NaPoint;
use super::Vector;

/// A physical position in millimetres, such as a volume origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point<const D: usize>(pub NaPoint<f64, D>);

impl<const D: usize> Point<D> {
    pub fn new(coords: [f64; D]) -> Self {
        Self(coords.into())
    }

    pub fn origin() -> Self {
        Self(NaPoint::origin())
    }
}

impl<const D: usize> std::ops::Index<usize> for Point<D> {
    type Output = f64;

    fn index(&self, axis: usize) -> &f64 {
        &self.0[axis]
    }
}

/// Moves the position by a physical offset.
impl<const D: usize> std::ops::Add<Vector<D>> for Point<D> {
    type Output = Self;

    fn add(self, offset: Vector<D>) -> Self {
        Self(self.0 + offset.0)
    }
}
