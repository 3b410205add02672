//! Physical geometry of voxel grids: origin, spacing and axis orientation.
//!
//! Everything here is three dimensional in practice; the `*3` aliases are the
//! names the rest of the workspace uses.

mod direction;
mod point;
mod spacing;
mod vector;

pub use direction::Direction;
pub use point::Point;
pub use spacing::Spacing;
pub use vector::Vector;

pub type Direction3 = Direction<3>;
pub type Point3 = Point<3>;
pub type Spacing3 = Spacing<3>;
pub type Vector3 = Vector<3>;
