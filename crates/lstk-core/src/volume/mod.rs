//! Volumes tagged with their coordinate space and role.

pub mod space;
pub mod volume;

pub use space::{Interpolation, Role, Space};
pub use volume::{Volume, GRID_TOLERANCE};
