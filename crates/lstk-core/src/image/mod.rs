//! Images and their sampling grids.

pub mod grid;
pub mod image;

pub use grid::Grid;
pub use image::Image;
