pub mod nifti_io;
pub mod transform_io;

pub use nifti_io::{read_grid, read_image, read_volume, write_image, write_volume};
pub use transform_io::{read_affine, write_affine};
