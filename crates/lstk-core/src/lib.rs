pub mod error;
pub mod filter;
pub mod image;
pub mod interpolation;
pub mod lesion;
pub mod spatial;
pub mod transform;
pub mod volume;

pub use error::{CoreError, Result};
pub use image::{Grid, Image};
pub use spatial::{Direction, Point, Spacing, Vector};
pub use transform::{AffineTransform, Transform};
pub use volume::{Interpolation, Role, Space, Volume};
