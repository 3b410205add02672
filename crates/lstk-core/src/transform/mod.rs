//! Spatial transforms between physical spaces.

pub mod affine;
pub mod trait_;

pub use affine::AffineTransform;
pub use trait_::Transform;
