//! Voxel-level lesion operations.
//!
//! These work on host-side voxel buffers in `[Z, Y, X]` order. Connected
//! component analysis is inherently sequential, so volumes are pulled out of
//! their tensors once and processed here.

pub mod components;
pub mod ensemble;
pub mod intensity;
pub mod regions;
pub mod threshold;

pub use components::{label_components, Components};
pub use ensemble::mean_probability;
pub use intensity::{clip_and_rescale, percentile};
pub use regions::{assign_regions, Region};
pub use threshold::{binarize, remove_small_components};
