//! Collaborator interfaces and their implementations.
//!
//! Each stage reads and writes volume files; the orchestrator chooses every
//! path through the [`WorkspaceManager`](crate::workspace::WorkspaceManager)
//! and hands it in, so stages never invent names of their own.

pub mod annotator;
pub mod greedy;
pub mod hd_bet;
pub mod segmenter;
pub mod stats;
pub mod warp;

use std::path::{Path, PathBuf};

use crate::artifact::{SpatialTransform, VolumeFile, WarpDirection};
use crate::config::{ClipBounds, Device, StripMode};
use crate::error::Result;
use crate::workspace::WorkspaceManager;

pub use annotator::AtlasAnnotator;
pub use greedy::GreedyRegistrar;
pub use hd_bet::HdBetStripper;
pub use segmenter::{EnsembleSegmenter, ModelRunner, ProcessModelRunner};
pub use stats::{LesionRecord, LesionStatsAggregator, StatsTable};

/// Output of skull stripping: the brain-extracted image and its mask, both in
/// the input's space.
#[derive(Debug, Clone)]
pub struct Stripped {
    pub brain: VolumeFile,
    pub mask: VolumeFile,
}

/// Removes non-brain tissue.
pub trait SkullStripper: Send + Sync {
    fn strip(
        &self,
        input: &VolumeFile,
        brain_out: &Path,
        mask_out: &Path,
        device: Device,
        mode: StripMode,
    ) -> Result<Stripped>;
}

/// Where [`SpatialRegistrar::register_to_atlas`] writes its results.
#[derive(Debug, Clone)]
pub struct AtlasOutputs {
    pub t1: PathBuf,
    pub flair: PathBuf,
    pub t1_matrix: PathBuf,
    pub flair_matrix: PathBuf,
}

/// Both subject images in atlas space and the transforms that put them there.
#[derive(Debug, Clone)]
pub struct AtlasRegistration {
    pub t1: VolumeFile,
    pub flair: VolumeFile,
    pub t1_to_atlas: SpatialTransform,
    pub flair_to_atlas: SpatialTransform,
}

/// Where [`SpatialRegistrar::register_deformable`] writes its results.
#[derive(Debug, Clone)]
pub struct DeformableOutputs {
    pub affine: PathBuf,
    pub warp: PathBuf,
    pub inverse_warp: PathBuf,
}

/// Computes and applies spatial transforms.
pub trait SpatialRegistrar: Send + Sync {
    /// Rigidly align `moving` to `fixed` and resample it onto the fixed grid.
    /// The resampled volume is tagged with the fixed space.
    fn rigid_register(
        &self,
        moving: &VolumeFile,
        fixed: &VolumeFile,
        resampled_out: &Path,
        matrix_out: &Path,
        threads: usize,
    ) -> Result<(VolumeFile, SpatialTransform)>;

    /// Affinely register both subject images to the atlas template.
    fn register_to_atlas(
        &self,
        atlas_t1: &VolumeFile,
        t1: &VolumeFile,
        flair: &VolumeFile,
        outputs: &AtlasOutputs,
        threads: usize,
    ) -> Result<AtlasRegistration>;

    /// Deformably register `moving` onto `fixed`.
    fn register_deformable(
        &self,
        fixed: &VolumeFile,
        moving: &VolumeFile,
        outputs: &DeformableOutputs,
        threads: usize,
    ) -> Result<SpatialTransform>;

    /// Warp `volume` with the interpolation policy of its role.
    fn apply_transform(
        &self,
        volume: &VolumeFile,
        transform: &SpatialTransform,
        direction: WarpDirection,
        output: &Path,
        threads: usize,
    ) -> Result<VolumeFile>;
}

/// Parameters of one segmentation call.
#[derive(Debug, Clone)]
pub struct SegmentationRequest {
    pub model_dir: PathBuf,
    pub device: Device,
    pub threshold: f32,
    pub min_lesion_voxels: usize,
    pub clip: ClipBounds,
}

/// Atlas-space segmentation results.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Thresholded, size-filtered binary segmentation.
    pub segmentation: VolumeFile,
    /// One probability map per ensemble member, in model order.
    pub model_maps: Vec<VolumeFile>,
    pub ensemble: VolumeFile,
}

/// Segments lesions from an atlas-space, skull-stripped (T1, FLAIR) pair.
pub trait LesionSegmenter: Send + Sync {
    fn segment(
        &self,
        t1: &VolumeFile,
        flair: &VolumeFile,
        request: &SegmentationRequest,
        workspace: &WorkspaceManager,
    ) -> Result<Segmentation>;
}

/// Relabels lesions with anatomical regions.
pub trait LesionAnnotator: Send + Sync {
    /// `t1` and `segmentation` share a space and grid; the result is in that
    /// space.
    fn annotate(
        &self,
        atlas_t1: &VolumeFile,
        atlas_regions: &VolumeFile,
        t1: &VolumeFile,
        segmentation: &VolumeFile,
        workspace: &WorkspaceManager,
        threads: usize,
    ) -> Result<VolumeFile>;
}

/// Summarizes lesions of a mask.
pub trait StatsAggregator: Send + Sync {
    fn compute_stats(&self, mask: &VolumeFile, multi_class: bool) -> Result<StatsTable>;
}
