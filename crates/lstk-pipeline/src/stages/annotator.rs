//! Anatomical lesion annotation.

use std::marker::PhantomData;
use std::sync::Arc;

use burn::tensor::backend::Backend;
use lstk_core::lesion::assign_regions;
use lstk_core::{Role, Space};
use tracing::info;

use super::{DeformableOutputs, LesionAnnotator, SpatialRegistrar};
use crate::artifact::{VolumeFile, WarpDirection};
use crate::error::Result;
use crate::workspace::{TransformFile, WorkspaceManager};

const STAGE: &str = "annotation";

/// Warps the atlas region map onto the subject and labels every lesion with
/// the region it touches.
pub struct AtlasAnnotator<B: Backend> {
    registrar: Arc<dyn SpatialRegistrar>,
    device: B::Device,
    _backend: PhantomData<B>,
}

impl<B: Backend> AtlasAnnotator<B> {
    pub fn new(registrar: Arc<dyn SpatialRegistrar>, device: B::Device) -> Self {
        Self {
            registrar,
            device,
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> LesionAnnotator for AtlasAnnotator<B> {
    fn annotate(
        &self,
        atlas_t1: &VolumeFile,
        atlas_regions: &VolumeFile,
        t1: &VolumeFile,
        segmentation: &VolumeFile,
        workspace: &WorkspaceManager,
        threads: usize,
    ) -> Result<VolumeFile> {
        atlas_t1.ensure_space(Space::Atlas, STAGE)?;
        atlas_regions.ensure_space(Space::Atlas, STAGE)?;
        atlas_regions.ensure_role(&[Role::RegionLabels], STAGE)?;
        segmentation.ensure_role(&[Role::Segmentation], STAGE)?;
        segmentation.ensure_space(t1.space, STAGE)?;

        let space = t1.space;
        let outputs = DeformableOutputs {
            affine: workspace.resolve_transform(Space::Atlas, space, "annot", TransformFile::Affine)?,
            warp: workspace.resolve_transform(Space::Atlas, space, "annot", TransformFile::Warp)?,
            inverse_warp: workspace.resolve_transform(Space::Atlas, space, "annot", TransformFile::InverseWarp)?,
        };
        let transform = self.registrar.register_deformable(t1, atlas_t1, &outputs, threads)?;

        let regions_out = workspace.resolve(Role::RegionLabels, space, "atlas")?;
        let regions = self
            .registrar
            .apply_transform(atlas_regions, &transform, WarpDirection::Forward, &regions_out, threads)?;

        let seg = segmentation.load::<B>(&self.device)?;
        let regions = regions.load::<B>(&self.device)?;
        seg.ensure_aligned_with(&regions, STAGE)?;

        let labels = assign_regions(&seg.voxels()?, &regions.voxels()?, seg.grid().shape())?;
        let lesions = labels.iter().filter(|v| **v > 0.0).count();
        info!(space = %space, lesion_voxels = lesions, "annotated lesions");

        VolumeFile::store(
            workspace.resolve(Role::AnnotatedSegmentation, space, "lst")?,
            &seg.with_voxels(labels, Role::AnnotatedSegmentation)?,
        )
    }
}
