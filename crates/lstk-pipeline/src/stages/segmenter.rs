//! Ensemble lesion segmentation.
//!
//! Inputs are intensity normalized, every ensemble member writes one
//! probability map, the maps are averaged, and the mean is thresholded and
//! cleaned of small components. All of this happens in atlas space.

use std::ffi::OsString;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use lstk_core::lesion::{binarize, clip_and_rescale, mean_probability, remove_small_components};
use lstk_core::{Role, Space, Volume};
use tracing::{debug, info};

use super::{LesionSegmenter, Segmentation, SegmentationRequest};
use crate::artifact::VolumeFile;
use crate::config::Device;
use crate::error::{PipelineError, Result};
use crate::process::{resolve_executable, ExternalCommand};
use crate::workspace::WorkspaceManager;

const STAGE: &str = "segmentation";
const MODEL_EXTENSION: &str = "onnx";

/// Runs one ensemble member on a normalized (T1, FLAIR) pair and writes a
/// probability map on the same grid.
pub trait ModelRunner: Send + Sync {
    fn run(&self, model: &Path, t1: &Path, flair: &Path, output: &Path, device: Device) -> Result<()>;
}

/// [`ModelRunner`] that starts one process per model.
#[derive(Debug, Clone)]
pub struct ProcessModelRunner {
    program: PathBuf,
}

impl ProcessModelRunner {
    pub fn new(program: &Path) -> Result<Self> {
        Ok(Self {
            program: resolve_executable(program)?,
        })
    }
}

pub fn model_runner_args(model: &Path, t1: &Path, flair: &Path, output: &Path, device: Device) -> Vec<OsString> {
    vec![
        "--model".into(),
        model.into(),
        "--t1".into(),
        t1.into(),
        "--flair".into(),
        flair.into(),
        "--output".into(),
        output.into(),
        "--device".into(),
        device.to_string().into(),
    ]
}

impl ModelRunner for ProcessModelRunner {
    fn run(&self, model: &Path, t1: &Path, flair: &Path, output: &Path, device: Device) -> Result<()> {
        ExternalCommand::new(STAGE, &self.program)
            .args(model_runner_args(model, t1, flair, output, device))
            .run_expecting(&[output])
    }
}

/// Ensemble members in `dir`, sorted by file name.
pub fn list_models(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| PipelineError::configuration(format!("cannot read model directory {}: {e}", dir.display())))?;

    let mut models = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| PipelineError::io(format!("cannot list {}", dir.display()), e))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == MODEL_EXTENSION) {
            models.push(path);
        }
    }
    models.sort();

    if models.is_empty() {
        return Err(PipelineError::configuration(format!(
            "no *.{MODEL_EXTENSION} models in {}",
            dir.display()
        )));
    }
    Ok(models)
}

/// [`LesionSegmenter`] averaging the outputs of every model in the model
/// directory.
pub struct EnsembleSegmenter<B: Backend> {
    runner: Box<dyn ModelRunner>,
    device: B::Device,
    _backend: PhantomData<B>,
}

impl<B: Backend> EnsembleSegmenter<B> {
    pub fn new(runner: Box<dyn ModelRunner>, device: B::Device) -> Self {
        Self {
            runner,
            device,
            _backend: PhantomData,
        }
    }

    fn normalize(&self, volume: &Volume<B>, request: &SegmentationRequest, path: PathBuf) -> Result<VolumeFile> {
        let values = clip_and_rescale(&volume.voxels()?, request.clip.low, request.clip.high)?;
        VolumeFile::store(path, &volume.with_voxels(values, volume.role())?)
    }
}

impl<B: Backend> LesionSegmenter for EnsembleSegmenter<B> {
    fn segment(
        &self,
        t1: &VolumeFile,
        flair: &VolumeFile,
        request: &SegmentationRequest,
        workspace: &WorkspaceManager,
    ) -> Result<Segmentation> {
        for input in [t1, flair] {
            input.ensure_space(Space::Atlas, STAGE)?;
            input.ensure_role(&[Role::BrainExtracted], STAGE)?;
        }
        let models = list_models(&request.model_dir)?;

        let t1_volume = t1.load::<B>(&self.device)?;
        let flair_volume = flair.load::<B>(&self.device)?;
        flair_volume.ensure_aligned_with(&t1_volume, STAGE)?;

        let t1_norm = self.normalize(&t1_volume, request, workspace.resolve(Role::BrainExtracted, Space::Atlas, "t1norm")?)?;
        let flair_norm = self.normalize(&flair_volume, request, workspace.resolve(Role::BrainExtracted, Space::Atlas, "flairnorm")?)?;

        let mut model_maps = Vec::with_capacity(models.len());
        let mut probabilities = Vec::with_capacity(models.len());
        for (i, model) in models.iter().enumerate() {
            let output = workspace.resolve(Role::ProbabilityMap, Space::Atlas, &format!("model{}", i + 1))?;
            debug!(model = %model.display(), "running ensemble member");
            self.runner
                .run(model, &t1_norm.path, &flair_norm.path, &output, request.device)?;

            let map = VolumeFile::new(output, Space::Atlas, Role::ProbabilityMap);
            map.ensure_exists(STAGE)?;
            let volume = map.load::<B>(&self.device)?;
            flair_volume.ensure_aligned_with(&volume, STAGE)?;
            probabilities.push(volume);
            model_maps.push(map);
        }

        let mean = mean_probability(&probabilities)?;
        let ensemble = VolumeFile::store(workspace.resolve(Role::ProbabilityMap, Space::Atlas, "ensemble")?, &mean)?;

        let binary = binarize(&mean.voxels()?, request.threshold)?;
        let (filtered, removed) = remove_small_components(&binary, mean.grid().shape(), request.min_lesion_voxels)?;
        let lesion_voxels = filtered.iter().filter(|v| **v > 0.0).count();
        info!(
            models = models.len(),
            removed_components = removed,
            lesion_voxels,
            "segmented lesions in atlas space"
        );

        let segmentation = VolumeFile::store(
            workspace.resolve(Role::Segmentation, Space::Atlas, "lst")?,
            &mean.with_voxels(filtered, Role::Segmentation)?,
        )?;

        Ok(Segmentation {
            segmentation,
            model_maps,
            ensemble,
        })
    }
}
