//! Run-mode state machine.
//!
//! [`PipelineOrchestrator::run`] checks the configuration, acquires a
//! workspace, runs the stages of the selected [`RunMode`] strictly in
//! sequence and publishes the native FLAIR results. The workspace is
//! released on every exit path.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use burn::tensor::backend::Backend;
use lstk_core::{CoreError, Role, Space};
use tracing::{info, warn};

use crate::artifact::{SpatialTransform, VolumeFile, WarpDirection};
use crate::config::{RunConfig, RunMode, ToolConfig};
use crate::error::{PipelineError, Result};
use crate::progress::{ProgressCallback, ProgressEvent, Stage};
use crate::stages::{
    AtlasAnnotator, AtlasOutputs, EnsembleSegmenter, GreedyRegistrar, HdBetStripper, LesionAnnotator,
    LesionSegmenter, LesionStatsAggregator, ProcessModelRunner, SegmentationRequest, SkullStripper,
    SpatialRegistrar, StatsAggregator, Stripped,
};
use crate::validation::preflight;
use crate::workspace::{Naming, TransformFile, WorkspaceManager};

pub const SEGMENTATION_NAME: &str = "space-flair_seg-lst.nii.gz";
pub const ANNOTATED_NAME: &str = "space-flair_desc-annotated_seg-lst.nii.gz";
pub const ENSEMBLE_PROBMAP_NAME: &str = "space-flair_desc-ensemble_probmap-lst.nii.gz";
pub const STATS_NAME: &str = "lesion_stats.csv";
pub const ANNOTATED_STATS_NAME: &str = "annotated_lesion_stats.csv";

/// Published name of the probability map of ensemble member `n` (from 1).
pub fn model_probmap_name(n: usize) -> String {
    format!("space-flair_desc-model{n}_probmap-lst.nii.gz")
}

/// The collaborators a run is composed of.
///
/// The skull stripper and the segmenter are optional so that runs which never
/// call them do not need their executables installed.
pub struct Stages {
    pub stripper: Option<Box<dyn SkullStripper>>,
    pub registrar: Arc<dyn SpatialRegistrar>,
    pub segmenter: Option<Box<dyn LesionSegmenter>>,
    pub annotator: Box<dyn LesionAnnotator>,
    pub stats: Box<dyn StatsAggregator>,
}

impl Stages {
    pub fn new(
        registrar: Arc<dyn SpatialRegistrar>,
        annotator: Box<dyn LesionAnnotator>,
        stats: Box<dyn StatsAggregator>,
    ) -> Self {
        Self {
            stripper: None,
            registrar,
            segmenter: None,
            annotator,
            stats,
        }
    }

    pub fn with_stripper(mut self, stripper: Box<dyn SkullStripper>) -> Self {
        self.stripper = Some(stripper);
        self
    }

    pub fn with_segmenter(mut self, segmenter: Box<dyn LesionSegmenter>) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    /// Build the production adapters needed by `config`, resolving every
    /// executable up front.
    pub fn for_config<B: Backend>(config: &RunConfig, device: &B::Device) -> Result<Self> {
        let tools: &ToolConfig = &config.tools;
        let registrar: Arc<dyn SpatialRegistrar> = Arc::new(GreedyRegistrar::<B>::new(&tools.greedy, device.clone())?);
        let annotator = Box::new(AtlasAnnotator::<B>::new(registrar.clone(), device.clone()));
        let mut stages = Self::new(registrar, annotator, Box::new(LesionStatsAggregator::<B>::new(device.clone())));

        if !config.stripped {
            stages = stages.with_stripper(Box::new(HdBetStripper::new(&tools.hd_bet)?));
        }
        if !config.mode.is_annotate_only() {
            let runner = Box::new(ProcessModelRunner::new(&tools.model_runner)?);
            stages = stages.with_segmenter(Box::new(EnsembleSegmenter::<B>::new(runner, device.clone())));
        }
        Ok(stages)
    }

    fn stripper(&self) -> Result<&dyn SkullStripper> {
        self.stripper
            .as_deref()
            .ok_or_else(|| PipelineError::configuration("skull stripping required but no stripper is configured"))
    }

    fn segmenter(&self) -> Result<&dyn LesionSegmenter> {
        self.segmenter
            .as_deref()
            .ok_or_else(|| PipelineError::configuration("segmentation required but no segmenter is configured"))
    }
}

/// Space the subject pair is brought into before the main stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// T1 rigidly onto FLAIR, both in native FLAIR space.
    NativeRigid,
    /// Both images affinely into atlas space.
    Atlas,
}

/// (T1, FLAIR) as staged in the workspace.
#[derive(Debug, Clone)]
pub struct InputPair {
    pub t1: VolumeFile,
    pub flair: VolumeFile,
}

/// Transforms computed while aligning a pair.
#[derive(Debug, Clone)]
pub enum AlignmentTransforms {
    Rigid {
        t1_to_flair: SpatialTransform,
    },
    Atlas {
        t1_to_atlas: SpatialTransform,
        flair_to_atlas: SpatialTransform,
    },
}

/// A skull-stripped pair in the working space.
#[derive(Debug, Clone)]
pub struct AlignedPair {
    pub t1: VolumeFile,
    pub flair: VolumeFile,
    /// Brain-extracted native copies, when stripping happened in atlas space.
    pub native: Option<InputPair>,
    pub transforms: AlignmentTransforms,
}

/// Files written to the output directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineResult {
    pub segmentation: Option<PathBuf>,
    pub annotated: Option<PathBuf>,
    pub stats: Vec<PathBuf>,
    pub probability_maps: Vec<PathBuf>,
}

impl PipelineResult {
    pub fn files(&self) -> Vec<&Path> {
        self.segmentation
            .iter()
            .chain(self.annotated.iter())
            .chain(self.stats.iter())
            .chain(self.probability_maps.iter())
            .map(PathBuf::as_path)
            .collect()
    }
}

/// Runs one configured pipeline.
pub struct PipelineOrchestrator<B: Backend> {
    config: RunConfig,
    stages: Stages,
    device: B::Device,
    naming: Naming,
    callbacks: Vec<Arc<dyn ProgressCallback>>,
}

impl<B: Backend> PipelineOrchestrator<B> {
    pub fn new(config: RunConfig, stages: Stages, device: B::Device) -> Self {
        Self {
            config,
            stages,
            device,
            naming: Naming::default(),
            callbacks: Vec::new(),
        }
    }

    pub fn with_naming(mut self, naming: Naming) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run the configured mode end to end.
    pub fn run(&self) -> Result<PipelineResult> {
        self.stage(Stage::Preflight, || preflight(&self.config))?;

        let workspace = WorkspaceManager::acquire(self.config.temp.as_deref(), self.naming.clone())?;
        let root = workspace.root().to_path_buf();
        let owned = workspace.is_owned();
        self.emit(&ProgressEvent::WorkspaceAcquired {
            path: root.clone(),
            owned,
        });

        let result = match &self.config.mode {
            RunMode::AnnotateOnly { existing_segmentation } => self.annotate_only(&workspace, existing_segmentation),
            RunMode::Full { annotate } => self.full(&workspace, *annotate),
        };

        workspace.release();
        self.emit(&ProgressEvent::WorkspaceReleased {
            path: root,
            removed: owned,
        });

        if let Ok(result) = &result {
            info!(files = result.files().len(), output = %self.config.output.display(), "pipeline finished");
        }
        result
    }

    fn emit(&self, event: &ProgressEvent) {
        for callback in &self.callbacks {
            callback.on_event(event);
        }
    }

    fn stage<T>(&self, stage: Stage, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.emit(&ProgressEvent::StageStarted(stage));
        let start = Instant::now();
        match f() {
            Ok(value) => {
                let elapsed = start.elapsed();
                info!(stage = %stage, elapsed_ms = elapsed.as_millis() as u64, "stage completed");
                self.emit(&ProgressEvent::StageCompleted { stage, elapsed });
                Ok(value)
            }
            Err(error) => {
                self.emit(&ProgressEvent::StageFailed {
                    stage,
                    error: error.to_string(),
                });
                Err(error)
            }
        }
    }

    fn annotate_only(&self, workspace: &WorkspaceManager, existing: &Path) -> Result<PipelineResult> {
        let (inputs, segmentation) = self.stage(Stage::StageInputs, || {
            let inputs = self.stage_inputs(workspace)?;
            let segmentation = self.copy_volume(
                existing,
                Space::NativeFlair,
                Role::Segmentation,
                workspace.resolve(Role::Segmentation, Space::NativeFlair, "existing")?,
            )?;
            Ok((inputs, segmentation))
        })?;

        let aligned = self.strip_and_align(workspace, inputs, self.config.stripped, Alignment::NativeRigid)?;

        let annotated = self.stage(Stage::Annotation, || {
            let (atlas_t1, atlas_regions) = self.atlas_assets();
            self.stages.annotator.annotate(
                &atlas_t1,
                &atlas_regions,
                &aligned.t1,
                &segmentation,
                workspace,
                self.config.threads,
            )
        })?;

        let annotated = self.stage(Stage::Publish, || self.publish(&annotated, ANNOTATED_NAME))?;
        Ok(PipelineResult {
            annotated: Some(annotated),
            ..PipelineResult::default()
        })
    }

    fn full(&self, workspace: &WorkspaceManager, annotate: bool) -> Result<PipelineResult> {
        let inputs = self.stage(Stage::StageInputs, || self.stage_inputs(workspace))?;
        let aligned = self.strip_and_align(workspace, inputs, self.config.stripped, Alignment::Atlas)?;
        let AlignmentTransforms::Atlas { flair_to_atlas, .. } = &aligned.transforms else {
            return Err(CoreError::space_mismatch("segmentation", Space::Atlas, aligned.flair.space).into());
        };

        let request = SegmentationRequest {
            model_dir: self.config.tools.model_dir.clone(),
            device: self.config.device,
            threshold: self.config.threshold,
            min_lesion_voxels: self.config.min_lesion_voxels,
            clip: self.config.clip,
        };
        let segmentation = self.stage(Stage::Segmentation, || {
            self.stages.segmenter()?.segment(&aligned.t1, &aligned.flair, &request, workspace)
        })?;

        let to_native = |volume: &VolumeFile, role: Role, descriptor: &str| -> Result<VolumeFile> {
            let output = workspace.resolve(role, Space::NativeFlair, descriptor)?;
            self.stages.registrar.apply_transform(
                volume,
                flair_to_atlas,
                WarpDirection::Inverse,
                &output,
                self.config.threads,
            )
        };

        let probability_maps = if self.config.probability_map {
            self.stage(Stage::ProbabilityExport, || {
                let mut maps = Vec::with_capacity(segmentation.model_maps.len() + 1);
                for (i, map) in segmentation.model_maps.iter().enumerate() {
                    maps.push((model_probmap_name(i + 1), to_native(map, Role::ProbabilityMap, &format!("model{}", i + 1))?));
                }
                maps.push((
                    ENSEMBLE_PROBMAP_NAME.to_string(),
                    to_native(&segmentation.ensemble, Role::ProbabilityMap, "ensemble")?,
                ));
                Ok(maps)
            })?
        } else {
            Vec::new()
        };

        let native_segmentation = self.stage(Stage::WarpToNative, || {
            to_native(&segmentation.segmentation, Role::Segmentation, "lst")
        })?;

        let native_annotated = if annotate {
            Some(self.stage(Stage::Annotation, || {
                let (atlas_t1, atlas_regions) = self.atlas_assets();
                let annotated = self.stages.annotator.annotate(
                    &atlas_t1,
                    &atlas_regions,
                    &aligned.t1,
                    &segmentation.segmentation,
                    workspace,
                    self.config.threads,
                )?;
                to_native(&annotated, Role::AnnotatedSegmentation, "lst")
            })?)
        } else {
            None
        };

        let mut result = self.stage(Stage::Publish, || {
            let mut result = PipelineResult {
                segmentation: Some(self.publish(&native_segmentation, SEGMENTATION_NAME)?),
                ..PipelineResult::default()
            };
            if let Some(annotated) = &native_annotated {
                result.annotated = Some(self.publish(annotated, ANNOTATED_NAME)?);
            }
            for (name, map) in &probability_maps {
                result.probability_maps.push(self.publish(map, name)?);
            }
            Ok(result)
        })?;

        result.stats = self.stage(Stage::Statistics, || {
            let mut written = Vec::new();
            let table = self.stages.stats.compute_stats(&native_segmentation, false)?;
            info!(lesions = table.lesion_count(), volume_mm3 = table.total_volume_mm3(), "lesion statistics");
            let path = self.config.output.join(STATS_NAME);
            table.write_csv(&path)?;
            written.push(path);

            if let Some(annotated) = &native_annotated {
                let table = self.stages.stats.compute_stats(annotated, true)?;
                let path = self.config.output.join(ANNOTATED_STATS_NAME);
                table.write_csv(&path)?;
                written.push(path);
            }
            Ok(written)
        })?;

        Ok(result)
    }

    /// Skull strip (unless `already_stripped`) and bring the pair into the
    /// space selected by `alignment`. Shared by both run modes.
    pub fn strip_and_align(
        &self,
        workspace: &WorkspaceManager,
        pair: InputPair,
        already_stripped: bool,
        alignment: Alignment,
    ) -> Result<AlignedPair> {
        let threads = self.config.threads;
        match alignment {
            Alignment::NativeRigid => {
                let (t1, t1_to_flair) = self.stage(Stage::RigidRegistration, || {
                    self.stages.registrar.rigid_register(
                        &pair.t1,
                        &pair.flair,
                        &workspace.resolve(pair.t1.role, Space::NativeFlair, "t1")?,
                        &workspace.resolve_transform(Space::NativeT1, Space::NativeFlair, "rigid", TransformFile::Affine)?,
                        threads,
                    )
                })?;
                let transforms = AlignmentTransforms::Rigid { t1_to_flair };

                if already_stripped {
                    return Ok(AlignedPair {
                        t1,
                        flair: pair.flair,
                        native: None,
                        transforms,
                    });
                }

                self.stage(Stage::SkullStrip, || {
                    let stripped = self.strip(workspace, &t1)?;
                    let flair = self.mask_volume(
                        &pair.flair,
                        &stripped.mask,
                        workspace.resolve(Role::BrainExtracted, Space::NativeFlair, "flair")?,
                    )?;
                    Ok(AlignedPair {
                        t1: stripped.brain,
                        flair,
                        native: None,
                        transforms,
                    })
                })
            }
            Alignment::Atlas => {
                let registration = self.stage(Stage::AtlasRegistration, || {
                    let (atlas_t1, _) = self.atlas_assets();
                    let outputs = AtlasOutputs {
                        t1: workspace.resolve(pair.t1.role, Space::Atlas, "t1")?,
                        flair: workspace.resolve(pair.flair.role, Space::Atlas, "flair")?,
                        t1_matrix: workspace.resolve_transform(Space::NativeT1, Space::Atlas, "atlas", TransformFile::Affine)?,
                        flair_matrix: workspace.resolve_transform(
                            Space::NativeFlair,
                            Space::Atlas,
                            "atlas",
                            TransformFile::Affine,
                        )?,
                    };
                    self.stages
                        .registrar
                        .register_to_atlas(&atlas_t1, &pair.t1, &pair.flair, &outputs, threads)
                })?;
                let transforms = AlignmentTransforms::Atlas {
                    t1_to_atlas: registration.t1_to_atlas.clone(),
                    flair_to_atlas: registration.flair_to_atlas.clone(),
                };

                if already_stripped {
                    return Ok(AlignedPair {
                        t1: registration.t1,
                        flair: registration.flair,
                        native: None,
                        transforms,
                    });
                }

                self.stage(Stage::SkullStrip, || {
                    let stripped = self.strip(workspace, &registration.t1)?;
                    let flair = self.mask_volume(
                        &registration.flair,
                        &stripped.mask,
                        workspace.resolve(Role::BrainExtracted, Space::Atlas, "flair")?,
                    )?;

                    let mut native = Vec::with_capacity(2);
                    for (input, to_atlas, descriptor) in [
                        (&pair.t1, &registration.t1_to_atlas, "t1"),
                        (&pair.flair, &registration.flair_to_atlas, "flair"),
                    ] {
                        let mask = self.stages.registrar.apply_transform(
                            &stripped.mask,
                            to_atlas,
                            WarpDirection::Inverse,
                            &workspace.resolve(Role::Mask, input.space, "brain")?,
                            threads,
                        )?;
                        native.push(self.mask_volume(
                            input,
                            &mask,
                            workspace.resolve(Role::BrainExtracted, input.space, descriptor)?,
                        )?);
                    }
                    let flair_native = native.pop();
                    let t1_native = native.pop();

                    Ok(AlignedPair {
                        t1: stripped.brain,
                        flair,
                        native: t1_native.zip(flair_native).map(|(t1, flair)| InputPair { t1, flair }),
                        transforms,
                    })
                })
            }
        }
    }

    fn strip(&self, workspace: &WorkspaceManager, t1: &VolumeFile) -> Result<Stripped> {
        let strip_mode = self.config.strip_mode;
        self.stages.stripper()?.strip(
            t1,
            &workspace.resolve(Role::BrainExtracted, t1.space, "t1")?,
            &workspace.resolve(Role::Mask, t1.space, "brain")?,
            self.config.device,
            strip_mode,
        )
    }

    fn mask_volume(&self, volume: &VolumeFile, mask: &VolumeFile, output: PathBuf) -> Result<VolumeFile> {
        let image = volume.load::<B>(&self.device)?;
        let mask = mask.load::<B>(&self.device)?;
        VolumeFile::store(output, &image.apply_mask(&mask)?)
    }

    fn stage_inputs(&self, workspace: &WorkspaceManager) -> Result<InputPair> {
        let role = if self.config.stripped {
            Role::BrainExtracted
        } else {
            Role::Anatomical
        };
        Ok(InputPair {
            t1: self.copy_volume(
                &self.config.t1,
                Space::NativeT1,
                role,
                workspace.resolve(role, Space::NativeT1, "input")?,
            )?,
            flair: self.copy_volume(
                &self.config.flair,
                Space::NativeFlair,
                role,
                workspace.resolve(role, Space::NativeFlair, "input")?,
            )?,
        })
    }

    /// Re-encode an input into the workspace so every artifact is `.nii.gz`.
    fn copy_volume(&self, source: &Path, space: Space, role: Role, destination: PathBuf) -> Result<VolumeFile> {
        let volume = lstk_io::read_volume::<B, _>(source, space, role, &self.device)?;
        VolumeFile::store(destination, &volume)
    }

    fn atlas_assets(&self) -> (VolumeFile, VolumeFile) {
        (
            VolumeFile::new(&self.config.tools.atlas_t1, Space::Atlas, Role::BrainExtracted),
            VolumeFile::new(&self.config.tools.atlas_regions, Space::Atlas, Role::RegionLabels),
        )
    }

    /// Copy a native FLAIR volume into the output directory.
    fn publish(&self, volume: &VolumeFile, name: &str) -> Result<PathBuf> {
        volume.ensure_space(Space::NativeFlair, "publish")?;
        let output = &self.config.output;
        fs::create_dir_all(output)
            .map_err(|e| PipelineError::io(format!("cannot create output directory {}", output.display()), e))?;

        let destination = output.join(name);
        if destination.exists() {
            warn!(path = %destination.display(), "overwriting existing output");
        }
        fs::copy(&volume.path, &destination)
            .map_err(|e| PipelineError::io(format!("cannot publish {}", destination.display()), e))?;
        info!(path = %destination.display(), "published");
        Ok(destination)
    }
}
