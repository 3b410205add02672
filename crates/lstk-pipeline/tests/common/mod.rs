//! Shared fixtures for pipeline integration tests.
//!
//! External processes are replaced by in-process fakes. Registration writes
//! identity matrices, except that FLAIR→atlas may carry a translation along x,
//! and is applied with the real resample path. Skull stripping keeps every
//! non-zero voxel, and each "model" echoes the normalized FLAIR scaled by a
//! per-model factor. Segmentation, annotation and statistics are real.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use burn_ndarray::NdArray;
use lstk_core::spatial::{Direction3, Point3, Spacing3};
use lstk_core::{Grid, Image, Role, Space, Volume};
use lstk_pipeline::artifact::{SpatialTransform, TransformKind, VolumeFile, WarpDirection};
use lstk_pipeline::config::{Device, RunConfig, RunConfigBuilder, StripMode, ToolConfig};
use lstk_pipeline::error::{PipelineError, Result};
use lstk_pipeline::stages::warp::apply_affine;
use lstk_pipeline::stages::{
    AtlasAnnotator, AtlasOutputs, AtlasRegistration, DeformableOutputs, EnsembleSegmenter, LesionStatsAggregator,
    ModelRunner, SkullStripper, SpatialRegistrar, Stripped,
};
use lstk_pipeline::workspace::Naming;
use lstk_pipeline::{HistoryCallback, PipelineOrchestrator, Stages};
use nalgebra::Matrix4;
use tempfile::TempDir;

pub type B = NdArray<f32>;

pub const N: usize = 8;
pub const BACKGROUND: f32 = 10.0;
pub const LESION: f32 = 100.0;

/// Voxels of the 2×2×2 lesion, as (x, y, z).
pub fn large_lesion() -> Vec<[usize; 3]> {
    let mut voxels = Vec::new();
    for z in 2..4 {
        for y in 2..4 {
            for x in 2..4 {
                voxels.push([x, y, z]);
            }
        }
    }
    voxels
}

/// The single-voxel lesion.
pub const SMALL_LESION: [usize; 3] = [5, 5, 5];

pub fn offset([x, y, z]: [usize; 3]) -> usize {
    (z * N + y) * N + x
}

pub fn flair_grid() -> Grid {
    Grid::new([N, N, N], Point3::origin(), Spacing3::uniform(1.0), Direction3::identity())
}

/// T1 is acquired at half the FLAIR resolution.
pub fn t1_grid() -> Grid {
    Grid::new([N / 2, N / 2, N / 2], Point3::origin(), Spacing3::uniform(2.0), Direction3::identity())
}

pub fn write_volume(path: &Path, grid: &Grid, values: Vec<f32>) {
    let image = Image::<B>::from_voxels(values, grid, &Default::default()).unwrap();
    lstk_io::write_image(path, &image).unwrap();
}

pub fn read_voxels(path: &Path) -> Vec<f32> {
    lstk_io::read_image::<B, _>(path, &Default::default())
        .unwrap()
        .voxels()
        .unwrap()
}

/// Input images, atlas assets and models in one scratch directory.
pub struct Fixture {
    pub dir: TempDir,
    pub t1: PathBuf,
    pub flair: PathBuf,
    pub output: PathBuf,
    pub existing_segmentation: PathBuf,
    pub tools: ToolConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let t1 = root.join("t1.nii.gz");
        write_volume(&t1, &t1_grid(), vec![50.0; (N / 2).pow(3)]);

        let mut flair_values = vec![BACKGROUND; N * N * N];
        for voxel in large_lesion().into_iter().chain([SMALL_LESION]) {
            flair_values[offset(voxel)] = LESION;
        }
        let flair = root.join("flair.nii.gz");
        write_volume(&flair, &flair_grid(), flair_values);

        let mut seg_values = vec![0.0; N * N * N];
        for voxel in large_lesion().into_iter().chain([SMALL_LESION]) {
            seg_values[offset(voxel)] = 1.0;
        }
        let existing_segmentation = root.join("existing_seg.nii.gz");
        write_volume(&existing_segmentation, &flair_grid(), seg_values);

        let atlas_dir = root.join("atlas");
        fs::create_dir(&atlas_dir).unwrap();
        let atlas_t1 = atlas_dir.join("atlas_t1.nii.gz");
        write_volume(&atlas_t1, &flair_grid(), vec![50.0; N * N * N]);

        // Periventricular band crossing the large lesion's first voxel.
        let mut regions = vec![0.0; N * N * N];
        for x in 0..3 {
            regions[offset([x, 2, 2])] = 1.0;
        }
        let atlas_regions = atlas_dir.join("atlas_regions.nii.gz");
        write_volume(&atlas_regions, &flair_grid(), regions);

        let model_dir = root.join("model");
        fs::create_dir(&model_dir).unwrap();
        for name in ["member-a.onnx", "member-b.onnx"] {
            fs::write(model_dir.join(name), b"").unwrap();
        }

        let tools = ToolConfig {
            atlas_t1,
            atlas_regions,
            model_dir,
            ..ToolConfig::default()
        };

        Self {
            t1,
            flair,
            output: root.join("out"),
            existing_segmentation,
            tools,
            dir,
        }
    }

    pub fn builder(&self) -> RunConfigBuilder {
        RunConfig::builder(&self.t1, &self.flair, &self.output)
            .tools(self.tools.clone())
            .threads(2)
    }

    pub fn output_names(&self) -> BTreeSet<String> {
        fs::read_dir(&self.output)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }
}

/// Names of collaborator calls, in order.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<&'static str>>>);

impl CallLog {
    pub fn push(&self, call: &'static str) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }
}

/// Brain mask = every non-zero voxel.
pub struct ThresholdStripper {
    pub log: CallLog,
}

impl SkullStripper for ThresholdStripper {
    fn strip(
        &self,
        input: &VolumeFile,
        brain_out: &Path,
        mask_out: &Path,
        _device: Device,
        _mode: StripMode,
    ) -> Result<Stripped> {
        self.log.push("strip");
        input.ensure_role(&[Role::Anatomical], "skull strip")?;
        let volume: Volume<B> = input.load(&Default::default())?;
        let mask: Vec<f32> = volume
            .voxels()?
            .iter()
            .map(|v| if *v > 0.0 { 1.0 } else { 0.0 })
            .collect();
        let mask = VolumeFile::store(mask_out, &volume.with_voxels(mask, Role::Mask)?)?;
        let brain = VolumeFile::store(brain_out, &volume.apply_mask(&mask.load(&Default::default())?)?)?;
        Ok(Stripped { brain, mask })
    }
}

/// Registrations are the identity, except FLAIR→atlas, whose matrix moves
/// atlas points by `flair_shift_mm` along x to find the FLAIR sample.
///
/// With a positive shift, FLAIR content appears that many millimetres further
/// towards -x in atlas space.
pub struct TranslatingRegistrar {
    pub log: CallLog,
    pub flair_shift_mm: f64,
}

impl TranslatingRegistrar {
    pub fn identity(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            flair_shift_mm: 0.0,
        }
    }

    fn translation(
        &self,
        moving: &VolumeFile,
        fixed: &VolumeFile,
        matrix: &Path,
        shift_x: f64,
    ) -> Result<SpatialTransform> {
        let mut affine = Matrix4::identity();
        affine[(0, 3)] = shift_x;
        lstk_io::write_affine(matrix, &affine)?;
        Ok(SpatialTransform {
            from: moving.space,
            to: fixed.space,
            from_reference: moving.path.clone(),
            to_reference: fixed.path.clone(),
            kind: TransformKind::Affine {
                matrix: matrix.to_path_buf(),
            },
        })
    }
}

impl SpatialRegistrar for TranslatingRegistrar {
    fn rigid_register(
        &self,
        moving: &VolumeFile,
        fixed: &VolumeFile,
        resampled_out: &Path,
        matrix_out: &Path,
        _threads: usize,
    ) -> Result<(VolumeFile, SpatialTransform)> {
        self.log.push("rigid_register");
        let transform = self.translation(moving, fixed, matrix_out, 0.0)?;
        let resampled = apply_affine::<B>(moving, &transform, WarpDirection::Forward, resampled_out, &Default::default())?;
        Ok((resampled, transform))
    }

    fn register_to_atlas(
        &self,
        atlas_t1: &VolumeFile,
        t1: &VolumeFile,
        flair: &VolumeFile,
        outputs: &AtlasOutputs,
        _threads: usize,
    ) -> Result<AtlasRegistration> {
        self.log.push("register_to_atlas");
        let t1_to_atlas = self.translation(t1, atlas_t1, &outputs.t1_matrix, 0.0)?;
        let flair_to_atlas = self.translation(flair, atlas_t1, &outputs.flair_matrix, self.flair_shift_mm)?;
        Ok(AtlasRegistration {
            t1: apply_affine::<B>(t1, &t1_to_atlas, WarpDirection::Forward, &outputs.t1, &Default::default())?,
            flair: apply_affine::<B>(flair, &flair_to_atlas, WarpDirection::Forward, &outputs.flair, &Default::default())?,
            t1_to_atlas,
            flair_to_atlas,
        })
    }

    fn register_deformable(
        &self,
        fixed: &VolumeFile,
        moving: &VolumeFile,
        outputs: &DeformableOutputs,
        _threads: usize,
    ) -> Result<SpatialTransform> {
        self.log.push("register_deformable");
        self.translation(moving, fixed, &outputs.affine, 0.0)
    }

    fn apply_transform(
        &self,
        volume: &VolumeFile,
        transform: &SpatialTransform,
        direction: WarpDirection,
        output: &Path,
        _threads: usize,
    ) -> Result<VolumeFile> {
        self.log.push("apply_transform");
        apply_affine::<B>(volume, transform, direction, output, &Default::default())
    }
}

/// Path of a workspace volume under the default naming.
pub fn workspace_volume(temp: &Path, role: Role, space: Space, descriptor: &str) -> PathBuf {
    temp.join(Naming::default().volume_name(role, space, descriptor).unwrap())
}

/// Asserts `masked` equals `input` inside `mask` and zero outside it.
pub fn assert_masked(input: &[f32], mask: &[f32], masked: &[f32]) {
    assert_eq!(input.len(), masked.len());
    assert_eq!(mask.len(), masked.len());
    for (i, ((value, inside), out)) in input.iter().zip(mask).zip(masked).enumerate() {
        let expected = if *inside > 0.0 { *value } else { 0.0 };
        assert_eq!(*out, expected, "voxel {i}");
    }
}

/// Writes the normalized FLAIR, scaled by 1.0 for `*-a.onnx` and 0.8
/// otherwise, as the probability map.
pub struct EchoModelRunner;

impl ModelRunner for EchoModelRunner {
    fn run(&self, model: &Path, _t1: &Path, flair: &Path, output: &Path, _device: Device) -> Result<()> {
        let scale = if model.to_string_lossy().ends_with("-a.onnx") { 1.0 } else { 0.8 };
        let image = lstk_io::read_image::<B, _>(flair, &Default::default())?;
        let values = image.voxels()?.into_iter().map(|v| v * scale).collect();
        lstk_io::write_image(output, &image.with_voxels(values)?)?;
        Ok(())
    }
}

/// A model process that always crashes.
pub struct CrashingModelRunner;

impl ModelRunner for CrashingModelRunner {
    fn run(&self, _model: &Path, _t1: &Path, _flair: &Path, _output: &Path, _device: Device) -> Result<()> {
        Err(PipelineError::external_tool("segmentation", Some(139), "segmentation fault"))
    }
}

pub fn stages_with(log: &CallLog, runner: Box<dyn ModelRunner>) -> Stages {
    stages_from(TranslatingRegistrar::identity(log), log, runner)
}

/// Fake stages whose FLAIR→atlas registration is a translation along x.
pub fn shifted_stages(log: &CallLog, flair_shift_mm: f64) -> Stages {
    let registrar = TranslatingRegistrar {
        log: log.clone(),
        flair_shift_mm,
    };
    stages_from(registrar, log, Box::new(EchoModelRunner))
}

fn stages_from(registrar: TranslatingRegistrar, log: &CallLog, runner: Box<dyn ModelRunner>) -> Stages {
    let registrar: Arc<dyn SpatialRegistrar> = Arc::new(registrar);
    Stages::new(
        registrar.clone(),
        Box::new(AtlasAnnotator::<B>::new(registrar, Default::default())),
        Box::new(LesionStatsAggregator::<B>::new(Default::default())),
    )
    .with_stripper(Box::new(ThresholdStripper { log: log.clone() }))
    .with_segmenter(Box::new(EnsembleSegmenter::<B>::new(runner, Default::default())))
}

pub fn fake_stages(log: &CallLog) -> Stages {
    stages_with(log, Box::new(EchoModelRunner))
}

pub fn orchestrator(config: RunConfig, stages: Stages, history: &HistoryCallback) -> PipelineOrchestrator<B> {
    PipelineOrchestrator::<B>::new(config, stages, Default::default()).with_callback(Arc::new(history.clone()))
}
