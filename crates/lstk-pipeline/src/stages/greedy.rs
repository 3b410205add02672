//! Registration with greedy.
//!
//! Affine and rigid registrations run greedy and apply the resulting matrix in
//! process with the resample filter. Deformable transforms are applied by
//! greedy itself since the warp fields are greedy's own format.

use std::ffi::OsString;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use lstk_core::Interpolation;
use tracing::info;

use super::warp::apply_affine;
use super::{AtlasOutputs, AtlasRegistration, DeformableOutputs, SpatialRegistrar};
use crate::artifact::{SpatialTransform, TransformKind, VolumeFile, WarpDirection};
use crate::error::Result;
use crate::process::{resolve_executable, ExternalCommand};

const ITERATIONS: &str = "100x50x10";
const NCC_RADIUS: &str = "2x2x2";

/// Interpolation values for greedy's `-ri` flag.
fn interpolation_args(interpolation: Interpolation) -> &'static [&'static str] {
    match interpolation {
        Interpolation::Linear => &["LINEAR"],
        Interpolation::Nearest => &["NN"],
        Interpolation::Label => &["LABEL", "0.2vox"],
    }
}

fn os(parts: &[&str]) -> Vec<OsString> {
    parts.iter().map(OsString::from).collect()
}

/// `greedy -a` arguments for a `dof`-parameter linear registration.
pub fn linear_args(fixed: &Path, moving: &Path, matrix: &Path, dof: u8, threads: usize) -> Vec<OsString> {
    let mut args = os(&["-d", "3", "-a", "-dof"]);
    args.push(dof.to_string().into());
    args.extend(os(&["-m", "NMI", "-ia-image-centers", "-n", ITERATIONS, "-threads"]));
    args.push(threads.to_string().into());
    args.push("-i".into());
    args.push(fixed.into());
    args.push(moving.into());
    args.push("-o".into());
    args.push(matrix.into());
    args
}

/// Deformable registration initialised with an affine matrix.
pub fn deformable_args(fixed: &Path, moving: &Path, outputs: &DeformableOutputs, threads: usize) -> Vec<OsString> {
    let mut args = os(&["-d", "3", "-m", "NCC", NCC_RADIUS, "-n", ITERATIONS, "-threads"]);
    args.push(threads.to_string().into());
    args.push("-i".into());
    args.push(fixed.into());
    args.push(moving.into());
    args.push("-it".into());
    args.push(outputs.affine.clone().into());
    args.push("-o".into());
    args.push(outputs.warp.clone().into());
    args.push("-oinv".into());
    args.push(outputs.inverse_warp.clone().into());
    args
}

/// Reslicing through a deformable transform.
///
/// Forward applies `warp` after `affine`; inverse applies the inverted affine
/// after the inverse warp.
#[allow(clippy::too_many_arguments)]
pub fn reslice_args(
    reference: &Path,
    interpolation: Interpolation,
    input: &Path,
    output: &Path,
    affine: &Path,
    warp: &Path,
    direction: WarpDirection,
    threads: usize,
) -> Vec<OsString> {
    let mut args = os(&["-d", "3", "-threads"]);
    args.push(threads.to_string().into());
    args.push("-rf".into());
    args.push(reference.into());
    args.push("-ri".into());
    args.extend(os(interpolation_args(interpolation)));
    args.push("-rm".into());
    args.push(input.into());
    args.push(output.into());
    args.push("-r".into());
    match direction {
        WarpDirection::Forward => {
            args.push(warp.into());
            args.push(affine.into());
        }
        WarpDirection::Inverse => {
            let mut inverted = affine.as_os_str().to_os_string();
            inverted.push(",-1");
            args.push(inverted);
            args.push(warp.into());
        }
    }
    args
}

/// [`SpatialRegistrar`] backed by the greedy executable.
#[derive(Debug, Clone)]
pub struct GreedyRegistrar<B: Backend> {
    program: PathBuf,
    device: B::Device,
    _backend: PhantomData<B>,
}

impl<B: Backend> GreedyRegistrar<B> {
    /// Resolve `program` on `PATH`; fails with a configuration error when absent.
    pub fn new(program: &Path, device: B::Device) -> Result<Self> {
        Ok(Self {
            program: resolve_executable(program)?,
            device,
            _backend: PhantomData,
        })
    }

    fn command(&self, stage: &str) -> ExternalCommand {
        ExternalCommand::new(stage, &self.program)
    }

    fn linear(
        &self,
        stage: &str,
        fixed: &VolumeFile,
        moving: &VolumeFile,
        matrix: &Path,
        dof: u8,
        threads: usize,
    ) -> Result<SpatialTransform> {
        self.command(stage)
            .args(linear_args(&fixed.path, &moving.path, matrix, dof, threads))
            .run_expecting(&[matrix])?;
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

impl<B: Backend> SpatialRegistrar for GreedyRegistrar<B> {
    fn rigid_register(
        &self,
        moving: &VolumeFile,
        fixed: &VolumeFile,
        resampled_out: &Path,
        matrix_out: &Path,
        threads: usize,
    ) -> Result<(VolumeFile, SpatialTransform)> {
        let transform = self.linear("rigid registration", fixed, moving, matrix_out, 6, threads)?;
        let resampled = apply_affine::<B>(moving, &transform, WarpDirection::Forward, resampled_out, &self.device)?;
        Ok((resampled, transform))
    }

    fn register_to_atlas(
        &self,
        atlas_t1: &VolumeFile,
        t1: &VolumeFile,
        flair: &VolumeFile,
        outputs: &AtlasOutputs,
        threads: usize,
    ) -> Result<AtlasRegistration> {
        info!(atlas = %atlas_t1.path.display(), "registering T1 and FLAIR to atlas");
        let t1_to_atlas = self.linear("atlas registration", atlas_t1, t1, &outputs.t1_matrix, 12, threads)?;
        let flair_to_atlas = self.linear("atlas registration", atlas_t1, flair, &outputs.flair_matrix, 12, threads)?;

        let t1 = apply_affine::<B>(t1, &t1_to_atlas, WarpDirection::Forward, &outputs.t1, &self.device)?;
        let flair = apply_affine::<B>(flair, &flair_to_atlas, WarpDirection::Forward, &outputs.flair, &self.device)?;
        Ok(AtlasRegistration {
            t1,
            flair,
            t1_to_atlas,
            flair_to_atlas,
        })
    }

    fn register_deformable(
        &self,
        fixed: &VolumeFile,
        moving: &VolumeFile,
        outputs: &DeformableOutputs,
        threads: usize,
    ) -> Result<SpatialTransform> {
        self.linear("deformable registration", fixed, moving, &outputs.affine, 12, threads)?;
        self.command("deformable registration")
            .args(deformable_args(&fixed.path, &moving.path, outputs, threads))
            .run_expecting(&[outputs.warp.as_path(), outputs.inverse_warp.as_path()])?;

        Ok(SpatialTransform {
            from: moving.space,
            to: fixed.space,
            from_reference: moving.path.clone(),
            to_reference: fixed.path.clone(),
            kind: TransformKind::Deformable {
                affine: outputs.affine.clone(),
                warp: outputs.warp.clone(),
                inverse_warp: outputs.inverse_warp.clone(),
            },
        })
    }

    fn apply_transform(
        &self,
        volume: &VolumeFile,
        transform: &SpatialTransform,
        direction: WarpDirection,
        output: &Path,
        threads: usize,
    ) -> Result<VolumeFile> {
        match &transform.kind {
            TransformKind::Affine { .. } => apply_affine::<B>(volume, transform, direction, output, &self.device),
            TransformKind::Deformable {
                affine,
                warp,
                inverse_warp,
            } => {
                transform.check_source(volume, direction)?;
                let warp = match direction {
                    WarpDirection::Forward => warp,
                    WarpDirection::Inverse => inverse_warp,
                };
                self.command("warp")
                    .args(reslice_args(
                        transform.target_reference(direction),
                        volume.role.interpolation(),
                        &volume.path,
                        output,
                        affine,
                        warp,
                        direction,
                        threads,
                    ))
                    .run_expecting(&[output])?;
                Ok(VolumeFile::new(output, transform.target_space(direction), volume.role))
            }
        }
    }
}
