//! Skull stripping with HD-BET.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use lstk_core::Role;

use super::{SkullStripper, Stripped};
use crate::artifact::VolumeFile;
use crate::config::{Device, StripMode};
use crate::error::{PipelineError, Result};
use crate::process::{resolve_executable, ExternalCommand};

const STAGE: &str = "skull strip";

/// [`SkullStripper`] backed by the `hd-bet` executable.
#[derive(Debug, Clone)]
pub struct HdBetStripper {
    program: PathBuf,
}

impl HdBetStripper {
    pub fn new(program: &Path) -> Result<Self> {
        Ok(Self {
            program: resolve_executable(program)?,
        })
    }
}

/// HD-BET writes the mask next to its output as `<stem>_mask.nii.gz`.
pub fn mask_path_for(brain_out: &Path) -> PathBuf {
    let name = brain_out
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name
        .strip_suffix(".nii.gz")
        .or_else(|| name.strip_suffix(".nii"))
        .unwrap_or(&name);
    brain_out.with_file_name(format!("{stem}_mask.nii.gz"))
}

pub fn hd_bet_args(input: &Path, brain_out: &Path, device: Device, mode: StripMode) -> Vec<OsString> {
    let device = match device {
        Device::Cpu => "cpu".to_string(),
        Device::Cuda(i) => i.to_string(),
    };
    let (mode, tta) = match mode {
        StripMode::Fast => ("fast", "0"),
        StripMode::Accurate => ("accurate", "1"),
    };
    vec![
        "-i".into(),
        input.into(),
        "-o".into(),
        brain_out.into(),
        "-device".into(),
        device.into(),
        "-mode".into(),
        mode.into(),
        "-tta".into(),
        tta.into(),
        "-s".into(),
        "1".into(),
    ]
}

impl SkullStripper for HdBetStripper {
    fn strip(
        &self,
        input: &VolumeFile,
        brain_out: &Path,
        mask_out: &Path,
        device: Device,
        mode: StripMode,
    ) -> Result<Stripped> {
        input.ensure_role(&[Role::Anatomical], STAGE)?;

        let written_mask = mask_path_for(brain_out);
        ExternalCommand::new(STAGE, &self.program)
            .args(hd_bet_args(&input.path, brain_out, device, mode))
            .run_expecting(&[brain_out, written_mask.as_path()])?;

        if written_mask != mask_out {
            fs::rename(&written_mask, mask_out).map_err(|e| {
                PipelineError::io(format!("cannot move brain mask to {}", mask_out.display()), e)
            })?;
        }

        Ok(Stripped {
            brain: VolumeFile::new(brain_out, input.space, Role::BrainExtracted),
            mask: VolumeFile::new(mask_out, input.space, Role::Mask),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_path() {
        assert_eq!(
            mask_path_for(Path::new("/w/sub-X_space-mni_desc-stripped_brain.nii.gz")),
            PathBuf::from("/w/sub-X_space-mni_desc-stripped_brain_mask.nii.gz")
        );
        assert_eq!(mask_path_for(Path::new("t1.nii")), PathBuf::from("t1_mask.nii.gz"));
    }

    #[test]
    fn test_args_fast_gpu() {
        let args: Vec<String> = hd_bet_args(Path::new("in.nii.gz"), Path::new("out.nii.gz"), Device::Cuda(1), StripMode::Fast)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args.join(" "), "-i in.nii.gz -o out.nii.gz -device 1 -mode fast -tta 0 -s 1");
    }

    #[test]
    fn test_args_accurate_cpu() {
        let args: Vec<String> = hd_bet_args(Path::new("in.nii.gz"), Path::new("out.nii.gz"), Device::Cpu, StripMode::Accurate)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.join(" ").ends_with("-device cpu -mode accurate -tta 1 -s 1"));
    }
}
