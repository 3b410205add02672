//! On-disk artifacts exchanged between stages.

use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use lstk_core::{CoreError, Grid, Role, Space, Volume};

use crate::error::{PipelineError, Result};

/// A volume file together with the space and role of its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeFile {
    pub path: PathBuf,
    pub space: Space,
    pub role: Role,
}

impl VolumeFile {
    pub fn new(path: impl Into<PathBuf>, space: Space, role: Role) -> Self {
        Self {
            path: path.into(),
            space,
            role,
        }
    }

    pub fn ensure_space(&self, expected: Space, context: &str) -> Result<()> {
        if self.space != expected {
            return Err(CoreError::space_mismatch(context, expected, self.space).into());
        }
        Ok(())
    }

    pub fn ensure_role(&self, accepted: &[Role], context: &str) -> Result<()> {
        if !accepted.contains(&self.role) {
            return Err(CoreError::role_mismatch(context, accepted, self.role).into());
        }
        Ok(())
    }

    /// Fail with a stage error unless the file exists.
    pub fn ensure_exists(&self, stage: &str) -> Result<()> {
        if !self.path.is_file() {
            return Err(PipelineError::missing_output(stage, &self.path));
        }
        Ok(())
    }

    pub fn grid(&self) -> Result<Grid> {
        Ok(lstk_io::read_grid(&self.path)?)
    }

    pub fn load<B: Backend>(&self, device: &B::Device) -> Result<Volume<B>> {
        Ok(lstk_io::read_volume(&self.path, self.space, self.role, device)?)
    }

    /// Write `volume` to `path` and describe the result.
    pub fn store<B: Backend>(path: impl Into<PathBuf>, volume: &Volume<B>) -> Result<Self> {
        let path = path.into();
        lstk_io::write_volume(&path, volume)?;
        Ok(Self::new(path, volume.space(), volume.role()))
    }

    /// Same file, new tags. Used when an external tool's output changes the
    /// meaning of a copy (e.g. a rigid resample moves T1 onto the FLAIR grid).
    pub fn retag(&self, space: Space, role: Role) -> Self {
        Self::new(self.path.clone(), space, role)
    }
}

/// Direction in which a [`SpatialTransform`] is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarpDirection {
    /// `from` space → `to` space.
    Forward,
    /// `to` space → `from` space.
    Inverse,
}

/// Files making up a transform.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformKind {
    /// RAS 4×4 matrix mapping `to`-space points onto `from`-space points.
    Affine { matrix: PathBuf },
    /// Affine followed by a dense warp, with the inverse warp alongside.
    Deformable {
        affine: PathBuf,
        warp: PathBuf,
        inverse_warp: PathBuf,
    },
}

/// A directed mapping between two spaces, computed once and reused for
/// every later warp in either direction.
///
/// `from` is the moving side of the registration and `to` the fixed side.
/// The reference volumes define the sampling grid of each end.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialTransform {
    pub from: Space,
    pub to: Space,
    pub from_reference: PathBuf,
    pub to_reference: PathBuf,
    pub kind: TransformKind,
}

impl SpatialTransform {
    /// Space a volume must be in to be warped in `direction`.
    pub fn source_space(&self, direction: WarpDirection) -> Space {
        match direction {
            WarpDirection::Forward => self.from,
            WarpDirection::Inverse => self.to,
        }
    }

    /// Space of the warped result.
    pub fn target_space(&self, direction: WarpDirection) -> Space {
        match direction {
            WarpDirection::Forward => self.to,
            WarpDirection::Inverse => self.from,
        }
    }

    /// Reference volume whose grid the warped result is sampled on.
    pub fn target_reference(&self, direction: WarpDirection) -> &Path {
        match direction {
            WarpDirection::Forward => &self.to_reference,
            WarpDirection::Inverse => &self.from_reference,
        }
    }

    /// Check that `volume` can be warped in `direction`.
    pub fn check_source(&self, volume: &VolumeFile, direction: WarpDirection) -> Result<()> {
        volume.ensure_space(self.source_space(direction), "apply transform")
    }
}
