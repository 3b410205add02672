//! Working directory management.
//!
//! Every intermediate file of a run lives in one directory under a name that
//! is a pure function of (subject, session, space, descriptor, role). An owned
//! directory is a fresh temp dir removed when the manager is released or
//! dropped; a supplied directory is created if needed and left in place.

use std::fs;
use std::path::{Path, PathBuf};

use lstk_core::{Role, Space};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

const VOLUME_EXTENSION: &str = "nii.gz";
const MATRIX_EXTENSION: &str = "mat";

/// Subject/session labels used in artifact names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naming {
    pub subject: String,
    pub session: String,
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            subject: "X".to_string(),
            session: "Y".to_string(),
        }
    }
}

/// What a transform file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformFile {
    Affine,
    Warp,
    InverseWarp,
}

impl TransformFile {
    fn suffix(self) -> &'static str {
        match self {
            Self::Affine => "affine",
            Self::Warp => "warp",
            Self::InverseWarp => "invwarp",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Self::Affine => MATRIX_EXTENSION,
            Self::Warp | Self::InverseWarp => VOLUME_EXTENSION,
        }
    }
}

impl Naming {
    /// `sub-<s>_ses-<t>_space-<space>_desc-<descriptor>_<role>.nii.gz`
    pub fn volume_name(&self, role: Role, space: Space, descriptor: &str) -> Result<String> {
        check_descriptor(descriptor)?;
        Ok(format!(
            "sub-{}_ses-{}_space-{}_desc-{}_{}.{}",
            self.subject,
            self.session,
            space.tag(),
            descriptor,
            role.tag(),
            VOLUME_EXTENSION
        ))
    }

    /// `sub-<s>_ses-<t>_from-<a>_to-<b>_desc-<descriptor>_<kind>.<ext>`
    pub fn transform_name(&self, from: Space, to: Space, descriptor: &str, kind: TransformFile) -> Result<String> {
        check_descriptor(descriptor)?;
        Ok(format!(
            "sub-{}_ses-{}_from-{}_to-{}_desc-{}_{}.{}",
            self.subject,
            self.session,
            from.tag(),
            to.tag(),
            descriptor,
            kind.suffix(),
            kind.extension()
        ))
    }
}

fn check_descriptor(descriptor: &str) -> Result<()> {
    if descriptor.is_empty() || !descriptor.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(PipelineError::configuration(format!(
            "artifact descriptor '{descriptor}' must be non-empty and alphanumeric"
        )));
    }
    Ok(())
}

/// An acquired working directory.
#[derive(Debug)]
pub struct WorkspaceManager {
    root: PathBuf,
    naming: Naming,
    owned: Option<TempDir>,
}

impl WorkspaceManager {
    /// Acquire a workspace: `supplied` is created if absent and kept after
    /// the run; `None` creates a fresh temp directory owned by the manager.
    pub fn acquire(supplied: Option<&Path>, naming: Naming) -> Result<Self> {
        match supplied {
            Some(dir) => {
                if dir.exists() && !dir.is_dir() {
                    return Err(PipelineError::configuration(format!(
                        "temp path {} exists and is not a directory",
                        dir.display()
                    )));
                }
                fs::create_dir_all(dir)
                    .map_err(|e| PipelineError::io(format!("cannot create workspace {}", dir.display()), e))?;
                info!(path = %dir.display(), "using supplied workspace");
                Ok(Self {
                    root: dir.to_path_buf(),
                    naming,
                    owned: None,
                })
            }
            None => {
                let temp = tempfile::Builder::new()
                    .prefix("lstk-")
                    .tempdir()
                    .map_err(|e| PipelineError::io("cannot create temporary workspace", e))?;
                info!(path = %temp.path().display(), "created temporary workspace");
                Ok(Self {
                    root: temp.path().to_path_buf(),
                    naming,
                    owned: Some(temp),
                })
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_owned(&self) -> bool {
        self.owned.is_some()
    }

    pub fn naming(&self) -> &Naming {
        &self.naming
    }

    /// Path of a volume artifact.
    pub fn resolve(&self, role: Role, space: Space, descriptor: &str) -> Result<PathBuf> {
        let path = self.root.join(self.naming.volume_name(role, space, descriptor)?);
        debug!(path = %path.display(), "resolved artifact");
        Ok(path)
    }

    /// Path of a transform file.
    pub fn resolve_transform(&self, from: Space, to: Space, descriptor: &str, kind: TransformFile) -> Result<PathBuf> {
        Ok(self.root.join(self.naming.transform_name(from, to, descriptor, kind)?))
    }

    /// Release the workspace, removing it if owned. Removal failures are
    /// logged, not returned.
    pub fn release(mut self) {
        self.remove_owned();
    }

    fn remove_owned(&mut self) {
        if let Some(temp) = self.owned.take() {
            let path = temp.path().to_path_buf();
            match temp.close() {
                Ok(()) => info!(path = %path.display(), "removed temporary workspace"),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove temporary workspace"),
            }
        }
    }
}

impl Drop for WorkspaceManager {
    fn drop(&mut self) {
        self.remove_owned();
    }
}
