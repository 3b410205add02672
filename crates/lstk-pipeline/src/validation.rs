//! Preflight checks.
//!
//! Everything that can be known to fail before the first stage runs is
//! checked here and reported as a configuration error.

use std::path::Path;

use lstk_core::volume::GRID_TOLERANCE;
use tracing::debug;

use crate::config::{RunConfig, RunMode};
use crate::error::{PipelineError, Result};
use crate::stages::segmenter::list_models;

fn require_file(path: &Path, what: &str) -> Result<()> {
    if !path.is_file() {
        return Err(PipelineError::configuration(format!("{what} not found: {}", path.display())));
    }
    Ok(())
}

fn require_directory_or_absent(path: &Path, what: &str) -> Result<()> {
    if path.exists() && !path.is_dir() {
        return Err(PipelineError::configuration(format!(
            "{what} {} exists and is not a directory",
            path.display()
        )));
    }
    Ok(())
}

/// Check inputs, output locations and assets for `config`'s run mode.
pub fn preflight(config: &RunConfig) -> Result<()> {
    require_file(&config.t1, "T1 image")?;
    require_file(&config.flair, "FLAIR image")?;
    require_directory_or_absent(&config.output, "output path")?;
    if let Some(temp) = &config.temp {
        require_directory_or_absent(temp, "temp path")?;
    }

    if config.mode.annotates() {
        require_file(&config.tools.atlas_t1, "atlas T1 template")?;
        require_file(&config.tools.atlas_regions, "atlas region map")?;
    }

    match &config.mode {
        RunMode::AnnotateOnly { existing_segmentation } => {
            require_file(existing_segmentation, "existing segmentation")?;
            let seg = lstk_io::read_grid(existing_segmentation)?;
            let flair = lstk_io::read_grid(&config.flair)?;
            if !seg.approx_eq(&flair, GRID_TOLERANCE) {
                return Err(PipelineError::configuration(format!(
                    "existing segmentation is not on the FLAIR grid ({})",
                    seg.describe_difference(&flair)
                )));
            }
        }
        RunMode::Full { .. } => {
            require_file(&config.tools.atlas_t1, "atlas T1 template")?;
            let models = list_models(&config.tools.model_dir)?;
            debug!(count = models.len(), "found ensemble models");
        }
    }
    Ok(())
}
