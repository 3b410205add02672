//! Orchestration of the lstk lesion segmentation pipeline.
//!
//! A [`RunConfig`] selects one run mode; [`PipelineOrchestrator`] composes the
//! [`stages`] into that mode inside a [`WorkspaceManager`] directory and
//! publishes the native FLAIR results.

pub mod artifact;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod process;
pub mod progress;
pub mod stages;
pub mod validation;
pub mod workspace;

pub use artifact::{SpatialTransform, TransformKind, VolumeFile, WarpDirection};
pub use config::{ClipBounds, Device, RunConfig, RunConfigBuilder, RunMode, StripMode, ToolConfig};
pub use error::{ErrorKind, PipelineError, Result};
pub use orchestrator::{Alignment, PipelineOrchestrator, PipelineResult, Stages};
pub use progress::{ConsoleProgressCallback, HistoryCallback, ProgressCallback, ProgressEvent, Stage};
pub use workspace::{Naming, WorkspaceManager};
