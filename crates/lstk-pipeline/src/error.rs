//! Error types for pipeline runs.
//!
//! Every error aborts the run. [`ErrorKind`] groups them the way a caller
//! reacts to them: fix the invocation, fix the environment, or report a bug.

use std::path::Path;

use lstk_core::CoreError;
use thiserror::Error;

/// Main error type for lstk-pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid flags, missing inputs or missing tools. Raised before any
    /// stage runs.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An external collaborator failed or did not produce its outputs.
    #[error("{stage} failed{}: {message}", .exit_code.map(|c| format!(" with exit code {c}")).unwrap_or_default())]
    ExternalTool {
        stage: String,
        exit_code: Option<i32>,
        message: String,
    },

    /// Two volumes were combined without agreeing on space, role or grid.
    #[error(transparent)]
    SpaceMismatch(CoreError),

    /// Reading or writing a volume or matrix file failed.
    #[error("volume I/O failed: {0:#}")]
    VolumeIo(anyhow::Error),

    /// Filesystem error outside volume decoding.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    ExternalTool,
    SpaceMismatch,
    Io,
}

impl ErrorKind {
    /// Process exit code for the CLI.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Io => 1,
            Self::Configuration => 2,
            Self::ExternalTool => 3,
            Self::SpaceMismatch => 4,
        }
    }
}

impl PipelineError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn external_tool(stage: impl Into<String>, exit_code: Option<i32>, message: impl Into<String>) -> Self {
        Self::ExternalTool {
            stage: stage.into(),
            exit_code,
            message: message.into(),
        }
    }

    /// A stage ran but one of its promised outputs is missing.
    pub fn missing_output(stage: impl Into<String>, path: &Path) -> Self {
        Self::external_tool(stage, None, format!("expected output {} was not written", path.display()))
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::ExternalTool { .. } => ErrorKind::ExternalTool,
            Self::SpaceMismatch(_) => ErrorKind::SpaceMismatch,
            Self::VolumeIo(_) | Self::Io { .. } => ErrorKind::Io,
        }
    }
}

impl From<CoreError> for PipelineError {
    fn from(err: CoreError) -> Self {
        match err {
            e if e.is_tag_mismatch() => Self::SpaceMismatch(e),
            CoreError::InvalidParameter(msg) => Self::Configuration(msg),
            other => Self::VolumeIo(anyhow::Error::new(other)),
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        Self::VolumeIo(err)
    }
}
