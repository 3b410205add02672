//! Progress tracking and callbacks for pipeline runs.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Pipeline stages in the order they can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Preflight,
    StageInputs,
    RigidRegistration,
    AtlasRegistration,
    SkullStrip,
    Segmentation,
    ProbabilityExport,
    WarpToNative,
    Annotation,
    Publish,
    Statistics,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Preflight => "preflight",
            Self::StageInputs => "stage inputs",
            Self::RigidRegistration => "rigid registration",
            Self::AtlasRegistration => "atlas registration",
            Self::SkullStrip => "skull strip",
            Self::Segmentation => "segmentation",
            Self::ProbabilityExport => "probability export",
            Self::WarpToNative => "warp to native",
            Self::Annotation => "annotation",
            Self::Publish => "publish",
            Self::Statistics => "statistics",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Something observable that happened during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    WorkspaceAcquired { path: PathBuf, owned: bool },
    StageStarted(Stage),
    StageCompleted { stage: Stage, elapsed: Duration },
    StageFailed { stage: Stage, error: String },
    WorkspaceReleased { path: PathBuf, removed: bool },
}

/// Progress callback trait for monitoring a run.
pub trait ProgressCallback: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct ConsoleProgressCallback;

impl ProgressCallback for ConsoleProgressCallback {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::WorkspaceAcquired { path, owned } => {
                tracing::info!("Workspace {} ({})", path.display(), if *owned { "temporary" } else { "kept" });
            }
            ProgressEvent::StageStarted(stage) => tracing::info!("Running {}", stage),
            ProgressEvent::StageCompleted { stage, elapsed } => {
                tracing::info!("Finished {} in {:.2}s", stage, elapsed.as_secs_f64());
            }
            ProgressEvent::StageFailed { stage, error } => tracing::error!("{} failed: {}", stage, error),
            ProgressEvent::WorkspaceReleased { path, removed } => {
                if *removed {
                    tracing::info!("Removed workspace {}", path.display());
                }
            }
        }
    }
}

/// Records every event.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl HistoryCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Stages that started, in order.
    pub fn started_stages(&self) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::StageStarted(stage) => Some(stage),
                _ => None,
            })
            .collect()
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_event(&self, event: &ProgressEvent) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
