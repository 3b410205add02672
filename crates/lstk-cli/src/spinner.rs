//! Terminal progress for pipeline runs.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use lstk_pipeline::{ProgressCallback, ProgressEvent};

/// Spinner showing the running stage; completed stages are printed above it.
pub struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for SpinnerProgress {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::StageStarted(stage) => self.bar.set_message(format!("{stage}...")),
            ProgressEvent::StageCompleted { stage, elapsed } => {
                self.bar.println(format!("  {stage} ({:.1}s)", elapsed.as_secs_f64()));
            }
            ProgressEvent::StageFailed { stage, .. } => self.bar.println(format!("  {stage} failed")),
            ProgressEvent::WorkspaceAcquired { .. } | ProgressEvent::WorkspaceReleased { .. } => {}
        }
    }
}
