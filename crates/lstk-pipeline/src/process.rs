//! Running external tools.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::{PipelineError, Result};

/// Lines of stderr kept in an [`PipelineError::ExternalTool`] message.
const STDERR_TAIL_LINES: usize = 20;

/// Resolve an executable name on `PATH` (or check an explicit path).
///
/// A missing tool is a configuration error so it surfaces before any stage
/// runs.
pub fn resolve_executable(program: &Path) -> Result<PathBuf> {
    which::which(program).map_err(|e| {
        PipelineError::configuration(format!("required tool '{}' not found: {e}", program.display()))
    })
}

/// One invocation of an external program on behalf of a pipeline stage.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    stage: String,
    program: PathBuf,
    args: Vec<OsString>,
}

impl ExternalCommand {
    pub fn new(stage: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            stage: stage.into(),
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion. Non-zero exit is an [`PipelineError::ExternalTool`]
    /// carrying the tail of stderr.
    pub fn run(&self) -> Result<()> {
        debug!(stage = %self.stage, command = %self.display(), "running external tool");

        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|e| {
                PipelineError::external_tool(
                    &self.stage,
                    None,
                    format!("cannot start {}: {e}", self.program.display()),
                )
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
        let message = if tail.is_empty() {
            format!("{} exited unsuccessfully", self.program.display())
        } else {
            tail
        };
        Err(PipelineError::external_tool(&self.stage, output.status.code(), message))
    }

    /// Run, then check that every expected output file exists.
    pub fn run_expecting(&self, outputs: &[&Path]) -> Result<()> {
        self.run()?;
        for path in outputs {
            if !path.is_file() {
                return Err(PipelineError::missing_output(&self.stage, path));
            }
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_display_joins_args() {
        let cmd = ExternalCommand::new("registration", "greedy").args(["-d", "3"]).arg("-a");
        assert_eq!(cmd.display(), "greedy -d 3 -a");
    }

    #[test]
    fn test_success() {
        ExternalCommand::new("noop", "sh").args(["-c", "exit 0"]).run().unwrap();
    }

    #[test]
    fn test_failure_carries_exit_code_and_stderr() {
        let err = ExternalCommand::new("skull strip", "sh")
            .args(["-c", "echo 'no GPU' >&2; exit 3"])
            .run()
            .unwrap_err();
        match err {
            PipelineError::ExternalTool { stage, exit_code, message } => {
                assert_eq!(stage, "skull strip");
                assert_eq!(exit_code, Some(3));
                assert_eq!(message, "no GPU");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_program() {
        let err = ExternalCommand::new("segment", "/nonexistent/model-runner").run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalTool);
    }

    #[test]
    fn test_missing_output_after_success() {
        let err = ExternalCommand::new("segment", "sh")
            .args(["-c", "true"])
            .run_expecting(&[Path::new("/nonexistent/probmap.nii.gz")])
            .unwrap_err();
        assert!(err.to_string().contains("was not written"));
    }

    #[test]
    fn test_resolve_missing_executable_is_configuration_error() {
        let err = resolve_executable(Path::new("lstk-definitely-not-installed")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
