//! Run configuration.
//!
//! [`RunConfig`] is resolved once from the command line (or a test) through
//! [`RunConfigBuilder`] and never changes during a run. Flag combinations are
//! checked in [`RunConfigBuilder::build`], before any workspace exists.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use tracing::warn;

use crate::error::{PipelineError, Result};

/// Compute device handed to the skull stripper and the segmentation models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
}

impl FromStr for Device {
    type Err = PipelineError;

    /// `cpu`, a GPU index (`0`) or `cuda:<index>`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("cpu") {
            return Ok(Self::Cpu);
        }
        let index = s.strip_prefix("cuda:").unwrap_or(s);
        index
            .parse::<usize>()
            .map(Self::Cuda)
            .map_err(|_| PipelineError::configuration(format!("invalid device '{s}', expected 'cpu' or a GPU index")))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda(i) => write!(f, "cuda:{i}"),
        }
    }
}

/// Skull stripping quality/speed trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StripMode {
    Fast,
    #[default]
    Accurate,
}

/// Intensity clipping percentiles applied before segmentation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipBounds {
    pub low: f64,
    pub high: f64,
}

impl Default for ClipBounds {
    fn default() -> Self {
        Self { low: 0.5, high: 99.5 }
    }
}

impl ClipBounds {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.low) || !(0.0..=100.0).contains(&self.high) || self.low >= self.high {
            return Err(PipelineError::configuration(format!(
                "clipping percentiles must satisfy 0 <= low < high <= 100, got {} {}",
                self.low, self.high
            )));
        }
        Ok(())
    }
}

/// What a run produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Annotate a segmentation that already exists in native FLAIR space.
    AnnotateOnly { existing_segmentation: PathBuf },
    /// Segment in atlas space; annotate too unless `annotate` is false.
    Full { annotate: bool },
}

impl RunMode {
    pub fn is_annotate_only(&self) -> bool {
        matches!(self, Self::AnnotateOnly { .. })
    }

    pub fn annotates(&self) -> bool {
        match self {
            Self::AnnotateOnly { .. } => true,
            Self::Full { annotate } => *annotate,
        }
    }
}

/// Executables and static assets. Every field has a default, so a config
/// file only lists what differs from a standard installation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    /// HD-BET executable name or path.
    pub hd_bet: PathBuf,
    /// greedy executable name or path.
    pub greedy: PathBuf,
    /// Program that runs one segmentation model on a (T1, FLAIR) pair.
    pub model_runner: PathBuf,
    /// Atlas T1 template, skull stripped.
    pub atlas_t1: PathBuf,
    /// Atlas region label map (1 periventricular, 2 juxtacortical, 4 infratentorial).
    pub atlas_regions: PathBuf,
    /// Directory holding the `*.onnx` ensemble members.
    pub model_dir: PathBuf,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            hd_bet: PathBuf::from("hd-bet"),
            greedy: PathBuf::from("greedy"),
            model_runner: PathBuf::from("lstk-model-runner"),
            atlas_t1: PathBuf::from("atlas/sub-mni152_space-mni_t1.nii.gz"),
            atlas_regions: PathBuf::from("atlas/sub-mni152_space-mni_msmask.nii.gz"),
            model_dir: PathBuf::from("model"),
        }
    }
}

impl ToolConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PipelineError::configuration(format!("invalid tool config: {e}")))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| PipelineError::configuration(format!("cannot read tool config {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Resolve relative asset paths against `base` (the config file's directory).
    pub fn with_assets_relative_to(mut self, base: &Path) -> Self {
        for asset in [&mut self.atlas_t1, &mut self.atlas_regions, &mut self.model_dir] {
            if asset.is_relative() {
                *asset = base.join(&*asset);
            }
        }
        self
    }
}

/// Immutable configuration of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub t1: PathBuf,
    pub flair: PathBuf,
    pub output: PathBuf,
    pub temp: Option<PathBuf>,
    pub mode: RunMode,
    /// Inputs are already skull stripped.
    pub stripped: bool,
    pub strip_mode: StripMode,
    pub probability_map: bool,
    pub threshold: f32,
    pub min_lesion_voxels: usize,
    pub clip: ClipBounds,
    pub device: Device,
    pub threads: usize,
    pub tools: ToolConfig,
}

impl RunConfig {
    pub fn builder(t1: impl Into<PathBuf>, flair: impl Into<PathBuf>, output: impl Into<PathBuf>) -> RunConfigBuilder {
        RunConfigBuilder::new(t1, flair, output)
    }
}

/// Raw flags, as given on the command line.
#[derive(Debug, Clone)]
pub struct RunConfigBuilder {
    t1: PathBuf,
    flair: PathBuf,
    output: PathBuf,
    temp: Option<PathBuf>,
    existing_seg: Option<PathBuf>,
    segment_only: bool,
    annotate_only: bool,
    stripped: bool,
    fast_mode: bool,
    probability_map: bool,
    threshold: f32,
    min_lesion_voxels: usize,
    clip: ClipBounds,
    device: Device,
    threads: usize,
    tools: ToolConfig,
}

impl RunConfigBuilder {
    pub fn new(t1: impl Into<PathBuf>, flair: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            t1: t1.into(),
            flair: flair.into(),
            output: output.into(),
            temp: None,
            existing_seg: None,
            segment_only: false,
            annotate_only: false,
            stripped: false,
            fast_mode: false,
            probability_map: false,
            threshold: 0.5,
            min_lesion_voxels: 0,
            clip: ClipBounds::default(),
            device: Device::Cpu,
            threads: 8,
            tools: ToolConfig::default(),
        }
    }

    pub fn temp(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp = Some(dir.into());
        self
    }

    pub fn existing_segmentation(mut self, path: impl Into<PathBuf>) -> Self {
        self.existing_seg = Some(path.into());
        self
    }

    pub fn segment_only(mut self, on: bool) -> Self {
        self.segment_only = on;
        self
    }

    pub fn annotate_only(mut self, on: bool) -> Self {
        self.annotate_only = on;
        self
    }

    pub fn stripped(mut self, on: bool) -> Self {
        self.stripped = on;
        self
    }

    pub fn fast_mode(mut self, on: bool) -> Self {
        self.fast_mode = on;
        self
    }

    pub fn probability_map(mut self, on: bool) -> Self {
        self.probability_map = on;
        self
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn min_lesion_voxels(mut self, voxels: usize) -> Self {
        self.min_lesion_voxels = voxels;
        self
    }

    pub fn clip(mut self, low: f64, high: f64) -> Self {
        self.clip = ClipBounds { low, high };
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn tools(mut self, tools: ToolConfig) -> Self {
        self.tools = tools;
        self
    }

    /// Resolve the run mode and check numeric parameters.
    pub fn build(self) -> Result<RunConfig> {
        let mode = match (self.annotate_only, self.existing_seg) {
            (true, Some(existing_segmentation)) => {
                if self.segment_only {
                    warn!("both --annotate_only and --segment_only given; annotate-only takes precedence");
                }
                RunMode::AnnotateOnly { existing_segmentation }
            }
            (true, None) => {
                return Err(PipelineError::configuration(
                    "annotate-only mode needs an existing segmentation (--existing_seg)",
                ));
            }
            (false, Some(path)) => {
                return Err(PipelineError::configuration(format!(
                    "an existing segmentation ({}) is only used in annotate-only mode; add --annotate_only",
                    path.display()
                )));
            }
            (false, None) => RunMode::Full {
                annotate: !self.segment_only,
            },
        };

        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(PipelineError::configuration(format!(
                "threshold must lie in [0, 1], got {}",
                self.threshold
            )));
        }
        self.clip.validate()?;
        if self.threads == 0 {
            return Err(PipelineError::configuration("threads must be at least 1"));
        }

        Ok(RunConfig {
            t1: self.t1,
            flair: self.flair,
            output: self.output,
            temp: self.temp,
            mode,
            stripped: self.stripped,
            strip_mode: if self.fast_mode { StripMode::Fast } else { StripMode::Accurate },
            probability_map: self.probability_map,
            threshold: self.threshold,
            min_lesion_voxels: self.min_lesion_voxels,
            clip: self.clip,
            device: self.device,
            threads: self.threads,
            tools: self.tools,
        })
    }
}
