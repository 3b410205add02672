use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use burn_ndarray::NdArray;
use clap::Parser;
use lstk_pipeline::{
    ConsoleProgressCallback, Device, PipelineError, PipelineOrchestrator, PipelineResult, RunConfig, Stages, ToolConfig,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod spinner;

use spinner::SpinnerProgress;

type Backend = NdArray<f32>;

#[derive(Parser, Debug)]
#[command(name = "lstk")]
#[command(about = "Segment and annotate white matter lesions from T1 and FLAIR MRI")]
#[command(version)]
struct Cli {
    /// T1-weighted input image (NIfTI)
    #[arg(long)]
    t1: PathBuf,

    /// FLAIR input image (NIfTI)
    #[arg(long)]
    flair: PathBuf,

    /// Output directory, created if absent
    #[arg(short, long)]
    output: PathBuf,

    /// Keep intermediates in this directory instead of a removed temp dir
    #[arg(long)]
    temp: Option<PathBuf>,

    /// Existing segmentation in FLAIR space (requires --annotate_only)
    #[arg(long = "existing_seg")]
    existing_seg: Option<PathBuf>,

    /// Segment only, skip annotation
    #[arg(long = "segment_only")]
    segment_only: bool,

    /// Annotate an existing segmentation only
    #[arg(long = "annotate_only")]
    annotate_only: bool,

    /// Inputs are already skull stripped
    #[arg(long)]
    stripped: bool,

    /// Probability threshold for the ensemble map
    #[arg(long, default_value_t = 0.5)]
    threshold: f32,

    /// Minimum lesion size in voxels (atlas space)
    #[arg(long = "lesion_threshold", default_value_t = 0)]
    lesion_threshold: usize,

    /// Lower and upper intensity clipping percentiles
    #[arg(long, num_args = 2, value_names = ["LOW", "HIGH"], default_values_t = [0.5, 99.5])]
    clipping: Vec<f64>,

    /// Fast skull stripping (no test-time augmentation)
    #[arg(long = "fast-mode")]
    fast_mode: bool,

    /// Also write native-space probability maps
    #[arg(long = "probability_map")]
    probability_map: bool,

    /// Compute device: cpu or a GPU index
    #[arg(long, default_value = "cpu")]
    device: Device,

    /// Threads handed to registration
    #[arg(long, default_value_t = 8)]
    threads: usize,

    /// TOML file with tool and asset locations
    #[arg(long)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_tools(path: Option<&Path>) -> Result<ToolConfig> {
    let Some(path) = path else {
        return Ok(ToolConfig::default());
    };
    let tools = ToolConfig::from_file(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(tools.with_assets_relative_to(base))
}

impl Cli {
    fn into_config(self) -> Result<RunConfig> {
        let tools = load_tools(self.config.as_deref())?;
        let [low, high] = <[f64; 2]>::try_from(self.clipping.as_slice())
            .context("--clipping takes exactly two values")?;

        let mut builder = RunConfig::builder(self.t1, self.flair, self.output)
            .segment_only(self.segment_only)
            .annotate_only(self.annotate_only)
            .stripped(self.stripped)
            .fast_mode(self.fast_mode)
            .probability_map(self.probability_map)
            .threshold(self.threshold)
            .min_lesion_voxels(self.lesion_threshold)
            .clip(low, high)
            .device(self.device)
            .threads(self.threads)
            .tools(tools);
        if let Some(temp) = self.temp {
            builder = builder.temp(temp);
        }
        if let Some(seg) = self.existing_seg {
            builder = builder.existing_segmentation(seg);
        }
        Ok(builder.build()?)
    }
}

fn run(cli: Cli) -> Result<PipelineResult> {
    let verbose = cli.verbose;
    let config = cli.into_config()?;
    let device = Default::default();
    let stages = Stages::for_config::<Backend>(&config, &device)?;
    let orchestrator = PipelineOrchestrator::<Backend>::new(config, stages, device);

    if verbose {
        return Ok(orchestrator.with_callback(Arc::new(ConsoleProgressCallback)).run()?);
    }
    let spinner = Arc::new(SpinnerProgress::new());
    let result = orchestrator.with_callback(spinner.clone()).run();
    spinner.finish();
    Ok(result?)
}

fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<PipelineError>()
        .map_or(1, |e| e.kind().exit_code())
        .clamp(1, 255) as u8
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(result) => {
            for file in result.files() {
                info!("wrote {}", file.display());
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}
