//! ocr-sampler - drive the OCR sampling pipeline from image files
//!
//! Feeds images from disk as the producer's frames, prints published text and
//! writes published masks to the instance's mask file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ocr_sampler::config::{self, FilterSettings};
use ocr_sampler::shared::{ChannelSink, FileImageSink, OutputSink, PipelineOutput};
use ocr_sampler::storage::PluginFiles;
use ocr_sampler::vision::EngineFactory;
use ocr_sampler::Pipeline;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Continuous OCR sampling of video frames
#[derive(Parser, Debug)]
#[command(name = "ocr-sampler")]
#[command(about = "Continuous OCR sampling of a shared video frame", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sample frames read from an image file or a directory of images
    Run {
        /// Settings file (TOML); defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Image file or directory of frames
        #[arg(short, long)]
        input: PathBuf,

        /// Number of frames to feed (inputs are cycled)
        #[arg(short = 'n', long, default_value = "10")]
        frames: usize,

        /// Delay between frames in milliseconds
        #[arg(long, default_value = "200")]
        interval_ms: u64,

        /// Directory for side files (default: module config directory)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Instance identifier (default: random)
        #[arg(long)]
        id: Option<String>,
    },
    /// Remove the side files of an instance
    Cleanup {
        #[arg(long)]
        id: String,

        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Print the default settings as TOML
    DefaultConfig,
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    match args.command {
        Command::Run {
            config,
            input,
            frames,
            interval_ms,
            dir,
            id,
        } => run(config, &input, frames, interval_ms, dir, id),
        Command::Cleanup { id, dir } => {
            plugin_files(dir)?.cleanup(&id)?;
            info!("Removed side files for {}", id);
            Ok(())
        }
        Command::DefaultConfig => {
            print!("{}", toml::to_string_pretty(&FilterSettings::default())?);
            Ok(())
        }
    }
}

fn plugin_files(dir: Option<PathBuf>) -> Result<PluginFiles> {
    Ok(match dir {
        Some(dir) => PluginFiles::new(dir),
        None => PluginFiles::in_config_dir()?,
    })
}

#[cfg(feature = "tesseract")]
fn engine_factory() -> Result<Arc<dyn EngineFactory>> {
    Ok(Arc::new(ocr_sampler::vision::tesseract::TesseractFactory))
}

#[cfg(not(feature = "tesseract"))]
fn engine_factory() -> Result<Arc<dyn EngineFactory>> {
    anyhow::bail!("no OCR engine available; rebuild with `--features tesseract`")
}

/// Image files in `input`, sorted by name
fn collect_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(input)
        .with_context(|| format!("cannot read {}", input.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| image::ImageFormat::from_path(path).is_ok())
        .collect();
    paths.sort();
    if paths.is_empty() {
        anyhow::bail!("no images found in {}", input.display());
    }
    Ok(paths)
}

fn run(
    config: Option<PathBuf>,
    input: &Path,
    frames: usize,
    interval_ms: u64,
    dir: Option<PathBuf>,
    id: Option<String>,
) -> Result<()> {
    let settings = match config {
        Some(path) => config::load_settings(&path)
            .with_context(|| format!("cannot load settings from {}", path.display()))?,
        None => FilterSettings::default(),
    };
    let inputs = collect_inputs(input)?;
    let files = plugin_files(dir)?;

    let (sink, rx) = ChannelSink::unbounded();
    let mut builder = Pipeline::builder(engine_factory()?)
        .files(files.clone())
        .sink(Arc::new(sink));
    if let Some(id) = id {
        builder = builder.id(id);
    }
    let mut pipeline = builder.build(settings)?;
    if !pipeline.is_ready() {
        anyhow::bail!("OCR engine failed to initialize, see log for details");
    }
    let mask_sink = FileImageSink::new(files, pipeline.id());
    info!("Pipeline {} sampling {} input(s)", pipeline.id(), inputs.len());

    let interval = Duration::from_millis(interval_ms);
    for path in inputs.iter().cycle().take(frames) {
        let frame = image::open(path)
            .with_context(|| format!("cannot open {}", path.display()))?
            .to_rgba8();
        pipeline.submit_frame(frame);

        let deadline = Instant::now() + interval;
        while let Ok(output) = rx.recv_deadline(deadline) {
            match output {
                PipelineOutput::Text { sink, text } => println!("[{sink}] {text}"),
                PipelineOutput::Image { sink, image } => mask_sink.publish_image(&sink, &image),
            }
        }
    }

    pipeline.shutdown();
    Ok(())
}
