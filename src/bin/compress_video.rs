//! compress_video - mask and compress one recording into a container
//!
//! This tool:
//! 1. Resolves the ffmpeg/ffprobe locations once
//! 2. Loads the run configuration (file, env, then command-line overrides)
//! 3. Runs one compression pass and reports what was stored

use anyhow::{Context, Result};
use clap::Parser;
use masked_video::{CompressConfig, CompressionOrchestrator, ToolPaths};
use std::io::IsTerminal;
use std::path::PathBuf;

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Video file, TIFF sequence directory, frame store directory or stub:// URI.
    input: String,
    /// Output container path (replaced if it exists).
    output: PathBuf,
    /// JSON or TOML configuration file.
    #[arg(long, env = "MASKVID_CONFIG")]
    config: Option<PathBuf>,
    /// Frames per second the recording was made at.
    #[arg(long)]
    expected_fps: Option<u32>,
    /// Frames per reduction window (default: one second of video).
    #[arg(long)]
    buffer_size: Option<usize>,
    /// Processed frames between unmasked snapshots.
    #[arg(long)]
    save_full_interval: Option<u64>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frame: Option<u64>,
    #[arg(long)]
    min_area: Option<u32>,
    #[arg(long)]
    max_area: Option<u32>,
    #[arg(long)]
    thresh_block_size: Option<u32>,
    #[arg(long)]
    thresh_c: Option<f64>,
    #[arg(long)]
    dilation_size: Option<u32>,
    /// Keep blobs that touch the frame border.
    #[arg(long)]
    keep_border_data: bool,
    /// Subjects are brighter than the background.
    #[arg(long)]
    dark_background: bool,
    /// Subtract a sampled static background before reduction.
    #[arg(long)]
    background_subtraction: bool,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

impl Args {
    fn apply(&self, cfg: &mut CompressConfig) {
        if let Some(fps) = self.expected_fps {
            cfg.expected_fps = fps;
        }
        if let Some(size) = self.buffer_size {
            cfg.buffer_size = Some(size);
        }
        if let Some(interval) = self.save_full_interval {
            cfg.save_full_interval = Some(interval);
        }
        if let Some(max_frame) = self.max_frame {
            cfg.max_frame = max_frame;
        }
        if let Some(v) = self.min_area {
            cfg.mask.min_area = v;
        }
        if let Some(v) = self.max_area {
            cfg.mask.max_area = v;
        }
        if let Some(v) = self.thresh_block_size {
            cfg.mask.thresh_block_size = v;
        }
        if let Some(v) = self.thresh_c {
            cfg.mask.thresh_c = v;
        }
        if let Some(v) = self.dilation_size {
            cfg.mask.dilation_size = v;
        }
        if self.keep_border_data {
            cfg.mask.keep_border_data = true;
        }
        if self.dark_background {
            cfg.mask.is_light_background = false;
        }
        if self.background_subtraction {
            cfg.background.is_subtraction = true;
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = ui::Ui::from_args(&args.ui, std::io::stderr().is_terminal());

    let tools = {
        let _stage = ui.stage("Locate ffmpeg/ffprobe");
        ToolPaths::resolve()
    };
    if tools.ffmpeg.is_none() {
        log::warn!("ffmpeg not found; only image sequences and frame stores can be read");
    }

    let cfg = {
        let _stage = ui.stage("Load configuration");
        let mut cfg = CompressConfig::load_from(args.config.as_deref())
            .context("failed to load configuration")?;
        args.apply(&mut cfg);
        cfg.validate().context("invalid configuration")?;
        cfg
    };

    let summary = {
        let _stage = ui.stage("Compress");
        let frames = ui.frames();
        let result = CompressionOrchestrator::new(&cfg)
            .with_observer(&frames)
            .run(&args.input, &args.output, &tools);
        frames.finish();
        result.with_context(|| format!("failed to compress {}", args.input))?
    };

    println!(
        "{}: {} frames ({}x{}), {} full-frame snapshots{}",
        args.output.display(),
        summary.frames,
        summary.width,
        summary.height,
        summary.full_frames,
        if summary.normalized {
            ", normalization ranges stored"
        } else {
            ""
        }
    );
    Ok(())
}
