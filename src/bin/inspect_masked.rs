//! inspect_masked - print the layout of a masked-video container

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use masked_video::container::{self, ContainerReader};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Container produced by compress_video.
    path: PathBuf,
    /// Decode every chunk and check its checksum.
    #[arg(long)]
    verify: bool,
    /// Export frame N of /mask as a PNG next to the container.
    #[arg(long, value_name = "N")]
    export_frame: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let reader = ContainerReader::open(&args.path)
        .with_context(|| format!("failed to open {}", args.path.display()))?;

    println!("{}", args.path.display());
    println!(
        "  has_finished: {}",
        if reader.has_finished()? {
            "1"
        } else {
            "0 (incomplete, do not use)"
        }
    );
    for info in reader.datasets()? {
        println!(
            "  {:<22} {:<4} {:?}",
            info.name,
            info.dtype.name(),
            info.shape
        );
        for (key, value) in reader.attributes(&info.name)? {
            println!("      {} = {}", key, value);
        }
    }

    let metadata = reader
        .read_table(container::VIDEO_METADATA)
        .context("failed to read video metadata")?;
    if metadata.is_empty() {
        println!("  {:<22} (none)", container::VIDEO_METADATA);
    } else {
        println!(
            "  {:<22} {} records: {}",
            container::VIDEO_METADATA,
            metadata.len(),
            metadata.fields().collect::<Vec<_>>().join(", ")
        );
    }

    if let Ok(raw) = reader.read_array::<i64>(container::TIMESTAMP_RAW) {
        let known = raw.iter().filter(|&&v| v >= 0).count();
        println!("  timestamps known for {}/{} frames", known, raw.len());
    }

    if args.verify {
        let chunks = reader.verify().context("verification failed")?;
        println!("  verified {} chunks", chunks);
    }

    if let Some(index) = args.export_frame {
        let frame = reader.read_frame(container::MASK, index)?;
        let out = args.path.with_extension(format!("frame{:06}.png", index));
        frame
            .save(&out)
            .map_err(|e| anyhow!("failed to write {}: {}", out.display(), e))?;
        println!("  frame {} written to {}", index, out.display());
    }
    Ok(())
}
