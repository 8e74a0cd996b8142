//! Frame sources.
//!
//! This module provides the sources a compression run can read from:
//! - Video files decoded by an external `ffmpeg` process (`ffmpeg`)
//! - Directories of numbered TIFF images (`image_sequence`)
//! - Chunked, randomly addressable frame stores (`store`)
//! - Synthetic `stub://` sources (demos and tests)
//!
//! All sources hand out `DynamicImage` frames in their native pixel type;
//! grayscale conversion and 8-bit rescaling happen in `frame::prepare_frame`.
//! End of stream is `Ok(None)`.
//!
//! Each source owns its subprocess or file handles and releases them exactly
//! once, either through `release()` or on drop.

pub mod ffmpeg;
pub mod image_sequence;
pub mod store;
mod synthetic;

use image::DynamicImage;
use std::path::Path;

pub use ffmpeg::FfmpegSource;
pub use image_sequence::ImageSequenceSource;
pub use store::StoreSource;
pub use synthetic::SyntheticSource;

use crate::config::ToolPaths;
use crate::frame::PixelType;
use crate::{Error, Result};

/// Frame index and presentation time reported by a source while reading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceTimestamp {
    pub frame: i64,
    pub time: f64,
}

/// A video source. The variant set is closed; dispatch is by tag.
pub enum VideoSource {
    Decoder(FfmpegSource),
    ImageSequence(ImageSequenceSource),
    Store(StoreSource),
    Synthetic(SyntheticSource),
}

impl VideoSource {
    /// Pick a backend for `input`:
    /// `stub://` URIs are synthetic, directories with a `metadata.json` are
    /// frame stores, other directories are image sequences, files go through
    /// the external decoder.
    pub fn open(input: &str, tools: &ToolPaths) -> Result<Self> {
        if input.starts_with(synthetic::STUB_SCHEME) {
            return Ok(VideoSource::Synthetic(SyntheticSource::parse(input)?));
        }
        let path = Path::new(input);
        if !path.exists() {
            return Err(Error::not_found(path));
        }
        if path.is_dir() {
            if StoreSource::is_store(path) {
                Ok(VideoSource::Store(StoreSource::open(path)?))
            } else {
                Ok(VideoSource::ImageSequence(ImageSequenceSource::open(path)?))
            }
        } else {
            Ok(VideoSource::Decoder(FfmpegSource::open(
                path,
                tools.ffmpeg.as_deref(),
            )?))
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            VideoSource::Decoder(_) => "ffmpeg",
            VideoSource::ImageSequence(_) => "image-sequence",
            VideoSource::Store(_) => "store",
            VideoSource::Synthetic(_) => "synthetic",
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            VideoSource::Decoder(source) => source.width(),
            VideoSource::ImageSequence(source) => source.width(),
            VideoSource::Store(source) => source.width(),
            VideoSource::Synthetic(source) => source.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            VideoSource::Decoder(source) => source.height(),
            VideoSource::ImageSequence(source) => source.height(),
            VideoSource::Store(source) => source.height(),
            VideoSource::Synthetic(source) => source.height(),
        }
    }

    pub fn pixel_type(&self) -> PixelType {
        match self {
            VideoSource::Decoder(_) => PixelType::U8,
            VideoSource::ImageSequence(source) => source.pixel_type(),
            VideoSource::Store(source) => source.pixel_type(),
            VideoSource::Synthetic(source) => source.pixel_type(),
        }
    }

    /// Frame count when the source knows it without decoding.
    pub fn len_hint(&self) -> Option<u64> {
        match self {
            VideoSource::Decoder(_) => None,
            VideoSource::ImageSequence(source) => Some(source.len() as u64),
            VideoSource::Store(source) => Some(source.len()),
            VideoSource::Synthetic(source) => Some(source.len()),
        }
    }

    /// Read the next frame; `Ok(None)` at end of stream.
    pub fn read(&mut self) -> Result<Option<DynamicImage>> {
        match self {
            VideoSource::Decoder(source) => source.read(),
            VideoSource::ImageSequence(source) => source.read(),
            VideoSource::Store(source) => source.read(),
            VideoSource::Synthetic(source) => source.read(),
        }
    }

    pub fn supports_random_access(&self) -> bool {
        !matches!(self, VideoSource::Decoder(_))
    }

    /// Read frame `index` (0-based) for sources that can seek.
    pub fn read_at(&mut self, index: u64) -> Result<Option<DynamicImage>> {
        match self {
            VideoSource::Decoder(_) => Err(Error::InvalidSource(
                "decoder source does not support random access".into(),
            )),
            VideoSource::ImageSequence(source) => source.read_at(index),
            VideoSource::Store(source) => source.read_at(index),
            VideoSource::Synthetic(source) => source.read_at(index),
        }
    }

    /// Timestamps the source itself observed while reading.
    pub fn frame_timestamps(&self) -> &[SourceTimestamp] {
        match self {
            VideoSource::Decoder(source) => source.frame_timestamps(),
            VideoSource::Store(source) => source.frame_timestamps(),
            VideoSource::ImageSequence(_) | VideoSource::Synthetic(_) => &[],
        }
    }

    /// Release subprocesses and handles. Safe to call more than once.
    pub fn release(&mut self) {
        match self {
            VideoSource::Decoder(source) => source.release(),
            VideoSource::ImageSequence(source) => source.release(),
            VideoSource::Store(source) => source.release(),
            VideoSource::Synthetic(_) => {}
        }
    }
}
