//! Masked video compression
//!
//! This crate turns long raw recordings (video files, TIFF sequences or
//! chunked frame stores) into a mostly-zeroed "masked" container: pixels
//! unlikely to contain a subject are set to 0, so the lossless chunk
//! compressor collapses the background while subject regions stay intact.
//!
//! # Pipeline
//!
//! 1. `ingest::VideoSource` supplies frames from one of its backends.
//! 2. `frame::prepare_frame` converts to 8-bit grayscale, clamped to `[1, 255]`.
//! 3. `frame::FrameBuffer` collects one window (about a second of video).
//! 4. The window is reduced to one image (per-pixel min or max), optionally
//!    after `background` subtraction.
//! 5. `mask::compute_roi_mask` derives a keep-mask that is applied to every
//!    frame of the window.
//! 6. `container::ContainerWriter` appends the masked window, plus a periodic
//!    unmasked snapshot, and finally timestamps from `probe`.
//!
//! # Module Structure
//!
//! - `line_reader`: non-blocking line draining of subprocess pipes
//! - `ingest`: frame sources (ffmpeg decoder, image sequence, store, synthetic)
//! - `probe`: ffprobe metadata and timestamp correction
//! - `mask`: region-of-interest mask
//! - `container`: on-disk format, writer and reader
//! - `compress`: the run state machine

pub mod background;
pub mod compress;
pub mod config;
pub mod container;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod line_reader;
pub mod mask;
pub mod probe;
pub mod progress;

pub use background::{BackgroundParams, BackgroundSubtractor, SampledBackground};
pub use compress::{compress_video, CompressSummary, CompressionOrchestrator, RunState};
pub use config::{CompressConfig, ToolPaths};
pub use container::{ContainerReader, ContainerWriter};
pub use error::{Error, Result};
pub use frame::{FrameBuffer, PixelType};
pub use ingest::{SourceTimestamp, VideoSource};
pub use line_reader::{LineRead, LineReader};
pub use mask::{compute_roi_mask, MaskParams};
pub use probe::{correct_timestamp, probe_video, TimestampTable, VideoMetadata};
pub use progress::{ProgressObserver, ProgressState};
