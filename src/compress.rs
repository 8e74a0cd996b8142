//! Compression run: source -> windows -> masks -> container.
//!
//! The orchestrator is responsible for:
//! - Validating source geometry before anything is written
//! - Seeding the container from the probe (expected frame count, metadata)
//! - Windowing frames, reducing each window and masking it
//! - Periodic unmasked snapshots into `/full_data`
//! - Dropping a trailing all-zero frame at end of stream
//! - Trimming, timestamps, and the `has_finished` flag
//!
//! It MUST NOT:
//! - Mark a file finished after any failure
//! - Store a masked frame that was not clamped to `[1, 255]` first
//!
//! A window is flushed lazily, when the next frame arrives or the stream ends,
//! so the most recent frame is still in the buffer when the end-of-stream
//! check runs.

use std::path::Path;
use std::time::Duration;

use crate::background::{reduce_foreground, BackgroundSubtractor, SampledBackground};
use crate::config::{CompressConfig, ToolPaths};
use crate::container::{self, ContainerWriter};
use crate::frame::{prepare_frame, FrameBuffer};
use crate::ingest::VideoSource;
use crate::mask::compute_roi_mask;
use crate::probe::{probe_video, TimestampTable, VideoMetadata};
use crate::progress::{ProgressCounter, ProgressObserver, ProgressState};
use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Initializing,
    Streaming,
    Draining,
    Finalizing,
    Done,
    Failed,
}

/// Outcome of a finished run.
#[derive(Clone, Debug, PartialEq)]
pub struct CompressSummary {
    pub width: u32,
    pub height: u32,
    /// Frames stored in `/mask`.
    pub frames: u64,
    /// Snapshots stored in `/full_data`.
    pub full_frames: u64,
    /// `/normalization_range` was written.
    pub normalized: bool,
    /// A trailing all-zero frame was dropped.
    pub dropped_blank_tail: bool,
    pub elapsed: Duration,
}

/// Compress `input` into a container at `output`.
pub fn compress_video(
    input: &str,
    output: &Path,
    config: &CompressConfig,
    tools: &ToolPaths,
) -> Result<CompressSummary> {
    CompressionOrchestrator::new(config).run(input, output, tools)
}

pub struct CompressionOrchestrator<'a> {
    config: &'a CompressConfig,
    observer: Option<&'a dyn ProgressObserver>,
    state: RunState,
}

impl<'a> CompressionOrchestrator<'a> {
    pub fn new(config: &'a CompressConfig) -> Self {
        Self {
            config,
            observer: None,
            state: RunState::Initializing,
        }
    }

    pub fn with_observer(mut self, observer: &'a dyn ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        log::debug!("run state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Open `input`, probe it, estimate the background if enabled, and run.
    pub fn run(&mut self, input: &str, output: &Path, tools: &ToolPaths) -> Result<CompressSummary> {
        self.config.validate()?;
        let mut source = VideoSource::open(input, tools)?;
        log::info!(
            "source {} ({}): {}x{} {:?}",
            input,
            source.kind(),
            source.width(),
            source.height(),
            source.pixel_type()
        );

        let metadata = if matches!(source, VideoSource::Decoder(_)) {
            probe_video(Path::new(input), tools.ffprobe.as_deref())
        } else {
            VideoMetadata::default()
        };

        let background: Option<Box<dyn BackgroundSubtractor>> =
            if self.config.background.is_subtraction {
                // separate instance so the main stream starts at frame 0
                let mut sampler = VideoSource::open(input, tools)?;
                Some(Box::new(SampledBackground::from_source(
                    &mut sampler,
                    &self.config.background,
                    self.config.mask.is_light_background,
                )?))
            } else {
                None
            };

        self.run_source(&mut source, &metadata, background, output)
    }

    /// Run against an already opened source.
    pub fn run_source(
        &mut self,
        source: &mut VideoSource,
        metadata: &VideoMetadata,
        mut background: Option<Box<dyn BackgroundSubtractor>>,
        output: &Path,
    ) -> Result<CompressSummary> {
        self.state = RunState::Initializing;
        let result = self.process(source, metadata, &mut background, output);
        source.release();
        match &result {
            Ok(summary) => {
                self.transition(RunState::Done);
                log::info!(
                    "compressed {} frames ({} snapshots) into {} in {}",
                    summary.frames,
                    summary.full_frames,
                    output.display(),
                    crate::progress::format_duration(summary.elapsed)
                );
            }
            Err(e) => {
                self.transition(RunState::Failed);
                log::error!("compression of {} failed: {}", output.display(), e);
            }
        }
        result
    }

    fn process(
        &mut self,
        source: &mut VideoSource,
        metadata: &VideoMetadata,
        background: &mut Option<Box<dyn BackgroundSubtractor>>,
        output: &Path,
    ) -> Result<CompressSummary> {
        let config = self.config;
        config.validate()?;
        let (width, height) = (source.width(), source.height());
        if width == 0 || height == 0 {
            return Err(Error::InvalidSource(format!(
                "source reports {}x{} frames",
                width, height
            )));
        }

        let expected = if metadata.is_empty() {
            source.len_hint()
        } else {
            Some(metadata.len() as u64)
        }
        .map(|n| n.min(config.max_frame));
        if expected.is_none() {
            log::warn!("frame count unknown; container will grow as frames arrive");
        }

        let mut writer = ContainerWriter::create(output, width, height, expected.unwrap_or(1))?;
        writer.set_attribute(container::MASK, "expected_fps", config.expected_fps)?;
        writer.set_attribute(
            container::MASK,
            "is_light_background",
            config.mask.is_light_background as u8,
        )?;
        let interval = config.full_interval();
        writer.set_attribute(container::FULL_DATA, "save_interval", interval)?;
        writer.set_attribute(container::FULL_DATA, "expected_fps", config.expected_fps)?;

        // ---------------------------------------------------------------- Streaming
        self.transition(RunState::Streaming);
        let is_light = config.mask.is_light_background;
        let progress = ProgressCounter::new(expected, self.observer);
        let mut buffer = FrameBuffer::new(config.window_size());
        let mut state = ProgressState::default();
        let mut ranges: Vec<f32> = Vec::new();
        let mut last_blank = false;
        let mut last_snapshot = false;
        let mut end_of_stream = false;

        while state.frames < config.max_frame {
            let Some(raw) = source.read()? else {
                end_of_stream = true;
                break;
            };
            let prepared = prepare_frame(raw);
            if prepared.image.dimensions() != (width, height) {
                return Err(Error::Format(format!(
                    "frame {} is {}x{}, expected {}x{}",
                    state.frames + 1,
                    prepared.image.width(),
                    prepared.image.height(),
                    width,
                    height
                )));
            }

            if buffer.is_full() {
                self.flush_window(&mut buffer, background, &mut writer, is_light)?;
            }

            state.frames += 1;
            if let Some((lo, hi)) = prepared.range {
                ranges.extend([lo, hi]);
            }
            last_blank = prepared.blank;
            last_snapshot = (state.frames - 1) % interval == 0;
            if last_snapshot {
                writer.append_frame(container::FULL_DATA, &prepared.image)?;
                state.full_frames += 1;
            }
            buffer.push(prepared.image);
            state.buffer_fill = buffer.len();
            progress.update(state.frames);
        }

        // ---------------------------------------------------------------- Draining
        self.transition(RunState::Draining);
        let dropped_blank_tail = end_of_stream && last_blank && buffer.latest().is_some();
        if dropped_blank_tail {
            log::warn!(
                "frame {} is all zeros at end of stream; dropping it",
                state.frames
            );
            buffer.discard_latest();
            if last_snapshot {
                state.full_frames -= 1;
                writer.truncate(container::FULL_DATA, state.full_frames)?;
            }
            if ranges.len() as u64 == state.frames * 2 {
                ranges.truncate(ranges.len() - 2);
            }
            state.frames -= 1;
            state.buffer_fill = buffer.len();
        }
        if !buffer.is_empty() {
            self.flush_window(&mut buffer, background, &mut writer, is_light)?;
        }

        // ---------------------------------------------------------------- Finalizing
        self.transition(RunState::Finalizing);
        writer.finalize_datasets()?;
        if writer.len(container::MASK) != state.frames {
            return Err(Error::Corrupt {
                path: output.to_path_buf(),
                reason: format!(
                    "{} frames processed but {} stored",
                    state.frames,
                    writer.len(container::MASK)
                ),
            });
        }

        let normalized = !ranges.is_empty();
        if normalized {
            writer.write_array(container::NORMALIZATION_RANGE, &[2], &ranges)?;
        }
        if !metadata.is_empty() {
            writer.write_table(container::VIDEO_METADATA, metadata)?;
        }

        // the decoder flushes its remaining frame log on release
        source.release();
        let timestamps =
            TimestampTable::build(metadata, source.frame_timestamps(), state.frames as usize);
        writer.write_array(container::TIMESTAMP_RAW, &[], &timestamps.raw)?;
        writer.write_array(container::TIMESTAMP_TIME, &[], &timestamps.time)?;

        writer.finish()?;

        Ok(CompressSummary {
            width,
            height,
            frames: state.frames,
            full_frames: state.full_frames,
            normalized,
            dropped_blank_tail,
            elapsed: progress.elapsed(),
        })
    }

    /// Reduce the window, mask every frame in it and append it to `/mask`.
    fn flush_window(
        &self,
        buffer: &mut FrameBuffer,
        background: &mut Option<Box<dyn BackgroundSubtractor>>,
        writer: &mut ContainerWriter,
        is_light: bool,
    ) -> Result<()> {
        let reduced = match background.as_mut() {
            Some(subtractor) => reduce_foreground(&subtractor.apply(buffer.frames()), is_light),
            None => buffer.reduce(is_light),
        };
        let Some(reduced) = reduced else {
            return Err(Error::Format(format!(
                "window of {} frames reduced to no image",
                buffer.len()
            )));
        };
        let mask = compute_roi_mask(&reduced, &self.config.mask);
        buffer.apply_mask(&mask);
        writer.append_frames(container::MASK, buffer.frames())?;
        buffer.reset();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerReader;

    fn config(buffer_size: usize, interval: u64) -> CompressConfig {
        CompressConfig {
            buffer_size: Some(buffer_size),
            save_full_interval: Some(interval),
            ..CompressConfig::default()
        }
    }

    fn run(uri: &str, cfg: &CompressConfig, output: &Path) -> CompressSummary {
        let mut source = VideoSource::open(uri, &ToolPaths::none()).unwrap();
        let mut orchestrator = CompressionOrchestrator::new(cfg);
        let summary = orchestrator
            .run_source(&mut source, &VideoMetadata::default(), None, output)
            .unwrap();
        assert_eq!(orchestrator.state(), RunState::Done);
        summary
    }

    #[test]
    fn snapshot_count_is_ceiling_of_frames_over_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        let summary = run("stub://48x40?frames=7", &config(3, 3), &path);
        assert_eq!(summary.frames, 7);
        assert_eq!(summary.full_frames, 3);

        let reader = ContainerReader::open(&path).unwrap();
        assert_eq!(reader.shape(container::MASK).unwrap(), vec![7, 40, 48]);
        assert_eq!(reader.shape(container::FULL_DATA).unwrap(), vec![3, 40, 48]);
    }

    #[test]
    fn interval_of_one_snapshots_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let summary = run(
            "stub://48x40?frames=5",
            &config(2, 1),
            &dir.path().join("out.db"),
        );
        assert_eq!(summary.full_frames, 5);
    }

    #[test]
    fn max_frame_stops_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CompressConfig {
            max_frame: 10,
            ..config(4, 100)
        };
        let summary = run("stub://48x40?frames=50", &cfg, &dir.path().join("out.db"));
        assert_eq!(summary.frames, 10);
        assert!(!summary.dropped_blank_tail);
    }

    #[test]
    fn blank_last_frame_on_window_boundary_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        let summary = run("stub://64x48?frames=25&blank_tail=1", &config(25, 100), &path);
        assert!(summary.dropped_blank_tail);
        assert_eq!(summary.frames, 24);

        let reader = ContainerReader::open(&path).unwrap();
        assert_eq!(reader.shape(container::MASK).unwrap()[0], 24);
        for i in 0..24 {
            let frame = reader.read_frame(container::MASK, i).unwrap();
            assert!(frame.as_raw().iter().any(|&p| p != 0), "frame {} is empty", i);
        }
    }

    #[test]
    fn blank_only_stream_is_dropped_and_snapshot_undone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        let summary = run("stub://48x40?frames=1&blank_tail=1", &config(5, 10), &path);
        assert_eq!(summary.frames, 0);
        assert_eq!(summary.full_frames, 0);

        let reader = ContainerReader::open(&path).unwrap();
        assert_eq!(reader.shape(container::FULL_DATA).unwrap()[0], 0);
        assert!(reader.has_finished().unwrap());
    }

    #[test]
    fn attributes_describe_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        run("stub://48x40?frames=3", &config(2, 100), &path);

        let reader = ContainerReader::open(&path).unwrap();
        let attr = |ds: &str, key: &str| reader.attribute(ds, key).unwrap().unwrap();
        assert_eq!(attr(container::MASK, "expected_fps"), 25);
        assert_eq!(attr(container::MASK, "is_light_background"), 1);
        assert_eq!(attr(container::FULL_DATA, "save_interval"), 100);
        // no probe, no source log: every timestamp is unknown
        assert_eq!(
            reader.read_array::<i64>(container::TIMESTAMP_RAW).unwrap(),
            vec![-1, -1, -1]
        );
    }

    #[test]
    fn sixteen_bit_source_records_normalization_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        let summary = run("stub://48x40?frames=4&depth=16", &config(2, 100), &path);
        assert!(summary.normalized);

        let reader = ContainerReader::open(&path).unwrap();
        assert_eq!(
            reader.shape(container::NORMALIZATION_RANGE).unwrap(),
            vec![4, 2]
        );
        let ranges = reader
            .read_array::<f32>(container::NORMALIZATION_RANGE)
            .unwrap();
        assert_eq!(&ranges[..2], &[40.0 * 257.0, 200.0 * 257.0]);
    }

    #[test]
    fn invalid_config_is_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        let zero_fps = CompressConfig {
            expected_fps: 0,
            ..CompressConfig::default()
        };
        for cfg in [config(3, 0), zero_fps] {
            let mut source = VideoSource::open("stub://48x40?frames=3", &ToolPaths::none()).unwrap();
            let mut orchestrator = CompressionOrchestrator::new(&cfg);
            let err = orchestrator
                .run_source(&mut source, &VideoMetadata::default(), None, &path)
                .unwrap_err();
            assert!(matches!(err, Error::Configuration(_)));
            assert_eq!(orchestrator.state(), RunState::Failed);
            assert!(!path.exists());
        }

        let err = compress_video("stub://48x40?frames=3", &path, &config(3, 0), &ToolPaths::none())
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn background_subtraction_run_masks_like_plain_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        let uri = "stub://48x40?frames=20";
        let mut cfg = config(5, 100);
        cfg.background.is_subtraction = true;
        cfg.background.buffer_size = 3;
        cfg.background.frame_gap = 4;

        let summary = compress_video(uri, &path, &cfg, &ToolPaths::none()).unwrap();
        assert_eq!(summary.frames, 20);

        let reader = ContainerReader::open(&path).unwrap();
        assert!(reader.has_finished().unwrap());
        let mut source = VideoSource::open(uri, &ToolPaths::none()).unwrap();
        for i in 0..20u64 {
            let original = prepare_frame(source.read_at(i).unwrap().unwrap()).image;
            let stored = reader.read_frame(container::MASK, i).unwrap();
            assert!(stored
                .as_raw()
                .iter()
                .zip(original.as_raw())
                .all(|(&s, &o)| s == 0 || s == o));
        }
    }

    #[test]
    fn failure_leaves_file_unfinished() {
        struct Shrinking;
        impl BackgroundSubtractor for Shrinking {
            fn apply(&mut self, _frames: &[image::GrayImage]) -> Vec<image::GrayImage> {
                Vec::new()
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        let cfg = config(2, 100);
        let mut source = VideoSource::open("stub://48x40?frames=4", &ToolPaths::none()).unwrap();
        let mut orchestrator = CompressionOrchestrator::new(&cfg);
        // a subtractor that returns no frames cannot be reduced
        let err = orchestrator
            .run_source(
                &mut source,
                &VideoMetadata::default(),
                Some(Box::new(Shrinking)),
                &path,
            )
            .err()
            .unwrap();
        assert!(matches!(err, Error::Format(_)));
        assert_eq!(orchestrator.state(), RunState::Failed);
        assert!(!ContainerReader::open(&path).unwrap().has_finished().unwrap());
    }
}
