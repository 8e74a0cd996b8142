use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::background::BackgroundParams;
use crate::mask::MaskParams;
use crate::{Error, Result};

const DEFAULT_EXPECTED_FPS: u32 = 25;
/// Seconds of video between unmasked snapshots.
const DEFAULT_FULL_INTERVAL_SECS: u64 = 200;

#[derive(Debug, Deserialize, Default)]
struct CompressConfigFile {
    expected_fps: Option<u32>,
    buffer_size: Option<usize>,
    save_full_interval: Option<u64>,
    max_frame: Option<u64>,
    mask: Option<MaskParams>,
    background: Option<BackgroundParams>,
}

/// Parameters of one compression run.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressConfig {
    pub mask: MaskParams,
    pub background: BackgroundParams,
    pub expected_fps: u32,
    /// Window size; `None` means one second of video.
    pub buffer_size: Option<usize>,
    /// Full-frame snapshot interval; `None` means 200 seconds of video.
    pub save_full_interval: Option<u64>,
    pub max_frame: u64,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self::from_file(CompressConfigFile::default())
    }
}

impl CompressConfig {
    /// Load from `MASKVID_CONFIG` (if set), then apply env overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("MASKVID_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => CompressConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CompressConfigFile) -> Self {
        Self {
            mask: file.mask.unwrap_or_default(),
            background: file.background.unwrap_or_default(),
            expected_fps: file.expected_fps.unwrap_or(DEFAULT_EXPECTED_FPS),
            buffer_size: file.buffer_size,
            save_full_interval: file.save_full_interval,
            max_frame: file.max_frame.unwrap_or(u64::MAX),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(fps) = env_number::<u32>("MASKVID_EXPECTED_FPS")? {
            self.expected_fps = fps;
        }
        if let Some(size) = env_number::<usize>("MASKVID_BUFFER_SIZE")? {
            self.buffer_size = Some(size);
        }
        if let Some(interval) = env_number::<u64>("MASKVID_SAVE_FULL_INTERVAL")? {
            self.save_full_interval = Some(interval);
        }
        if let Some(max_frame) = env_number::<u64>("MASKVID_MAX_FRAME")? {
            self.max_frame = max_frame;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.expected_fps == 0 {
            return Err(Error::Configuration(
                "expected_fps must be greater than zero".into(),
            ));
        }
        if self.buffer_size == Some(0) {
            return Err(Error::Configuration(
                "buffer_size must be greater than zero".into(),
            ));
        }
        if self.save_full_interval == Some(0) {
            return Err(Error::Configuration(
                "save_full_interval must be greater than zero".into(),
            ));
        }
        if self.mask.min_area > self.mask.max_area {
            return Err(Error::Configuration(format!(
                "min_area ({}) exceeds max_area ({})",
                self.mask.min_area, self.mask.max_area
            )));
        }
        if self.mask.thresh_block_size == 0 {
            return Err(Error::Configuration(
                "thresh_block_size must be greater than zero".into(),
            ));
        }
        if self.background.is_subtraction
            && (self.background.buffer_size == 0 || self.background.frame_gap == 0)
        {
            return Err(Error::Configuration(
                "background subtraction needs a non-zero buffer_size and frame_gap".into(),
            ));
        }
        Ok(())
    }

    /// Frames per reduction window.
    pub fn window_size(&self) -> usize {
        self.buffer_size.unwrap_or(self.expected_fps as usize)
    }

    /// Processed frames between unmasked snapshots.
    pub fn full_interval(&self) -> u64 {
        self.save_full_interval
            .unwrap_or(DEFAULT_FULL_INTERVAL_SECS * self.expected_fps as u64)
    }
}

fn read_config_file(path: &Path) -> Result<CompressConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        Ok(toml::from_str(&raw)?)
    } else {
        Ok(serde_json::from_str(&raw)?)
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Configuration(format!("{} must be a non-negative integer", key))),
        _ => Ok(None),
    }
}

// ----------------------------------------------------------------------------
// External tool locations
// ----------------------------------------------------------------------------

/// Locations of the external decoder and prober, resolved once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolPaths {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

impl ToolPaths {
    /// `MASKVID_FFMPEG` / `MASKVID_FFPROBE`, falling back to a `PATH` search.
    pub fn resolve() -> Self {
        let lookup = |env_key: &str, name: &str| {
            std::env::var_os(env_key)
                .map(PathBuf::from)
                .filter(|p| p.is_file())
                .or_else(|| which::which(name).ok())
        };
        let tools = Self {
            ffmpeg: lookup("MASKVID_FFMPEG", "ffmpeg"),
            ffprobe: lookup("MASKVID_FFPROBE", "ffprobe"),
        };
        log::debug!("resolved tools: {:?}", tools);
        tools
    }

    pub fn none() -> Self {
        Self::default()
    }
}
