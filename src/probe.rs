//! Per-frame decode metadata from an external `ffprobe` run, and the
//! timestamp table derived from it.
//!
//! The probe is best effort. A missing binary, a non-zero exit or output that
//! does not parse all yield an empty `VideoMetadata`; the run continues with
//! an unknown frame count.

use serde_json::Value;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::ingest::SourceTimestamp;
use crate::line_reader::{LineRead, LineReader};
use crate::{Error, Result};

/// Poll interval while waiting for the prober to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const RAW_TIMESTAMP_FIELD: &str = "best_effort_timestamp";
const TIME_FIELD: &str = "best_effort_timestamp_time";

/// Sentinel for an unknown corrected frame index.
pub const UNKNOWN_RAW: i64 = -1;

// ----------------------------------------------------------------------------
// Metadata table
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(values) => values.len(),
            Column::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One record per probed frame, stored column-wise.
///
/// A column is numeric when every value in it parses as a float.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VideoMetadata {
    columns: Vec<(String, Column)>,
    rows: usize,
}

impl VideoMetadata {
    pub fn from_columns(columns: Vec<(String, Column)>) -> Result<Self> {
        let rows = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        if let Some((name, _)) = columns.iter().find(|(_, c)| c.len() != rows) {
            return Err(Error::Format(format!(
                "metadata column {} does not have {} rows",
                name, rows
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn columns(&self) -> &[(String, Column)] {
        &self.columns
    }

    pub fn column(&self, field: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, c)| c)
    }

    pub fn numeric(&self, field: &str) -> Option<&[f64]> {
        match self.column(field)? {
            Column::Numeric(values) => Some(values),
            Column::Text(_) => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Probe
// ----------------------------------------------------------------------------

/// Probe `path`; never fails, degrades to an empty table.
pub fn probe_video(path: &Path, ffprobe: Option<&Path>) -> VideoMetadata {
    let Some(ffprobe) = ffprobe else {
        log::warn!("ffprobe not available; frame metadata for {} skipped", path.display());
        return VideoMetadata::default();
    };
    match run_probe(path, ffprobe) {
        Ok(metadata) => {
            log::info!(
                "probed {}: {} frames, {} fields",
                path.display(),
                metadata.len(),
                metadata.columns.len()
            );
            metadata
        }
        Err(e) => {
            log::warn!("frame metadata probe of {} failed: {}", path.display(), e);
            VideoMetadata::default()
        }
    }
}

fn run_probe(path: &Path, ffprobe: &Path) -> Result<VideoMetadata> {
    let mut child = Command::new(ffprobe)
        .args(["-v", "error", "-show_frames", "-print_format", "json"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::NotFound(format!("failed to spawn {}: {}", ffprobe.display(), e)))?;

    let mut stdout = LineReader::spawn(
        child
            .stdout
            .take()
            .ok_or_else(|| Error::Format("ffprobe stdout missing".into()))?,
    );
    let mut stderr = LineReader::spawn(
        child
            .stderr
            .take()
            .ok_or_else(|| Error::Format("ffprobe stderr missing".into()))?,
    );

    let mut output = String::new();
    let mut errors = Vec::new();
    let status = loop {
        match stdout.read(POLL_INTERVAL) {
            LineRead::Line(line) => {
                output.push_str(&line);
                output.push('\n');
            }
            LineRead::Empty => {}
            // stdout is done; keep polling the child at the same pace
            LineRead::Closed => std::thread::sleep(POLL_INTERVAL),
        }
        for line in stdout.drain_available() {
            output.push_str(&line);
            output.push('\n');
        }
        errors.extend(stderr.drain_available());
        if let Some(status) = child.try_wait()? {
            break status;
        }
    };
    for line in stdout.drain_until_closed(DRAIN_TIMEOUT) {
        output.push_str(&line);
        output.push('\n');
    }
    errors.extend(stderr.drain_until_closed(DRAIN_TIMEOUT));

    if !status.success() {
        return Err(Error::Format(format!(
            "ffprobe exited with {}: {}",
            status,
            errors.join(" | ")
        )));
    }
    parse_probe_output(&output)
}

/// Parse `ffprobe -show_frames -print_format json` output.
///
/// The first frame's keys define the field set; frames missing any of them
/// are dropped.
pub fn parse_probe_output(json: &str) -> Result<VideoMetadata> {
    let doc: Value = serde_json::from_str(json)?;
    let frames = doc
        .get("frames")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Format("probe output has no frames array".into()))?;

    let Some(first) = frames.first().and_then(Value::as_object) else {
        return Ok(VideoMetadata::default());
    };
    let fields: Vec<String> = first.keys().cloned().collect();

    let mut raw: Vec<Vec<String>> = vec![Vec::new(); fields.len()];
    let mut dropped = 0usize;
    for frame in frames {
        let Some(record) = frame.as_object() else {
            dropped += 1;
            continue;
        };
        let Some(values) = fields
            .iter()
            .map(|f| record.get(f).map(value_text))
            .collect::<Option<Vec<String>>>()
        else {
            dropped += 1;
            continue;
        };
        for (column, value) in raw.iter_mut().zip(values) {
            column.push(value);
        }
    }
    if dropped > 0 {
        log::warn!("dropped {} incomplete probe records", dropped);
    }

    let columns = fields
        .into_iter()
        .zip(raw)
        .map(|(name, values)| {
            let numeric: Option<Vec<f64>> = values.iter().map(|v| v.parse().ok()).collect();
            let column = match numeric {
                Some(numbers) => Column::Numeric(numbers),
                None => Column::Text(values),
            };
            (name, column)
        })
        .collect();
    VideoMetadata::from_columns(columns)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ----------------------------------------------------------------------------
// Timestamps
// ----------------------------------------------------------------------------

/// Rescale frame indices when the source dropped frames.
///
/// If the smallest positive step between successive indices is not 1,
/// every index is divided by it. Times are not consulted.
pub fn correct_timestamp(raw: &[i64]) -> Vec<i64> {
    let min_step = raw
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&d| d > 0)
        .min();
    match min_step {
        Some(step) if step != 1 => raw
            .iter()
            .map(|&v| (v as f64 / step as f64).round() as i64)
            .collect(),
        _ => raw.to_vec(),
    }
}

/// `/timestamp/raw` and `/timestamp/time`, one entry per stored frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimestampTable {
    pub raw: Vec<i64>,
    pub time: Vec<f64>,
}

impl TimestampTable {
    /// Timestamps for `frames` stored frames.
    ///
    /// Probe metadata is preferred; otherwise the timestamps the source
    /// recorded while reading. Short tables are padded with `UNKNOWN_RAW` and
    /// NaN, long ones truncated.
    pub fn build(metadata: &VideoMetadata, recorded: &[SourceTimestamp], frames: usize) -> Self {
        let (raw, time): (Vec<i64>, Vec<f64>) =
            match (metadata.numeric(RAW_TIMESTAMP_FIELD), metadata.numeric(TIME_FIELD)) {
                (Some(raw), Some(time)) => (
                    raw.iter().map(|&v| v.round() as i64).collect(),
                    time.to_vec(),
                ),
                _ if !recorded.is_empty() => {
                    log::debug!("probe metadata has no timestamps; using source frame log");
                    recorded.iter().map(|t| (t.frame, t.time)).unzip()
                }
                _ => (Vec::new(), Vec::new()),
            };

        if raw.len() != frames {
            log::debug!(
                "timestamp table has {} entries for {} stored frames",
                raw.len(),
                frames
            );
        }

        let mut raw = correct_timestamp(&raw);
        let mut time = time;
        raw.resize(frames, UNKNOWN_RAW);
        time.resize(frames, f64::NAN);
        Self { raw, time }
    }
}
