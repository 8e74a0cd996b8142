//! Video file source backed by an external `ffmpeg` process.
//!
//! The decoder writes raw 8-bit grayscale frames to stdout and one `showinfo`
//! line per frame to stderr. stderr is drained through a `LineReader` after
//! every frame so the child never blocks on a full pipe; the `(n, pts_time)`
//! pairs found there are kept for timestamp reconciliation.

use image::{DynamicImage, GrayImage};
use regex::Regex;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::OnceLock;
use std::time::Duration;

use super::SourceTimestamp;
use crate::line_reader::LineReader;
use crate::{Error, Result};

/// How long `release()` waits for trailing stderr lines.
const RELEASE_DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

pub struct FfmpegSource {
    path: PathBuf,
    width: u32,
    height: u32,
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
    stderr: Option<LineReader>,
    timestamps: Vec<SourceTimestamp>,
    frames_read: u64,
}

impl FfmpegSource {
    pub fn open(path: &Path, ffmpeg: Option<&Path>) -> Result<Self> {
        if !path.exists() {
            return Err(Error::not_found(path));
        }
        let ffmpeg = ffmpeg.ok_or_else(|| {
            Error::NotFound("ffmpeg binary not found; cannot decode video files".into())
        })?;

        let (width, height) = probe_resolution(ffmpeg, path)?;
        let frame_bytes = width as usize * height as usize;

        let mut child = Command::new(ffmpeg)
            .arg("-i")
            .arg(path)
            .args(["-f", "image2pipe"])
            // drop rather than duplicate frames on timestamp jumps; drops are
            // reconciled from the frame log afterwards
            .args(["-vsync", "drop"])
            .args(["-threads", "0"])
            .args(["-vf", "showinfo"])
            .args(["-pix_fmt", "gray"])
            .args(["-vcodec", "rawvideo"])
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::NotFound(format!("failed to spawn {}: {}", ffmpeg.display(), e))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Format("ffmpeg stdout missing".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Format("ffmpeg stderr missing".into()))?;

        log::info!(
            "ffmpeg decoder started for {} ({}x{})",
            path.display(),
            width,
            height
        );

        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            child: Some(child),
            stdout: Some(BufReader::with_capacity(frame_bytes.max(1), stdout)),
            stderr: Some(LineReader::spawn(stderr)),
            timestamps: Vec::new(),
            frames_read: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn read(&mut self) -> Result<Option<DynamicImage>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };
        let mut buf = vec![0u8; self.width as usize * self.height as usize];
        let got = read_exact_or_eof(stdout, &mut buf)?;
        if got < buf.len() {
            log::debug!(
                "ffmpeg stream for {} ended after {} frames",
                self.path.display(),
                self.frames_read
            );
            return Ok(None);
        }
        self.frames_read += 1;
        self.collect_timestamps();

        let frame = GrayImage::from_raw(self.width, self.height, buf)
            .ok_or_else(|| Error::Format("decoded frame has unexpected size".into()))?;
        Ok(Some(DynamicImage::ImageLuma8(frame)))
    }

    pub fn frame_timestamps(&self) -> &[SourceTimestamp] {
        &self.timestamps
    }

    fn collect_timestamps(&mut self) {
        if let Some(stderr) = &self.stderr {
            for line in stderr.drain_available() {
                if let Some(ts) = parse_showinfo_line(&line) {
                    self.timestamps.push(ts);
                }
            }
        }
    }

    /// Flush pending stderr, terminate the decoder and reap it.
    pub fn release(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        self.stdout = None;
        if let Some(mut stderr) = self.stderr.take() {
            for line in stderr.drain_until_closed(RELEASE_DRAIN_TIMEOUT) {
                if let Some(ts) = parse_showinfo_line(&line) {
                    self.timestamps.push(ts);
                }
            }
        }
        if let Err(e) = child.kill() {
            log::debug!("ffmpeg already exited: {}", e);
        }
        match child.wait() {
            Ok(status) => log::debug!("ffmpeg decoder exited with {}", status),
            Err(e) => log::warn!("failed to reap ffmpeg decoder: {}", e),
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Run `ffmpeg -i <file>` and read the frame size from its banner.
fn probe_resolution(ffmpeg: &Path, path: &Path) -> Result<(u32, u32)> {
    let output = Command::new(ffmpeg)
        .arg("-hide_banner")
        .arg("-i")
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| Error::NotFound(format!("failed to run {}: {}", ffmpeg.display(), e)))?;
    let banner = String::from_utf8_lossy(&output.stderr);
    parse_resolution(&banner).ok_or_else(|| {
        let tail: String = banner.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
        Error::Format(format!(
            "could not read the frame size of {} from ffmpeg output: {}",
            path.display(),
            tail
        ))
    })
}

/// Frame size from the first `Video:` stream line, e.g.
/// `Stream #0:0: Video: h264 (avc1 / 0x31637661), yuv420p, 640x480 [SAR 1:1], 25 fps`.
pub(crate) fn parse_resolution(banner: &str) -> Option<(u32, u32)> {
    static SIZE: OnceLock<Regex> = OnceLock::new();
    let size = SIZE.get_or_init(|| Regex::new(r"^\s*(\d+)x(\d+)").expect("static regex"));

    let line = banner.lines().find(|l| l.contains("Video: "))?;
    let (_, stream) = line.split_once("Video: ")?;
    stream.split(',').find_map(|segment| {
        let caps = size.captures(segment)?;
        let width = caps[1].parse().ok()?;
        let height = caps[2].parse().ok()?;
        Some((width, height))
    })
}

/// `(n, pts_time)` from a `showinfo` filter line.
pub(crate) fn parse_showinfo_line(line: &str) -> Option<SourceTimestamp> {
    static SHOWINFO: OnceLock<Regex> = OnceLock::new();
    let re = SHOWINFO.get_or_init(|| {
        Regex::new(r"\bn:\s*(\d+)\b.*\bpts_time:\s*(-?[0-9.]+(?:[eE][-+]?\d+)?)")
            .expect("static regex")
    });
    let caps = re.captures(line)?;
    Some(SourceTimestamp {
        frame: caps[1].parse().ok()?,
        time: caps[2].parse().ok()?,
    })
}

fn read_exact_or_eof(r: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut got = 0usize;
    while got < buf.len() {
        match r.read(&mut buf[got..]) {
            Ok(0) => return Ok(got),
            Ok(n) => got += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(got)
}
