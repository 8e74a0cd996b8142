//! Non-blocking line reader for subprocess pipes.
//!
//! A dedicated thread drains the stream into a bounded channel so the child
//! process never stalls on a full pipe buffer. The consuming side only polls;
//! it never blocks longer than the timeout it passes in.
//!
//! When both stdout and stderr of a child must be consumed, use one reader per
//! stream.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::io::{BufRead, BufReader, Read};
use std::thread::JoinHandle;
use std::time::Duration;

/// Default queue depth (lines) between the reader thread and the consumer.
pub const DEFAULT_LINE_CAPACITY: usize = 4096;

/// Outcome of a single poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineRead {
    Line(String),
    /// Nothing arrived within the timeout; the stream is still open.
    Empty,
    /// The stream reached EOF and every queued line has been consumed.
    Closed,
}

pub struct LineReader {
    rx: Receiver<String>,
    handle: Option<JoinHandle<()>>,
}

impl LineReader {
    pub fn spawn<R>(stream: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self::with_capacity(stream, DEFAULT_LINE_CAPACITY)
    }

    pub fn with_capacity<R>(stream: R, capacity: usize) -> Self
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = bounded::<String>(capacity.max(1));
        let handle = std::thread::spawn(move || {
            let mut reader = BufReader::new(stream);
            let mut raw = Vec::new();
            loop {
                raw.clear();
                match reader.read_until(b'\n', &mut raw) {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&raw)
                            .trim_end_matches(['\r', '\n'])
                            .to_string();
                        if tx.send(line).is_err() {
                            // consumer dropped
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        log::debug!("line reader stopped: {}", e);
                        break;
                    }
                }
            }
        });
        Self {
            rx,
            handle: Some(handle),
        }
    }

    /// Pop one line, waiting at most `timeout`.
    pub fn read(&self, timeout: Duration) -> LineRead {
        match self.rx.recv_timeout(timeout) {
            Ok(line) => LineRead::Line(line),
            Err(RecvTimeoutError::Timeout) => LineRead::Empty,
            Err(RecvTimeoutError::Disconnected) => LineRead::Closed,
        }
    }

    /// Take every line that is queued right now without waiting.
    pub fn drain_available(&self) -> Vec<String> {
        self.rx.try_iter().collect()
    }

    /// Wait for the stream to close (bounded by `timeout` per line) and
    /// return the remaining lines.
    pub fn drain_until_closed(&mut self, timeout: Duration) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            match self.read(timeout) {
                LineRead::Line(line) => lines.push(line),
                LineRead::Empty => break,
                LineRead::Closed => {
                    if let Some(handle) = self.handle.take() {
                        let _ = handle.join();
                    }
                    break;
                }
            }
        }
        lines
    }
}
