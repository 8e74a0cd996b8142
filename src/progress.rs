use std::time::{Duration, Instant};

/// Processed frames between progress log lines.
pub const REPORT_EVERY: u64 = 500;

/// Receives frame counts as the run advances. The CLI draws a bar with it.
pub trait ProgressObserver {
    fn frames_processed(&self, processed: u64, expected: Option<u64>);
}

/// Counters of one compression run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressState {
    /// Frames read and accepted so far.
    pub frames: u64,
    /// Unmasked snapshots written so far.
    pub full_frames: u64,
    /// Slots filled in the current window.
    pub buffer_fill: usize,
}

pub struct ProgressCounter<'a> {
    start: Instant,
    expected: Option<u64>,
    observer: Option<&'a dyn ProgressObserver>,
}

impl<'a> ProgressCounter<'a> {
    pub fn new(expected: Option<u64>, observer: Option<&'a dyn ProgressObserver>) -> Self {
        Self {
            start: Instant::now(),
            expected,
            observer,
        }
    }

    pub fn update(&self, frames: u64) {
        if let Some(observer) = self.observer {
            observer.frames_processed(frames, self.expected);
        }
        if frames > 0 && frames % REPORT_EVERY == 0 {
            log::info!("{}", self.line(frames));
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// `elapsed; frames N[/M]; fps F`
    pub fn line(&self, frames: u64) -> String {
        let elapsed = self.start.elapsed();
        let fps = if elapsed.as_secs_f64() > 0.0 {
            frames as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let total = match self.expected {
            Some(expected) => format!("{}/{}", frames, expected),
            None => frames.to_string(),
        };
        format!(
            "elapsed {}; frames {}; {:.1} fps",
            format_duration(elapsed),
            total,
            fps
        )
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
