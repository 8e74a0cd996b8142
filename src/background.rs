//! Optional background removal applied to a window before reduction.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::frame::{prepare_frame, reduce_frames};
use crate::ingest::VideoSource;
use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundParams {
    pub is_subtraction: bool,
    /// Number of frames sampled to estimate the background.
    pub buffer_size: usize,
    /// Source frames between samples.
    pub frame_gap: usize,
}

impl Default for BackgroundParams {
    fn default() -> Self {
        Self {
            is_subtraction: false,
            buffer_size: 100,
            frame_gap: 10,
        }
    }
}

pub trait BackgroundSubtractor {
    /// Foreground magnitude of each frame; subjects come out bright.
    fn apply(&mut self, frames: &[GrayImage]) -> Vec<GrayImage>;
}

/// Static background estimated from frames sampled across the video.
pub struct SampledBackground {
    background: GrayImage,
    is_light_background: bool,
}

impl SampledBackground {
    /// Background from already decoded frames: per-pixel max on a light
    /// background, min on a dark one.
    pub fn from_frames(frames: &[GrayImage], is_light_background: bool) -> Option<Self> {
        let background = reduce_frames(frames, !is_light_background)?;
        Some(Self {
            background,
            is_light_background,
        })
    }

    /// Sample `params.buffer_size` frames, `params.frame_gap` apart, from a
    /// dedicated source instance.
    pub fn from_source(
        source: &mut VideoSource,
        params: &BackgroundParams,
        is_light_background: bool,
    ) -> Result<Self> {
        let gap = params.frame_gap.max(1) as u64;
        let mut samples = Vec::with_capacity(params.buffer_size);

        if source.supports_random_access() {
            for i in 0..params.buffer_size as u64 {
                match source.read_at(i * gap)? {
                    Some(frame) => samples.push(prepare_frame(frame).image),
                    None => break,
                }
            }
        } else {
            let mut index = 0u64;
            while samples.len() < params.buffer_size {
                let Some(frame) = source.read()? else {
                    break;
                };
                if index % gap == 0 {
                    samples.push(prepare_frame(frame).image);
                }
                index += 1;
            }
        }
        source.release();

        log::info!("background estimated from {} sampled frames", samples.len());
        Self::from_frames(&samples, is_light_background).ok_or_else(|| {
            Error::InvalidSource("no frames available for background estimation".into())
        })
    }

    pub fn background(&self) -> &GrayImage {
        &self.background
    }
}

impl BackgroundSubtractor for SampledBackground {
    fn apply(&mut self, frames: &[GrayImage]) -> Vec<GrayImage> {
        frames
            .iter()
            .map(|frame| {
                let mut out = frame.clone();
                for (p, &b) in out.iter_mut().zip(self.background.as_raw().iter()) {
                    *p = if self.is_light_background {
                        b.saturating_sub(*p)
                    } else {
                        p.saturating_sub(b)
                    };
                }
                out
            })
            .collect()
    }
}

/// Reduce a background-subtracted window to the polarity the mask expects.
pub fn reduce_foreground(foreground: &[GrayImage], is_light_background: bool) -> Option<GrayImage> {
    let mut reduced = reduce_frames(foreground, false)?;
    if is_light_background {
        for p in reduced.iter_mut() {
            *p = 255 - *p;
        }
    }
    Some(reduced)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(values: &[u8]) -> GrayImage {
        GrayImage::from_raw(values.len() as u32, 1, values.to_vec()).unwrap()
    }

    #[test]
    fn light_background_subject_becomes_bright_then_dark() {
        let frames = vec![gray(&[200, 200, 60]), gray(&[200, 50, 200])];
        let mut bg = SampledBackground::from_frames(&frames, true).unwrap();
        assert_eq!(bg.background().as_raw(), &vec![200, 200, 200]);

        let fg = bg.apply(&frames);
        assert_eq!(fg[0].as_raw(), &vec![0, 0, 140]);
        assert_eq!(fg[1].as_raw(), &vec![0, 150, 0]);

        let reduced = reduce_foreground(&fg, true).unwrap();
        assert_eq!(reduced.as_raw(), &vec![255, 105, 115]);
    }

    #[test]
    fn seekable_source_is_sampled_frame_gap_apart() {
        let mut source =
            VideoSource::open("stub://48x40?frames=30", &crate::ToolPaths::none()).unwrap();
        let params = BackgroundParams {
            is_subtraction: true,
            buffer_size: 2,
            frame_gap: 8,
        };
        let bg = SampledBackground::from_source(&mut source, &params, true).unwrap();
        // frames 0 and 8 put the subject at x 14..26 and 22..34
        assert_eq!(bg.background().dimensions(), (48, 40));
        assert_eq!(bg.background().get_pixel(15, 20)[0], 200);
        assert_eq!(bg.background().get_pixel(23, 20)[0], 40);
        assert_eq!(bg.background().get_pixel(0, 0)[0], 200);
    }

    #[test]
    fn empty_source_cannot_estimate_background() {
        let mut source =
            VideoSource::open("stub://48x40?frames=0", &crate::ToolPaths::none()).unwrap();
        let err = SampledBackground::from_source(&mut source, &BackgroundParams::default(), true)
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidSource(_)));
    }

    #[test]
    fn dark_background_keeps_bright_subjects() {
        let frames = vec![gray(&[10, 180]), gray(&[10, 10])];
        let mut bg = SampledBackground::from_frames(&frames, false).unwrap();
        let fg = bg.apply(&frames);
        let reduced = reduce_foreground(&fg, false).unwrap();
        assert_eq!(reduced.as_raw(), &vec![0, 170]);
    }
}
