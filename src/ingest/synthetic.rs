//! Deterministic synthetic source for demos and tests.
//!
//! URI form: `stub://<W>x<H>?frames=<N>[&blank_tail=1][&depth=16]`
//!
//! Frames show a light field (200) with one dark square (40) that drifts
//! back and forth around the centre. `blank_tail=1` makes the last frame
//! all zeros, the way some decoders emit a trailing empty frame.
//! `depth=16` serves 16-bit frames scaled from the 8-bit pattern.

use image::{DynamicImage, GrayImage, ImageBuffer, Luma};

use crate::frame::PixelType;
use crate::{Error, Result};

pub const STUB_SCHEME: &str = "stub://";

const DEFAULT_FRAMES: u64 = 100;
const FIELD: u8 = 200;
const SUBJECT: u8 = 40;
const SUBJECT_SIDE: u32 = 12;
/// Frames per back-and-forth sweep.
const SWEEP: u64 = 16;

pub struct SyntheticSource {
    width: u32,
    height: u32,
    frames: u64,
    blank_tail: bool,
    deep: bool,
    next: u64,
}

impl SyntheticSource {
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix(STUB_SCHEME)
            .ok_or_else(|| Error::InvalidSource(format!("not a stub uri: {}", uri)))?;
        let (size, query) = rest.split_once('?').unwrap_or((rest, ""));
        let (w, h) = size
            .split_once('x')
            .ok_or_else(|| Error::InvalidSource(format!("stub uri needs <W>x<H>: {}", uri)))?;
        let width: u32 = w
            .parse()
            .map_err(|_| Error::InvalidSource(format!("bad stub width: {}", w)))?;
        let height: u32 = h
            .parse()
            .map_err(|_| Error::InvalidSource(format!("bad stub height: {}", h)))?;
        if width == 0 || height == 0 {
            return Err(Error::InvalidSource(format!(
                "stub source has zero geometry: {}x{}",
                width, height
            )));
        }

        let mut source = Self {
            width,
            height,
            frames: DEFAULT_FRAMES,
            blank_tail: false,
            deep: false,
            next: 0,
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "frames" => {
                    source.frames = value.parse().map_err(|_| {
                        Error::InvalidSource(format!("bad stub frame count: {}", value))
                    })?
                }
                "blank_tail" => source.blank_tail = value == "1" || value == "true",
                "depth" => source.deep = value == "16",
                other => log::warn!("ignoring unknown stub parameter {}", other),
            }
        }
        Ok(source)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> u64 {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    pub fn pixel_type(&self) -> PixelType {
        if self.deep {
            PixelType::U16
        } else {
            PixelType::U8
        }
    }

    pub fn read(&mut self) -> Result<Option<DynamicImage>> {
        let frame = self.read_at(self.next)?;
        if frame.is_some() {
            self.next += 1;
        }
        Ok(frame)
    }

    pub fn read_at(&mut self, index: u64) -> Result<Option<DynamicImage>> {
        if index >= self.frames {
            return Ok(None);
        }
        let base = if self.blank_tail && index + 1 == self.frames {
            GrayImage::new(self.width, self.height)
        } else {
            self.render(index)
        };
        if !self.deep {
            return Ok(Some(DynamicImage::ImageLuma8(base)));
        }
        let wide: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_raw(
            self.width,
            self.height,
            base.as_raw().iter().map(|&v| v as u16 * 257).collect(),
        )
        .ok_or_else(|| Error::Format("synthetic frame has unexpected size".into()))?;
        Ok(Some(DynamicImage::ImageLuma16(wide)))
    }

    fn render(&self, index: u64) -> GrayImage {
        let mut img = GrayImage::from_pixel(self.width, self.height, Luma([FIELD]));
        let phase = index % SWEEP;
        let drift = if phase < SWEEP / 2 {
            phase
        } else {
            SWEEP - phase
        } as u32;
        let x0 = (self.width / 2).saturating_sub(SUBJECT_SIDE / 2 + SWEEP as u32 / 4) + drift;
        let y0 = (self.height / 2).saturating_sub(SUBJECT_SIDE / 2);
        for y in y0..(y0 + SUBJECT_SIDE).min(self.height) {
            for x in x0..(x0 + SUBJECT_SIDE).min(self.width) {
                img.put_pixel(x, y, Luma([SUBJECT]));
            }
        }
        img
    }
}
