//! Frame types and the per-window frame buffer.
//!
//! - `PixelType`: native sample type reported by a source.
//! - `prepare_frame`: color -> grayscale, non-8-bit -> 8-bit rescale, clamp to `[1, 255]`.
//! - `FrameBuffer`: fixed-capacity window of 8-bit frames, reduced to one image per window.
//!
//! Pixel value 0 is reserved for "masked out". Every frame that enters a
//! `FrameBuffer` has been clamped to `[1, 255]` so that background zeroing is
//! the only way a stored pixel can become 0.

use image::{DynamicImage, GrayImage};

/// Native sample type of a video source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelType {
    U8,
    U16,
    F32,
}

impl PixelType {
    pub fn of(image: &DynamicImage) -> Self {
        use image::ColorType;
        match image.color() {
            ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => PixelType::U8,
            ColorType::Rgb32F | ColorType::Rgba32F => PixelType::F32,
            _ => PixelType::U16,
        }
    }

    pub fn is_u8(self) -> bool {
        self == PixelType::U8
    }
}

/// A frame ready for windowing.
#[derive(Debug)]
pub struct PreparedFrame {
    pub image: GrayImage,
    /// `(min, max)` of the native values when a rescale was applied.
    pub range: Option<(f32, f32)>,
    /// Every native pixel was zero before clamping.
    pub blank: bool,
}

/// Convert a decoded frame to the 8-bit single-channel form stored on disk.
pub fn prepare_frame(image: DynamicImage) -> PreparedFrame {
    let (mut gray, range) = match PixelType::of(&image) {
        PixelType::U8 => (image.into_luma8(), None),
        PixelType::U16 => {
            let native = image.into_luma16();
            let (w, h) = native.dimensions();
            let (gray, range) = rescale(native.as_raw().iter().map(|&v| v as f64), w, h);
            (gray, Some(range))
        }
        PixelType::F32 => {
            let native = image.to_luma32f();
            let (w, h) = native.dimensions();
            let (gray, range) = rescale(native.as_raw().iter().map(|&v| v as f64), w, h);
            (gray, Some(range))
        }
    };
    // judged on native values; a constant non-zero frame rescales to all zeros
    let blank = match range {
        Some((min, max)) => min == 0.0 && max == 0.0,
        None => gray.as_raw().iter().all(|&p| p == 0),
    };
    clamp_reserved(&mut gray);
    PreparedFrame {
        image: gray,
        range,
        blank,
    }
}

/// Affine rescale of `values` to 0..=255 using their own min/max.
fn rescale<I>(values: I, width: u32, height: u32) -> (GrayImage, (f32, f32))
where
    I: Iterator<Item = f64> + Clone,
{
    let (min, max) = values
        .clone()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let span = max - min;
    let pixels: Vec<u8> = if span > 0.0 && span.is_finite() {
        // truncation, not rounding
        values.map(|v| ((v - min) * 255.0 / span) as u8).collect()
    } else {
        values.map(|_| 0u8).collect()
    };
    let image = GrayImage::from_raw(width, height, pixels)
        .unwrap_or_else(|| GrayImage::new(width, height));
    (image, (min as f32, max as f32))
}

fn clamp_reserved(image: &mut GrayImage) {
    for p in image.iter_mut() {
        if *p == 0 {
            *p = 1;
        }
    }
}

/// Per-pixel minimum (light background) or maximum (dark background) across `frames`.
///
/// Returns `None` when `frames` is empty.
pub fn reduce_frames(frames: &[GrayImage], is_light_background: bool) -> Option<GrayImage> {
    let (first, rest) = frames.split_first()?;
    let mut out = first.clone();
    for frame in rest {
        for (acc, &v) in out.iter_mut().zip(frame.as_raw().iter()) {
            *acc = if is_light_background {
                (*acc).min(v)
            } else {
                (*acc).max(v)
            };
        }
    }
    Some(out)
}

// ----------------------------------------------------------------------------
// FrameBuffer: one reduction window
// ----------------------------------------------------------------------------

/// Fixed-capacity window of frames.
///
/// The buffer is reset, not resized, when a new window starts.
pub struct FrameBuffer {
    frames: Vec<GrayImage>,
    capacity: usize,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, frame: GrayImage) {
        debug_assert!(self.frames.len() < self.capacity);
        self.frames.push(frame);
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently filled slot.
    pub fn latest(&self) -> Option<&GrayImage> {
        self.frames.last()
    }

    /// Drop the most recently filled slot.
    pub fn discard_latest(&mut self) -> Option<GrayImage> {
        self.frames.pop()
    }

    pub fn frames(&self) -> &[GrayImage] {
        &self.frames
    }

    pub fn reduce(&self, is_light_background: bool) -> Option<GrayImage> {
        reduce_frames(&self.frames, is_light_background)
    }

    /// Multiply every frame by a 0/1 mask.
    pub fn apply_mask(&mut self, mask: &GrayImage) {
        let mask = mask.as_raw();
        for frame in &mut self.frames {
            for (p, &m) in frame.iter_mut().zip(mask.iter()) {
                if m == 0 {
                    *p = 0;
                }
            }
        }
    }

    /// Start a new window.
    pub fn reset(&mut self) {
        self.frames.clear();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
