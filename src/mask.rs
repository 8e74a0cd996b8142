//! Region-of-interest mask.
//!
//! `compute_roi_mask` turns a reduced grayscale image (one per window) into a
//! 0/1 keep-mask:
//!
//! 1. 5x5 median smoothing.
//! 2. Local mean adaptive threshold (`thresh_block_size` forced odd, bias `thresh_c`).
//! 3. 8-connected components of the foreground estimate.
//! 4. Border and area (`[min_area, max_area]`, inclusive) rejection.
//! 5. Filled rasterisation of survivors, outermost pixel ring zeroed.
//! 6. Elliptical dilation, 3 iterations.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const MEDIAN_SIZE: usize = 5;
const DILATION_ITERATIONS: usize = 3;

/// Parameters of the ROI mask.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskParams {
    pub min_area: u32,
    pub max_area: u32,
    pub thresh_block_size: u32,
    pub thresh_c: f64,
    pub dilation_size: u32,
    pub keep_border_data: bool,
    pub is_light_background: bool,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            min_area: 100,
            max_area: 5000,
            thresh_block_size: 61,
            thresh_c: 15.0,
            dilation_size: 9,
            keep_border_data: false,
            is_light_background: true,
        }
    }
}

/// Compute the keep-mask for `image`. Output pixels are 0 or 1.
pub fn compute_roi_mask(image: &GrayImage, params: &MaskParams) -> GrayImage {
    let (w, h) = image.dimensions();
    let (wu, hu) = (w as usize, h as usize);
    if wu == 0 || hu == 0 {
        return GrayImage::new(w, h);
    }

    let smoothed = median_filter(image.as_raw(), wu, hu, MEDIAN_SIZE);

    let mut block = params.thresh_block_size.max(1) as usize;
    if block % 2 == 0 {
        block += 1;
    }
    let foreground = adaptive_threshold(
        &smoothed,
        wu,
        hu,
        block,
        params.thresh_c,
        params.is_light_background,
    );

    let mut mask = select_components(&foreground, wu, hu, params);

    // filled rasterisation leaves the outer ring set when a blob touches it
    for x in 0..wu {
        mask[x] = 0;
        mask[(hu - 1) * wu + x] = 0;
    }
    for y in 0..hu {
        mask[y * wu] = 0;
        mask[y * wu + wu - 1] = 0;
    }

    let element = ellipse_element(params.dilation_size.max(1) as usize);
    for _ in 0..DILATION_ITERATIONS {
        mask = dilate(&mask, wu, hu, &element);
    }

    GrayImage::from_raw(w, h, mask).unwrap_or_else(|| GrayImage::new(w, h))
}

/// Half-sample symmetric reflection of an out-of-range index.
fn reflect(i: isize, n: usize) -> usize {
    let n = n as isize;
    let mut i = i;
    loop {
        if i < 0 {
            i = -i - 1;
        } else if i >= n {
            i = 2 * n - i - 1;
        } else {
            return i as usize;
        }
    }
}

fn median_filter(src: &[u8], w: usize, h: usize, size: usize) -> Vec<u8> {
    let half = (size / 2) as isize;
    let mut out = vec![0u8; src.len()];
    let mut window = Vec::with_capacity(size * size);
    for y in 0..h {
        for x in 0..w {
            window.clear();
            for dy in -half..=half {
                let yy = reflect(y as isize + dy, h);
                for dx in -half..=half {
                    let xx = reflect(x as isize + dx, w);
                    window.push(src[yy * w + xx]);
                }
            }
            let mid = window.len() / 2;
            let (_, median, _) = window.select_nth_unstable(mid);
            out[y * w + x] = *median;
        }
    }
    out
}

/// Mean-C adaptive threshold with replicated borders.
///
/// Light background: foreground where `src <= mean - C`.
/// Dark background: foreground where `src > mean + C`.
fn adaptive_threshold(
    src: &[u8],
    w: usize,
    h: usize,
    block: usize,
    c: f64,
    is_light_background: bool,
) -> Vec<bool> {
    let r = block / 2;
    let pw = w + 2 * r;
    let ph = h + 2 * r;

    // integral image over the replicate-padded source
    let mut integral = vec![0u64; (pw + 1) * (ph + 1)];
    for py in 0..ph {
        let sy = py.saturating_sub(r).min(h - 1);
        let mut row_sum = 0u64;
        for px in 0..pw {
            let sx = px.saturating_sub(r).min(w - 1);
            row_sum += src[sy * w + sx] as u64;
            integral[(py + 1) * (pw + 1) + px + 1] = integral[py * (pw + 1) + px + 1] + row_sum;
        }
    }

    let area = (block * block) as f64;
    let delta = c.floor() as i32;
    let mut out = vec![false; w * h];
    for y in 0..h {
        for x in 0..w {
            // window [x, x + block) in padded coordinates is centred on (x, y)
            let (x0, y0, x1, y1) = (x, y, x + block, y + block);
            let sum = integral[y1 * (pw + 1) + x1] + integral[y0 * (pw + 1) + x0]
                - integral[y0 * (pw + 1) + x1]
                - integral[y1 * (pw + 1) + x0];
            let mean = (sum as f64 / area).round() as i32;
            let diff = src[y * w + x] as i32 - mean;
            out[y * w + x] = if is_light_background {
                diff <= -delta
            } else {
                diff > delta
            };
        }
    }
    out
}

struct Component {
    pixels: Vec<usize>,
    touches_border: bool,
}

fn label_components(foreground: &[bool], w: usize, h: usize) -> Vec<Component> {
    let mut seen = vec![false; foreground.len()];
    let mut components = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..foreground.len() {
        if !foreground[start] || seen[start] {
            continue;
        }
        seen[start] = true;
        queue.push_back(start);
        let mut pixels = Vec::new();
        let mut touches_border = false;

        while let Some(idx) = queue.pop_front() {
            pixels.push(idx);
            let (x, y) = (idx % w, idx / w);
            // contour tracing never reaches the outermost ring, so the
            // second ring already counts as the border
            if x <= 1 || y <= 1 || x + 2 >= w || y + 2 >= h {
                touches_border = true;
            }
            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = x as isize + dx;
                    let ny = y as isize + dy;
                    if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                        continue;
                    }
                    let n = ny as usize * w + nx as usize;
                    if foreground[n] && !seen[n] {
                        seen[n] = true;
                        queue.push_back(n);
                    }
                }
            }
        }
        components.push(Component {
            pixels,
            touches_border,
        });
    }
    components
}

/// Rasterise the components that pass the border and area filters, holes filled.
fn select_components(foreground: &[bool], w: usize, h: usize, params: &MaskParams) -> Vec<u8> {
    let mut mask = vec![0u8; w * h];
    for component in label_components(foreground, w, h) {
        if component.touches_border && !params.keep_border_data {
            continue;
        }
        let area = component.pixels.len() as u64;
        if area < params.min_area as u64 || area > params.max_area as u64 {
            continue;
        }
        for idx in component.pixels {
            mask[idx] = 1;
        }
    }
    fill_holes(&mut mask, w, h);
    mask
}

/// Set every 0-region that is not 4-connected to the image edge.
fn fill_holes(mask: &mut [u8], w: usize, h: usize) {
    let mut outside = vec![false; mask.len()];
    let mut queue = VecDeque::new();
    for y in 0..h {
        for x in 0..w {
            let edge = x == 0 || y == 0 || x + 1 == w || y + 1 == h;
            let idx = y * w + x;
            if edge && mask[idx] == 0 && !outside[idx] {
                outside[idx] = true;
                queue.push_back(idx);
            }
        }
    }
    while let Some(idx) = queue.pop_front() {
        let (x, y) = (idx % w, idx / w);
        let mut visit = |n: usize| {
            if mask[n] == 0 && !outside[n] {
                outside[n] = true;
                queue.push_back(n);
            }
        };
        if x > 0 {
            visit(idx - 1);
        }
        if x + 1 < w {
            visit(idx + 1);
        }
        if y > 0 {
            visit(idx - w);
        }
        if y + 1 < h {
            visit(idx + w);
        }
    }
    for (m, out) in mask.iter_mut().zip(outside) {
        if *m == 0 && !out {
            *m = 1;
        }
    }
}

/// Offsets `(dx, dy)` of an elliptical structuring element of `size x size`,
/// anchored at its centre.
fn ellipse_element(size: usize) -> Vec<(isize, isize)> {
    let r = (size / 2) as isize;
    let c = (size / 2) as isize;
    let inv_r2 = if r > 0 { 1.0 / (r * r) as f64 } else { 0.0 };
    let mut offsets = Vec::new();
    for i in 0..size as isize {
        let dy = i - r;
        if dy.abs() > r {
            continue;
        }
        let dx = (c as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round() as isize;
        let j1 = (c - dx).max(0);
        let j2 = (c + dx + 1).min(size as isize);
        for j in j1..j2 {
            offsets.push((j - c, dy));
        }
    }
    offsets
}

fn dilate(src: &[u8], w: usize, h: usize, element: &[(isize, isize)]) -> Vec<u8> {
    let mut out = vec![0u8; src.len()];
    for (idx, &v) in src.iter().enumerate() {
        if v == 0 {
            continue;
        }
        let (x, y) = ((idx % w) as isize, (idx / w) as isize);
        // out(p) = max over element of src(p + d), so a set pixel stamps at p - d
        for &(dx, dy) in element {
            let tx = x - dx;
            let ty = y - dy;
            if tx >= 0 && ty >= 0 && (tx as usize) < w && (ty as usize) < h {
                out[ty as usize * w + tx as usize] = 1;
            }
        }
    }
    out
}
