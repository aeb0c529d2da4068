//! Grayscale conversion, background subtraction, adaptive thresholding, and
//! the camera-only auto-crop/contrast-stretch steps
//!
//! Every function here takes its pixel buffer, dimensions, and an explicit
//! `is_camera` flag rather than reaching for ambient state, matching the
//! "explicit buffer parameters" convention the rest of the workspace uses.

use serde::{Deserialize, Serialize};

use crate::geom::sample_bilinear_u8;

/// A 1-bit-per-pixel plane stored one byte per pixel (0 or 1) for simplicity;
/// `1` means "darker than the local threshold", i.e. candidate ink.
#[derive(Clone, Debug)]
pub struct BinaryPlane {
    pub width: usize,
    pub height: usize,
    pub bits: Vec<u8>,
}

impl BinaryPlane {
    fn empty(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            bits: vec![0u8; width * height],
        }
    }

    #[inline]
    pub fn get(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return 0;
        }
        self.bits[y as usize * self.width + x as usize]
    }
}

/// Tunable constants for the preprocessing pipeline, split by source.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PreprocessParams {
    /// Downsample factor for background-subtraction's local-max pass.
    pub bg_downsample: usize,
    /// Percentile pair used by camera contrast stretch (low, high), in [0,1].
    pub stretch_percentiles: (f32, f32),
    /// Unsharp-mask blend weight.
    pub unsharp_weight: f32,
    /// Fraction of the frame the cropped box must keep to be applied.
    pub auto_crop_min_fraction: f32,
    /// Padding fraction added around the detected paper box.
    pub auto_crop_pad_fraction: f32,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            bg_downsample: 8,
            stretch_percentiles: (0.02, 0.95),
            unsharp_weight: 0.3,
            auto_crop_min_fraction: 0.94,
            auto_crop_pad_fraction: 0.015,
        }
    }
}

/// Y = round(0.299 R + 0.587 G + 0.114 B), channel-wise RGBA -> 8-bit luma.
pub fn grayscale(rgba: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = vec![0u8; width * height];
    for (i, px) in out.iter_mut().enumerate() {
        let r = rgba[i * 4] as f32;
        let g = rgba[i * 4 + 1] as f32;
        let b = rgba[i * 4 + 2] as f32;
        *px = (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Divide out multiplicative lighting: downsample by local max, box-smooth,
/// bilinear-upsample, then `normalized = clamp(round(gray / max(1,bg) * 255))`.
pub fn subtract_background(
    gray: &[u8],
    width: usize,
    height: usize,
    params: &PreprocessParams,
) -> Vec<u8> {
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let factor = params.bg_downsample.max(1);
    let dw = width.div_ceil(factor).max(1);
    let dh = height.div_ceil(factor).max(1);

    let mut down = vec![0u8; dw * dh];
    for dy in 0..dh {
        for dx in 0..dw {
            let x0 = dx * factor;
            let y0 = dy * factor;
            let x1 = (x0 + factor).min(width);
            let y1 = (y0 + factor).min(height);
            let mut max_v = 0u8;
            for y in y0..y1 {
                for x in x0..x1 {
                    max_v = max_v.max(gray[y * width + x]);
                }
            }
            down[dy * dw + dx] = max_v;
        }
    }

    let smoothed = box_mean_3x3(&down, dw, dh);

    let mut normalized = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            // Map full-res pixel center into downsampled space for sampling.
            let sx = (x as f32 + 0.5) / factor as f32 - 0.5;
            let sy = (y as f32 + 0.5) / factor as f32 - 0.5;
            let bg = sample_bilinear_u8(&smoothed, dw, dh, sx, sy).max(1) as f32;
            let g = gray[y * width + x] as f32;
            let v = (g / bg * 255.0).round().clamp(0.0, 255.0) as u8;
            normalized[y * width + x] = v;
        }
    }
    normalized
}

fn box_mean_3x3(plane: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            let mut sum = 0u32;
            let mut count = 0u32;
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if nx < 0 || ny < 0 || nx as usize >= width || ny as usize >= height {
                        continue;
                    }
                    sum += plane[ny as usize * width + nx as usize] as u32;
                    count += 1;
                }
            }
            out[y * width + x] = (sum / count.max(1)) as u8;
        }
    }
    out
}

/// Otsu's global threshold over a 256-bin histogram, maximizing between-class variance.
pub fn otsu_threshold(gray: &[u8]) -> u8 {
    if gray.is_empty() {
        return 127;
    }
    let mut hist = [0u32; 256];
    for &v in gray {
        hist[v as usize] += 1;
    }

    let total = gray.len() as f64;
    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum();

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = 127u8;

    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b == 0.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f <= 0.0 {
            break;
        }
        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;
        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }
    best_t
}

/// Compute the integral (summed-area table) of a grayscale plane.
///
/// `integral[y*(w+1)+x]` sums the rectangle `[0,0)..(x,y)`, exclusive.
fn integral_image(gray: &[u8], width: usize, height: usize) -> Vec<u64> {
    let stride = width + 1;
    let mut table = vec![0u64; stride * (height + 1)];
    for y in 0..height {
        let mut row_sum = 0u64;
        for x in 0..width {
            row_sum += gray[y * width + x] as u64;
            table[(y + 1) * stride + (x + 1)] = row_sum + table[y * stride + (x + 1)];
        }
    }
    table
}

fn region_mean(
    integral: &[u64],
    width: usize,
    height: usize,
    cx: usize,
    cy: usize,
    half_side: usize,
) -> u8 {
    let stride = width + 1;
    let x0 = cx.saturating_sub(half_side);
    let y0 = cy.saturating_sub(half_side);
    let x1 = (cx + half_side + 1).min(width);
    let y1 = (cy + half_side + 1).min(height);

    let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
        - integral[y0 * stride + x1]
        - integral[y1 * stride + x0];
    let area = ((x1 - x0) * (y1 - y0)).max(1) as u64;
    (sum / area) as u8
}

/// Adaptive threshold via an integral image; emits `1` where the
/// normalized plane is darker than the local threshold.
pub fn adaptive_threshold(normalized: &[u8], width: usize, height: usize, is_camera: bool) -> BinaryPlane {
    if width == 0 || height == 0 {
        return BinaryPlane::empty(width, height);
    }

    let min_dim = width.min(height);
    let half_side = if is_camera {
        (min_dim / 18).max(15)
    } else {
        (min_dim / 35).max(8)
    };

    let integral = integral_image(normalized, width, height);
    let global_mean = (normalized.iter().map(|&v| v as u64).sum::<u64>() / normalized.len() as u64) as f64;
    let otsu_global = otsu_threshold(normalized);

    let mut bits = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            let local_mean = region_mean(&integral, width, height, x, y, half_side) as i32;
            let threshold = if is_camera {
                let offset = (4.0f64).max((global_mean * 0.05).round()) as i32;
                local_mean - offset
            } else {
                (otsu_global as i32).min(local_mean - 8)
            };
            let v = normalized[y * width + x] as i32;
            bits[y * width + x] = if v < threshold { 1 } else { 0 };
        }
    }

    BinaryPlane { width, height, bits }
}

/// Locate the paper rectangle in a camera frame and crop it
/// Returns `(x0, y0, x1, y1)`, the full frame if cropping would remove less
/// than `1 - auto_crop_min_fraction` along either axis.
pub fn camera_auto_crop(
    gray: &[u8],
    width: usize,
    height: usize,
    params: &PreprocessParams,
) -> (usize, usize, usize, usize) {
    if width == 0 || height == 0 {
        return (0, 0, width, height);
    }

    let row_brightness: Vec<f32> = (0..height)
        .map(|y| {
            let sum: u64 = (0..width).map(|x| gray[y * width + x] as u64).sum();
            sum as f32 / width as f32
        })
        .collect();
    let col_brightness: Vec<f32> = (0..width)
        .map(|x| {
            let sum: u64 = (0..height).map(|y| gray[y * width + x] as u64).sum();
            sum as f32 / height as f32
        })
        .collect();

    let median = |v: &[f32]| -> f32 {
        let mut sorted = v.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        sorted[sorted.len() / 2]
    };
    let row_med = median(&row_brightness);
    let col_med = median(&col_brightness);

    let thresh_row = 0.65 * row_med;
    let thresh_col = 0.65 * col_med;

    let y0 = row_brightness
        .iter()
        .position(|&b| b > thresh_row)
        .unwrap_or(0);
    let y1 = row_brightness
        .iter()
        .rposition(|&b| b > thresh_row)
        .map(|i| i + 1)
        .unwrap_or(height);
    let x0 = col_brightness
        .iter()
        .position(|&b| b > thresh_col)
        .unwrap_or(0);
    let x1 = col_brightness
        .iter()
        .rposition(|&b| b > thresh_col)
        .map(|i| i + 1)
        .unwrap_or(width);

    let pad_x = (width as f32 * params.auto_crop_pad_fraction).round() as i64;
    let pad_y = (height as f32 * params.auto_crop_pad_fraction).round() as i64;

    let px0 = (x0 as i64 - pad_x).max(0) as usize;
    let py0 = (y0 as i64 - pad_y).max(0) as usize;
    let px1 = ((x1 as i64 + pad_x).max(0) as usize).min(width);
    let py1 = ((y1 as i64 + pad_y).max(0) as usize).min(height);

    let kept_w = px1.saturating_sub(px0) as f32 / width as f32;
    let kept_h = py1.saturating_sub(py0) as f32 / height as f32;

    if kept_w < params.auto_crop_min_fraction || kept_h < params.auto_crop_min_fraction {
        (px0, py0, px1.max(px0 + 1), py1.max(py0 + 1))
    } else {
        (0, 0, width, height)
    }
}

/// Percentile-based linear contrast stretch followed by an unsharp mask
/// (camera-only, applied after auto-crop).
pub fn contrast_stretch_unsharp(
    gray: &[u8],
    width: usize,
    height: usize,
    params: &PreprocessParams,
) -> Vec<u8> {
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let mut hist = [0u32; 256];
    for &v in gray {
        hist[v as usize] += 1;
    }
    let total = gray.len() as u32;
    let (lo_pct, hi_pct) = params.stretch_percentiles;
    let lo_target = (total as f32 * lo_pct) as u32;
    let hi_target = (total as f32 * hi_pct) as u32;

    let mut cum = 0u32;
    let mut lo = 0u8;
    let mut hi = 255u8;
    let mut lo_found = false;
    for (v, &count) in hist.iter().enumerate() {
        cum += count;
        if !lo_found && cum >= lo_target.max(1) {
            lo = v as u8;
            lo_found = true;
        }
        if cum >= hi_target.max(1) {
            hi = v as u8;
            break;
        }
    }
    if hi <= lo {
        hi = lo.saturating_add(1);
    }

    let scale = 255.0 / (hi as f32 - lo as f32).max(1.0);
    let stretched: Vec<u8> = gray
        .iter()
        .map(|&v| (((v as f32 - lo as f32) * scale).clamp(0.0, 255.0)) as u8)
        .collect();

    let blurred = box_mean_3x3(&stretched, width, height);
    stretched
        .iter()
        .zip(blurred.iter())
        .map(|(&s, &b)| {
            let sharpened = s as f32 + params.unsharp_weight * (s as f32 - b as f32);
            sharpened.clamp(0.0, 255.0) as u8
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_rgba(w: usize, h: usize, r: u8, g: u8, b: u8) -> Vec<u8> {
        let mut out = Vec::with_capacity(w * h * 4);
        for _ in 0..(w * h) {
            out.extend_from_slice(&[r, g, b, 255]);
        }
        out
    }

    #[test]
    fn grayscale_matches_luma_formula() {
        let rgba = solid_rgba(4, 4, 100, 150, 200);
        let gray = grayscale(&rgba, 4, 4);
        let expected = (0.299 * 100.0 + 0.587 * 150.0 + 0.114 * 200.0).round() as u8;
        assert!(gray.iter().all(|&v| v == expected));
    }

    #[test]
    fn otsu_splits_bimodal_histogram() {
        let mut samples = vec![20u8; 500];
        samples.extend(vec![220u8; 500]);
        let t = otsu_threshold(&samples);
        assert!(t > 20 && t < 220);
    }

    #[test]
    fn adaptive_threshold_flags_dark_spot_on_bright_background() {
        let w = 64;
        let h = 64;
        let mut gray = vec![240u8; w * h];
        for y in 28..36 {
            for x in 28..36 {
                gray[y * w + x] = 20;
            }
        }
        let plane = adaptive_threshold(&gray, w, h, false);
        assert_eq!(plane.get(32, 32), 1);
        assert_eq!(plane.get(4, 4), 0);
    }

    #[test]
    fn auto_crop_keeps_full_frame_when_paper_fills_it() {
        let w = 300;
        let h = 300;
        let gray = vec![230u8; w * h];
        let params = PreprocessParams::default();
        let (x0, y0, x1, y1) = camera_auto_crop(&gray, w, h, &params);
        assert_eq!((x0, y0, x1, y1), (0, 0, w, h));
    }

    #[test]
    fn auto_crop_trims_dark_margin() {
        let w = 300;
        let h = 300;
        let mut gray = vec![10u8; w * h];
        for y in 60..240 {
            for x in 60..240 {
                gray[y * w + x] = 230;
            }
        }
        let params = PreprocessParams::default();
        let (x0, y0, x1, y1) = camera_auto_crop(&gray, w, h, &params);
        assert!(x0 > 0 && y0 > 0 && x1 < w && y1 < h);
    }

    #[test]
    fn contrast_stretch_expands_narrow_range() {
        let w = 16;
        let h = 16;
        let mut gray = vec![128u8; w * h];
        gray[0] = 100;
        gray[1] = 150;
        let params = PreprocessParams::default();
        let out = contrast_stretch_unsharp(&gray, w, h, &params);
        let min = *out.iter().min().unwrap();
        let max = *out.iter().max().unwrap();
        assert!(max > min);
    }
}
