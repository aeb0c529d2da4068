//! Elliptical-kernel bubble sampling and per-query adaptive decoding
//!
//! Each bubble is scored by exactly one of two interchangeable estimators,
//! picked once per decode by `source` rather than blended: the binary
//! estimator (Gaussian-weighted mean of the 1-bit plane) for scans, the
//! grayscale estimator (inner-ellipse vs. surrounding-annulus contrast) for
//! camera frames. Neither threshold is absolute — every candidate bubble in
//! a query (one ID column, one question's choices) is sampled first, and the
//! fill decision comes from where a value sits in that query's distribution.

use serde::{Deserialize, Serialize};

use omr_core::BinaryPlane;

use crate::mapper::CoordinateMapper;
use crate::scan_result::Source;

/// Which estimator scores a bubble kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Estimator {
    /// Gaussian-weighted mean of the 1-bit plane. Preferred for scans.
    Binary,
    /// Inner-ellipse-vs-annulus contrast over the normalized grayscale plane.
    /// Preferred for camera frames.
    Grayscale,
}

impl Estimator {
    pub fn for_source(source: Source) -> Self {
        match source {
            Source::Upload => Estimator::Binary,
            Source::Camera => Estimator::Grayscale,
        }
    }
}

/// Which kind of bubble is being sampled — governs the inner-sample radius
/// and which `(baseline, k)` adaptive-threshold pair applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BubbleKind {
    Id,
    Answer,
}

impl BubbleKind {
    /// Fraction of the full bubble radius actually sampled, per [`BubbleSampleParams`].
    fn inner_fraction(self, params: &BubbleSampleParams) -> f32 {
        match self {
            BubbleKind::Id => params.inner_fraction_id,
            BubbleKind::Answer => params.inner_fraction_answer,
        }
    }

    /// `(baseline, k)` for the per-query adaptive threshold, by source, per
    /// [`BubbleSampleParams`].
    fn threshold_baseline(self, source: Source, params: &BubbleSampleParams) -> (f32, f32) {
        match (source, self) {
            (Source::Camera, BubbleKind::Id) => params.threshold_camera_id,
            (Source::Upload, BubbleKind::Id) => params.threshold_upload_id,
            (Source::Camera, BubbleKind::Answer) => params.threshold_camera_answer,
            (Source::Upload, BubbleKind::Answer) => params.threshold_upload_answer,
        }
    }
}

/// Tunable constants for the bubble sampler and decoder, per spec §4.5. Every
/// `(baseline, k)` pair, estimator radius fraction, and decision ratio named
/// in the spec lives here so a caller can override tuning from JSON without
/// touching code, matching [`omr_core::PreprocessParams`]'s convention.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BubbleSampleParams {
    pub inner_fraction_id: f32,
    pub inner_fraction_answer: f32,
    /// Gaussian kernel sigma, in units of the inner-sample radius.
    pub gaussian_sigma: f32,
    /// Outer-ellipse radius multiplier (of the inner radius) for the
    /// grayscale estimator's background annulus.
    pub annulus_outer_multiplier: f32,
    /// Floor on the annulus mean brightness used as `bg` in the grayscale
    /// estimator, so a dark overall frame can't manufacture a high score.
    pub min_background: f32,
    pub threshold_camera_id: (f32, f32),
    pub threshold_upload_id: (f32, f32),
    pub threshold_camera_answer: (f32, f32),
    pub threshold_upload_answer: (f32, f32),
    /// Runner-up-to-winner ratio above which an ID column is double-shaded.
    pub id_double_shade_ratio: f32,
    /// Runner-up-to-winner ratio above which a question is multiple-answer.
    pub answer_multiple_ratio: f32,
    /// Winner-to-others-average ratio an answer mark must clear, camera source.
    pub noise_ratio_camera: f32,
    /// Same, scan/upload source.
    pub noise_ratio_scan: f32,
    /// A winner this far above `threshold` bypasses noise rejection outright.
    pub noise_threshold_multiplier: f32,
}

impl Default for BubbleSampleParams {
    fn default() -> Self {
        Self {
            inner_fraction_id: 0.75,
            inner_fraction_answer: 0.70,
            gaussian_sigma: 0.6,
            annulus_outer_multiplier: 1.6,
            min_background: MIN_BACKGROUND,
            threshold_camera_id: (0.08, 0.35),
            threshold_upload_id: (0.18, 0.35),
            threshold_camera_answer: (0.06, 0.30),
            threshold_upload_answer: (0.15, 0.30),
            id_double_shade_ratio: 0.5,
            answer_multiple_ratio: 0.4,
            noise_ratio_camera: 1.8,
            noise_ratio_scan: 1.5,
            noise_threshold_multiplier: 1.5,
        }
    }
}

/// One bubble's raw darkness score, in `[0, 1]` where 0 is paper-white.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BubbleSample {
    pub score: f32,
}

/// Gaussian-weighted mean of the 1-bit plane over an ellipse centered at
/// `(cx, cy)` with radii `(rx, ry)`. `sigma` is in the same normalized-radius
/// units as the ellipse test (i.e. `sigma = 0.6` means "0.6 * r").
fn gaussian_ellipse_mean_binary(
    binary: &BinaryPlane,
    width: usize,
    height: usize,
    cx: f32,
    cy: f32,
    rx: f32,
    ry: f32,
    sigma: f32,
) -> f32 {
    let x0 = (cx - rx).floor().max(0.0) as i32;
    let x1 = (cx + rx).ceil().min(width as f32) as i32;
    let y0 = (cy - ry).floor().max(0.0) as i32;
    let y1 = (cy + ry).ceil().min(height as f32) as i32;

    let two_sigma2 = 2.0 * sigma * sigma;
    let mut wsum = 0f64;
    let mut vsum = 0f64;
    for y in y0..y1 {
        for x in x0..x1 {
            let dx = (x as f32 + 0.5 - cx) / rx;
            let dy = (y as f32 + 0.5 - cy) / ry;
            let d2 = dx * dx + dy * dy;
            if d2 > 1.0 {
                continue;
            }
            let w = (-(d2 as f64) / two_sigma2 as f64).exp();
            wsum += w;
            vsum += w * binary.get(x, y) as f64;
        }
    }
    if wsum > 0.0 {
        (vsum / wsum) as f32
    } else {
        0.0
    }
}

/// Gaussian-weighted mean pixel value (brightness, not darkness) of the
/// normalized grayscale plane over the same kind of ellipse.
fn gaussian_ellipse_mean_gray(
    normalized: &[u8],
    width: usize,
    height: usize,
    cx: f32,
    cy: f32,
    rx: f32,
    ry: f32,
    sigma: f32,
) -> f32 {
    let x0 = (cx - rx).floor().max(0.0) as i32;
    let x1 = (cx + rx).ceil().min(width as f32) as i32;
    let y0 = (cy - ry).floor().max(0.0) as i32;
    let y1 = (cy + ry).ceil().min(height as f32) as i32;

    let two_sigma2 = 2.0 * sigma * sigma;
    let mut wsum = 0f64;
    let mut vsum = 0f64;
    for y in y0..y1 {
        for x in x0..x1 {
            let dx = (x as f32 + 0.5 - cx) / rx;
            let dy = (y as f32 + 0.5 - cy) / ry;
            let d2 = dx * dx + dy * dy;
            if d2 > 1.0 {
                continue;
            }
            let w = (-(d2 as f64) / two_sigma2 as f64).exp();
            let idx = y as usize * width + x as usize;
            let v = normalized.get(idx).copied().unwrap_or(255) as f64;
            wsum += w;
            vsum += w * v;
        }
    }
    if wsum > 0.0 {
        (vsum / wsum) as f32
    } else {
        255.0
    }
}

/// Arithmetic mean pixel value over the annulus between the inner ellipse
/// (radii `inner_rx, inner_ry`) and the outer ellipse (`outer_rx, outer_ry`).
#[allow(clippy::too_many_arguments)]
fn annulus_mean_gray(
    normalized: &[u8],
    width: usize,
    height: usize,
    cx: f32,
    cy: f32,
    inner_rx: f32,
    inner_ry: f32,
    outer_rx: f32,
    outer_ry: f32,
) -> f32 {
    let x0 = (cx - outer_rx).floor().max(0.0) as i32;
    let x1 = (cx + outer_rx).ceil().min(width as f32) as i32;
    let y0 = (cy - outer_ry).floor().max(0.0) as i32;
    let y1 = (cy + outer_ry).ceil().min(height as f32) as i32;

    let mut sum = 0f64;
    let mut count = 0u32;
    for y in y0..y1 {
        for x in x0..x1 {
            let odx = (x as f32 + 0.5 - cx) / outer_rx;
            let ody = (y as f32 + 0.5 - cy) / outer_ry;
            if odx * odx + ody * ody > 1.0 {
                continue;
            }
            let idx_dx = (x as f32 + 0.5 - cx) / inner_rx;
            let idx_dy = (y as f32 + 0.5 - cy) / inner_ry;
            if idx_dx * idx_dx + idx_dy * idx_dy <= 1.0 {
                continue; // inside the inner ellipse: not part of the annulus
            }
            let idx = y as usize * width + x as usize;
            sum += normalized.get(idx).copied().unwrap_or(255) as f64;
            count += 1;
        }
    }
    if count > 0 {
        (sum / count as f64) as f32
    } else {
        255.0
    }
}

/// Minimum plausible local background brightness, used as a floor so a dark
/// overall frame can't manufacture a darkness score out of near-zero `bg`.
/// Mirrored as [`BubbleSampleParams::min_background`]'s default.
const MIN_BACKGROUND: f32 = 50.0;

/// Sample one bubble centered at normalized `(nx, ny)` with normalized
/// diameter `(diam_nx, diam_ny)` using the estimator appropriate for `kind`
/// and `source`, with the default [`BubbleSampleParams`].
#[allow(clippy::too_many_arguments)]
pub fn sample_bubble(
    binary: &BinaryPlane,
    normalized: &[u8],
    width: usize,
    height: usize,
    mapper: &CoordinateMapper,
    nx: f32,
    ny: f32,
    diam_nx: f32,
    diam_ny: f32,
    kind: BubbleKind,
    estimator: Estimator,
) -> BubbleSample {
    sample_bubble_with_params(
        binary, normalized, width, height, mapper, nx, ny, diam_nx, diam_ny, kind, estimator,
        &BubbleSampleParams::default(),
    )
}

/// Same as [`sample_bubble`] with explicit parameter overrides.
#[allow(clippy::too_many_arguments)]
pub fn sample_bubble_with_params(
    binary: &BinaryPlane,
    normalized: &[u8],
    width: usize,
    height: usize,
    mapper: &CoordinateMapper,
    nx: f32,
    ny: f32,
    diam_nx: f32,
    diam_ny: f32,
    kind: BubbleKind,
    estimator: Estimator,
    params: &BubbleSampleParams,
) -> BubbleSample {
    let center = mapper.map(nx, ny);
    let (span_x, span_y) = mapper.local_scale();
    let rx = (diam_nx * span_x / 2.0).max(1.0);
    let ry = (diam_ny * span_y / 2.0).max(1.0);

    let inner_frac = kind.inner_fraction(params);
    let inner_rx = rx * inner_frac;
    let inner_ry = ry * inner_frac;

    let score = match estimator {
        Estimator::Binary => gaussian_ellipse_mean_binary(
            binary, width, height, center.x, center.y, inner_rx, inner_ry, params.gaussian_sigma,
        ),
        Estimator::Grayscale => {
            let mu_in = gaussian_ellipse_mean_gray(
                normalized, width, height, center.x, center.y, inner_rx, inner_ry,
                params.gaussian_sigma,
            );
            let outer_rx = rx * params.annulus_outer_multiplier;
            let outer_ry = ry * params.annulus_outer_multiplier;
            let mu_out = annulus_mean_gray(
                normalized, width, height, center.x, center.y, inner_rx, inner_ry, outer_rx,
                outer_ry,
            );
            let bg = mu_out.max(params.min_background);
            ((bg - mu_in) / bg).max(0.0)
        }
    };

    BubbleSample { score }
}

/// Per-query adaptive threshold: `max(baseline, median + (q90 - median) * k)`
/// over the sorted scores of every candidate bubble in the query, with the
/// default [`BubbleSampleParams`].
pub fn adaptive_threshold(scores: &[f32], kind: BubbleKind, source: Source) -> f32 {
    adaptive_threshold_with_params(scores, kind, source, &BubbleSampleParams::default())
}

/// Same as [`adaptive_threshold`] with explicit parameter overrides.
pub fn adaptive_threshold_with_params(
    scores: &[f32],
    kind: BubbleKind,
    source: Source,
    params: &BubbleSampleParams,
) -> f32 {
    let (baseline, k) = kind.threshold_baseline(source, params);
    if scores.is_empty() {
        return baseline;
    }
    let mut sorted: Vec<f32> = scores.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = percentile(&sorted, 0.5);
    let q90 = percentile(&sorted, 0.9);
    baseline.max(median + (q90 - median) * k)
}

fn percentile(sorted: &[f32], p: f32) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (p * (sorted.len() - 1) as f32).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Outcome of decoding one question's row of choice bubbles: which choice
/// (if any) is the primary mark. Anomalies (multiple answers) are reported
/// alongside, not folded into this type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnswerMark {
    Blank,
    Single(usize),
}

impl Serialize for AnswerMark {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AnswerMark::Blank => serializer.serialize_str(""),
            AnswerMark::Single(idx) => {
                let letter = (b'A' + *idx as u8) as char;
                serializer.serialize_str(&letter.to_string())
            }
        }
    }
}

impl<'de> Deserialize<'de> for AnswerMark {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.chars().next() {
            None => Ok(AnswerMark::Blank),
            Some(c) if c.is_ascii_uppercase() => {
                Ok(AnswerMark::Single((c as u8 - b'A') as usize))
            }
            Some(c) => Err(serde::de::Error::custom(format!(
                "invalid answer letter: {c:?}"
            ))),
        }
    }
}

/// Decide the winning row of one student-ID column. Returns the winning row
/// (or `None` if nothing cleared `threshold`) and whether a second row also
/// cleared it within 50% of the winner's score, using the default
/// [`BubbleSampleParams`].
pub fn decode_id_column(scores: &[f32], threshold: f32) -> (Option<usize>, bool) {
    decode_id_column_with_params(scores, threshold, &BubbleSampleParams::default())
}

/// Same as [`decode_id_column`] with explicit parameter overrides.
pub fn decode_id_column_with_params(
    scores: &[f32],
    threshold: f32,
    params: &BubbleSampleParams,
) -> (Option<usize>, bool) {
    let Some((best_idx, best)) = argmax(scores) else {
        return (None, false);
    };
    if best < threshold {
        return (None, false);
    }
    let runner_up = second_highest(scores, best_idx);
    let double_shade = runner_up >= threshold && runner_up >= params.id_double_shade_ratio * best;
    (Some(best_idx), double_shade)
}

/// Decide the primary mark of one question's row of choice bubbles, applying
/// the noise-rejection and multi-answer detection rules for answer decoding.
/// Returns the mark and whether a second choice also qualifies as marked,
/// using the default [`BubbleSampleParams`].
pub fn decode_answer_row(scores: &[f32], threshold: f32, is_camera: bool) -> (AnswerMark, bool) {
    decode_answer_row_with_params(scores, threshold, is_camera, &BubbleSampleParams::default())
}

/// Same as [`decode_answer_row`] with explicit parameter overrides.
pub fn decode_answer_row_with_params(
    scores: &[f32],
    threshold: f32,
    is_camera: bool,
    params: &BubbleSampleParams,
) -> (AnswerMark, bool) {
    let Some((best_idx, best)) = argmax(scores) else {
        return (AnswerMark::Blank, false);
    };
    if best < threshold {
        return (AnswerMark::Blank, false);
    }

    let others_count = scores.len().saturating_sub(1);
    let others_avg = if others_count > 0 {
        (scores.iter().sum::<f32>() - best) / others_count as f32
    } else {
        0.0
    };
    let noise_ratio = if is_camera {
        params.noise_ratio_camera
    } else {
        params.noise_ratio_scan
    };
    let passes_noise_rejection =
        best >= noise_ratio * others_avg || best > params.noise_threshold_multiplier * threshold;
    if !passes_noise_rejection {
        return (AnswerMark::Blank, false);
    }

    let runner_up = second_highest(scores, best_idx);
    let multiple = runner_up >= threshold && runner_up >= params.answer_multiple_ratio * best;
    (AnswerMark::Single(best_idx), multiple)
}

fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .enumerate()
        .fold(None, |acc, (i, &s)| match acc {
            Some((_, best)) if best >= s => acc,
            _ => Some((i, s)),
        })
}

fn second_highest(scores: &[f32], skip_idx: usize) -> f32 {
    scores
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != skip_idx)
        .map(|(_, &s)| s)
        .fold(f32::MIN, f32::max)
        .max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_threshold_rides_above_baseline_for_uniform_blanks() {
        let scores = vec![0.01, 0.02, 0.015, 0.0, 0.03];
        let t = adaptive_threshold(&scores, BubbleKind::Answer, Source::Upload);
        assert!(t >= 0.15);
    }

    #[test]
    fn adaptive_threshold_rises_above_baseline_when_one_bubble_is_dark() {
        let scores = vec![0.02, 0.01, 0.9, 0.015, 0.02];
        let t = adaptive_threshold(&scores, BubbleKind::Answer, Source::Upload);
        // The dark outlier should pull the threshold up but still sit below it.
        assert!(t > 0.15);
        assert!(t < 0.9);
    }

    #[test]
    fn id_column_picks_clear_winner() {
        let scores = vec![0.02, 0.03, 0.85, 0.01, 0.0, 0.02, 0.01, 0.0, 0.02, 0.01];
        let threshold = adaptive_threshold(&scores, BubbleKind::Id, Source::Upload);
        let (row, double) = decode_id_column(&scores, threshold);
        assert_eq!(row, Some(2));
        assert!(!double);
    }

    #[test]
    fn id_column_with_two_shaded_rows_flags_double_shade() {
        let mut scores = vec![0.02; 10];
        scores[3] = 0.9;
        scores[7] = 0.6; // >= 50% of 0.9
        let threshold = adaptive_threshold(&scores, BubbleKind::Id, Source::Upload);
        let (row, double) = decode_id_column(&scores, threshold);
        assert_eq!(row, Some(3));
        assert!(double);
    }

    #[test]
    fn id_column_all_blank_is_undetected() {
        let scores = vec![0.01; 10];
        let threshold = adaptive_threshold(&scores, BubbleKind::Id, Source::Upload);
        let (row, double) = decode_id_column(&scores, threshold);
        assert_eq!(row, None);
        assert!(!double);
    }

    #[test]
    fn answer_row_single_clear_mark() {
        let scores = vec![0.02, 0.85, 0.03, 0.01];
        let threshold = adaptive_threshold(&scores, BubbleKind::Answer, Source::Upload);
        let (mark, multi) = decode_answer_row(&scores, threshold, false);
        assert_eq!(mark, AnswerMark::Single(1));
        assert!(!multi);
    }

    #[test]
    fn answer_row_two_close_marks_flagged_multiple_but_darkest_wins() {
        let scores = vec![0.02, 0.80, 0.78, 0.01];
        let threshold = adaptive_threshold(&scores, BubbleKind::Answer, Source::Upload);
        let (mark, multi) = decode_answer_row(&scores, threshold, false);
        assert_eq!(mark, AnswerMark::Single(1));
        assert!(multi);
    }

    #[test]
    fn answer_row_dominant_mark_with_faint_smudge_still_single() {
        let scores = vec![0.90, 0.20, 0.0, 0.0];
        let threshold = adaptive_threshold(&scores, BubbleKind::Answer, Source::Upload);
        let (mark, multi) = decode_answer_row(&scores, threshold, false);
        assert_eq!(mark, AnswerMark::Single(0));
        assert!(!multi);
    }

    #[test]
    fn answer_mark_json_round_trips_through_letters() {
        let blank = serde_json::to_string(&AnswerMark::Blank).unwrap();
        assert_eq!(blank, "\"\"");
        let single = serde_json::to_string(&AnswerMark::Single(2)).unwrap();
        assert_eq!(single, "\"C\"");
        let parsed: AnswerMark = serde_json::from_str("\"D\"").unwrap();
        assert_eq!(parsed, AnswerMark::Single(3));
    }
}
