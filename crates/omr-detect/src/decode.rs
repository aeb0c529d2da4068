//! Top-level scan pipeline: decode bytes -> preprocess -> detect -> sample -> [`ScanResult`].

use std::path::Path;

use omr_core::{
    adaptive_threshold as binarize, camera_auto_crop, contrast_stretch_unsharp, grayscale,
    otsu_threshold, subtract_background, BinaryPlane, PixelImage, PreprocessParams,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::bubble::{
    self, adaptive_threshold_with_params, decode_answer_row_with_params,
    decode_id_column_with_params, sample_bubble_with_params, AnswerMark, BubbleKind,
    BubbleSampleParams, Estimator,
};
use crate::error::DecodeError;
use crate::mapper::CoordinateMapper;
use crate::marker_detector::{detect_markers_with_params, MarkerDetectParams};
use crate::quad::MarkerQuad;
use crate::scan_result::{BubbleDebug, ScanResult, Source};
use crate::template::{self, TemplateLayout};

fn crop_plane(
    plane: &[u8],
    width: usize,
    bbox: (usize, usize, usize, usize),
) -> (Vec<u8>, usize, usize) {
    let (x0, y0, x1, y1) = bbox;
    let new_w = x1 - x0;
    let new_h = y1 - y0;
    let mut out = vec![0u8; new_w * new_h];
    for y in 0..new_h {
        let src_row_start = (y0 + y) * width + x0;
        let dst_row_start = y * new_w;
        out[dst_row_start..dst_row_start + new_w]
            .copy_from_slice(&plane[src_row_start..src_row_start + new_w]);
    }
    (out, new_w, new_h)
}

/// Options controlling one decode call.
///
/// The three tunable-parameter fields default to `None`, in which case the
/// pipeline uses each stage's `Default` (the constants specified in spec
/// §4.1-§4.5). A caller building these from JSON (e.g. the CLI's `--params`
/// flag) can override any subset without needing to specify the others.
#[derive(Clone, Debug, Default)]
pub struct DecodeOptions {
    pub capture_bubble_debug: bool,
    /// When set, dump the normalized/binary planes and per-bubble scores
    /// here for offline inspection
    pub debug_dir: Option<std::path::PathBuf>,
    pub preprocess_params: Option<PreprocessParams>,
    pub marker_params: Option<MarkerDetectParams>,
    pub bubble_params: Option<BubbleSampleParams>,
}

/// Decode one answer sheet image end to end.
///
/// A failed marker detection is not an `Err`: the pipeline keeps going
/// against a degraded full-frame quad and the caller reads
/// `markers_found` off the returned [`ScanResult`] to decide whether to
/// trust the rest of it.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(bytes, options), fields(num_questions, choices_per_question))
)]
pub fn decode(
    bytes: &[u8],
    num_questions: usize,
    choices_per_question: usize,
    source: Source,
    options: &DecodeOptions,
) -> Result<ScanResult, DecodeError> {
    let template = template::layout_for(num_questions)
        .ok_or(DecodeError::TemplateUnknown { num_questions })?;

    let preprocess_params = options.preprocess_params.unwrap_or_default();
    let marker_params = options.marker_params.unwrap_or_default();
    let bubble_params = options.bubble_params.clone().unwrap_or_default();

    let image = PixelImage::from_encoded_bytes(bytes)?;
    let (width, height) = (image.width, image.height);
    let is_camera = source.is_camera();

    let mut gray = grayscale(&image.data, width, height);
    let (mut w, mut h) = (width, height);

    if is_camera {
        let bbox = camera_auto_crop(&gray, w, h, &preprocess_params);
        if bbox != (0, 0, w, h) {
            let (cropped, cw, ch) = crop_plane(&gray, w, bbox);
            gray = cropped;
            w = cw;
            h = ch;
        }
        gray = contrast_stretch_unsharp(&gray, w, h, &preprocess_params);
    }

    let (quad, found) =
        detect_and_maybe_retry(&gray, w, h, is_camera, &preprocess_params, &marker_params);
    let (quad, markers_found) = if found {
        (quad, true)
    } else {
        (MarkerQuad::full_frame(w, h), false)
    };

    let normalized = subtract_background(&gray, w, h, &preprocess_params);
    let binary = binarize(&normalized, w, h, is_camera);
    let mapper = CoordinateMapper::new(quad);
    let estimator = Estimator::for_source(source);

    let mut debug: Vec<BubbleDebug> = Vec::new();
    let mut sample = |nx: f32, ny: f32, kind: BubbleKind| -> f32 {
        sample_bubble_with_params(
            &binary,
            &normalized,
            w,
            h,
            &mapper,
            nx,
            ny,
            template.bubble_diameter_nx,
            template.bubble_diameter_ny,
            kind,
            estimator,
            &bubble_params,
        )
        .score
    };

    let (student_id, id_double_shade_columns) =
        decode_student_id(&template, source, &bubble_params, &mut sample);
    let (answers, multiple_answer_questions) = decode_answers(
        &template,
        num_questions,
        choices_per_question,
        source,
        &bubble_params,
        &mut sample,
    );

    if options.capture_bubble_debug {
        collect_bubble_debug(
            &template,
            num_questions,
            choices_per_question,
            source,
            &bubble_params,
            &mut sample,
            &mut debug,
        );
    }

    let result = ScanResult {
        student_id,
        answers,
        multiple_answer_questions,
        id_double_shade_columns,
        markers_found,
        source_hint: source,
        bubble_debug: options.capture_bubble_debug.then_some(debug),
    };

    if let Some(dir) = &options.debug_dir {
        dump_debug(dir, &result, &normalized, &binary, w, h);
    }

    Ok(result)
}

/// Run detection once on the background-subtracted binary plane; if that
/// fails, retry against a plain Otsu-thresholded raw grayscale plane before
/// giving up
fn detect_and_maybe_retry(
    gray: &[u8],
    width: usize,
    height: usize,
    is_camera: bool,
    preprocess_params: &PreprocessParams,
    marker_params: &MarkerDetectParams,
) -> (MarkerQuad, bool) {
    let normalized = subtract_background(gray, width, height, preprocess_params);
    let binary = binarize(&normalized, width, height, is_camera);
    let (quad, found) = detect_markers_with_params(&binary, width, height, is_camera, marker_params);
    if found {
        return (quad, found);
    }

    let t = otsu_threshold(gray);
    let bits: Vec<u8> = gray
        .iter()
        .map(|&v| if (v as i32) < t as i32 { 1 } else { 0 })
        .collect();
    let raw_binary = BinaryPlane {
        width,
        height,
        bits,
    };
    detect_markers_with_params(&raw_binary, width, height, is_camera, marker_params)
}

/// Decode every ID column: sample its 10 rows, compute that column's own
/// adaptive threshold, then pick a winner
fn decode_student_id(
    template: &TemplateLayout,
    source: Source,
    bubble_params: &BubbleSampleParams,
    sample: &mut impl FnMut(f32, f32, BubbleKind) -> f32,
) -> (Vec<Option<u8>>, Vec<usize>) {
    let id = template.id;
    let mut student_id = Vec::with_capacity(id.num_cols);
    let mut double_shade_columns = Vec::new();

    for col in 0..id.num_cols {
        let scores: Vec<f32> = (0..id.num_rows)
            .map(|row| {
                let nx = id.first_col_nx + col as f32 * id.col_spacing_nx;
                let ny = id.first_row_ny + row as f32 * id.row_spacing_ny;
                sample(nx, ny, BubbleKind::Id)
            })
            .collect();
        let threshold = adaptive_threshold_with_params(&scores, BubbleKind::Id, source, bubble_params);
        let (row, double_shade) = decode_id_column_with_params(&scores, threshold, bubble_params);
        student_id.push(row.map(|r| r as u8));
        if double_shade {
            double_shade_columns.push(col + 1);
        }
    }

    (student_id, double_shade_columns)
}

/// Decode every question: sample its `choicesPerQuestion` bubbles, compute
/// that question's own adaptive threshold, then apply noise rejection and
/// pick the primary mark
fn decode_answers(
    template: &TemplateLayout,
    num_questions: usize,
    choices_per_question: usize,
    source: Source,
    bubble_params: &BubbleSampleParams,
    sample: &mut impl FnMut(f32, f32, BubbleKind) -> f32,
) -> (Vec<AnswerMark>, Vec<usize>) {
    let mut answers = Vec::with_capacity(num_questions);
    let mut multiple_answer_questions = Vec::new();

    for q in 1..=num_questions {
        let (block, row_in_block) = template
            .block_for_question(q)
            .expect("template covers every question in range");
        let scores: Vec<f32> = (0..choices_per_question)
            .map(|choice| {
                let (nx, ny) = block.bubble_center(row_in_block, choice);
                sample(nx, ny, BubbleKind::Answer)
            })
            .collect();
        let threshold =
            adaptive_threshold_with_params(&scores, BubbleKind::Answer, source, bubble_params);
        let (mark, multiple) =
            decode_answer_row_with_params(&scores, threshold, source.is_camera(), bubble_params);
        answers.push(mark);
        if multiple {
            multiple_answer_questions.push(q);
        }
    }

    (answers, multiple_answer_questions)
}

/// Re-sample everything once more, this time recording each bubble's score
/// and the threshold it was judged against, for `--json` debug output.
fn collect_bubble_debug(
    template: &TemplateLayout,
    num_questions: usize,
    choices_per_question: usize,
    source: Source,
    bubble_params: &BubbleSampleParams,
    sample: &mut impl FnMut(f32, f32, BubbleKind) -> f32,
    out: &mut Vec<BubbleDebug>,
) {
    let id = template.id;
    for col in 0..id.num_cols {
        let scores: Vec<f32> = (0..id.num_rows)
            .map(|row| {
                let nx = id.first_col_nx + col as f32 * id.col_spacing_nx;
                let ny = id.first_row_ny + row as f32 * id.row_spacing_ny;
                sample(nx, ny, BubbleKind::Id)
            })
            .collect();
        let threshold =
            bubble::adaptive_threshold_with_params(&scores, BubbleKind::Id, source, bubble_params);
        for (row, &score) in scores.iter().enumerate() {
            out.push(BubbleDebug {
                kind: BubbleKind::Id,
                index: col + 1,
                choice: row,
                score,
                threshold,
            });
        }
    }

    for q in 1..=num_questions {
        let (block, row_in_block) = template
            .block_for_question(q)
            .expect("template covers every question in range");
        let scores: Vec<f32> = (0..choices_per_question)
            .map(|choice| {
                let (nx, ny) = block.bubble_center(row_in_block, choice);
                sample(nx, ny, BubbleKind::Answer)
            })
            .collect();
        let threshold = bubble::adaptive_threshold_with_params(
            &scores,
            BubbleKind::Answer,
            source,
            bubble_params,
        );
        for (choice, &score) in scores.iter().enumerate() {
            out.push(BubbleDebug {
                kind: BubbleKind::Answer,
                index: q,
                choice,
                score,
                threshold,
            });
        }
    }
}

fn dump_debug(
    dir: &Path,
    result: &ScanResult,
    normalized: &[u8],
    binary: &BinaryPlane,
    width: usize,
    height: usize,
) {
    if std::fs::create_dir_all(dir).is_err() {
        log::warn!("could not create debug dir {}", dir.display());
        return;
    }
    if let Ok(json) = serde_json::to_vec_pretty(result) {
        let _ = std::fs::write(dir.join("scan_result.json"), json);
    }
    if let Ok(img) = image::GrayImage::from_raw(width as u32, height as u32, normalized.to_vec()) {
        let _ = img.save(dir.join("normalized.png"));
    }
    let binary_bytes: Vec<u8> = binary
        .bits
        .iter()
        .map(|&b| if b == 1 { 0u8 } else { 255u8 })
        .collect();
    if let Ok(img) = image::GrayImage::from_raw(width as u32, height as u32, binary_bytes) {
        let _ = img.save(dir.join("binary.png"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_plane_extracts_subregion() {
        let width = 4;
        let plane: Vec<u8> = (0..16).collect();
        let (cropped, w, h) = crop_plane(&plane, width, (1, 1, 3, 3));
        assert_eq!((w, h), (2, 2));
        assert_eq!(cropped, vec![5, 6, 9, 10]);
    }

    #[test]
    fn unknown_template_is_rejected_before_decoding_pixels() {
        let err = decode(&[], 7, 4, Source::Upload, &DecodeOptions::default());
        assert!(matches!(
            err,
            Err(DecodeError::TemplateUnknown { num_questions: 7 })
        ));
    }

    #[test]
    fn garbage_bytes_surface_as_image_decode_error() {
        let err = decode(b"not an image", 20, 4, Source::Upload, &DecodeOptions::default());
        assert!(matches!(err, Err(DecodeError::Image(_))));
    }
}
