//! End-to-end checks against synthetically rasterized sheets. These build a
//! pixel image directly from the template's normalized coordinates rather
//! than rasterizing an actual PDF, so they exercise the same geometry the
//! renderer draws from without paying for a PDF rasterizer dependency.

use image::{ImageFormat, Rgba, RgbaImage};

use omr_detect::{decode, layout_for, AnswerMark, DecodeOptions, Source, TemplateLayout};

const IMG_W: u32 = 1000;
const IMG_H: u32 = 1400;
const MARKER_MARGIN: u32 = 60;
const MARKER_SIZE: u32 = 40;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const INK: Rgba<u8> = Rgba([20, 20, 20, 255]);

struct Frame {
    x0: f32,
    y0: f32,
    w: f32,
    h: f32,
}

fn frame() -> Frame {
    Frame {
        x0: MARKER_MARGIN as f32,
        y0: MARKER_MARGIN as f32,
        w: (IMG_W - 2 * MARKER_MARGIN) as f32,
        h: (IMG_H - 2 * MARKER_MARGIN) as f32,
    }
}

fn to_pixel(frame: &Frame, nx: f32, ny: f32) -> (f32, f32) {
    (frame.x0 + nx * frame.w, frame.y0 + ny * frame.h)
}

fn fill_square(img: &mut RgbaImage, cx: f32, cy: f32, side: f32, color: Rgba<u8>) {
    let half = side / 2.0;
    let x0 = (cx - half).max(0.0) as u32;
    let y0 = (cy - half).max(0.0) as u32;
    let x1 = ((cx + half) as u32).min(img.width());
    let y1 = ((cy + half) as u32).min(img.height());
    for y in y0..y1 {
        for x in x0..x1 {
            img.put_pixel(x, y, color);
        }
    }
}

fn fill_circle(img: &mut RgbaImage, cx: f32, cy: f32, radius: f32, color: Rgba<u8>) {
    let x0 = (cx - radius).max(0.0) as u32;
    let y0 = (cy - radius).max(0.0) as u32;
    let x1 = ((cx + radius) as u32).min(img.width());
    let y1 = ((cy + radius) as u32).min(img.height());
    for y in y0..y1 {
        for x in x0..x1 {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            if dx * dx + dy * dy <= radius * radius {
                img.put_pixel(x, y, color);
            }
        }
    }
}

/// Build a blank sheet with the four fiducial markers but no bubbles shaded.
fn blank_sheet(layout: &TemplateLayout) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(IMG_W, IMG_H, WHITE);
    let f = frame();
    for &(nx, ny) in &[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)] {
        let (cx, cy) = to_pixel(&f, nx, ny);
        fill_square(&mut img, cx, cy, MARKER_SIZE as f32, INK);
    }
    let _ = layout;
    img
}

fn shade_id_digit(img: &mut RgbaImage, layout: &TemplateLayout, col: usize, digit: usize) {
    let f = frame();
    let id = layout.id;
    let (nx, ny) = (
        id.first_col_nx + col as f32 * id.col_spacing_nx,
        id.first_row_ny + digit as f32 * id.row_spacing_ny,
    );
    let (cx, cy) = to_pixel(&f, nx, ny);
    let r = layout.bubble_diameter_nx * f.w / 2.0 * 0.6;
    fill_circle(img, cx, cy, r, INK);
}

fn shade_id_digit_partial(img: &mut RgbaImage, layout: &TemplateLayout, col: usize, digit: usize, fraction: f32) {
    let f = frame();
    let id = layout.id;
    let (nx, ny) = (
        id.first_col_nx + col as f32 * id.col_spacing_nx,
        id.first_row_ny + digit as f32 * id.row_spacing_ny,
    );
    let (cx, cy) = to_pixel(&f, nx, ny);
    let full_r = layout.bubble_diameter_nx * f.w / 2.0 * 0.6;
    let r = full_r * fraction.sqrt();
    fill_circle(img, cx, cy, r, INK);
}

fn shade_answer(img: &mut RgbaImage, layout: &TemplateLayout, question: usize, choice: usize) {
    let (block, row) = layout.block_for_question(question).expect("question in range");
    let (nx, ny) = block.bubble_center(row, choice);
    let f = frame();
    let (cx, cy) = to_pixel(&f, nx, ny);
    let r = layout.bubble_diameter_nx * f.w / 2.0 * 0.6;
    fill_circle(img, cx, cy, r, INK);
}

fn shade_answer_partial(img: &mut RgbaImage, layout: &TemplateLayout, question: usize, choice: usize, fraction: f32) {
    let (block, row) = layout.block_for_question(question).expect("question in range");
    let (nx, ny) = block.bubble_center(row, choice);
    let f = frame();
    let (cx, cy) = to_pixel(&f, nx, ny);
    let full_r = layout.bubble_diameter_nx * f.w / 2.0 * 0.6;
    let r = full_r * fraction.sqrt();
    fill_circle(img, cx, cy, r, INK);
}

fn encode_png(img: &RgbaImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut bytes);
    img.write_to(&mut cursor, ImageFormat::Png)
        .expect("encoding a synthetic sheet to PNG must not fail");
    bytes
}

fn digits(n: u32, width: usize) -> Vec<usize> {
    format!("{n:0width$}")
        .chars()
        .map(|c| c.to_digit(10).unwrap() as usize)
        .collect()
}

fn answers_to_string(answers: &[AnswerMark]) -> String {
    answers
        .iter()
        .map(|a| match a {
            AnswerMark::Blank => '_',
            AnswerMark::Single(i) => (b'A' + *i as u8) as char,
        })
        .collect()
}

/// Render a 100-question sheet, shade an ID and a handful of answers,
/// including one equally-shaded double answer on Q4.
#[test]
fn hundred_question_sheet_decodes_id_and_answers() {
    let layout = layout_for(100).unwrap();
    let mut img = blank_sheet(&layout);

    for (col, digit) in digits(2026000042, 10).into_iter().enumerate() {
        shade_id_digit(&mut img, &layout, col, digit);
    }
    shade_answer(&mut img, &layout, 1, 1); // B
    shade_answer(&mut img, &layout, 2, 0); // A
    // Q3 left blank.
    shade_answer(&mut img, &layout, 4, 2); // C
    shade_answer(&mut img, &layout, 4, 3); // D, equally dark -> multiple-answer

    let bytes = encode_png(&img);
    let result = decode(&bytes, 100, 5, Source::Upload, &DecodeOptions::default())
        .expect("decode should succeed against a registered template");

    assert!(result.markers_found, "fiducials should be detected");

    let id: String = result
        .student_id
        .iter()
        .map(|d| d.map(|v| char::from_digit(v as u32, 10).unwrap()).unwrap_or('?'))
        .collect();
    assert_eq!(id, "2026000042");

    assert_eq!(result.answers[0], AnswerMark::Single(1)); // B
    assert_eq!(result.answers[1], AnswerMark::Single(0)); // A
    assert_eq!(result.answers[2], AnswerMark::Blank);
    assert!(result.multiple_answer_questions.contains(&4));
}

/// A 50-question sheet with 5 choices per question, shading choice E on Q25.
#[test]
fn fifty_question_sheet_with_five_choices_decodes_last_letter() {
    let layout = layout_for(50).unwrap();
    let mut img = blank_sheet(&layout);
    shade_answer(&mut img, &layout, 25, 4); // E

    let bytes = encode_png(&img);
    let result = decode(&bytes, 50, 5, Source::Upload, &DecodeOptions::default()).unwrap();

    assert!(result.markers_found);
    assert_eq!(result.answers[24], AnswerMark::Single(4));
}

/// Two bubbles shaded in one ID column, each covering at least 70% of its
/// ellipse, are both reported via `id_double_shade_columns`.
#[test]
fn double_shaded_id_column_is_flagged() {
    let layout = layout_for(20).unwrap();
    let mut img = blank_sheet(&layout);
    shade_id_digit_partial(&mut img, &layout, 0, 3, 0.9);
    shade_id_digit_partial(&mut img, &layout, 0, 7, 0.75);
    for col in 1..10 {
        shade_id_digit(&mut img, &layout, col, 0);
    }

    let bytes = encode_png(&img);
    let result = decode(&bytes, 20, 4, Source::Upload, &DecodeOptions::default()).unwrap();

    assert!(result.markers_found);
    assert!(result.id_double_shade_columns.contains(&1));
}

/// Two choices shaded in one question, each >= 40% as dark as the darker,
/// are flagged via `multiple_answer_questions` while the darker one is
/// still the primary selection.
#[test]
fn multiple_shaded_answer_choices_are_flagged() {
    let layout = layout_for(20).unwrap();
    let mut img = blank_sheet(&layout);
    shade_answer_partial(&mut img, &layout, 5, 0, 1.0);
    shade_answer_partial(&mut img, &layout, 5, 1, 0.9);

    let bytes = encode_png(&img);
    let result = decode(&bytes, 20, 4, Source::Upload, &DecodeOptions::default()).unwrap();

    assert!(result.markers_found);
    assert_eq!(result.answers[4], AnswerMark::Single(0));
    assert!(result.multiple_answer_questions.contains(&5));
}

/// A scan with the top 10% of the image clipped off loses the top two
/// fiducials; geometry validation must fail and `markers_found` must be
/// `false` rather than the decode erroring out.
#[test]
fn clipped_markers_report_not_found_without_erroring() {
    let layout = layout_for(100).unwrap();
    let mut img = blank_sheet(&layout);
    for (col, digit) in digits(1234567890, 10).into_iter().enumerate() {
        shade_id_digit(&mut img, &layout, col, digit);
    }
    let clip_rows = (IMG_H as f32 * 0.10) as u32;
    for y in 0..clip_rows {
        for x in 0..IMG_W {
            img.put_pixel(x, y, WHITE);
        }
    }

    let bytes = encode_png(&img);
    let result = decode(&bytes, 100, 4, Source::Upload, &DecodeOptions::default()).unwrap();

    assert!(!result.markers_found, "clipped top fiducials must fail geometry validation");
}

#[test]
fn blank_answers_and_blank_id_round_trip_as_empty() {
    let layout = layout_for(20).unwrap();
    let img = blank_sheet(&layout);

    let bytes = encode_png(&img);
    let result = decode(&bytes, 20, 4, Source::Upload, &DecodeOptions::default()).unwrap();

    assert!(result.markers_found);
    assert!(result.student_id.iter().all(Option::is_none));
    assert!(result.answers.iter().all(|a| *a == AnswerMark::Blank));
    assert_eq!(answers_to_string(&result.answers), "_".repeat(20));
}
