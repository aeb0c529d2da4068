//! Renders the PDF answer sheets the OMR engine is calibrated against.
//!
//! The detector (`omr-detect`) and this crate share one [`TemplateLayout`]
//! per question count; nothing here invents its own geometry. There is only
//! ever one copy of the layout, so there is nothing left to drift out of
//! lockstep between what gets printed and what gets decoded.

mod error;
mod geometry;
mod request;
mod shapes;

pub use error::RenderError;
pub use request::SheetRequest;

use omr_detect::{layout_for, TemplateLayout, FRAME_WIDTH_MM, MARKER_INSET_MM, PAGE_HEIGHT_MM, PAGE_WIDTH_MM};
use printpdf::{BuiltinFont, FontId, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions};

const CHOICE_LETTERS: &[char] = &['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H'];

/// The column letters an ID digit can wear on a sheet: `0`-`9` reuse the
/// same bubble circle, just labeled with digits instead of letters.
const ID_DIGITS: &[char] = &['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];

/// Render one answer sheet to PDF bytes
pub fn render(request: &SheetRequest) -> Result<Vec<u8>, RenderError> {
    let layout = layout_for(request.num_questions).ok_or(RenderError::TemplateUnknown {
        num_questions: request.num_questions,
    })?;

    let mut doc = PdfDocument::new(&format!("Answer Sheet - {}", request.name));
    let font = doc.add_builtin_font(BuiltinFont::Helvetica);

    let mut ops = Vec::new();
    draw_fiducials(&mut ops, &layout);
    draw_header(&mut ops, &font, request);
    draw_id_grid(&mut ops, &font, &layout);
    draw_answer_blocks(&mut ops, &font, &layout, request.choices_per_question.max(1).min(CHOICE_LETTERS.len()));

    let page = PdfPage::new(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), ops);
    let bytes = doc.with_pages(vec![page]).save(&PdfSaveOptions::default());

    log::info!(
        "rendered {}-question sheet ({} bytes) for \"{}\"",
        request.num_questions,
        bytes.len(),
        request.name
    );
    Ok(bytes)
}

fn draw_fiducials(ops: &mut Vec<Op>, layout: &TemplateLayout) {
    let side = layout.marker_size_mm();
    for &(nx, ny) in &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
        let (x, y) = geometry::frame_to_page_mm(nx, ny);
        shapes::filled_square(ops, x, y, side);
    }
}

fn draw_header(ops: &mut Vec<Op>, font: &FontId, request: &SheetRequest) {
    let header = request
        .header_text
        .as_deref()
        .unwrap_or("Multiple Choice Answer Sheet");
    shapes::text(ops, font, MARKER_INSET_MM + 2.0, 14.0, 14.0, header);

    if let Some(code) = &request.exam_code {
        shapes::text(
            ops,
            font,
            PAGE_WIDTH_MM - MARKER_INSET_MM - 45.0,
            14.0,
            11.0,
            &format!("Exam code: {code}"),
        );
    }

    if request.logo_bytes.is_some() {
        shapes::rect_outline(ops, PAGE_WIDTH_MM - MARKER_INSET_MM - 22.0, 4.0, 18.0, 12.0);
    }

    shapes::text(ops, font, MARKER_INSET_MM + 2.0, 20.0, 9.0, "Name:");
    shapes::rule(
        ops,
        MARKER_INSET_MM + 14.0,
        20.5,
        MARKER_INSET_MM + 90.0,
        20.5,
        0.3,
    );
    shapes::text(ops, font, MARKER_INSET_MM + 95.0, 20.0, 9.0, "Date:");
    shapes::rule(
        ops,
        MARKER_INSET_MM + 107.0,
        20.5,
        MARKER_INSET_MM + 140.0,
        20.5,
        0.3,
    );
}

fn draw_id_grid(ops: &mut Vec<Op>, font: &FontId, layout: &TemplateLayout) {
    let id = layout.id;
    let diameter = layout.bubble_diameter_nx * FRAME_WIDTH_MM;

    for col in 0..id.num_cols {
        let (header_x, header_y) = geometry::frame_to_page_mm(
            id.first_col_nx + col as f32 * id.col_spacing_nx,
            id.first_row_ny,
        );
        shapes::text(
            ops,
            font,
            header_x - 1.5,
            header_y - diameter - 1.5,
            7.0,
            &format!("{col}"),
        );

        for row in 0..id.num_rows {
            let (cx, cy) = geometry::frame_to_page_mm(
                id.first_col_nx + col as f32 * id.col_spacing_nx,
                id.first_row_ny + row as f32 * id.row_spacing_ny,
            );
            shapes::stroked_circle(ops, cx, cy, diameter);
            if col == 0 {
                let digit = ID_DIGITS.get(row).copied().unwrap_or('?');
                shapes::text(ops, font, cx - 14.0, cy + 1.3, 7.0, &digit.to_string());
            }
        }
    }
}

fn draw_answer_blocks(ops: &mut Vec<Op>, font: &FontId, layout: &TemplateLayout, choices: usize) {
    let diameter = layout.bubble_diameter_nx * FRAME_WIDTH_MM;

    for block in &layout.answer_blocks {
        for choice in 0..choices {
            let (header_x, header_y) = geometry::frame_to_page_mm(
                block.first_bubble_nx + choice as f32 * block.bubble_spacing_nx,
                block.first_bubble_ny,
            );
            shapes::text(
                ops,
                font,
                header_x - 1.5,
                header_y - diameter - 1.5,
                6.0,
                &CHOICE_LETTERS[choice].to_string(),
            );
        }

        for row in 0..block.num_rows() {
            let question = block.start_q + row;
            let (label_x, label_y) = geometry::frame_to_page_mm(block.first_bubble_nx, block.first_bubble_ny + row as f32 * block.row_spacing_ny);
            shapes::text(ops, font, label_x - 13.0, label_y + 1.3, 7.0, &question.to_string());

            for choice in 0..choices {
                let (cx, cy) = block.bubble_center(row, choice);
                let (px, py) = geometry::frame_to_page_mm(cx, cy);
                shapes::stroked_circle(ops, px, py, diameter);
            }
        }
    }
}
