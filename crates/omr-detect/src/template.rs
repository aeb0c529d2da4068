//! Template registry: normalized-coordinate layouts for 20/50/100-question
//! sheets The renderer (`omr-render`) builds its print geometry
//! from the exact same mm constants and the exact same [`TemplateLayout`]
//! values, so there is a single source of truth instead of two independently
//! maintained coordinate systems drifting apart (see `DESIGN.md` for the
//! resolution of the `xCorrection` open question).

use serde::{Deserialize, Serialize};

/// A4 portrait page size.
pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;
/// Distance from the page edge to each fiducial marker's center.
pub const MARKER_INSET_MM: f32 = 10.0;
/// The rectangle whose corners are the marker centers — the coordinate
/// frame every normalized value in this module is relative to.
pub const FRAME_WIDTH_MM: f32 = PAGE_WIDTH_MM - 2.0 * MARKER_INSET_MM;
pub const FRAME_HEIGHT_MM: f32 = PAGE_HEIGHT_MM - 2.0 * MARKER_INSET_MM;

/// Fiducial marker square side length, full-size sheet.
pub const MARKER_SIZE_MM: f32 = 7.0;
/// Fiducial marker square side length, mini (20-question) sheet.
pub const MARKER_SIZE_MINI_MM: f32 = 4.0;
/// Bubble diameter, full-size sheet.
pub const BUBBLE_DIAMETER_MM: f32 = 3.8;
/// Bubble diameter, mini (20-question) sheet.
pub const BUBBLE_DIAMETER_MINI_MM: f32 = 3.2;

#[inline]
fn nx(mm: f32) -> f32 {
    mm / FRAME_WIDTH_MM
}
#[inline]
fn ny(mm: f32) -> f32 {
    mm / FRAME_HEIGHT_MM
}

/// Normalized-coordinate layout of the 10x10 student-ID bubble grid.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct IdGridLayout {
    pub first_col_nx: f32,
    pub first_row_ny: f32,
    pub col_spacing_nx: f32,
    pub row_spacing_ny: f32,
    pub num_cols: usize,
    pub num_rows: usize,
}

/// A contiguous rectangular group of question rows sharing one bubble grid.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AnswerBlock {
    /// 1-based, inclusive question range.
    pub start_q: usize,
    pub end_q: usize,
    pub first_bubble_nx: f32,
    pub first_bubble_ny: f32,
    pub bubble_spacing_nx: f32,
    pub row_spacing_ny: f32,
}

impl AnswerBlock {
    pub fn num_rows(&self) -> usize {
        self.end_q - self.start_q + 1
    }

    /// Normalized center of the bubble for `choice_index` (0-based) on the
    /// `row_in_block`-th row (0-based) of this block.
    pub fn bubble_center(&self, row_in_block: usize, choice_index: usize) -> (f32, f32) {
        (
            self.first_bubble_nx + choice_index as f32 * self.bubble_spacing_nx,
            self.first_bubble_ny + row_in_block as f32 * self.row_spacing_ny,
        )
    }
}

/// Full normalized layout for a given question count.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemplateLayout {
    pub num_questions: usize,
    pub id: IdGridLayout,
    pub answer_blocks: Vec<AnswerBlock>,
    pub bubble_diameter_nx: f32,
    pub bubble_diameter_ny: f32,
    /// Whether the renderer prints this sheet at mini scale (20-question
    /// sheet: 4mm markers, 3.2mm bubbles) or full scale (7mm markers,
    /// 3.8mm bubbles).
    pub mini: bool,
}

impl TemplateLayout {
    /// Printed fiducial marker square side, in millimeters.
    pub fn marker_size_mm(&self) -> f32 {
        if self.mini {
            MARKER_SIZE_MINI_MM
        } else {
            MARKER_SIZE_MM
        }
    }
}

impl TemplateLayout {
    /// The answer block (and 0-based row within it) covering 1-based question `q`.
    pub fn block_for_question(&self, q: usize) -> Option<(&AnswerBlock, usize)> {
        self.answer_blocks
            .iter()
            .find(|b| q >= b.start_q && q <= b.end_q)
            .map(|b| (b, q - b.start_q))
    }

    /// Verify the coverage invariant: answer blocks partition `1..=num_questions` exactly.
    pub fn covers_all_questions_exactly(&self) -> bool {
        let mut seen = vec![false; self.num_questions + 1];
        for b in &self.answer_blocks {
            if b.start_q == 0 || b.start_q > b.end_q || b.end_q > self.num_questions {
                return false;
            }
            for q in b.start_q..=b.end_q {
                if seen[q] {
                    return false; // overlap
                }
                seen[q] = true;
            }
        }
        seen.iter().skip(1).all(|&s| s)
    }
}

fn id_grid(first_col_mm: f32, first_row_mm: f32, col_spacing_mm: f32, row_spacing_mm: f32) -> IdGridLayout {
    IdGridLayout {
        first_col_nx: nx(first_col_mm),
        first_row_ny: ny(first_row_mm),
        col_spacing_nx: nx(col_spacing_mm),
        row_spacing_ny: ny(row_spacing_mm),
        num_cols: 10,
        num_rows: 10,
    }
}

fn answer_block(
    start_q: usize,
    end_q: usize,
    first_x_mm: f32,
    first_y_mm: f32,
    choice_spacing_mm: f32,
    row_spacing_mm: f32,
) -> AnswerBlock {
    AnswerBlock {
        start_q,
        end_q,
        first_bubble_nx: nx(first_x_mm),
        first_bubble_ny: ny(first_y_mm),
        bubble_spacing_nx: nx(choice_spacing_mm),
        row_spacing_ny: ny(row_spacing_mm),
    }
}

fn layout_20() -> TemplateLayout {
    TemplateLayout {
        num_questions: 20,
        id: id_grid(15.0, 25.0, 14.0, 4.6),
        answer_blocks: vec![
            answer_block(1, 10, 15.0, 90.0, 5.0, 4.6),
            answer_block(11, 20, 100.0, 90.0, 5.0, 4.6),
        ],
        bubble_diameter_nx: nx(BUBBLE_DIAMETER_MINI_MM),
        bubble_diameter_ny: ny(BUBBLE_DIAMETER_MINI_MM),
        mini: true,
    }
}

fn layout_50() -> TemplateLayout {
    TemplateLayout {
        num_questions: 50,
        id: id_grid(15.0, 25.0, 14.0, 4.6),
        answer_blocks: vec![
            answer_block(1, 25, 15.0, 90.0, 5.0, 4.6),
            answer_block(26, 50, 100.0, 90.0, 5.0, 4.6),
        ],
        bubble_diameter_nx: nx(BUBBLE_DIAMETER_MM),
        bubble_diameter_ny: ny(BUBBLE_DIAMETER_MM),
        mini: false,
    }
}

fn layout_100() -> TemplateLayout {
    TemplateLayout {
        num_questions: 100,
        id: id_grid(12.0, 25.0, 12.0, 4.2),
        answer_blocks: vec![
            // Top band, alongside the ID grid.
            answer_block(41, 50, 125.0, 25.0, 4.0, 4.2),
            answer_block(71, 80, 158.0, 25.0, 4.0, 4.2),
            // Bottom 4x2 grid of blocks. Choice/row spacing (5.0mm / 4.6mm)
            // matches §4.7's printed bubble pitch so a 3.8mm outline never
            // overlaps its neighbor; the second row group starts 50mm below
            // the first to clear a 10-row block's ~45mm span.
            answer_block(1, 10, 12.0, 90.0, 5.0, 4.6),
            answer_block(11, 20, 57.0, 90.0, 5.0, 4.6),
            answer_block(21, 30, 102.0, 90.0, 5.0, 4.6),
            answer_block(31, 40, 147.0, 90.0, 5.0, 4.6),
            answer_block(51, 60, 12.0, 140.0, 5.0, 4.6),
            answer_block(61, 70, 57.0, 140.0, 5.0, 4.6),
            answer_block(81, 90, 102.0, 140.0, 5.0, 4.6),
            answer_block(91, 100, 147.0, 140.0, 5.0, 4.6),
        ],
        bubble_diameter_nx: nx(BUBBLE_DIAMETER_MM),
        bubble_diameter_ny: ny(BUBBLE_DIAMETER_MM),
        mini: false,
    }
}

/// Look up the registered layout for a question count, or `None` if
/// `num_questions` is not one of {20, 50, 100}
pub fn layout_for(num_questions: usize) -> Option<TemplateLayout> {
    match num_questions {
        20 => Some(layout_20()),
        50 => Some(layout_50()),
        100 => Some(layout_100()),
        _ => None,
    }
}
