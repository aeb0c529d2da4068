//! Millimeter/PDF coordinate conversion shared by every drawing routine.
//!
//! `omr-detect::TemplateLayout` expresses bubble positions as normalized
//! `(nx, ny)` relative to the marker-center frame. The renderer turns those
//! back into page-absolute millimeters, then into PDF points
//! with the origin at the bottom-left instead of the template's top-left,
//! so the detector's and renderer's geometry stay defined by the exact same
//! numbers instead of two independently maintained layouts drifting apart.

use omr_detect::{FRAME_HEIGHT_MM, FRAME_WIDTH_MM, MARKER_INSET_MM, PAGE_HEIGHT_MM};
use printpdf::{Mm, Point};

/// Normalized `(nx, ny)` -> page-absolute millimeters from the top-left corner.
pub fn frame_to_page_mm(nx: f32, ny: f32) -> (f32, f32) {
    (
        MARKER_INSET_MM + nx * FRAME_WIDTH_MM,
        MARKER_INSET_MM + ny * FRAME_HEIGHT_MM,
    )
}

/// Page-absolute mm (origin top-left, y down) -> a PDF [`Point`] (origin
/// bottom-left, y up).
pub fn page_point(x_mm: f32, y_top_mm: f32) -> Point {
    Point::new(Mm(x_mm), Mm(PAGE_HEIGHT_MM - y_top_mm))
}
