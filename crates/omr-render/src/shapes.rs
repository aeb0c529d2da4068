//! Low-level `printpdf` drawing primitives: filled squares (fiducial
//! markers), stroked circles (bubbles), straight rules (name/date lines),
//! and text runs. Every routine appends [`Op`]s to a page's op list rather
//! than touching a document directly, matching `printpdf`'s content-stream
//! model.

use printpdf::{
    Color, FontId, Line, LinePoint, Op, PaintMode, Polygon, PolygonRing, Pt, Rgb, TextItem,
    WindingOrder,
};

use crate::geometry::page_point;

const BLACK: Color = Color::Rgb(Rgb {
    r: 0.0,
    g: 0.0,
    b: 0.0,
    icc_profile: None,
});

/// A solid black square centered at `(cx_mm, cy_mm)`, `side_mm` wide — one
/// fiducial marker
pub fn filled_square(ops: &mut Vec<Op>, cx_mm: f32, cy_mm: f32, side_mm: f32) {
    let half = side_mm / 2.0;
    let points = [
        (-half, -half),
        (half, -half),
        (half, half),
        (-half, half),
    ]
    .into_iter()
    .map(|(dx, dy)| LinePoint {
        p: page_point(cx_mm + dx, cy_mm + dy),
        bezier: false,
    })
    .collect();

    ops.push(Op::SetFillColor { col: BLACK });
    ops.push(Op::DrawPolygon {
        polygon: Polygon {
            rings: vec![PolygonRing { points }],
            mode: PaintMode::Fill,
            winding_order: WindingOrder::NonZero,
        },
    });
}

/// A black-stroked, unfilled circle approximated by a 32-gon — one answer
/// or ID bubble outline
pub fn stroked_circle(ops: &mut Vec<Op>, cx_mm: f32, cy_mm: f32, diameter_mm: f32) {
    const SEGMENTS: usize = 32;
    let r = diameter_mm / 2.0;
    let points = (0..SEGMENTS)
        .map(|i| {
            let theta = (i as f32 / SEGMENTS as f32) * std::f32::consts::TAU;
            LinePoint {
                p: page_point(cx_mm + r * theta.cos(), cy_mm + r * theta.sin()),
                bezier: false,
            }
        })
        .collect();

    ops.push(Op::SetOutlineColor { col: BLACK });
    ops.push(Op::SetLineWidth { width: 0.4 });
    ops.push(Op::DrawLine {
        line: Line {
            points,
            is_closed: true,
        },
    });
}

/// A straight rule from `(x0, y0)` to `(x1, y1)` in page mm — name/date
/// underlines and section dividers.
pub fn rule(ops: &mut Vec<Op>, x0_mm: f32, y0_mm: f32, x1_mm: f32, y1_mm: f32, width: f32) {
    ops.push(Op::SetOutlineColor { col: BLACK });
    ops.push(Op::SetLineWidth { width });
    ops.push(Op::DrawLine {
        line: Line {
            points: vec![
                LinePoint {
                    p: page_point(x0_mm, y0_mm),
                    bezier: false,
                },
                LinePoint {
                    p: page_point(x1_mm, y1_mm),
                    bezier: false,
                },
            ],
            is_closed: false,
        },
    });
}

/// An unfilled rectangle outline — used for the optional logo placeholder
/// slot and the answer-block frame dividers.
pub fn rect_outline(ops: &mut Vec<Op>, x_mm: f32, y_mm: f32, w_mm: f32, h_mm: f32) {
    let points = [
        (x_mm, y_mm),
        (x_mm + w_mm, y_mm),
        (x_mm + w_mm, y_mm + h_mm),
        (x_mm, y_mm + h_mm),
    ]
    .into_iter()
    .map(|(x, y)| LinePoint {
        p: page_point(x, y),
        bezier: false,
    })
    .collect();

    ops.push(Op::SetOutlineColor { col: BLACK });
    ops.push(Op::SetLineWidth { width: 0.3 });
    ops.push(Op::DrawLine {
        line: Line {
            points,
            is_closed: true,
        },
    });
}

/// One line of left-aligned text at `(x_mm, y_mm)` (baseline, page mm).
pub fn text(ops: &mut Vec<Op>, font: &FontId, x_mm: f32, y_mm: f32, size_pt: f32, s: &str) {
    ops.push(Op::StartTextSection);
    ops.push(Op::SetFontSize {
        size: Pt(size_pt),
        font: font.clone(),
    });
    ops.push(Op::SetTextCursor {
        pos: page_point(x_mm, y_mm),
    });
    ops.push(Op::WriteText {
        items: vec![TextItem::Text(s.to_string())],
        font: font.clone(),
    });
    ops.push(Op::EndTextSection);
}
