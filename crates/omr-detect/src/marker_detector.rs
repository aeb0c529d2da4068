//! Fiducial marker detector: coarse scan, flood-fill refinement, geometry
//! validation

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use omr_core::BinaryPlane;

use crate::quad::MarkerQuad;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Tunable derived parameters for Phase 1's coarse scan, per spec §4.2
/// "Parameters (derived)". Phase 2/3's structural ratios (quadrant
/// uniformity, edge density, aspect/fill acceptance, geometry validation)
/// are invariants rather than tunables and stay fixed in the phase
/// functions themselves.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MarkerDetectParams {
    /// `baseMarkerSize = max(base_size_min, floor(min(W,H) * base_size_fraction))`.
    pub base_size_fraction: f32,
    pub base_size_min: f32,
    /// Multi-scale search factors applied to the base marker size.
    pub scale_multipliers: [f32; 3],
    pub search_fraction_camera: f32,
    pub search_fraction_scan: f32,
    pub min_density_camera: f32,
    pub min_density_scan: f32,
}

impl Default for MarkerDetectParams {
    fn default() -> Self {
        Self {
            base_size_fraction: 0.04,
            base_size_min: 12.0,
            scale_multipliers: [0.6, 1.0, 1.5],
            search_fraction_camera: 0.35,
            search_fraction_scan: 0.30,
            min_density_camera: 0.25,
            min_density_scan: 0.35,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CornerKind {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

const CORNERS: [CornerKind; 4] = [
    CornerKind::TopLeft,
    CornerKind::TopRight,
    CornerKind::BottomLeft,
    CornerKind::BottomRight,
];

struct CoarseCandidate {
    center: Point2<f32>,
    size: f32,
    density_ok: bool,
}

fn corner_region(
    corner: CornerKind,
    width: usize,
    height: usize,
    fraction: f32,
) -> (usize, usize, usize, usize) {
    let rw = ((width as f32) * fraction).round() as usize;
    let rh = ((height as f32) * fraction).round() as usize;
    match corner {
        CornerKind::TopLeft => (0, 0, rw.min(width), rh.min(height)),
        CornerKind::TopRight => (width.saturating_sub(rw), 0, width, rh.min(height)),
        CornerKind::BottomLeft => (0, height.saturating_sub(rh), rw.min(width), height),
        CornerKind::BottomRight => (
            width.saturating_sub(rw),
            height.saturating_sub(rh),
            width,
            height,
        ),
    }
}

/// Mean fill density of `plane` over `[x0,x1) x [y0,y1)`, sampled at `stride`.
fn window_density(plane: &BinaryPlane, x0: i32, y0: i32, size: i32, stride: i32) -> f32 {
    let stride = stride.max(1);
    let mut filled = 0u32;
    let mut total = 0u32;
    let mut y = y0;
    while y < y0 + size {
        let mut x = x0;
        while x < x0 + size {
            total += 1;
            if plane.get(x, y) == 1 {
                filled += 1;
            }
            x += stride;
        }
        y += stride;
    }
    if total == 0 {
        0.0
    } else {
        filled as f32 / total as f32
    }
}

fn quadrant_uniformity(plane: &BinaryPlane, x0: i32, y0: i32, size: i32, stride: i32) -> f32 {
    let half = size / 2;
    let q1 = window_density(plane, x0, y0, half, stride);
    let q2 = window_density(plane, x0 + half, y0, half, stride);
    let q3 = window_density(plane, x0, y0 + half, half, stride);
    let q4 = window_density(plane, x0 + half, y0 + half, half, stride);
    let vals = [q1, q2, q3, q4];
    let min_v = vals.iter().cloned().fold(f32::INFINITY, f32::min);
    let max_v = vals.iter().cloned().fold(0.0f32, f32::max);
    if max_v <= 0.0 {
        0.0
    } else {
        min_v / max_v
    }
}

/// Fraction filled along each of the four sides; all four must clear 0.30.
fn edge_density_ok(plane: &BinaryPlane, x0: i32, y0: i32, size: i32, stride: i32) -> bool {
    let line_density = |fixed: i32, vary_start: i32, len: i32, horizontal: bool| -> f32 {
        let stride = stride.max(1);
        let mut filled = 0u32;
        let mut total = 0u32;
        let mut t = vary_start;
        while t < vary_start + len {
            let (x, y) = if horizontal { (t, fixed) } else { (fixed, t) };
            total += 1;
            if plane.get(x, y) == 1 {
                filled += 1;
            }
            t += stride;
        }
        if total == 0 {
            0.0
        } else {
            filled as f32 / total as f32
        }
    };

    let top = line_density(y0, x0, size, true);
    let bottom = line_density(y0 + size - 1, x0, size, true);
    let left = line_density(x0, y0, size, false);
    let right = line_density(x0 + size - 1, y0, size, false);

    top >= 0.30 && bottom >= 0.30 && left >= 0.30 && right >= 0.30
}

/// Phase 1: coarse multi-scale sliding-window scan within one corner region.
fn phase1_corner(
    plane: &BinaryPlane,
    width: usize,
    height: usize,
    corner: CornerKind,
    search_fraction: f32,
    scales: &[f32],
    min_density: f32,
) -> CoarseCandidate {
    let (rx0, ry0, rx1, ry1) = corner_region(corner, width, height, search_fraction);

    let mut best_score = -1.0f32;
    let mut best = CoarseCandidate {
        center: Point2::new(
            ((rx0 + rx1) / 2).max(1) as f32,
            ((ry0 + ry1) / 2).max(1) as f32,
        ),
        size: scales.first().copied().unwrap_or(12.0),
        density_ok: false,
    };

    for &size_f in scales {
        let size = size_f.round().max(4.0) as i32;
        if size as usize >= (rx1.saturating_sub(rx0)).max(1) || size as usize >= (ry1.saturating_sub(ry0)).max(1) {
            continue;
        }
        let stride = (size / 4).max(1);
        let sample_stride = (size / 8).max(1);

        let mut y = ry0 as i32;
        while y + size <= ry1 as i32 {
            let mut x = rx0 as i32;
            while x + size <= rx1 as i32 {
                let density = window_density(plane, x, y, size, sample_stride);
                let uniformity = quadrant_uniformity(plane, x, y, size, sample_stride);
                let edges_ok = edge_density_ok(plane, x, y, size, sample_stride);

                let density_ok = density >= min_density;
                let pass = density_ok && uniformity >= 0.40 && edges_ok;
                let score = if pass { density * uniformity } else { -1.0 };

                if score > best_score {
                    best_score = score;
                    best = CoarseCandidate {
                        center: Point2::new(x as f32 + size as f32 / 2.0, y as f32 + size as f32 / 2.0),
                        size: size as f32,
                        density_ok: pass,
                    };
                }
                x += stride;
            }
            y += stride;
        }
    }

    best
}

/// Phase 2: flood-fill refinement of a coarse center into a connected-component centroid.
fn phase2_refine(plane: &BinaryPlane, seed: Point2<f32>, marker_size: f32) -> Point2<f32> {
    let radius = (1.8 * marker_size).ceil() as i32;
    let cap = (6.0 * marker_size * marker_size) as usize;

    let start = find_seed_pixel(plane, seed, marker_size);
    let Some((sx, sy)) = start else {
        return seed;
    };

    let mut visited = std::collections::HashSet::new();
    let mut queue = std::collections::VecDeque::new();
    queue.push_back((sx, sy));
    visited.insert((sx, sy));

    let mut min_x = sx;
    let mut max_x = sx;
    let mut min_y = sy;
    let mut max_y = sy;
    let mut sum_x = 0i64;
    let mut sum_y = 0i64;
    let mut count = 0i64;

    while let Some((x, y)) = queue.pop_front() {
        if count as usize >= cap {
            break;
        }
        if (x - sx).abs() > radius || (y - sy).abs() > radius {
            continue;
        }
        sum_x += x as i64;
        sum_y += y as i64;
        count += 1;
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);

        for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
            let (nx, ny) = (x + dx, y + dy);
            if visited.contains(&(nx, ny)) {
                continue;
            }
            if plane.get(nx, ny) == 1 {
                visited.insert((nx, ny));
                queue.push_back((nx, ny));
            }
        }
    }

    if count == 0 {
        return seed;
    }

    let bbox_w = (max_x - min_x + 1).max(1);
    let bbox_h = (max_y - min_y + 1).max(1);
    let aspect = bbox_w.min(bbox_h) as f32 / bbox_w.max(bbox_h) as f32;
    let fill_ratio = count as f32 / (bbox_w * bbox_h) as f32;

    if aspect >= 0.55 && fill_ratio >= 0.65 {
        Point2::new(
            sum_x as f32 / count as f32,
            sum_y as f32 / count as f32,
        )
    } else {
        seed
    }
}

/// Spiral outward from `seed` to find the nearest filled pixel within `1.5*marker_size`.
fn find_seed_pixel(plane: &BinaryPlane, seed: Point2<f32>, marker_size: f32) -> Option<(i32, i32)> {
    let cx = seed.x.round() as i32;
    let cy = seed.y.round() as i32;
    if plane.get(cx, cy) == 1 {
        return Some((cx, cy));
    }
    let max_r = (1.5 * marker_size).ceil() as i32;
    for r in 1..=max_r {
        for dx in -r..=r {
            for dy in -r..=r {
                if dx.abs() != r && dy.abs() != r {
                    continue;
                }
                let (x, y) = (cx + dx, cy + dy);
                if plane.get(x, y) == 1 {
                    return Some((x, y));
                }
            }
        }
    }
    None
}

/// Detect the four corner fiducials using the default [`MarkerDetectParams`].
/// Returns the quad and whether all Phase-1 density checks and the Phase-3
/// geometry validation both passed.
pub fn detect_markers(
    plane: &BinaryPlane,
    width: usize,
    height: usize,
    is_camera: bool,
) -> (MarkerQuad, bool) {
    detect_markers_with_params(plane, width, height, is_camera, &MarkerDetectParams::default())
}

/// Same as [`detect_markers`] with explicit derived-parameter overrides.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(plane, params), fields(width, height, is_camera))
)]
pub fn detect_markers_with_params(
    plane: &BinaryPlane,
    width: usize,
    height: usize,
    is_camera: bool,
    params: &MarkerDetectParams,
) -> (MarkerQuad, bool) {
    let base = ((width.min(height) as f32) * params.base_size_fraction)
        .floor()
        .max(params.base_size_min);
    let scales = params.scale_multipliers.map(|m| m * base);
    let search_fraction = if is_camera {
        params.search_fraction_camera
    } else {
        params.search_fraction_scan
    };
    let min_density = if is_camera {
        params.min_density_camera
    } else {
        params.min_density_scan
    };

    let mut centers = [Point2::new(0.0, 0.0); 4];
    let mut all_density_ok = true;

    for (i, &corner) in CORNERS.iter().enumerate() {
        let coarse = phase1_corner(plane, width, height, corner, search_fraction, &scales, min_density);
        all_density_ok &= coarse.density_ok;
        let refined = phase2_refine(plane, coarse.center, coarse.size);
        centers[i] = refined;
    }

    let quad = MarkerQuad {
        top_left: centers[0],
        top_right: centers[1],
        bottom_left: centers[2],
        bottom_right: centers[3],
    };

    let geometry_ok = quad.validate(width, height);
    let found = all_density_ok && geometry_ok;
    (quad, found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use omr_core::BinaryPlane;

    fn plane_with_square_markers(width: usize, height: usize, marker: usize) -> BinaryPlane {
        let mut bits = vec![0u8; width * height];
        let mut paint = |cx: usize, cy: usize| {
            let half = marker / 2;
            for y in cy.saturating_sub(half)..(cy + half).min(height) {
                for x in cx.saturating_sub(half)..(cx + half).min(width) {
                    bits[y * width + x] = 1;
                }
            }
        };
        let inset = marker;
        paint(inset, inset);
        paint(width - inset, inset);
        paint(inset, height - inset);
        paint(width - inset, height - inset);
        BinaryPlane { width, height, bits }
    }

    #[test]
    fn finds_four_corner_squares() {
        let (w, h) = (400, 400);
        let plane = plane_with_square_markers(w, h, 24);
        let (quad, found) = detect_markers(&plane, w, h, false);
        assert!(found, "expected markers to be found");
        assert!(quad.top_left.x < 60.0 && quad.top_left.y < 60.0);
        assert!(quad.bottom_right.x > 340.0 && quad.bottom_right.y > 340.0);
    }

    #[test]
    fn blank_sheet_fails_detection() {
        let (w, h) = (400, 400);
        let plane = BinaryPlane {
            width: w,
            height: h,
            bits: vec![0u8; w * h],
        };
        let (_, found) = detect_markers(&plane, w, h, false);
        assert!(!found);
    }

    #[test]
    fn clipped_top_markers_fail_geometry() {
        let (w, h) = (400, 400);
        let mut plane = plane_with_square_markers(w, h, 24);
        for y in 0..(h / 10) {
            for x in 0..w {
                plane.bits[y * w + x] = 0;
            }
        }
        let (_, found) = detect_markers(&plane, w, h, false);
        assert!(!found);
    }
}
