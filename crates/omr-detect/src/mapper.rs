//! Normalized-to-pixel coordinate mapping
//!
//! Deliberately a bilinear blend of the four marker centers rather than a
//! full planar homography: the sheet is assumed flat and the camera capture
//! roughly fronto-parallel, so the cheaper blend is within budget while a
//! full perspective solve is not.

use nalgebra::Point2;

use crate::quad::MarkerQuad;

/// Maps normalized `(nx, ny) in [0, 1]^2` bubble/cell coordinates, where the
/// unit square's corners are the marker centers, into image-pixel space.
#[derive(Clone, Copy, Debug)]
pub struct CoordinateMapper {
    quad: MarkerQuad,
}

impl CoordinateMapper {
    pub fn new(quad: MarkerQuad) -> Self {
        Self { quad }
    }

    /// Bilinear blend: interpolate along the top and bottom edges at `nx`,
    /// then interpolate between those two points at `ny`.
    pub fn map(&self, nx: f32, ny: f32) -> Point2<f32> {
        let lerp = |a: Point2<f32>, b: Point2<f32>, t: f32| a + (b - a) * t;
        let top = lerp(self.quad.top_left, self.quad.top_right, nx);
        let bottom = lerp(self.quad.bottom_left, self.quad.bottom_right, nx);
        lerp(top, bottom, ny)
    }

    /// Approximate local pixel extent of one normalized-unit step along x/y,
    /// used to size the bubble sampling kernel in pixels.
    pub fn local_scale(&self) -> (f32, f32) {
        let sx = (self.quad.top_len() + self.quad.bottom_len()) / 2.0;
        let sy = (self.quad.left_len() + self.quad.right_len()) / 2.0;
        (sx, sy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f32) -> MarkerQuad {
        MarkerQuad {
            top_left: Point2::new(0.0, 0.0),
            top_right: Point2::new(size, 0.0),
            bottom_left: Point2::new(0.0, size),
            bottom_right: Point2::new(size, size),
        }
    }

    #[test]
    fn corners_map_exactly() {
        let mapper = CoordinateMapper::new(square(100.0));
        assert_eq!(mapper.map(0.0, 0.0), Point2::new(0.0, 0.0));
        assert_eq!(mapper.map(1.0, 0.0), Point2::new(100.0, 0.0));
        assert_eq!(mapper.map(0.0, 1.0), Point2::new(0.0, 100.0));
        assert_eq!(mapper.map(1.0, 1.0), Point2::new(100.0, 100.0));
    }

    #[test]
    fn center_maps_to_centroid() {
        let mapper = CoordinateMapper::new(square(100.0));
        let p = mapper.map(0.5, 0.5);
        assert!((p.x - 50.0).abs() < 1e-4);
        assert!((p.y - 50.0).abs() < 1e-4);
    }

    #[test]
    fn skewed_quad_still_interpolates_linearly_per_edge() {
        let mut q = square(100.0);
        q.top_right = Point2::new(120.0, 0.0);
        let mapper = CoordinateMapper::new(q);
        let p = mapper.map(0.5, 0.0);
        assert!((p.x - 60.0).abs() < 1e-4);
    }

    #[test]
    fn local_scale_reflects_quad_size() {
        let mapper = CoordinateMapper::new(square(200.0));
        let (sx, sy) = mapper.local_scale();
        assert!((sx - 200.0).abs() < 1e-3);
        assert!((sy - 200.0).abs() < 1e-3);
    }
}
