use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Four corner fiducial centers, in image-pixel coordinates.
///
/// Invariant when [`MarkerQuad::validate`] returns `true`: positive area,
/// opposite-side length ratio >= 0.7, diagonal ratio >= 0.8, and both the
/// top and left edges span at least 30% of `min(width, height)`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerQuad {
    pub top_left: Point2<f32>,
    pub top_right: Point2<f32>,
    pub bottom_left: Point2<f32>,
    pub bottom_right: Point2<f32>,
}

impl MarkerQuad {
    /// Degenerate quad spanning the entire frame, used when detection fails
    /// after both preprocessing passes
    pub fn full_frame(width: usize, height: usize) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            top_left: Point2::new(0.0, 0.0),
            top_right: Point2::new(w, 0.0),
            bottom_left: Point2::new(0.0, h),
            bottom_right: Point2::new(w, h),
        }
    }

    fn dist(a: Point2<f32>, b: Point2<f32>) -> f32 {
        (a - b).norm()
    }

    pub fn top_len(&self) -> f32 {
        Self::dist(self.top_left, self.top_right)
    }
    pub fn bottom_len(&self) -> f32 {
        Self::dist(self.bottom_left, self.bottom_right)
    }
    pub fn left_len(&self) -> f32 {
        Self::dist(self.top_left, self.bottom_left)
    }
    pub fn right_len(&self) -> f32 {
        Self::dist(self.top_right, self.bottom_right)
    }
    fn diag1(&self) -> f32 {
        Self::dist(self.top_left, self.bottom_right)
    }
    fn diag2(&self) -> f32 {
        Self::dist(self.top_right, self.bottom_left)
    }

    /// Shoelace-formula signed area, used only for the "positive area" check.
    pub fn area(&self) -> f32 {
        let pts = [self.top_left, self.top_right, self.bottom_right, self.bottom_left];
        let mut sum = 0.0f32;
        for i in 0..4 {
            let a = pts[i];
            let b = pts[(i + 1) % 4];
            sum += a.x * b.y - b.x * a.y;
        }
        0.5 * sum.abs()
    }

    /// Rejects quads that are too small, too skewed, or too non-convex to
    /// be a genuine set of fiducials rather than detector noise.
    pub fn validate(&self, width: usize, height: usize) -> bool {
        if self.area() <= 0.0 {
            return false;
        }
        let h_ratio = self.top_len().min(self.bottom_len()) / self.top_len().max(self.bottom_len());
        let v_ratio = self.left_len().min(self.right_len()) / self.left_len().max(self.right_len());
        let (d1, d2) = (self.diag1(), self.diag2());
        let diag_ratio = d1.min(d2) / d1.max(d2);

        let min_dim = width.min(height) as f32;
        let top_span_ok = self.top_len() >= 0.30 * min_dim;
        let left_span_ok = self.left_len() >= 0.30 * min_dim;

        h_ratio >= 0.7 && v_ratio >= 0.7 && diag_ratio >= 0.8 && top_span_ok && left_span_ok
    }

    /// Per-corner Euclidean drift against another quad
    pub fn max_corner_drift(&self, other: &MarkerQuad) -> f32 {
        Self::dist(self.top_left, other.top_left)
            .max(Self::dist(self.top_right, other.top_right))
            .max(Self::dist(self.bottom_left, other.bottom_left))
            .max(Self::dist(self.bottom_right, other.bottom_right))
    }

    /// Linearly blend each corner of `self` toward `other` with weight `w`.
    pub fn lerp_toward(&self, other: &MarkerQuad, w: f32) -> MarkerQuad {
        let l = |a: Point2<f32>, b: Point2<f32>| a + (b - a) * w;
        MarkerQuad {
            top_left: l(self.top_left, other.top_left),
            top_right: l(self.top_right, other.top_right),
            bottom_left: l(self.bottom_left, other.bottom_left),
            bottom_right: l(self.bottom_right, other.bottom_right),
        }
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
    fn square_quad_on_large_frame_validates() {
        let q = square(400.0);
        assert!(q.validate(1000, 1000));
    }

    #[test]
    fn quad_spanning_too_little_of_frame_fails() {
        let q = square(50.0);
        assert!(!q.validate(1000, 1000));
    }

    #[test]
    fn skewed_quad_fails_ratio_checks() {
        let mut q = square(400.0);
        q.bottom_right = Point2::new(40.0, 400.0);
        assert!(!q.validate(1000, 1000));
    }

    #[test]
    fn drift_and_lerp_behave() {
        let a = square(400.0);
        let mut b = square(400.0);
        b.top_left = Point2::new(10.0, 10.0);
        assert!((a.max_corner_drift(&b) - (10.0f32 * 2.0).sqrt()).abs() < 1e-3);
        let mid = a.lerp_toward(&b, 0.5);
        assert!((mid.top_left.x - 5.0).abs() < 1e-3);
    }
}
