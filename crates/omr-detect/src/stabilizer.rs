//! Temporal stabilizer for the live-camera preview loop
//!
//! Owned by the live-preview loop only; a one-shot upload/capture decode
//! never touches this type.

use serde::{Deserialize, Serialize};

use crate::quad::MarkerQuad;

pub const LOCK_THRESHOLD: u32 = 3;
pub const DEADZONE: f32 = 8.0;
pub const SMOOTH: f32 = 0.15;
const STABLE_FRAMES_CAP: u32 = LOCK_THRESHOLD + 5;

/// Tunable parameters for [`StabilizerState::update_with_params`], per spec
/// §4.3. `Default` matches [`LOCK_THRESHOLD`]/[`DEADZONE`]/[`SMOOTH`] exactly.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StabilizerParams {
    pub lock_threshold: u32,
    pub deadzone: f32,
    pub smooth: f32,
    /// Cap on `stable_frames`, preventing unbounded growth while locked.
    pub stable_frames_cap: u32,
    /// Drift multiplier of `deadzone` below which a locked estimate rejects
    /// jitter instead of re-blending.
    pub jitter_reject_multiplier: f32,
}

impl Default for StabilizerParams {
    fn default() -> Self {
        Self {
            lock_threshold: LOCK_THRESHOLD,
            deadzone: DEADZONE,
            smooth: SMOOTH,
            stable_frames_cap: STABLE_FRAMES_CAP,
            jitter_reject_multiplier: 4.0,
        }
    }
}

/// Process-local stabilizer state, created on first successful detection and
/// destroyed when the camera session ends.
#[derive(Clone, Debug, Default)]
pub struct StabilizerState {
    pub quad: Option<MarkerQuad>,
    pub stable_frames: u32,
    pub locked: bool,
}

impl StabilizerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one frame's detection result (`None` = detection failed this
    /// frame) using the default [`StabilizerParams`].
    pub fn update(&mut self, detection: Option<MarkerQuad>) {
        self.update_with_params(detection, &StabilizerParams::default());
    }

    /// Same as [`StabilizerState::update`] with explicit parameter overrides.
    pub fn update_with_params(&mut self, detection: Option<MarkerQuad>, params: &StabilizerParams) {
        match (self.quad, detection) {
            (None, Some(fresh)) => {
                self.quad = Some(fresh);
                self.stable_frames = 1;
                self.locked = false;
            }
            (Some(prior), Some(fresh)) => {
                let drift = prior.max_corner_drift(&fresh);
                if drift < params.deadzone {
                    self.stable_frames = (self.stable_frames + 1).min(params.stable_frames_cap);
                    if self.stable_frames >= params.lock_threshold {
                        self.locked = true;
                    }
                    // keep prior positions
                } else if drift < params.jitter_reject_multiplier * params.deadzone && self.locked {
                    // reject jitter, stay locked at prior positions
                } else {
                    self.quad = Some(prior.lerp_toward(&fresh, params.smooth));
                    self.stable_frames = 0;
                    self.locked = false;
                }
            }
            (Some(_), None) => {
                self.stable_frames = self.stable_frames.saturating_sub(1);
                if self.stable_frames == 0 {
                    self.quad = None;
                    self.locked = false;
                }
            }
            (None, None) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    fn square(size: f32, offset: f32) -> MarkerQuad {
        MarkerQuad {
            top_left: Point2::new(offset, offset),
            top_right: Point2::new(offset + size, offset),
            bottom_left: Point2::new(offset, offset + size),
            bottom_right: Point2::new(offset + size, offset + size),
        }
    }

    #[test]
    fn seeds_on_first_detection() {
        let mut s = StabilizerState::new();
        s.update(Some(square(400.0, 0.0)));
        assert_eq!(s.stable_frames, 1);
        assert!(!s.locked);
        assert!(s.quad.is_some());
    }

    #[test]
    fn locks_after_threshold_stable_frames_and_resists_jitter() {
        let mut s = StabilizerState::new();
        for _ in 0..3 {
            s.update(Some(square(400.0, 0.0)));
        }
        assert!(s.locked);
        let held = s.quad.unwrap();

        // small jitter within deadzone keeps position identical
        s.update(Some(square(400.0, 2.0)));
        assert_eq!(s.quad.unwrap().top_left, held.top_left);

        // jitter within 4*deadzone while locked is rejected
        s.update(Some(square(400.0, 20.0)));
        assert_eq!(s.quad.unwrap().top_left, held.top_left);
        assert!(s.locked);
    }

    #[test]
    fn large_jump_unlocks_and_blends() {
        let mut s = StabilizerState::new();
        for _ in 0..3 {
            s.update(Some(square(400.0, 0.0)));
        }
        assert!(s.locked);
        s.update(Some(square(400.0, 200.0)));
        assert!(!s.locked);
        assert_eq!(s.stable_frames, 0);
        // blended toward the new reading but not all the way
        let tl = s.quad.unwrap().top_left;
        assert!(tl.x > 0.0 && tl.x < 200.0);
    }

    #[test]
    fn holds_across_brief_occlusion_then_clears() {
        let mut s = StabilizerState::new();
        for _ in 0..3 {
            s.update(Some(square(400.0, 0.0)));
        }
        assert!(s.locked);
        for _ in 0..3 {
            s.update(None);
        }
        assert!(s.quad.is_none());
    }
}
