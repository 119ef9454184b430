//! Landmark-to-feature normalization
//!
//! Produces the 42 values the gesture classifier was trained on: each point's
//! (x, y) relative to the minimum x and minimum y of the hand.
//!
//! Only translation is removed. The vector is not scale or rotation
//! normalized, so the same sign made closer to the camera yields larger
//! values. The classifier was trained this way and changing it would
//! invalidate the model.

use crate::error::{Error, Result};
use crate::hand_landmarks::{LandmarkSet, HAND_LANDMARK_COUNT};

pub const FEATURE_LEN: usize = HAND_LANDMARK_COUNT * 2;

/// Interleaved `[x0, y0, x1, y1, ..., x20, y20]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f32; FEATURE_LEN]);

impl FeatureVector {
    pub fn new(values: [f32; FEATURE_LEN]) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.0.to_vec()
    }
}

/// Feature vector for one hand.
///
/// Fails with [`Error::LandmarkShape`] unless exactly 21 points are given.
pub fn normalize(landmarks: &LandmarkSet) -> Result<FeatureVector> {
    let points = landmarks.points();
    if points.len() != HAND_LANDMARK_COUNT {
        return Err(Error::LandmarkShape {
            expected: HAND_LANDMARK_COUNT,
            actual: points.len(),
        });
    }

    let min_x = points.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
    let min_y = points.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);

    let mut features = [0.0; FEATURE_LEN];
    for (i, p) in points.iter().enumerate() {
        features[2 * i] = p.x - min_x;
        features[2 * i + 1] = p.y - min_y;
    }

    Ok(FeatureVector(features))
}
