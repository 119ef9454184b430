pub mod model_mediapipe;

use image::DynamicImage;
use nalgebra::Point2;

use crate::error::Result;

/// Number of points the hand landmark network produces per hand.
pub const HAND_LANDMARK_COUNT: usize = 21;

// MediaPipe hand topology, used for drawing
pub const HAND_SKELETON: [(usize, usize); 21] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (5, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (9, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (13, 17),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
];

/// Points of one detected hand in normalized image coordinates (x, y in [0, 1]).
///
/// The set is not validated on construction; the feature normalizer rejects
/// anything other than [`HAND_LANDMARK_COUNT`] points.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Point2<f32>>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point2<f32>>) -> Self {
        Self { points }
    }

    pub fn from_xy(coords: &[(f32, f32)]) -> Self {
        Self::new(coords.iter().map(|&(x, y)| Point2::new(x, y)).collect())
    }

    pub fn points(&self) -> &[Point2<f32>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Same hand shifted by (dx, dy).
    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self::new(
            self.points
                .iter()
                .map(|p| Point2::new(p.x + dx, p.y + dy))
                .collect(),
        )
    }

    /// Landmarks in pixel coordinates of an image of the given size.
    pub fn to_pixels(&self, width: u32, height: u32) -> Vec<Point2<f32>> {
        self.points
            .iter()
            .map(|p| Point2::new(p.x * width as f32, p.y * height as f32))
            .collect()
    }
}

/// Finds at most one hand in an image.
///
/// Implementations are immutable after construction so one instance can serve
/// the stream pipeline and concurrent single-shot requests.
pub trait HandLandmarkDetector: Send + Sync {
    /// `Ok(None)` when no hand reaches the minimum detection confidence.
    fn detect(&self, image: &DynamicImage) -> Result<Option<LandmarkSet>>;
}
