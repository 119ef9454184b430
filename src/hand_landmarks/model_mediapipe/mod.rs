use std::cmp::min;
use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;
use nalgebra::Point2;
use ndarray::{Array, CowArray};
use ort::tensor::OrtOwnedTensor;
use ort::{Session, Value};
use tracing::trace;

use crate::config::DetectorConfig;
use crate::error::{Error, Result};
use crate::hand_landmarks::{HandLandmarkDetector, LandmarkSet, HAND_LANDMARK_COUNT};
use crate::utils::{onnx_session, sigmoid};

/// MediaPipe hand landmark network (ONNX export).
///
/// Input is a `[1, size, size, 3]` RGB tensor in `[0, 1]`; output 0 holds 21
/// points (x, y, z) in input pixels and output 1 the hand-presence score.
/// Only one hand is ever reported.
pub struct MediapipeHandLandmarksModel {
    session: Arc<Session>,
    input_size: u32,
    min_detection_confidence: f32,
    presence_is_logit: bool,
}

/// Centered square region of the frame that is fed to the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SquareCrop {
    x: u32,
    y: u32,
    side: u32,
}

impl SquareCrop {
    fn centered(width: u32, height: u32) -> Self {
        let side = min(width, height);
        Self {
            x: (width - side) / 2,
            y: (height - side) / 2,
            side,
        }
    }

    /// Map a point in network input pixels back to normalized image coordinates.
    fn to_image(&self, px: f32, py: f32, input_size: u32, width: u32, height: u32) -> Point2<f32> {
        let scale = self.side as f32 / input_size as f32;
        Point2::new(
            (self.x as f32 + px * scale) / width as f32,
            (self.y as f32 + py * scale) / height as f32,
        )
    }
}

impl MediapipeHandLandmarksModel {
    pub fn load(path: &Path, config: &DetectorConfig, intra_threads: i16) -> Result<Self> {
        let session = onnx_session("hand landmark model", path, intra_threads)?;

        Ok(Self {
            session: Arc::new(session),
            input_size: config.input_size,
            min_detection_confidence: config.min_detection_confidence,
            presence_is_logit: config.presence_is_logit,
        })
    }

    fn run(&self, image: &DynamicImage, crop: SquareCrop) -> Result<(Vec<f32>, f32)> {
        let size = self.input_size;

        let input = image
            .crop_imm(crop.x, crop.y, crop.side, crop.side)
            .resize_exact(size, size, image::imageops::FilterType::Triangle)
            .to_rgb8();

        let input_: Vec<f32> = input
            .pixels()
            .flat_map(|p| p.0)
            .map(|p| p as f32 / 255.0)
            .collect();

        let array: CowArray<_, _> =
            Array::from_shape_vec((1, size as usize, size as usize, 3), input_)
                .map_err(|e| Error::Detection(e.to_string()))?
                .into_dyn()
                .into();

        let inputs = vec![Value::from_array(self.session.allocator(), &array)
            .map_err(|e| Error::Detection(e.to_string()))?];
        let outputs: Vec<Value> = self
            .session
            .run(inputs)
            .map_err(|e| Error::Detection(e.to_string()))?;

        let (Some(points_out), Some(flag_out)) = (outputs.get(0), outputs.get(1)) else {
            return Err(Error::Detection(format!(
                "expected landmark and presence outputs, got {} tensors",
                outputs.len()
            )));
        };

        let points: OrtOwnedTensor<f32, _> = points_out
            .try_extract()
            .map_err(|e| Error::Detection(e.to_string()))?;
        let points: Vec<f32> = points.view().iter().copied().collect();

        let flag: OrtOwnedTensor<f32, _> = flag_out
            .try_extract()
            .map_err(|e| Error::Detection(e.to_string()))?;
        let flag = flag
            .view()
            .iter()
            .next()
            .copied()
            .ok_or_else(|| Error::Detection("empty hand presence output".into()))?;

        Ok((points, flag))
    }
}

impl HandLandmarkDetector for MediapipeHandLandmarksModel {
    fn detect(&self, image: &DynamicImage) -> Result<Option<LandmarkSet>> {
        let (width, height) = (image.width(), image.height());
        let crop = SquareCrop::centered(width, height);
        if crop.side == 0 {
            return Ok(None);
        }

        let (raw, flag) = self.run(image, crop)?;

        let presence = if self.presence_is_logit { sigmoid(flag) } else { flag };
        trace!(presence, "hand presence");
        if presence < self.min_detection_confidence {
            return Ok(None);
        }

        decode_landmarks(&raw, crop, self.input_size, width, height).map(Some)
    }
}

/// Turn the flat network output (x, y[, z] per point) into a landmark set.
fn decode_landmarks(
    raw: &[f32],
    crop: SquareCrop,
    input_size: u32,
    width: u32,
    height: u32,
) -> Result<LandmarkSet> {
    if raw.is_empty() || raw.len() % HAND_LANDMARK_COUNT != 0 {
        return Err(Error::Detection(format!(
            "landmark output of {} values is not {} points",
            raw.len(),
            HAND_LANDMARK_COUNT
        )));
    }
    let stride = raw.len() / HAND_LANDMARK_COUNT;
    if stride < 2 {
        return Err(Error::Detection("landmark output has no y coordinate".into()));
    }

    let points = raw
        .chunks_exact(stride)
        .map(|p| crop.to_image(p[0], p[1], input_size, width, height))
        .collect();

    Ok(LandmarkSet::new(points))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_is_centered_on_the_long_side() {
        assert_eq!(
            SquareCrop::centered(640, 480),
            SquareCrop { x: 80, y: 0, side: 480 }
        );
        assert_eq!(
            SquareCrop::centered(300, 500),
            SquareCrop { x: 0, y: 100, side: 300 }
        );
    }

    #[test]
    fn decoded_points_are_normalized_to_the_full_frame() {
        let crop = SquareCrop::centered(640, 480);
        // every point at the centre of the 224px input, with a z component
        let raw: Vec<f32> = (0..HAND_LANDMARK_COUNT)
            .flat_map(|_| [112.0, 112.0, -3.0])
            .collect();

        let set = decode_landmarks(&raw, crop, 224, 640, 480).unwrap();
        assert_eq!(set.len(), HAND_LANDMARK_COUNT);
        let p = set.points()[0];
        assert!((p.x - 0.5).abs() < 1e-6);
        assert!((p.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn malformed_output_is_a_detection_error() {
        let crop = SquareCrop::centered(100, 100);
        assert!(matches!(
            decode_landmarks(&[1.0; 50], crop, 224, 100, 100),
            Err(Error::Detection(_))
        ));
        assert!(matches!(
            decode_landmarks(&[1.0; 21], crop, 224, 100, 100),
            Err(Error::Detection(_))
        ));
    }

    #[test]
    fn unloadable_model_is_unavailable() {
        let config = DetectorConfig::default();
        assert!(matches!(
            MediapipeHandLandmarksModel::load(Path::new("/nonexistent/hand.onnx"), &config, 1),
            Err(Error::CapabilityUnavailable {
                capability: "hand landmark model",
                ..
            })
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hand_landmark.onnx");
        std::fs::write(&path, b"\x00\x01 not a protobuf").unwrap();
        assert!(matches!(
            MediapipeHandLandmarksModel::load(&path, &config, 1),
            Err(Error::CapabilityUnavailable { .. })
        ));
    }
}
