//! Single-image inference used by the HTTP endpoint and the batch CLI.
//!
//! Unlike the stream there is no confidence gate here: whatever label the
//! classifier ranks first is returned.

use std::sync::Arc;

use image::DynamicImage;
use serde::Serialize;
use tracing::debug;

use crate::classifier::GestureClassifier;
use crate::error::Result;
use crate::features::normalize;
use crate::hand_landmarks::HandLandmarkDetector;
use crate::labels::Label;

/// Returned in place of a label when the image has no hand.
pub const NO_HAND_SENTINEL: &str = "No Hand Detected";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Inference {
    Gesture(Label),
    NoHand,
}

impl Inference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Inference::Gesture(label) => label.as_str(),
            Inference::NoHand => NO_HAND_SENTINEL,
        }
    }
}

/// JSON body of a successful `/predict` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredictionResponse {
    pub prediction: String,
}

impl From<Inference> for PredictionResponse {
    fn from(inference: Inference) -> Self {
        Self {
            prediction: inference.as_str().to_string(),
        }
    }
}

/// Stateless single-shot recognizer. Cheap to clone and safe to share
/// between request handlers.
#[derive(Clone)]
pub struct SingleShot {
    detector: Arc<dyn HandLandmarkDetector>,
    classifier: Arc<GestureClassifier>,
}

impl SingleShot {
    pub fn new(
        detector: Arc<dyn HandLandmarkDetector>,
        classifier: Arc<GestureClassifier>,
    ) -> Self {
        Self {
            detector,
            classifier,
        }
    }

    pub fn infer(&self, image: &DynamicImage) -> Result<Inference> {
        let Some(landmarks) = self.detector.detect(image)? else {
            return Ok(Inference::NoHand);
        };
        let features = normalize(&landmarks)?;
        let prediction = self.classifier.classify(&features)?;
        debug!(
            label = %prediction.label,
            confidence = prediction.confidence,
            "single-shot prediction"
        );
        Ok(Inference::Gesture(prediction.label))
    }

    /// Decode an encoded image (PNG, JPEG, ...) and run [`Self::infer`].
    pub fn infer_bytes(&self, bytes: &[u8]) -> Result<Inference> {
        let image = image::load_from_memory(bytes)?;
        self.infer(&image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassifierModel;
    use crate::error::Error;
    use crate::features::FeatureVector;
    use crate::hand_landmarks::LandmarkSet;
    use crate::labels::LABEL_COUNT;
    use std::sync::Mutex;

    struct FixedDetector(Option<LandmarkSet>);

    impl HandLandmarkDetector for FixedDetector {
        fn detect(&self, _image: &DynamicImage) -> Result<Option<LandmarkSet>> {
            Ok(self.0.clone())
        }
    }

    /// Always ranks `peak` first with the given confidence and keeps the
    /// features it was called with.
    struct Peak {
        peak: usize,
        confidence: f32,
        seen: Arc<Mutex<Vec<FeatureVector>>>,
    }

    impl ClassifierModel for Peak {
        fn class_probabilities(&self, features: &FeatureVector) -> Result<Vec<f32>> {
            self.seen.lock().unwrap().push(*features);
            let mut p = vec![(1.0 - self.confidence) / 64.0; LABEL_COUNT];
            p[self.peak] = self.confidence;
            Ok(p)
        }
    }

    fn hand() -> LandmarkSet {
        let coords: Vec<(f32, f32)> = (0..21)
            .map(|i| (0.2 + 0.01 * i as f32, 0.3 + 0.02 * (i % 5) as f32))
            .collect();
        LandmarkSet::from_xy(&coords)
    }

    fn single_shot(
        hand: Option<LandmarkSet>,
        peak: usize,
        confidence: f32,
    ) -> (SingleShot, Arc<Mutex<Vec<FeatureVector>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let model = Peak {
            peak,
            confidence,
            seen: seen.clone(),
        };
        let shot = SingleShot::new(
            Arc::new(FixedDetector(hand)),
            Arc::new(GestureClassifier::new(model)),
        );
        (shot, seen)
    }

    #[test]
    fn no_hand_serializes_to_the_sentinel() {
        let (shot, _) = single_shot(None, 0, 0.9);
        let inference = shot.infer(&DynamicImage::new_rgb8(8, 8)).unwrap();
        assert_eq!(inference, Inference::NoHand);

        let body = serde_json::to_string(&PredictionResponse::from(inference)).unwrap();
        assert_eq!(body, r#"{"prediction":"No Hand Detected"}"#);
    }

    #[test]
    fn low_confidence_is_still_returned() {
        let (shot, _) = single_shot(Some(hand()), Label::YouAreWelcome.index(), 0.1);
        let inference = shot.infer(&DynamicImage::new_rgb8(8, 8)).unwrap();
        assert_eq!(inference, Inference::Gesture(Label::YouAreWelcome));

        let body = serde_json::to_string(&PredictionResponse::from(inference)).unwrap();
        assert_eq!(body, r#"{"prediction":"You are welcome."}"#);
    }

    #[test]
    fn hand_position_does_not_change_the_features() {
        let (shot, seen) = single_shot(Some(hand()), 0, 0.9);
        let (moved, moved_seen) = single_shot(Some(hand().translated(0.25, -0.1)), 0, 0.9);

        shot.infer(&DynamicImage::new_rgb8(8, 8)).unwrap();
        moved.infer(&DynamicImage::new_rgb8(8, 8)).unwrap();

        let a = seen.lock().unwrap()[0].to_vec();
        let b = moved_seen.lock().unwrap()[0].to_vec();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn undecodable_bytes_are_an_image_error() {
        let (shot, _) = single_shot(Some(hand()), 0, 0.9);
        assert!(matches!(
            shot.infer_bytes(b"definitely not a png"),
            Err(Error::Image(_))
        ));
    }

    #[test]
    fn encoded_png_is_decoded() {
        let mut png = Vec::new();
        DynamicImage::new_rgb8(4, 4)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageOutputFormat::Png)
            .unwrap();

        let (shot, _) = single_shot(Some(hand()), Label::Please.index(), 0.7);
        assert_eq!(
            shot.infer_bytes(&png).unwrap(),
            Inference::Gesture(Label::Please)
        );
    }
}
