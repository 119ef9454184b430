//! Gesture classification
//!
//! [`ClassifierModel`] is the trained model as an opaque capability;
//! [`GestureClassifier`] turns its output into a [`Prediction`].

pub mod model_onnx;

use crate::error::{Error, Result};
use crate::features::FeatureVector;
use crate::labels::{Label, LABEL_COUNT};
use crate::utils::argmax;

/// A trained gesture classifier.
///
/// One call yields the full class distribution, so the label and its
/// confidence always come from the same evaluation.
pub trait ClassifierModel: Send + Sync {
    /// Probability per label, indexed like [`crate::labels::LABELS`].
    fn class_probabilities(&self, features: &FeatureVector) -> Result<Vec<f32>>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: Label,
    /// Top-1 class probability.
    pub confidence: f32,
}

impl Prediction {
    pub fn new(label: Label, confidence: f32) -> Self {
        Self { label, confidence }
    }
}

/// Read-only classifier handle, shared between the stream and the endpoint.
pub struct GestureClassifier {
    model: Box<dyn ClassifierModel>,
}

impl GestureClassifier {
    pub fn new(model: impl ClassifierModel + 'static) -> Self {
        Self {
            model: Box::new(model),
        }
    }

    pub fn classify(&self, features: &FeatureVector) -> Result<Prediction> {
        let probabilities = self.model.class_probabilities(features)?;

        if probabilities.len() != LABEL_COUNT {
            return Err(Error::Classification(format!(
                "model returned {} class probabilities, expected {}",
                probabilities.len(),
                LABEL_COUNT
            )));
        }

        let (index, confidence) = argmax(&probabilities).ok_or_else(|| {
            Error::Classification("class probabilities contain NaN".to_string())
        })?;

        let label = Label::from_index(index)
            .ok_or_else(|| Error::Classification(format!("no label for class {index}")))?;

        Ok(Prediction { label, confidence })
    }
}
