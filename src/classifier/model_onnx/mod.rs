use std::path::Path;
use std::sync::Arc;

use ndarray::{Array, CowArray};
use ort::tensor::OrtOwnedTensor;
use ort::{Session, Value};

use crate::classifier::ClassifierModel;
use crate::config::ModelsConfig;
use crate::error::{Error, Result};
use crate::features::{FeatureVector, FEATURE_LEN};
use crate::utils::onnx_session;

/// scikit-learn gesture classifier exported to ONNX.
///
/// Expects a `[1, 42]` float input. The converter emits the predicted label
/// first and the class probabilities second; export with the zipmap disabled
/// so the probabilities come back as a plain `[1, 33]` float tensor.
pub struct OnnxGestureModel {
    session: Arc<Session>,
    probability_output: usize,
}

impl OnnxGestureModel {
    pub fn load(config: &ModelsConfig) -> Result<Self> {
        Self::load_from(&config.classifier, config.probability_output, config.intra_threads)
    }

    pub fn load_from(path: &Path, probability_output: usize, intra_threads: i16) -> Result<Self> {
        let session = onnx_session("gesture classifier", path, intra_threads)?;

        check_probability_output(session.outputs.len(), probability_output)?;

        Ok(Self {
            session: Arc::new(session),
            probability_output,
        })
    }
}

/// The probability tensor must be one of the model's outputs.
fn check_probability_output(outputs: usize, probability_output: usize) -> Result<()> {
    if probability_output >= outputs {
        return Err(Error::unavailable(
            "gesture classifier",
            format!("model has {outputs} outputs, no probability output {probability_output}"),
        ));
    }
    Ok(())
}

impl ClassifierModel for OnnxGestureModel {
    fn class_probabilities(&self, features: &FeatureVector) -> Result<Vec<f32>> {
        let array: CowArray<_, _> = Array::from_shape_vec((1, FEATURE_LEN), features.to_vec())
            .map_err(|e| Error::Classification(e.to_string()))?
            .into_dyn()
            .into();

        let inputs = vec![Value::from_array(self.session.allocator(), &array)
            .map_err(|e| Error::Classification(e.to_string()))?];
        let outputs: Vec<Value> = self
            .session
            .run(inputs)
            .map_err(|e| Error::Classification(e.to_string()))?;

        let output = outputs.get(self.probability_output).ok_or_else(|| {
            Error::Classification(format!("missing output {}", self.probability_output))
        })?;

        let probabilities: OrtOwnedTensor<f32, _> = output
            .try_extract()
            .map_err(|e| Error::Classification(e.to_string()))?;
        let probabilities: Vec<f32> = probabilities.view().iter().copied().collect();

        Ok(probabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_model_file_is_unavailable() {
        let result = OnnxGestureModel::load_from(Path::new("/nonexistent/gesture.onnx"), 1, 1);
        assert!(matches!(
            result,
            Err(Error::CapabilityUnavailable {
                capability: "gesture classifier",
                ..
            })
        ));
    }

    #[test]
    fn non_onnx_file_is_unavailable() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"label,probability\nA,0.9\n").unwrap();

        let result = OnnxGestureModel::load_from(file.path(), 1, 1);
        assert!(matches!(result, Err(Error::CapabilityUnavailable { .. })));
    }

    #[test]
    fn probability_output_must_exist() {
        assert!(check_probability_output(2, 1).is_ok());
        assert!(check_probability_output(2, 0).is_ok());
        assert!(matches!(
            check_probability_output(2, 2),
            Err(Error::CapabilityUnavailable { .. })
        ));
        assert!(matches!(
            check_probability_output(1, 5),
            Err(Error::CapabilityUnavailable { .. })
        ));
    }
}
