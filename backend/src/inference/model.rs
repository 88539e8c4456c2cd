use ndarray::Array4;
use std::sync::Arc;

use super::preprocess::ScanImage;
use super::probabilities::ClassProbabilities;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[cfg_attr(not(feature = "torch"), allow(dead_code))]
    #[error("Model forward pass failed: {0}")]
    Forward(String),
    #[error("Unexpected model output: expected {expected} values, got {actual}")]
    OutputShape { expected: usize, actual: usize },
    #[error("Model output contains non-finite values")]
    NonFinite,
    #[cfg_attr(not(feature = "torch"), allow(dead_code))]
    #[error("Model lock poisoned")]
    Poisoned,
}

/// A loaded network taking a `[1, H, W, 3]` input in [0, 1] and returning its
/// head's four class outputs untouched.
pub trait InferenceModel: Send + Sync {
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError>;
}

#[derive(Clone)]
pub struct ModelBackedClassifier {
    model: Arc<dyn InferenceModel>,
    apply_softmax: bool,
}

impl ModelBackedClassifier {
    pub fn new(model: Arc<dyn InferenceModel>) -> Self {
        Self {
            model,
            apply_softmax: false,
        }
    }

    /// Treat the model output as logits instead of probabilities.
    pub fn with_softmax(mut self, apply_softmax: bool) -> Self {
        self.apply_softmax = apply_softmax;
        self
    }

    pub fn classify(&self, image: &ScanImage) -> Result<ClassProbabilities, InferenceError> {
        let input = image.to_tensor();
        let output = self.model.forward(&input)?;
        if self.apply_softmax {
            ClassProbabilities::from_logits(&output)
        } else {
            ClassProbabilities::from_model_output(&output)
        }
    }
}

#[cfg(feature = "torch")]
pub use torch::TorchModel;

#[cfg(feature = "torch")]
mod torch {
    use ndarray::Array4;
    use std::io::Cursor;
    use std::sync::Mutex;
    use tch::{CModule, Device, Kind, Tensor};

    use super::{InferenceError, InferenceModel};

    /// TorchScript module. Its output is passed through as-is.
    pub struct TorchModel {
        module: Mutex<CModule>,
        device: Device,
    }

    impl TorchModel {
        pub fn from_bytes(bytes: &[u8]) -> Result<Self, tch::TchError> {
            let device = Device::cuda_if_available();
            let module = CModule::load_data_on_device(&mut Cursor::new(bytes), device)?;
            log::info!("TorchScript module loaded on {:?}", device);
            Ok(Self {
                module: Mutex::new(module),
                device,
            })
        }
    }

    impl InferenceModel for TorchModel {
        fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
            let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
            let data = input.as_standard_layout();
            let values = data
                .as_slice()
                .ok_or_else(|| InferenceError::Forward("input is not contiguous".to_string()))?;

            let tensor = Tensor::from_slice(values)
                .view(shape.as_slice())
                .permute([0, 3, 1, 2])
                .to_device(self.device);

            let module = self.module.lock().map_err(|_| InferenceError::Poisoned)?;
            let output = tch::no_grad(|| module.forward_ts(&[tensor]))
                .map_err(|e| InferenceError::Forward(e.to_string()))?;

            let output_flat = output.to_kind(Kind::Float).to_device(Device::Cpu).view([-1]);
            let num_elements = output_flat.size()[0] as usize;
            let mut output_vec = vec![0.0f32; num_elements];
            output_flat.copy_data(&mut output_vec, num_elements);
            Ok(output_vec)
        }
    }
}
