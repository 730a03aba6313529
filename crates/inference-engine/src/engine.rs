//! Inference Backend Implementations

use std::collections::VecDeque;
use std::path::Path;

use tracing::{debug, info};
use tract_onnx::prelude::*;

use crate::tensor::{InputTensor, OutputTensor, TensorData};
use crate::InferenceError;

/// Anything that can classify one preprocessed eye crop
pub trait InferenceBackend: Send {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Expected input shape as [N, H, W, C]
    fn input_shape(&self) -> [usize; 4];

    /// Run the model on one input, returning its first output tensor
    fn run(&mut self, input: &InputTensor) -> Result<OutputTensor, InferenceError>;
}

impl<T: InferenceBackend + ?Sized> InferenceBackend for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn input_shape(&self) -> [usize; 4] {
        (**self).input_shape()
    }

    fn run(&mut self, input: &InputTensor) -> Result<OutputTensor, InferenceError> {
        (**self).run(input)
    }
}

fn check_shape(expected: [usize; 4], input: &InputTensor) -> Result<(), InferenceError> {
    if input.shape() != expected {
        return Err(InferenceError::InvalidInputShape {
            expected: format!("{:?}", expected),
            actual: format!("{:?}", input.shape()),
        });
    }
    Ok(())
}

/// ONNX eye-state classifier running on tract
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    model_path: String,
    image_size: usize,
}

impl TractBackend {
    /// Load and optimize an ONNX model taking a [1, size, size, 3] f32 input
    pub fn load(model_path: impl AsRef<Path>, image_size: usize) -> Result<Self, InferenceError> {
        let path = model_path.as_ref();
        info!("Loading eye-state model from {}", path.display());

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| InferenceError::ModelLoad(format!("{}: {}", path.display(), e)))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, image_size, image_size, 3),
                ),
            )
            .map_err(|e| InferenceError::ModelLoad(e.to_string()))?
            .into_optimized()
            .map_err(|e| InferenceError::ModelLoad(e.to_string()))?
            .into_runnable()
            .map_err(|e| InferenceError::ModelLoad(e.to_string()))?;

        info!("Model loaded successfully");

        Ok(Self {
            model,
            model_path: path.display().to_string(),
            image_size,
        })
    }

    /// Get model path
    pub fn model_path(&self) -> &str {
        &self.model_path
    }

    fn decode_output(output: &Tensor) -> Result<OutputTensor, InferenceError> {
        let shape = output.shape().to_vec();
        let data = match output.datum_type() {
            DatumType::F32 => TensorData::F32(
                output
                    .as_slice::<f32>()
                    .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?
                    .to_vec(),
            ),
            DatumType::U8 => TensorData::U8(
                output
                    .as_slice::<u8>()
                    .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?
                    .to_vec(),
            ),
            other => TensorData::Unsupported(format!("{:?}", other)),
        };
        Ok(OutputTensor { shape, data })
    }
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_shape(&self) -> [usize; 4] {
        [1, self.image_size, self.image_size, 3]
    }

    fn run(&mut self, input: &InputTensor) -> Result<OutputTensor, InferenceError> {
        check_shape(self.input_shape(), input)?;

        let start = std::time::Instant::now();
        let values = input.to_vec();
        let tensor = Tensor::from_shape::<f32>(&input.shape(), values.as_slice())
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let first = outputs
            .first()
            .ok_or_else(|| InferenceError::InferenceFailed("model produced no outputs".into()))?;
        let decoded = Self::decode_output(first)?;

        debug!("Inference completed in {}us", start.elapsed().as_micros());
        Ok(decoded)
    }
}

/// Scripted backend for development and tests
///
/// Returns queued outputs in order, then repeats the fallback output.
pub struct MockBackend {
    image_size: usize,
    script: VecDeque<Result<OutputTensor, InferenceError>>,
    fallback: OutputTensor,
    calls: usize,
}

impl MockBackend {
    /// Backend that always answers with the given open-eye probability
    pub fn constant(probability: f32, image_size: usize) -> Self {
        info!("Creating mock inference backend (p={:.2})", probability);
        Self {
            image_size,
            script: VecDeque::new(),
            fallback: OutputTensor::scalar_f32(probability),
            calls: 0,
        }
    }

    /// Queue an output to be returned by the next unanswered call
    pub fn then(mut self, output: OutputTensor) -> Self {
        self.script.push_back(Ok(output));
        self
    }

    /// Queue a failure to be returned by the next unanswered call
    pub fn then_fail(mut self, error: InferenceError) -> Self {
        self.script.push_back(Err(error));
        self
    }

    /// Number of times `run` was invoked
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl InferenceBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn input_shape(&self) -> [usize; 4] {
        [1, self.image_size, self.image_size, 3]
    }

    fn run(&mut self, input: &InputTensor) -> Result<OutputTensor, InferenceError> {
        check_shape(self.input_shape(), input)?;
        self.calls += 1;
        self.script
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn input(size: usize) -> InputTensor {
        InputTensor::new(Array4::<f32>::zeros((1, size, size, 3))).unwrap()
    }

    #[test]
    fn test_mock_script_then_fallback() {
        let mut backend = MockBackend::constant(0.7, 4)
            .then(OutputTensor::scalar_u8(255))
            .then_fail(InferenceError::InferenceFailed("boom".into()));

        assert_eq!(backend.run(&input(4)).unwrap(), OutputTensor::scalar_u8(255));
        assert!(backend.run(&input(4)).is_err());
        assert_eq!(backend.run(&input(4)).unwrap(), OutputTensor::scalar_f32(0.7));
        assert_eq!(backend.calls(), 3);
    }

    #[test]
    fn test_mock_rejects_wrong_shape() {
        let mut backend = MockBackend::constant(0.5, 4);
        let err = backend.run(&input(5)).unwrap_err();
        assert!(matches!(err, InferenceError::InvalidInputShape { .. }));
        assert_eq!(backend.calls(), 0);
    }

    #[test]
    fn test_boxed_backend_delegates() {
        let mut backend: Box<dyn InferenceBackend> = Box::new(MockBackend::constant(0.3, 4));
        assert_eq!(backend.name(), "mock");
        assert_eq!(backend.input_shape(), [1, 4, 4, 3]);
        assert_eq!(backend.run(&input(4)).unwrap(), OutputTensor::scalar_f32(0.3));
    }

    #[test]
    fn test_tract_missing_model() {
        let result = TractBackend::load("/nonexistent/eye_state.onnx", 150);
        assert!(matches!(result, Err(InferenceError::ModelLoad(_))));
    }

    #[test]
    fn test_decode_output_types() {
        let f = Tensor::from_shape::<f32>(&[1, 1], &[0.25]).unwrap();
        assert_eq!(
            TractBackend::decode_output(&f).unwrap().data,
            TensorData::F32(vec![0.25])
        );

        let q = Tensor::from_shape::<u8>(&[1, 1], &[200]).unwrap();
        assert_eq!(
            TractBackend::decode_output(&q).unwrap().data,
            TensorData::U8(vec![200])
        );

        let i = Tensor::from_shape::<i64>(&[1], &[3]).unwrap();
        assert!(matches!(
            TractBackend::decode_output(&i).unwrap().data,
            TensorData::Unsupported(_)
        ));
    }
}
