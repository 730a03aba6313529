//! Eye-State Inference Engine
//!
//! The seam between the eye-state pipeline and the neural classifier.
//! Backends take a fixed-shape NHWC f32 tensor and return a single output
//! tensor tagged with its declared element type.

mod engine;
mod tensor;

pub use engine::{InferenceBackend, MockBackend, TractBackend};
pub use tensor::{ElementType, InputTensor, OutputTensor, TensorData};

use thiserror::Error;

/// Errors during inference
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoad(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
}
