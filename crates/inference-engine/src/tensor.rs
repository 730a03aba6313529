//! Input and output tensor types

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::InferenceError;

/// Declared element type of a model output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementType {
    F32,
    U8,
    /// Any other type, by the backend's name for it
    Other(String),
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementType::F32 => f.write_str("f32"),
            ElementType::U8 => f.write_str("u8"),
            ElementType::Other(name) => f.write_str(name),
        }
    }
}

/// Output values, decoded according to their declared type
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    U8(Vec<u8>),
    /// Values of a type the engine does not decode
    Unsupported(String),
}

/// Single model output with its shape and declared type
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    pub shape: Vec<usize>,
    pub data: TensorData,
}

impl OutputTensor {
    /// Scalar f32 output of shape [1, 1]
    pub fn scalar_f32(value: f32) -> Self {
        Self {
            shape: vec![1, 1],
            data: TensorData::F32(vec![value]),
        }
    }

    /// Scalar quantized output of shape [1, 1]
    pub fn scalar_u8(value: u8) -> Self {
        Self {
            shape: vec![1, 1],
            data: TensorData::U8(vec![value]),
        }
    }

    /// Declared element type
    pub fn element_type(&self) -> ElementType {
        match &self.data {
            TensorData::F32(_) => ElementType::F32,
            TensorData::U8(_) => ElementType::U8,
            TensorData::Unsupported(name) => ElementType::Other(name.clone()),
        }
    }
}

/// NHWC f32 input tensor, batch of one
#[derive(Debug, Clone)]
pub struct InputTensor {
    array: Array4<f32>,
}

impl InputTensor {
    /// Wrap an NHWC array
    pub fn new(array: Array4<f32>) -> Result<Self, InferenceError> {
        let shape = array.shape();
        if shape[0] != 1 || shape[3] != 3 {
            return Err(InferenceError::InvalidInputShape {
                expected: "[1, H, W, 3]".into(),
                actual: format!("{:?}", shape),
            });
        }
        Ok(Self { array })
    }

    /// Tensor shape as [N, H, W, C]
    pub fn shape(&self) -> [usize; 4] {
        let s = self.array.shape();
        [s[0], s[1], s[2], s[3]]
    }

    /// Contiguous row-major values
    pub fn to_vec(&self) -> Vec<f32> {
        self.array.iter().copied().collect()
    }
}
