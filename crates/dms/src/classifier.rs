//! Per-region eye-state classification
//!
//! Wraps one inference call: crop in, open-eye probability out. The
//! preprocessing order and constants match how the model was trained and
//! must not change.

use camera_capture::VideoFrame;
use image::imageops::{self, FilterType};
use inference_engine::{InferenceBackend, InputTensor, OutputTensor, TensorData};
use ndarray::Array4;
use smoothing_window::clamp_unit;
use tracing::{debug, info};

use crate::DmsError;

/// Raw pixel values are divided by this first
pub const PIXEL_SCALE: f32 = 255.0;
/// Then re-centered: (v - NORMALIZE_MEAN) / NORMALIZE_STD maps [0, 1] to [-1, 1]
pub const NORMALIZE_MEAN: f32 = 0.5;
pub const NORMALIZE_STD: f32 = 0.5;

/// Classifier opinion about one eye region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationResult {
    /// Probability the eye is open, in [0, 1]
    pub confidence: f32,
}

/// Eye-state classifier over an inference backend
pub struct EyeClassifier<B> {
    backend: B,
    image_size: u32,
}

impl<B: InferenceBackend> EyeClassifier<B> {
    /// Wrap a backend, checking it expects [1, image_size, image_size, 3]
    pub fn new(backend: B, image_size: u32) -> Result<Self, DmsError> {
        let expected = [1, image_size as usize, image_size as usize, 3];
        if backend.input_shape() != expected {
            return Err(DmsError::Initialization(format!(
                "{} backend expects input {:?}, classifier produces {:?}",
                backend.name(),
                backend.input_shape(),
                expected
            )));
        }
        info!("Eye classifier ready ({} backend, {}px)", backend.name(), image_size);
        Ok(Self { backend, image_size })
    }

    /// Resize, scale and re-center one crop into an NHWC tensor
    pub fn preprocess(&self, crop: &VideoFrame) -> Result<InputTensor, DmsError> {
        let rgb = crop
            .as_rgb_image()
            .map_err(|e| DmsError::ImageProcessing(e.to_string()))?;
        let size = self.image_size;
        let resized = imageops::resize(&rgb, size, size, FilterType::Triangle);

        let side = size as usize;
        let array = Array4::from_shape_fn((1, side, side, 3), |(_, y, x, c)| {
            let raw = f32::from(resized.get_pixel(x as u32, y as u32)[c]);
            let scaled = raw / PIXEL_SCALE;
            (scaled - NORMALIZE_MEAN) / NORMALIZE_STD
        });

        Ok(InputTensor::new(array)?)
    }

    /// Read the scalar probability out of a model output
    pub fn decode(output: &OutputTensor) -> Result<f32, DmsError> {
        let value = match &output.data {
            TensorData::F32(values) => values.first().copied(),
            TensorData::U8(values) => values.first().map(|&v| f32::from(v) / 255.0),
            TensorData::Unsupported(name) => {
                return Err(DmsError::UnsupportedOutputType(name.clone()))
            }
        };

        let value = value.ok_or_else(|| {
            DmsError::ImageProcessing(format!("model output {:?} is empty", output.shape))
        })?;
        Ok(clamp_unit(value))
    }

    /// Classify one crop
    pub fn classify(&mut self, crop: &VideoFrame) -> Result<ClassificationResult, DmsError> {
        let input = self.preprocess(crop)?;
        let output = self.backend.run(&input)?;
        let confidence = Self::decode(&output)?;
        debug!(
            "Classified {}x{} crop: {:.3} ({})",
            crop.width,
            crop.height,
            confidence,
            output.element_type()
        );
        Ok(ClassificationResult { confidence })
    }

    /// Borrow the backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }
}
