//! DMS configuration

use serde::{Deserialize, Serialize};

use crate::region::Region;
use crate::DmsError;

/// Eye-state pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Classifier input edge length (pixels); crops are resized to a square
    pub image_size: u32,

    /// Smoothed probability above which the eyes count as open
    pub open_threshold: f32,

    /// Number of frame-level probabilities averaged by the smoother
    pub window_capacity: usize,

    /// ONNX eye-state model path
    pub model_path: Option<String>,

    /// Fixed eye rectangles for the static detector
    pub eye_regions: Vec<Region>,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            image_size: 150,
            open_threshold: 0.4,
            window_capacity: 5,
            model_path: None,
            eye_regions: Vec::new(),
        }
    }
}

impl DmsConfig {
    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), DmsError> {
        if self.image_size == 0 {
            return Err(DmsError::Config("image_size must be at least 1".into()));
        }
        if self.window_capacity == 0 {
            return Err(DmsError::Config("window_capacity must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.open_threshold) {
            return Err(DmsError::Config(format!(
                "open_threshold {} is outside [0, 1]",
                self.open_threshold
            )));
        }
        Ok(())
    }
}
