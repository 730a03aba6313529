//! Driver Monitoring System (DMS) - eye-state pipeline
//!
//! Turns camera frames into a stable open/closed eye status:
//! - Eye-region proposal on a grayscale, equalized frame
//! - Region clamping and cropping
//! - Per-region open-eye classification
//! - Frame aggregation and temporal smoothing
//! - Thresholded status with display color

pub mod classifier;
pub mod config;
pub mod detector;
pub mod gate;
pub mod observer;
pub mod pipeline;
pub mod region;
pub mod status;

pub use classifier::{ClassificationResult, EyeClassifier};
pub use config::DmsConfig;
pub use detector::{EyeRegionDetector, StaticRegionDetector};
pub use gate::{FrameGate, GateGuard};
pub use observer::{CallbackObserver, PipelineObserver, RecordingObserver};
pub use pipeline::{CycleOutcome, EyeStatePipeline, FrameAnalysis};
pub use region::{extract_regions, EyeCrop, Region};
pub use status::{aggregate, DetectionResult, EyeStatus, StatusColor, StatusDecider};

use camera_capture::CameraError;
use inference_engine::InferenceError;
use thiserror::Error;

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Unsupported output type: {0}")]
    UnsupportedOutputType(String),

    #[error("Eye detector failed: {0}")]
    Detector(String),

    #[error("Frame acquisition failed: {0}")]
    FrameAcquisition(#[from] CameraError),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
