//! Camera Capture Library for Drowsiness Monitoring
//!
//! Provides the frame model consumed by the eye-state pipeline:
//! - Decoded RGB frames with crop and grayscale helpers
//! - Detector input preparation (grayscale + histogram equalization)
//! - Frame sources that hand out frames with an RAII release hook

pub mod frame;
pub mod source;

pub use frame::VideoFrame;
pub use source::{CapturedFrame, FrameSource, ImageDirSource, ReleaseHook};

use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame decode failed: {0}")]
    Decode(String),
}
