//! Drowsiness Monitor Host
//!
//! Hosts the eye-state pipeline behind a start/stop detection service,
//! the way a background camera service would.

pub mod config;
pub mod service;

pub use config::MonitorConfig;
pub use service::{DetectionCallback, DetectionService, LogCallback, MonitorState};

use camera_capture::{CameraError, CapturedFrame, FrameSource};
use dms::{DmsConfig, DmsError};
use inference_engine::{InferenceBackend, MockBackend, TractBackend};
use thiserror::Error;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Host error types
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Dms(#[from] DmsError),

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Detection worker failed: {0}")]
    Worker(String),

    #[error("Detection is not running")]
    NotRunning,

    #[error("Detection is already running")]
    AlreadyRunning,
}

/// Initialize logging
pub fn init_logging(level: Level) -> Result<(), MonitorError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| MonitorError::Logging(e.to_string()))
}

/// Load the configured eye-state model, or a mock when none is configured
pub fn build_backend(config: &DmsConfig) -> Result<Box<dyn InferenceBackend>, MonitorError> {
    let size = config.image_size as usize;
    match &config.model_path {
        Some(path) => {
            let backend = TractBackend::load(path, size)
                .map_err(|e| DmsError::Initialization(e.to_string()))?;
            Ok(Box::new(backend))
        }
        None => {
            warn!("No eye model path configured. Using mock implementation.");
            Ok(Box::new(MockBackend::constant(1.0, size)))
        }
    }
}

/// Pull the next frame on the blocking pool, handing the source back
///
/// Sources read files and decode images, which must not stall the runtime.
pub async fn next_frame_blocking<S>(
    mut source: S,
) -> Result<(S, Result<Option<CapturedFrame>, CameraError>), MonitorError>
where
    S: FrameSource + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let next = source.next_frame();
        (source, next)
    })
    .await
    .map_err(|e| MonitorError::Worker(e.to_string()))
}
