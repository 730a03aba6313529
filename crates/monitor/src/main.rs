//! Drowsiness Monitor - Main Entry Point
//!
//! Replays a directory of recorded frames through the detection service.

use std::sync::Arc;
use std::time::Duration;

use camera_capture::ImageDirSource;
use dms::{EyeStatePipeline, StaticRegionDetector};
use monitor::{
    build_backend, init_logging, next_frame_blocking, DetectionService, LogCallback, MonitorConfig,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1);
    let config = MonitorConfig::load(config_path.as_deref())?;
    init_logging(config.level()?)?;

    info!("=== Drowsiness Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Model input {}px, open threshold {}, window {}",
        config.dms.image_size, config.dms.open_threshold, config.dms.window_capacity
    );

    let backend = build_backend(&config.dms)?;
    let detector = StaticRegionDetector::new(config.dms.eye_regions.clone());
    let pipeline = EyeStatePipeline::new(&config.dms, detector, backend)?;
    let mut service =
        DetectionService::new(pipeline, Arc::new(LogCallback), config.error_escalation_threshold);

    let mut source = ImageDirSource::open(&config.frames_dir)?;
    info!("Replaying {} frames from {}", source.len(), config.frames_dir);

    service.start()?;

    let mut ticker = tokio::time::interval(Duration::from_millis(config.frame_interval_ms.max(1)));
    let mut submitted = 0u64;
    let mut dropped = 0u64;
    loop {
        ticker.tick().await;
        let (returned, next) = next_frame_blocking(source).await?;
        source = returned;

        match next {
            Ok(Some(frame)) => {
                if service.submit(frame) {
                    submitted += 1;
                } else {
                    dropped += 1;
                }
            }
            Ok(None) => break,
            Err(e) => warn!("Skipping frame: {}", e),
        }
    }

    service.stop().await?;
    info!(
        "Done: {} submitted, {} dropped, {} released, final state {:?}",
        submitted,
        dropped,
        source.released_count(),
        service.state()
    );

    Ok(())
}
