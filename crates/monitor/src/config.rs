//! Layered host configuration

use dms::DmsConfig;
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::MonitorError;

/// Environment variable prefix, e.g. `DROWSY_LOG_LEVEL`, `DROWSY_DMS__OPEN_THRESHOLD`
pub const ENV_PREFIX: &str = "DROWSY";

/// Host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Eye-state pipeline settings
    pub dms: DmsConfig,

    /// Directory of recorded frames to replay
    pub frames_dir: String,

    /// Max log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Consecutive failed cycles before the service reports an error state
    pub error_escalation_threshold: u32,

    /// Delay between submitted frames (milliseconds)
    pub frame_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            dms: DmsConfig::default(),
            frames_dir: "frames".to_string(),
            log_level: "info".to_string(),
            error_escalation_threshold: 3,
            frame_interval_ms: 66, // ~15fps
        }
    }
}

impl MonitorConfig {
    /// Defaults, then the optional TOML file, then `DROWSY_*` variables
    pub fn load(path: Option<&str>) -> Result<Self, MonitorError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: MonitorConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<(), MonitorError> {
        self.dms.validate()?;
        if self.error_escalation_threshold == 0 {
            return Err(MonitorError::InvalidConfig(
                "error_escalation_threshold must be at least 1".into(),
            ));
        }
        self.level()?;
        Ok(())
    }

    /// Parsed log level
    pub fn level(&self) -> Result<Level, MonitorError> {
        self.log_level
            .parse::<Level>()
            .map_err(|_| MonitorError::InvalidConfig(format!("unknown log level {:?}", self.log_level)))
    }
}
