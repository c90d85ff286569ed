//! Layered server configuration
//!
//! Built-in defaults, then an optional TOML file (`drowsiness.toml`, or the
//! path in `DROWSINESS_CONFIG`), then `DROWSINESS__SECTION__KEY` environment
//! variables.

use crate::rate_limit::RateLimitConfig;
use config::{Config, ConfigError, Environment, File};
use dms::DmsConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Default config file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "drowsiness.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub geometry: GeometrySettings,
    pub identity: IdentitySettings,
    pub stream: StreamSettings,
    pub storage: StorageSettings,
    pub auth: AuthSettings,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    /// Requests larger than this are rejected with 413
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            max_body_bytes: 6 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeometrySettings {
    pub ear_threshold: f64,
    pub mar_threshold: f64,
    pub tilt_threshold_deg: f64,
}

impl Default for GeometrySettings {
    fn default() -> Self {
        Self {
            ear_threshold: dms::EAR_THRESHOLD,
            mar_threshold: dms::MAR_THRESHOLD,
            tilt_threshold_deg: dms::TILT_THRESHOLD_DEGREES,
        }
    }
}

impl GeometrySettings {
    pub fn dms_config(&self) -> DmsConfig {
        DmsConfig {
            ear_threshold: self.ear_threshold,
            mar_threshold: self.mar_threshold,
            tilt_threshold_degrees: self.tilt_threshold_deg,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    /// Embedding model name; its threshold comes with it
    pub model: String,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            model: "compact-128".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub buffer_capacity: usize,
    pub poll_interval_ms: u64,
    /// Window for `/api/streams`
    pub push_staleness_secs: u64,
    /// Window for `/api/devices`
    pub device_staleness_secs: u64,
    pub placeholder_path: Option<PathBuf>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: ring_buffer::DEFAULT_CAPACITY,
            poll_interval_ms: live_stream::DEFAULT_POLL_INTERVAL.as_millis() as u64,
            push_staleness_secs: live_stream::PUSH_STALENESS.as_secs(),
            device_staleness_secs: live_stream::DEVICE_STALENESS.as_secs(),
            placeholder_path: None,
        }
    }
}

impl StreamSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn push_staleness(&self) -> Duration {
        Duration::from_secs(self.push_staleness_secs)
    }

    pub fn device_staleness(&self) -> Duration {
        Duration::from_secs(self.device_staleness_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite URL; in-memory repository when unset
    pub database_url: Option<String>,
    /// Archive decoded detect frames here when set
    pub upload_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Bearer token -> user id
    pub sessions: HashMap<String, Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub json: bool,
}

impl Settings {
    /// Load from `DROWSINESS_CONFIG` (or `drowsiness.toml`) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("DROWSINESS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Load from a specific file (which may be absent) and the environment
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(PathBuf::from(path)).required(false))
            .add_source(
                Environment::with_prefix("DROWSINESS")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}
