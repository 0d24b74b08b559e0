//! Service settings
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! `driver-risk.toml` (or an explicit file), then `DRIVER_RISK__*` environment
//! variables, e.g. `DRIVER_RISK__SERVER__PORT=9000` or
//! `DRIVER_RISK__ENGINE__SINK__BACKEND_BASE_URL=http://backend:5000`.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use trip_analysis::EngineConfig;

/// Default settings file name, without extension
pub const DEFAULT_SETTINGS_FILE: &str = "driver-risk";

/// HTTP server and logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// `tracing` filter directive, overridden by `RUST_LOG`
    pub log_level: String,
    /// One JSON object per log line
    pub json_logs: bool,
    /// Allowed CORS origin, `*` for any
    pub cors_origin: String,
    /// Serve Prometheus metrics at `/metrics`
    pub metrics_enabled: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            json_logs: false,
            cors_origin: "*".to_string(),
            metrics_enabled: true,
        }
    }
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub engine: EngineConfig,
}

impl Settings {
    /// Load settings; an explicit `path` must exist, the default file may not
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name(DEFAULT_SETTINGS_FILE).required(false),
        };

        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("DRIVER_RISK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
