//! Server configuration.
//!
//! Defaults are built in; a TOML file may override any subset of fields, and
//! the CLI applies its own flags on top.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{HubError, HubResult};

/// Default allowed CORS origin (the board's dev frontend).
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";

/// Runtime settings for the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
    /// Push-stream cadence in milliseconds.
    pub tick_interval_ms: u64,
    /// Reconnect delay suggested to SSE clients, in milliseconds.
    pub sse_retry_ms: u64,
    /// Largest per-tick move of the random walk, in percent.
    pub max_swing_percent: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            cors_origin: DEFAULT_CORS_ORIGIN.to_string(),
            tick_interval_ms: 1000,
            sse_retry_ms: 3000,
            max_swing_percent: 2.0,
        }
    }
}

impl ServerConfig {
    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml(text: &str) -> HubResult<Self> {
        toml::from_str(text).map_err(|e| HubError::config(e.to_string()))
    }

    /// Load a TOML config file.
    pub fn load(path: &Path) -> HubResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> HubResult<String> {
        toml::to_string_pretty(self).map_err(|e| HubError::config(e.to_string()))
    }

    pub fn validate(&self) -> HubResult<()> {
        if self.host.trim().is_empty() {
            return Err(HubError::config("host must not be empty"));
        }
        if self.tick_interval_ms == 0 {
            return Err(HubError::config("tick_interval_ms must be greater than zero"));
        }
        if !(self.max_swing_percent > 0.0 && self.max_swing_percent.is_finite()) {
            return Err(HubError::config("max_swing_percent must be a positive number"));
        }
        // Credentialed CORS cannot use a wildcard origin.
        if self.cors_origin.trim() == "*" {
            return Err(HubError::config("cors_origin must name a single origin, not '*'"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn sse_retry(&self) -> Duration {
        Duration::from_millis(self.sse_retry_ms)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
