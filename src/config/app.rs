//! Application-level configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Application-level settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Application name used in logs.
    pub name: String,
    /// Environment: "development", "staging", or "production".
    pub env: String,
    /// Logging verbosity: "debug", "info", "warn", "error".
    pub log_level: Option<String>,
    /// Interval between overview log lines with engine stats (default: 1m).
    #[serde(default, with = "duration")]
    pub overview_interval: Duration,
}
