//! Persistence configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// SQLite persistence of opportunities, latest quotes and price history.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Database file; parent directories are created on startup.
    pub path: Option<String>,
    /// Connection pool size (default: 5).
    pub max_connections: Option<u32>,
    /// Persisted quotes older than this are not restored on startup
    /// (default: 5m).
    #[serde(default, with = "duration")]
    pub restore_max_age: Duration,
}
