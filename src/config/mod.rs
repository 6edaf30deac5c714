//! Configuration loading and validation for the spread watcher.
//!
//! Uses serde_yaml to load YAML configuration files with support for
//! environment variable overrides of the most frequently tuned settings.

mod app;
mod detector;
mod duration;
mod error;
mod feed;
mod ingestion;
mod server;
mod simulation;
mod storage;
mod venue;

pub use app::AppConfig;
pub use detector::DetectorConfig;
pub use error::ConfigError;
pub use feed::{FeedConfig, LedgerConfig};
pub use ingestion::IngestionConfig;
pub use server::ServerConfig;
pub use simulation::SimulationConfig;
pub use storage::StorageConfig;
pub use venue::{VenueConfig, VenueKind, WebSocketConfig};

use serde::Deserialize;
use std::time::Duration;
use std::{collections::HashMap, env, fs};

/// Environment variable overriding `detector.min_spread_percent`.
const ENV_THRESHOLD: &str = "ARBITRAGE_THRESHOLD";
/// Environment variable overriding `ingestion.poll_interval`, in seconds.
const ENV_FETCH_INTERVAL: &str = "FETCH_INTERVAL";
/// Environment variable enabling storage at the given SQLite path.
const ENV_DATABASE_PATH: &str = "DATABASE_PATH";

/// Root configuration structure.
///
/// Required sections: app, venues, instruments.
/// Optional sections: ingestion, detector, ledger, feed, simulation, storage, server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Application-level settings like name and environment.
    pub app: AppConfig,
    /// Instruments to watch (e.g., "BTCUSDT").
    pub instruments: Vec<String>,
    /// Maps venue names to their configurations.
    pub venues: HashMap<String, VenueConfig>,
    /// Polling cadence and timeouts (optional).
    pub ingestion: Option<IngestionConfig>,
    /// Spread threshold and dedup policy (optional).
    pub detector: Option<DetectorConfig>,
    /// In-memory opportunity ledger (optional).
    pub ledger: Option<LedgerConfig>,
    /// Push feed queues (optional).
    pub feed: Option<FeedConfig>,
    /// Simulated venue price model (optional).
    pub simulation: Option<SimulationConfig>,
    /// Quote and opportunity persistence (optional).
    pub storage: Option<StorageConfig>,
    /// HTTP/WebSocket API (optional).
    pub server: Option<ServerConfig>,
}

impl Config {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Loads `.env` first (if present), then the YAML file, then applies
    /// `ARBITRAGE_THRESHOLD`, `FETCH_INTERVAL` and `DATABASE_PATH` overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore error if not found)
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Apply overrides from environment variables.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = env::var(ENV_THRESHOLD) {
            let threshold: f64 = value.trim().parse().map_err(|_| ConfigError::Env {
                name: ENV_THRESHOLD.to_string(),
                value: value.clone(),
            })?;
            self.detector
                .get_or_insert_with(|| DetectorConfig {
                    min_spread_percent: None,
                    reference_volume: None,
                    dedup_window: Duration::ZERO,
                    spread_delta: None,
                    id_bucket: Duration::ZERO,
                })
                .min_spread_percent = Some(threshold);
        }

        if let Ok(value) = env::var(ENV_FETCH_INTERVAL) {
            let interval = value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|secs| *secs > 0.0)
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .ok_or_else(|| ConfigError::Env {
                    name: ENV_FETCH_INTERVAL.to_string(),
                    value: value.clone(),
                })?;
            self.ingestion
                .get_or_insert_with(|| IngestionConfig {
                    poll_interval: Duration::ZERO,
                    fetch_timeout: Duration::ZERO,
                    queue_size: None,
                })
                .poll_interval = interval;
        }

        if let Ok(path) = env::var(ENV_DATABASE_PATH) {
            if !path.is_empty() {
                let storage = self.storage.get_or_insert_with(|| StorageConfig {
                    enabled: true,
                    path: None,
                    max_connections: None,
                    restore_max_age: Duration::ZERO,
                });
                storage.enabled = true;
                storage.path = Some(path);
            }
        }

        Ok(())
    }

    /// Returns the names of enabled venues, sorted.
    pub fn enabled_venues(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .venues
            .iter()
            .filter(|(_, v)| v.enabled)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Validation("app.name is required".into()));
        }

        if self.instruments.is_empty() {
            return Err(ConfigError::Validation(
                "at least one instrument is required".into(),
            ));
        }

        let is_production = self.app.env == "production";

        let mut enabled_venues = 0;
        for (name, venue) in &self.venues {
            if !venue.enabled {
                continue;
            }
            enabled_venues += 1;

            if is_production && venue.kind == VenueKind::Simulated {
                return Err(ConfigError::Validation(format!(
                    "venue {}: simulated venues are not allowed in production",
                    name
                )));
            }

            if venue.kind == VenueKind::Stream && venue.websocket.is_none() {
                return Err(ConfigError::Validation(format!(
                    "venue {}: websocket settings are required for stream venues",
                    name
                )));
            }
        }

        if enabled_venues == 0 {
            return Err(ConfigError::Validation(
                "at least one venue must be enabled".into(),
            ));
        }

        if let Some(ref detector) = self.detector {
            if let Some(threshold) = detector.min_spread_percent {
                if !threshold.is_finite() || threshold <= 0.0 {
                    return Err(ConfigError::Validation(
                        "detector.min_spread_percent must be positive".into(),
                    ));
                }
            }
            if let Some(volume) = detector.reference_volume {
                if !volume.is_finite() || volume <= 0.0 {
                    return Err(ConfigError::Validation(
                        "detector.reference_volume must be positive".into(),
                    ));
                }
            }
            if let Some(delta) = detector.spread_delta {
                if !delta.is_finite() || delta < 0.0 {
                    return Err(ConfigError::Validation(
                        "detector.spread_delta must not be negative".into(),
                    ));
                }
            }
        }

        if let Some(ref ledger) = self.ledger {
            if ledger.capacity == Some(0) {
                return Err(ConfigError::Validation(
                    "ledger.capacity must be positive".into(),
                ));
            }
        }

        if let Some(ref storage) = self.storage {
            if storage.enabled && storage.path.as_deref().is_some_and(str::is_empty) {
                return Err(ConfigError::Validation(
                    "storage.path must not be empty".into(),
                ));
            }
            if storage.max_connections == Some(0) {
                return Err(ConfigError::Validation(
                    "storage.max_connections must be positive".into(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
