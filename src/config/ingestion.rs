//! Quote ingestion configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Polling and queueing settings for quote ingestion.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    /// Interval between REST fetches per venue (default: 1s).
    #[serde(default, with = "duration")]
    pub poll_interval: Duration,
    /// Timeout for a single venue fetch (default: 5s).
    #[serde(default, with = "duration")]
    pub fetch_timeout: Duration,
    /// Capacity of the channel between sources and the engine.
    pub queue_size: Option<usize>,
}
