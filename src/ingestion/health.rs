//! Per-source health tracking.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use super::ConnectionState;

/// Coarse health of a quote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Registered, nothing fetched yet.
    Unknown,
    Healthy,
    /// Last fetch failed; previously fetched quotes stay in use.
    Degraded,
}

/// Health record of one source.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHealth {
    pub status: SourceStatus,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    /// Streaming sources only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionState>,
}

impl Default for SourceHealth {
    fn default() -> Self {
        Self {
            status: SourceStatus::Unknown,
            last_success: None,
            last_error: None,
            consecutive_failures: 0,
            connection: None,
        }
    }
}

/// HealthRegistry records fetch outcomes for every source.
#[derive(Debug, Default)]
pub struct HealthRegistry {
    sources: RwLock<HashMap<String, SourceHealth>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, source: &str) {
        self.sources
            .write()
            .entry(source.to_string())
            .or_default();
    }

    pub fn record_success(&self, source: &str) {
        let mut sources = self.sources.write();
        let health = sources.entry(source.to_string()).or_default();
        if health.status == SourceStatus::Degraded {
            info!(
                source = %source,
                failures = health.consecutive_failures,
                "Source recovered"
            );
        }
        health.status = SourceStatus::Healthy;
        health.last_success = Some(Utc::now());
        health.consecutive_failures = 0;
    }

    pub fn record_failure(&self, source: &str, error: &str) {
        let mut sources = self.sources.write();
        let health = sources.entry(source.to_string()).or_default();
        health.consecutive_failures += 1;
        health.last_error = Some(error.to_string());
        if health.status != SourceStatus::Degraded {
            warn!(source = %source, error = %error, "Source degraded");
        }
        health.status = SourceStatus::Degraded;
    }

    pub fn set_connection(&self, source: &str, state: ConnectionState) {
        self.sources
            .write()
            .entry(source.to_string())
            .or_default()
            .connection = Some(state);
    }

    pub fn get(&self, source: &str) -> Option<SourceHealth> {
        self.sources.read().get(source).cloned()
    }

    /// All sources, sorted by name.
    pub fn snapshot(&self) -> BTreeMap<String, SourceHealth> {
        self.sources
            .read()
            .iter()
            .map(|(name, health)| (name.clone(), health.clone()))
            .collect()
    }

    /// Degraded if any source is degraded, healthy if all are, else unknown.
    pub fn overall(&self) -> SourceStatus {
        let sources = self.sources.read();
        if sources.values().any(|h| h.status == SourceStatus::Degraded) {
            SourceStatus::Degraded
        } else if !sources.is_empty()
            && sources.values().all(|h| h.status == SourceStatus::Healthy)
        {
            SourceStatus::Healthy
        } else {
            SourceStatus::Unknown
        }
    }
}
