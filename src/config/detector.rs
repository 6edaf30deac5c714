//! Opportunity detection configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Spread detection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Minimum spread in percent to report (e.g., 0.5 for 0.5%).
    pub min_spread_percent: Option<f64>,
    /// Notional quantity used to compute potential profit (e.g., 0.1 BTC).
    pub reference_volume: Option<f64>,
    /// How long a repeated signal for the same venue pair stays suppressed.
    /// Zero suppresses for as long as the pair remains the extreme pair.
    #[serde(default, with = "duration")]
    pub dedup_window: Duration,
    /// Spread change in percentage points that re-emits a suppressed pair.
    pub spread_delta: Option<f64>,
    /// Width of the time bucket folded into opportunity ids (default: 1s).
    #[serde(default, with = "duration")]
    pub id_bucket: Duration,
}
