//! Venue (quote source) configuration.

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::duration;

/// How quotes are obtained from a venue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueKind {
    /// Periodic REST fetch of the latest price.
    #[default]
    Rest,
    /// Locally generated prices, for demos and development.
    Simulated,
    /// Streaming ticker subscription over WebSocket.
    Stream,
}

/// Settings for a single venue.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    /// Whether this venue should be used.
    #[serde(default)]
    pub enabled: bool,
    /// Ingestion mode for this venue.
    #[serde(default)]
    pub kind: VenueKind,
    /// Overrides the venue's public API base URL.
    pub base_url: Option<String>,
    /// Instrument to venue symbol overrides (e.g., BTCUSDT: XBTUSDT).
    #[serde(default)]
    pub symbols: HashMap<String, String>,
    /// Maximum API requests per minute.
    pub rate_limit: Option<i32>,
    /// Price offset added by the simulated venue (ignored for live venues).
    pub price_offset: Option<f64>,
    /// WebSocket connection settings (stream venues only).
    pub websocket: Option<WebSocketConfig>,
}

/// WebSocket connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Overrides the stream URL.
    pub url: Option<String>,
    /// Interval between ping messages to keep the connection alive.
    #[serde(default, with = "duration")]
    pub ping_interval: Duration,
    /// Initial delay before reconnecting after a disconnect.
    #[serde(default, with = "duration")]
    pub reconnect_delay: Duration,
    /// Upper bound for the exponential reconnect delay.
    #[serde(default, with = "duration")]
    pub max_reconnect_delay: Duration,
    /// Consecutive failed attempts before the cool-down kicks in.
    pub max_retries: Option<u32>,
    /// Pause after `max_retries` failures before the retry counter resets.
    #[serde(default, with = "duration")]
    pub cooldown: Duration,
    /// Upper bound for the connect and upgrade handshake.
    #[serde(default, with = "duration")]
    pub connect_timeout: Duration,
    /// Silence after which a connected stream is treated as dead.
    /// Zero means three ping intervals.
    #[serde(default, with = "duration")]
    pub idle_timeout: Duration,
}
