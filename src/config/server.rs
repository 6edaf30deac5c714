//! HTTP server configuration.

use serde::Deserialize;

/// HTTP and WebSocket API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Whether the API server should be started.
    #[serde(default)]
    pub enabled: bool,
    /// Socket address to bind (default: "0.0.0.0:8000").
    pub bind: Option<String>,
}
