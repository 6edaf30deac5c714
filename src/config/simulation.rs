//! Simulated venue configuration.

use serde::Deserialize;
use std::collections::HashMap;

/// Settings for the simulated price generator.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Base price per instrument (e.g., BTCUSDT: 67500).
    #[serde(default)]
    pub base_prices: HashMap<String, f64>,
    /// Relative price variance around the base (e.g., 0.008 for 0.8%).
    pub variance: Option<f64>,
    /// Absolute noise bound added to every generated price (default: 50).
    pub noise: Option<f64>,
}
