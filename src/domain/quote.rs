//! Venue price quote.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quote is the latest observed price of an instrument on one venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Venue the price was observed on (e.g., "Binance").
    pub venue: String,
    /// Instrument symbol (e.g., "BTCUSDT").
    pub instrument: String,
    /// Last traded or spot price.
    pub price: f64,
    /// When the venue observed this price.
    pub observed_at: DateTime<Utc>,
    /// 24h price change in percent, when the venue reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_24h: Option<f64>,
}

impl Quote {
    pub fn new(
        venue: impl Into<String>,
        instrument: impl Into<String>,
        price: f64,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            venue: venue.into(),
            instrument: instrument.into(),
            price,
            observed_at,
            change_24h: None,
        }
    }

    pub fn with_change_24h(mut self, change: f64) -> Self {
        self.change_24h = Some(change);
        self
    }

    /// Returns true if the price is usable for spread computation.
    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}
