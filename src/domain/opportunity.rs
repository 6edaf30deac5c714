//! Spread opportunity domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Opportunity is a detected, threshold-qualifying spread between two venues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    /// Deterministic identifier, see [`opportunity_id`].
    pub id: String,
    /// Instrument symbol (e.g., "BTCUSDT").
    pub instrument: String,
    /// Venue quoting the lowest price.
    pub buy_venue: String,
    /// Venue quoting the highest price.
    pub sell_venue: String,
    pub buy_price: f64,
    pub sell_price: f64,
    /// (sell - buy) / buy * 100, full precision.
    pub spread_percent: f64,
    /// (sell - buy) * reference volume.
    pub potential_profit: f64,
    /// Observation time of the quote that triggered the detection.
    pub detected_at: DateTime<Utc>,
}

/// Derives the opportunity id from the venue pair and a time bucket.
///
/// Two detections of the same (instrument, buy, sell) triple inside one
/// bucket share an id, which the ledger uses to drop duplicates.
pub fn opportunity_id(
    instrument: &str,
    buy_venue: &str,
    sell_venue: &str,
    detected_at: DateTime<Utc>,
    bucket: Duration,
) -> String {
    let bucket_ms = (bucket.as_millis() as i64).max(1);
    let slot = detected_at.timestamp_millis().div_euclid(bucket_ms);

    let data = format!("{}|{}|{}|{}", instrument, buy_venue, sell_venue, slot);

    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    let hash = hasher.finalize();

    // First 16 bytes are plenty for a feed identifier
    hex::encode(&hash[..16])
}
