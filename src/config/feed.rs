//! Ledger and feed configuration.

use serde::Deserialize;

/// Opportunity ledger settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Maximum number of opportunities retained in memory (default: 50).
    pub capacity: Option<usize>,
}

/// Push feed settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Queue size per channel subscriber before it gets disconnected.
    pub subscriber_queue: Option<usize>,
}
