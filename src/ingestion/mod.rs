//! Quote ingestion: pull sources, streaming sources and their supervision.
//!
//! Every venue is reached through [`QuoteSource`], whether prices come from a
//! public REST endpoint or the local simulator. Streaming venues are driven
//! by [`TickerStream`] instead and push quotes into the same channel.

mod connection;
mod health;
mod manager;
mod poller;
mod rest;
mod simulated;
mod stream;
mod symbols;

pub use connection::{BackoffPolicy, ConnectionMachine, ConnectionState};
pub use health::{HealthRegistry, SourceHealth, SourceStatus};
pub use manager::SourceManager;
pub use poller::Poller;
pub use rest::{BinanceSource, CoinbaseSource, KrakenSource};
pub use simulated::SimulatedSource;
pub use stream::TickerStream;
pub use symbols::{display_name, venue_symbol};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Quote;

/// Ingestion errors.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The fetch did not complete within the configured timeout.
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level HTTP failure.
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The venue answered with something we could not read.
    #[error("parse error: {0}")]
    Parse(String),

    /// The venue answered with an error status or error payload.
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },

    /// WebSocket or other connection failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// Local rate limit reached; the request was not sent.
    #[error("rate limit exceeded: {current}/{limit} per minute")]
    RateLimited { current: i64, limit: i64 },

    /// The venue cannot be built from its configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self {
        IngestError::Parse(e.to_string())
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// QuoteSource is a venue that can be asked for its latest prices.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Venue name stamped on every quote (e.g., "Binance").
    fn name(&self) -> &str;

    /// Fetches the latest quote for each instrument the venue lists.
    ///
    /// Instruments the venue does not quote are skipped. Returns an error
    /// only when nothing could be fetched.
    async fn fetch(&self, instruments: &[String]) -> Result<Vec<Quote>>;
}
