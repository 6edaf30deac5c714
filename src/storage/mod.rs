//! Storage interfaces and implementations for persisting quotes and
//! opportunities.

mod sqlite;

pub use sqlite::{SqliteStorage, SqliteStorageConfig};

use crate::domain::{Opportunity, Quote};
use async_trait::async_trait;

/// OpportunityStorage is the append-only opportunity log, keyed by id.
#[async_trait]
pub trait OpportunityStorage: Send + Sync {
    /// Save persists an opportunity.
    /// Returns true if it was new, false if the id already exists.
    async fn save(&self, opp: &Opportunity) -> Result<bool, StorageError>;

    /// Recent returns up to `limit` opportunities, newest first.
    async fn recent(&self, limit: u32) -> Result<Vec<Opportunity>, StorageError>;

    /// GetByInstrument returns up to `limit` opportunities for one instrument,
    /// newest first.
    async fn get_by_instrument(
        &self,
        instrument: &str,
        limit: u32,
    ) -> Result<Vec<Opportunity>, StorageError>;

    /// Count returns the total number of stored opportunities.
    async fn count(&self) -> Result<i64, StorageError>;

    /// Close closes the storage connection.
    async fn close(&self) -> Result<(), StorageError>;
}

/// QuoteStorage keeps the latest quote per (venue, instrument) plus an
/// append-only price history.
#[async_trait]
pub trait QuoteStorage: Send + Sync {
    /// Stores the quote if its slot is empty or holds an older one.
    /// Returns true if the row changed.
    async fn upsert_quote(&self, quote: &Quote) -> Result<bool, StorageError>;

    /// Latest quote for every key, ordered by instrument then venue.
    async fn latest_quotes(&self) -> Result<Vec<Quote>, StorageError>;

    /// Appends the quote to the price history.
    async fn append_price(&self, quote: &Quote) -> Result<(), StorageError>;

    /// Up to `limit` history entries, newest first, optionally for one
    /// instrument.
    async fn price_history(
        &self,
        instrument: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Quote>, StorageError>;
}

/// Storage is the full persistence surface used by the service and the API.
pub trait Storage: OpportunityStorage + QuoteStorage {}

impl<T: OpportunityStorage + QuoteStorage> Storage for T {}

/// StorageError represents errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
