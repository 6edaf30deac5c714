//! Service error types.

use crate::ingestion::IngestError;
use crate::storage::StorageError;

/// Service error type.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service is already running")]
    AlreadyRunning,
    #[error("source error: {0}")]
    Source(#[from] IngestError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
