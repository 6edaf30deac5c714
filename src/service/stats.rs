//! Runtime statistics for the service.

/// Counters kept by the service around the engine.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub restored_quotes: usize,
    pub restored_opportunities: usize,
    pub opportunities_persisted: u64,
    pub quotes_persisted: u64,
    /// Price history rows written.
    pub prices_recorded: u64,
    pub persist_errors: u64,
    /// Persistence writes skipped because the queue was full.
    pub persist_dropped: u64,
}
