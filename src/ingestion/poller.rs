//! Periodic polling of pull sources.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{HealthRegistry, IngestError, QuoteSource, Result};
use crate::domain::Quote;

/// Poller drives one source on a fixed interval.
///
/// Each fetch is bounded by a timeout. A failed or timed-out fetch produces
/// no quotes and marks the source degraded; earlier quotes stay in the
/// engine untouched.
pub struct Poller {
    source: Arc<dyn QuoteSource>,
    instruments: Vec<String>,
    interval: Duration,
    timeout: Duration,
    health: Arc<HealthRegistry>,
}

impl Poller {
    pub fn new(
        source: Arc<dyn QuoteSource>,
        instruments: Vec<String>,
        interval: Duration,
        timeout: Duration,
        health: Arc<HealthRegistry>,
    ) -> Self {
        health.register(source.name());
        Self {
            source,
            instruments,
            interval,
            timeout,
            health,
        }
    }

    /// Runs a single fetch with the timeout applied and records the outcome.
    pub async fn poll_once(&self) -> Result<Vec<Quote>> {
        let name = self.source.name();

        let fetch = self.source.fetch(&self.instruments);
        let result = match tokio::time::timeout(self.timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(IngestError::Timeout(self.timeout)),
        };

        match &result {
            Ok(quotes) => {
                debug!(source = %name, quotes = quotes.len(), "Fetched quotes");
                self.health.record_success(name);
            }
            Err(e) => {
                self.health.record_failure(name, &e.to_string());
            }
        }

        result
    }

    /// Polls until shutdown is signalled or the quote channel closes.
    pub async fn run(self, tx: mpsc::Sender<Quote>, mut shutdown: watch::Receiver<bool>) {
        let name = self.source.name().to_string();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            source = %name,
            interval = ?self.interval,
            timeout = ?self.timeout,
            "Starting poller"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    let quotes = match self.poll_once().await {
                        Ok(quotes) => quotes,
                        Err(e) => {
                            debug!(source = %name, error = %e, "Poll produced no quotes");
                            continue;
                        }
                    };

                    for quote in quotes {
                        if tx.send(quote).await.is_err() {
                            warn!(source = %name, "Quote channel closed");
                            return;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(source = %name, "Poller stopped");
    }
}
