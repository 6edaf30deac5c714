//! Spread watch service.
//!
//! Wires sources, engine, persistence and the API together and runs the
//! ingest loop until stopped.

mod config;
mod error;
mod stats;

pub use config::ServiceConfig;
pub use error::ServiceError;
pub use stats::Stats;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::{self, AppState};
use crate::config::{Config, VenueKind};
use crate::domain::{Opportunity, Quote};
use crate::engine::{Engine, IngestOutcome};
use crate::feed::{Handler, SubscriberError, SubscriptionId};
use crate::ingestion::{HealthRegistry, Poller, SourceManager, TickerStream};
use crate::storage::{
    OpportunityStorage, QuoteStorage, SqliteStorage, SqliteStorageConfig, Storage,
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_QUEUE_SIZE: usize = 1024;
const DEFAULT_OVERVIEW_INTERVAL: Duration = Duration::from_secs(60);
/// Queue between the engine and the storage writer.
const PERSIST_QUEUE_SIZE: usize = 1024;
/// Persisted quotes older than this are not restored.
const DEFAULT_RESTORE_MAX_AGE: Duration = Duration::from_secs(300);

/// Service runs ingestion, detection, persistence and the API.
pub struct Service {
    cfg: Config,
    engine: Arc<Engine>,
    sources: SourceManager,
    health: Arc<HealthRegistry>,
    storage: Option<Arc<SqliteStorage>>,

    version: String,
    started_at: Mutex<Option<Instant>>,
    running: Mutex<bool>,
    stats: Arc<parking_lot::Mutex<Stats>>,
    shutdown: watch::Sender<bool>,
}

/// Background tasks feeding the persistence writer.
struct Persistence {
    subscription: SubscriptionId,
    quotes: mpsc::Sender<Quote>,
    writer: JoinHandle<()>,
}

impl Service {
    /// Creates a new Service instance.
    pub async fn new(cfg: ServiceConfig) -> Result<Self, ServiceError> {
        let app_config = cfg.app_config;

        let engine = Arc::new(Engine::from_config(&app_config));
        let sources = SourceManager::from_config(&app_config).await?;

        let storage = match app_config.storage.as_ref().filter(|s| s.enabled) {
            Some(storage) => {
                let mut sqlite = SqliteStorageConfig::default();
                if let Some(ref path) = storage.path {
                    sqlite.path = path.clone();
                }
                if let Some(max) = storage.max_connections {
                    sqlite.max_connections = max;
                }
                Some(Arc::new(SqliteStorage::new(sqlite).await?))
            }
            None => None,
        };

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            cfg: app_config,
            engine,
            sources,
            health: Arc::new(HealthRegistry::new()),
            storage,
            version: cfg.version,
            started_at: Mutex::new(None),
            running: Mutex::new(false),
            stats: Arc::new(parking_lot::Mutex::new(Stats::default())),
            shutdown,
        })
    }

    #[cfg(test)]
    pub fn engine(&self) -> Arc<Engine> {
        Arc::clone(&self.engine)
    }

    #[cfg(test)]
    pub fn health(&self) -> Arc<HealthRegistry> {
        Arc::clone(&self.health)
    }

    /// Returns a copy of the current statistics.
    pub fn stats(&self) -> Stats {
        self.stats.lock().clone()
    }

    /// Returns true if the service is currently running.
    #[cfg(test)]
    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    /// Returns how long the service has been running.
    pub async fn uptime(&self) -> Duration {
        self.started_at
            .lock()
            .await
            .map(|s| s.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Starts every task and runs the ingest loop until [`stop`](Self::stop)
    /// is called.
    pub async fn start(&self) -> Result<(), ServiceError> {
        {
            let mut running = self.running.lock().await;
            if *running {
                return Err(ServiceError::AlreadyRunning);
            }
            self.shutdown.send_replace(false);
            *running = true;
        }
        *self.started_at.lock().await = Some(Instant::now());

        info!(
            version = %self.version,
            venues = ?self.cfg.enabled_venues(),
            instruments = ?self.cfg.instruments,
            "Starting spread watch service"
        );

        if let Err(e) = self.restore().await {
            warn!(error = %e, "Failed to restore persisted state");
        }

        let queue_size = self
            .cfg
            .ingestion
            .as_ref()
            .and_then(|i| i.queue_size)
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_QUEUE_SIZE);
        let (tx, rx) = mpsc::channel(queue_size);

        let tasks = self.spawn_sources(&tx).await;
        // Sources hold the only senders now
        drop(tx);

        let persistence = self.spawn_persistence();
        let server = self.spawn_server();

        self.run_loop(rx, persistence.as_ref().map(|p| &p.quotes))
            .await;

        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Source task failed");
            }
        }

        if let Some(persistence) = persistence {
            self.engine.publisher().unsubscribe(persistence.subscription);
            drop(persistence.quotes);
            if let Err(e) = persistence.writer.await {
                warn!(error = %e, "Persistence task failed");
            }
        }

        if let Some(server) = server {
            match server.await {
                Ok(Err(e)) => error!(error = %e, "API server error"),
                Err(e) => warn!(error = %e, "API server task failed"),
                Ok(Ok(())) => {}
            }
        }

        Ok(())
    }

    /// Closes storage. Call once the service is stopped for good.
    pub async fn close(&self) -> Result<(), ServiceError> {
        if let Some(ref storage) = self.storage {
            storage.close().await?;
        }
        Ok(())
    }

    /// Gracefully stops the service.
    pub async fn stop(&self) {
        {
            let mut running = self.running.lock().await;
            if !*running {
                return;
            }
            *running = false;
        }

        info!("Stopping service...");
        self.shutdown.send_replace(true);

        let uptime = self.uptime().await;
        info!(uptime = ?uptime, "Service stopped");
    }

    /// Seeds the engine from storage.
    async fn restore(&self) -> Result<(), ServiceError> {
        let Some(ref storage) = self.storage else {
            return Ok(());
        };

        let max_age = self
            .cfg
            .storage
            .as_ref()
            .map(|s| s.restore_max_age)
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_RESTORE_MAX_AGE);
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));

        let mut quotes = storage.latest_quotes().await?;
        let persisted_quotes = quotes.len();
        if let Some(cutoff) = cutoff {
            quotes.retain(|q| q.observed_at >= cutoff);
        }
        let expired_quotes = persisted_quotes - quotes.len();

        let stored_opportunities = storage.count().await?;
        let opportunities = storage
            .recent(self.engine.ledger_capacity() as u32)
            .await?;
        let (restored_quotes, restored_opportunities) =
            self.engine.restore(quotes, opportunities);

        {
            let mut stats = self.stats.lock();
            stats.restored_quotes = restored_quotes;
            stats.restored_opportunities = restored_opportunities;
        }

        info!(
            quotes = restored_quotes,
            expired_quotes = expired_quotes,
            opportunities = restored_opportunities,
            stored_opportunities = stored_opportunities,
            "Restored state from storage"
        );
        Ok(())
    }

    /// Spawns a poller per pull source and a ticker stream per stream venue.
    async fn spawn_sources(&self, tx: &mpsc::Sender<Quote>) -> Vec<JoinHandle<()>> {
        let ingestion = self.cfg.ingestion.as_ref();
        let interval = ingestion
            .map(|i| i.poll_interval)
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        let timeout = ingestion
            .map(|i| i.fetch_timeout)
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_FETCH_TIMEOUT);

        let mut tasks = Vec::new();

        for source in self.sources.sources().await {
            let poller = Poller::new(
                source,
                self.cfg.instruments.clone(),
                interval,
                timeout,
                Arc::clone(&self.health),
            );
            tasks.push(tokio::spawn(
                poller.run(tx.clone(), self.shutdown.subscribe()),
            ));
        }

        for (name, venue) in &self.cfg.venues {
            if !venue.enabled || venue.kind != VenueKind::Stream {
                continue;
            }
            let stream = TickerStream::from_config(
                name,
                venue,
                &self.cfg.instruments,
                Arc::clone(&self.health),
            );
            tasks.push(tokio::spawn(
                stream.run(tx.clone(), self.shutdown.subscribe()),
            ));
        }

        info!(tasks = tasks.len(), "Sources started");
        tasks
    }

    /// Subscribes the storage writer to the feed.
    fn spawn_persistence(&self) -> Option<Persistence> {
        let storage = self.storage.as_ref()?;

        let (opp_tx, opp_rx) = mpsc::channel(PERSIST_QUEUE_SIZE);
        let (quote_tx, quote_rx) = mpsc::channel(PERSIST_QUEUE_SIZE);

        // Stays subscribed when full: a dropped write is counted, not fatal
        let stats = Arc::clone(&self.stats);
        let handler: Handler = Arc::new(move |opp: &Opportunity| {
            opp_tx.try_send(opp.clone()).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    stats.lock().persist_dropped += 1;
                    SubscriberError::Failed("persistence queue full".into())
                }
                mpsc::error::TrySendError::Closed(_) => SubscriberError::Closed,
            })
        });
        let subscription = self.engine.publisher().subscribe(handler);

        let writer = tokio::spawn(persist_loop(
            Arc::clone(storage),
            opp_rx,
            quote_rx,
            Arc::clone(&self.stats),
        ));

        Some(Persistence {
            subscription,
            quotes: quote_tx,
            writer,
        })
    }

    fn spawn_server(&self) -> Option<JoinHandle<std::io::Result<()>>> {
        let server = self.cfg.server.as_ref().filter(|s| s.enabled)?;
        let bind = server
            .bind
            .clone()
            .unwrap_or_else(|| api::DEFAULT_BIND.to_string());

        let mut state = AppState::new(Arc::clone(&self.engine), Arc::clone(&self.health));
        if let Some(ref storage) = self.storage {
            state = state.with_storage(Arc::clone(storage) as Arc<dyn Storage>);
        }
        if let Some(size) = self.cfg.feed.as_ref().and_then(|f| f.subscriber_queue) {
            state = state.with_subscriber_queue(size);
        }

        let shutdown = self.shutdown.subscribe();
        Some(tokio::spawn(async move {
            api::serve(&bind, state, shutdown).await
        }))
    }

    /// Feeds quotes into the engine and logs periodic overviews.
    async fn run_loop(&self, mut rx: mpsc::Receiver<Quote>, persist: Option<&mpsc::Sender<Quote>>) {
        let overview_interval = Some(self.cfg.app.overview_interval)
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_OVERVIEW_INTERVAL);
        let mut overview = tokio::time::interval(overview_interval);
        // First tick fires immediately
        overview.tick().await;

        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return;
        }

        info!(overview_interval = ?overview_interval, "Starting ingest loop");

        loop {
            tokio::select! {
                received = rx.recv() => {
                    let Some(quote) = received else {
                        warn!("All sources stopped");
                        break;
                    };
                    self.handle_quote(quote, persist);
                }
                _ = overview.tick() => {
                    self.log_overview().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Ingest loop stopped");
    }

    fn handle_quote(&self, quote: Quote, persist: Option<&mpsc::Sender<Quote>>) {
        let copy = persist.is_some().then(|| quote.clone());

        match self.engine.ingest(quote) {
            IngestOutcome::Accepted(_) => {
                if let (Some(tx), Some(quote)) = (persist, copy) {
                    if tx.try_send(quote).is_err() {
                        self.stats.lock().persist_dropped += 1;
                    }
                }
            }
            IngestOutcome::Stale | IngestOutcome::Invalid => {}
        }
    }

    /// Logs a periodic overview with current stats.
    async fn log_overview(&self) {
        let engine = self.engine.stats();
        let stats = self.stats();
        let uptime = self.uptime().await;

        info!(
            uptime = ?uptime,
            quotes_received = engine.quotes_received,
            quotes_accepted = engine.quotes_accepted,
            stale_quotes = engine.stale_quotes,
            opportunities = engine.opportunities_emitted,
            suppressed = engine.suppressed,
            best_spread = %format!("{:.3}%", engine.best_spread_percent),
            ledger = self.engine.ledger_len(),
            subscribers = self.engine.publisher().subscriber_count(),
            sources = ?self.health.overall(),
            persisted = stats.opportunities_persisted,
            "Overview"
        );
    }
}

/// Writes opportunities and accepted quotes until both queues close.
///
/// Every accepted quote updates the latest-quote table and is appended to
/// the price history.
async fn persist_loop(
    storage: Arc<SqliteStorage>,
    mut opportunities: mpsc::Receiver<Opportunity>,
    mut quotes: mpsc::Receiver<Quote>,
    stats: Arc<parking_lot::Mutex<Stats>>,
) {
    let mut opportunities_open = true;
    let mut quotes_open = true;

    while opportunities_open || quotes_open {
        tokio::select! {
            biased;

            opp = opportunities.recv(), if opportunities_open => {
                let Some(opp) = opp else {
                    opportunities_open = false;
                    continue;
                };
                match storage.save(&opp).await {
                    Ok(true) => stats.lock().opportunities_persisted += 1,
                    Ok(false) => debug!(id = %opp.id, "Opportunity already stored"),
                    Err(e) => {
                        warn!(id = %opp.id, error = %e, "Failed to persist opportunity");
                        stats.lock().persist_errors += 1;
                    }
                }
            }
            quote = quotes.recv(), if quotes_open => {
                let Some(quote) = quote else {
                    quotes_open = false;
                    continue;
                };
                match storage.upsert_quote(&quote).await {
                    Ok(true) => stats.lock().quotes_persisted += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(venue = %quote.venue, error = %e, "Failed to persist quote");
                        stats.lock().persist_errors += 1;
                    }
                }
                match storage.append_price(&quote).await {
                    Ok(()) => stats.lock().prices_recorded += 1,
                    Err(e) => {
                        warn!(venue = %quote.venue, error = %e, "Failed to record price");
                        stats.lock().persist_errors += 1;
                    }
                }
            }
        }
    }

    debug!("Persistence writer stopped");
}
