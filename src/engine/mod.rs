//! Spread detection core.
//!
//! The engine serializes every quote through one path: store update, spread
//! evaluation for the affected instrument, detector policy, ledger append.
//! Broadcast to subscribers happens after the engine lock is released.
//! Accepted quotes are also fanned out on a broadcast channel for live price
//! consumers.

mod detector;
mod evaluator;
mod ledger;
mod store;

pub use detector::{Decision, Detector, DetectorSettings};
pub use evaluator::{Evaluation, evaluate};
pub use ledger::{DEFAULT_LEDGER_CAPACITY, Ledger};
pub use store::{QuoteStore, UpdateOutcome};

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::Config;
use crate::domain::{Opportunity, Quote};
use crate::feed::Publisher;

/// Ledger shared between the engine and the feed publisher.
pub type SharedLedger = Arc<Mutex<Ledger>>;

/// Accepted quotes buffered per live price receiver.
const QUOTE_CHANNEL_CAPACITY: usize = 256;

/// Counters describing what the engine did with incoming quotes.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub quotes_received: u64,
    pub quotes_accepted: u64,
    pub stale_quotes: u64,
    pub invalid_quotes: u64,
    pub evaluations: u64,
    pub below_threshold: u64,
    pub suppressed: u64,
    pub duplicate_ids: u64,
    pub opportunities_emitted: u64,
    pub best_spread_percent: f64,
}

/// Result of ingesting one quote.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Price was non-positive or non-finite.
    Invalid,
    /// An equal or newer quote was already stored.
    Stale,
    /// Store updated; carries the opportunity if one was emitted.
    Accepted(Option<Opportunity>),
}

impl IngestOutcome {
    #[cfg(test)]
    pub fn opportunity(&self) -> Option<&Opportunity> {
        match self {
            IngestOutcome::Accepted(Some(opp)) => Some(opp),
            _ => None,
        }
    }
}

struct EngineState {
    store: QuoteStore,
    detector: Detector,
    stats: EngineStats,
}

/// Engine owns the quote store, detector and ledger.
pub struct Engine {
    state: Mutex<EngineState>,
    ledger: SharedLedger,
    publisher: Arc<Publisher>,
    quotes_tx: broadcast::Sender<Quote>,
}

impl Engine {
    pub fn new(settings: DetectorSettings, ledger_capacity: usize) -> Self {
        let ledger: SharedLedger = Arc::new(Mutex::new(Ledger::new(ledger_capacity)));
        let publisher = Arc::new(Publisher::new(Arc::clone(&ledger)));

        Self {
            state: Mutex::new(EngineState {
                store: QuoteStore::new(),
                detector: Detector::new(settings),
                stats: EngineStats::default(),
            }),
            ledger,
            publisher,
            quotes_tx: broadcast::channel(QUOTE_CHANNEL_CAPACITY).0,
        }
    }

    /// Builds an engine from the detector and ledger config sections.
    pub fn from_config(cfg: &Config) -> Self {
        let settings = DetectorSettings::from_config(cfg.detector.as_ref());
        let capacity = cfg
            .ledger
            .as_ref()
            .and_then(|l| l.capacity)
            .unwrap_or(DEFAULT_LEDGER_CAPACITY);
        Self::new(settings, capacity)
    }

    pub fn publisher(&self) -> Arc<Publisher> {
        Arc::clone(&self.publisher)
    }

    /// Receives every quote the store accepts from now on.
    pub fn subscribe_quotes(&self) -> broadcast::Receiver<Quote> {
        self.quotes_tx.subscribe()
    }

    /// Offers a quote to the engine.
    ///
    /// Stale and invalid quotes change nothing. An accepted quote re-evaluates
    /// its instrument and may emit one opportunity, which is appended to the
    /// ledger and then broadcast.
    pub fn ingest(&self, quote: Quote) -> IngestOutcome {
        let live = (self.quotes_tx.receiver_count() > 0).then(|| quote.clone());

        let emitted = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.stats.quotes_received += 1;

            if !quote.is_valid() {
                state.stats.invalid_quotes += 1;
                debug!(
                    venue = %quote.venue,
                    instrument = %quote.instrument,
                    price = quote.price,
                    "Rejected invalid quote"
                );
                return IngestOutcome::Invalid;
            }

            let instrument = quote.instrument.clone();
            let venue = quote.venue.clone();
            let observed_at = quote.observed_at;
            let price = quote.price;

            match state.store.update(quote) {
                UpdateOutcome::Stale { stored_at } => {
                    state.stats.stale_quotes += 1;
                    debug!(
                        venue = %venue,
                        instrument = %instrument,
                        observed_at = %observed_at,
                        stored_at = %stored_at,
                        "Stale quote ignored"
                    );
                    return IngestOutcome::Stale;
                }
                UpdateOutcome::Accepted { previous } => {
                    state.stats.quotes_accepted += 1;
                    if let Some(prev) = previous {
                        debug!(
                            venue = %venue,
                            instrument = %instrument,
                            price = price,
                            delta = price - prev.price,
                            "Quote updated"
                        );
                    }
                }
            }

            let snapshot = state.store.snapshot(&instrument);
            let evaluation = evaluate(&snapshot, state.detector.settings().reference_volume);
            if let Some(ref eval) = evaluation {
                state.stats.evaluations += 1;
                if eval.spread_percent > state.stats.best_spread_percent {
                    state.stats.best_spread_percent = eval.spread_percent;
                }
            }

            match state
                .detector
                .on_evaluation(&instrument, evaluation, observed_at)
            {
                Decision::Emit(opp) => {
                    // Lock order: engine state, then ledger
                    if self.ledger.lock().append(opp.clone()) {
                        state.stats.opportunities_emitted += 1;
                        info!(
                            id = %opp.id,
                            instrument = %opp.instrument,
                            buy = %opp.buy_venue,
                            sell = %opp.sell_venue,
                            buy_price = opp.buy_price,
                            sell_price = opp.sell_price,
                            spread = %format!("{:.3}%", opp.spread_percent),
                            profit = opp.potential_profit,
                            "Opportunity detected"
                        );
                        Some(opp)
                    } else {
                        state.stats.duplicate_ids += 1;
                        debug!(id = %opp.id, "Opportunity already in ledger");
                        None
                    }
                }
                Decision::BelowThreshold => {
                    state.stats.below_threshold += 1;
                    None
                }
                Decision::Suppressed => {
                    state.stats.suppressed += 1;
                    None
                }
                Decision::InsufficientVenues => None,
            }
        };

        if let Some(quote) = live {
            // No receivers left is fine
            let _ = self.quotes_tx.send(quote);
        }
        if let Some(ref opp) = emitted {
            self.publisher.broadcast(opp);
        }

        IngestOutcome::Accepted(emitted)
    }

    /// Seeds the store and ledger from persisted state without running the
    /// detector. Opportunities are expected newest first.
    pub fn restore(&self, quotes: Vec<Quote>, opportunities: Vec<Opportunity>) -> (usize, usize) {
        let mut state = self.state.lock();
        let restored_quotes = quotes
            .into_iter()
            .filter(|q| q.is_valid())
            .filter(|q| state.store.update(q.clone()).is_accepted())
            .count();

        let mut ledger = self.ledger.lock();
        let restored_opps = opportunities
            .into_iter()
            .rev()
            .filter(|o| ledger.append(o.clone()))
            .count();

        (restored_quotes, restored_opps)
    }

    /// Latest quotes, all instruments or just one.
    pub fn quotes(&self, instrument: Option<&str>) -> Vec<Quote> {
        let state = self.state.lock();
        match instrument {
            Some(instrument) => {
                let mut quotes = state.store.snapshot(instrument);
                quotes.sort_by(|a, b| a.venue.cmp(&b.venue));
                quotes
            }
            None => state.store.all(),
        }
    }

    /// Most recent opportunities from the ledger.
    pub fn recent(&self, limit: usize, instrument: Option<&str>) -> Vec<Opportunity> {
        self.ledger.lock().query(limit, instrument)
    }

    /// Current spread evaluation for an instrument, if two venues are known.
    pub fn evaluation(&self, instrument: &str) -> Option<Evaluation> {
        let state = self.state.lock();
        let snapshot = state.store.snapshot(instrument);
        evaluate(&snapshot, state.detector.settings().reference_volume)
    }

    pub fn ledger_len(&self) -> usize {
        self.ledger.lock().len()
    }

    pub fn ledger_capacity(&self) -> usize {
        self.ledger.lock().capacity()
    }

    pub fn stats(&self) -> EngineStats {
        self.state.lock().stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Handler;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn q(venue: &str, price: f64, secs: i64) -> Quote {
        Quote::new(venue, "BTCUSDT", price, t(secs))
    }

    fn engine() -> Engine {
        Engine::new(DetectorSettings::default(), DEFAULT_LEDGER_CAPACITY)
    }

    fn counting_subscriber(engine: &Engine) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let handler: Handler = {
            let count = Arc::clone(&count);
            Arc::new(move |_: &Opportunity| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };
        engine.publisher().subscribe(handler);
        count
    }

    #[test]
    fn test_narrow_spread_emits_nothing() {
        let engine = engine();
        let pushed = counting_subscriber(&engine);

        engine.ingest(q("Binance", 67500.0, 0));
        engine.ingest(q("Coinbase", 67550.0, 0));
        let outcome = engine.ingest(q("Kraken", 67470.0, 0));

        assert_eq!(outcome, IngestOutcome::Accepted(None));
        let eval = engine.evaluation("BTCUSDT").unwrap();
        assert_eq!(eval.buy_venue, "Kraken");
        assert_eq!(eval.sell_venue, "Coinbase");
        assert!(engine.recent(10, None).is_empty());
        assert_eq!(pushed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wide_spread_emits_and_broadcasts() {
        let engine = engine();
        let pushed = counting_subscriber(&engine);

        assert_eq!(
            engine.ingest(q("Binance", 67500.0, 0)),
            IngestOutcome::Accepted(None)
        );
        let outcome = engine.ingest(q("Coinbase", 68200.0, 1));
        let opp = outcome.opportunity().unwrap();

        assert_eq!(opp.buy_venue, "Binance");
        assert_eq!(opp.sell_venue, "Coinbase");
        assert!((opp.spread_percent - 1.0370).abs() < 1e-4);
        assert!((opp.potential_profit - 70.0).abs() < 1e-9);
        assert_eq!(opp.detected_at, t(1));

        assert_eq!(engine.recent(10, None).len(), 1);
        assert_eq!(pushed.load(Ordering::SeqCst), 1);
        assert_eq!(engine.stats().opportunities_emitted, 1);
    }

    #[test]
    fn test_older_quote_skips_detection() {
        let engine = engine();
        engine.ingest(q("Binance", 67500.0, 5));
        engine.ingest(q("Kraken", 67470.0, 10));
        let evaluations = engine.stats().evaluations;

        // Would be a wide spread if it were accepted
        let outcome = engine.ingest(q("Kraken", 60000.0, 3));
        assert_eq!(outcome, IngestOutcome::Stale);

        let stats = engine.stats();
        assert_eq!(stats.stale_quotes, 1);
        assert_eq!(stats.evaluations, evaluations);
        assert!(engine.recent(10, None).is_empty());
    }

    #[test]
    fn test_replay_is_idempotent() {
        let engine = engine();
        let pushed = counting_subscriber(&engine);
        let quotes = [q("Binance", 67500.0, 0), q("Coinbase", 68200.0, 1)];

        for quote in quotes.iter().cloned() {
            engine.ingest(quote);
        }
        for quote in quotes.iter().cloned() {
            assert_eq!(engine.ingest(quote), IngestOutcome::Stale);
        }

        assert_eq!(engine.quotes(Some("BTCUSDT")).len(), 2);
        assert_eq!(engine.recent(10, None).len(), 1);
        assert_eq!(pushed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rapid_updates_emit_once() {
        let engine = engine();
        engine.ingest(q("Binance", 67500.0, 0));
        for i in 1..30 {
            let price = 68200.0 + (i % 4) as f64 * 2.0;
            engine.ingest(q("Coinbase", price, i));
        }
        assert_eq!(engine.recent(50, None).len(), 1);
        assert!(engine.stats().suppressed >= 28);
    }

    #[tokio::test]
    async fn test_accepted_quotes_reach_live_receivers() {
        let engine = engine();
        let mut rx = engine.subscribe_quotes();

        engine.ingest(q("Binance", 67500.0, 5));
        engine.ingest(q("Binance", 67400.0, 1));
        engine.ingest(q("Binance", -1.0, 6));
        engine.ingest(q("Kraken", 67470.0, 6));

        assert_eq!(rx.recv().await.unwrap(), q("Binance", 67500.0, 5));
        assert_eq!(rx.recv().await.unwrap(), q("Kraken", 67470.0, 6));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_invalid_quote_is_rejected() {
        let engine = engine();
        assert_eq!(engine.ingest(q("Binance", 0.0, 0)), IngestOutcome::Invalid);
        assert_eq!(
            engine.ingest(q("Binance", f64::INFINITY, 1)),
            IngestOutcome::Invalid
        );
        assert!(engine.quotes(None).is_empty());
        assert_eq!(engine.stats().invalid_quotes, 2);
    }

    #[test]
    fn test_ledger_cap_holds_through_engine() {
        let engine = Engine::new(DetectorSettings::default(), 5);
        // Alternate the buy venue so every update is a new episode
        for i in 0..40 {
            let (cheap, dear) = if i % 2 == 0 {
                ("Binance", "Coinbase")
            } else {
                ("Coinbase", "Binance")
            };
            engine.ingest(q(cheap, 67500.0, i * 2));
            engine.ingest(q(dear, 68200.0, i * 2 + 1));
        }
        assert_eq!(engine.ledger_len(), 5);
        assert!(engine.stats().opportunities_emitted > 5);
    }

    #[test]
    fn test_subscriber_can_read_engine_during_broadcast() {
        let engine = Arc::new(engine());
        let seen = Arc::new(AtomicUsize::new(0));
        let handler: Handler = {
            let engine = Arc::clone(&engine);
            let seen = Arc::clone(&seen);
            Arc::new(move |_: &Opportunity| {
                seen.store(engine.recent(10, None).len(), Ordering::SeqCst);
                Ok(())
            })
        };
        engine.publisher().subscribe(handler);

        engine.ingest(q("Binance", 67500.0, 0));
        engine.ingest(q("Coinbase", 68200.0, 1));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_restore_seeds_state_without_emitting() {
        let engine = engine();
        let pushed = counting_subscriber(&engine);
        let opp = Opportunity {
            id: "persisted".to_string(),
            instrument: "BTCUSDT".to_string(),
            buy_venue: "Binance".to_string(),
            sell_venue: "Coinbase".to_string(),
            buy_price: 67500.0,
            sell_price: 68200.0,
            spread_percent: 1.037,
            potential_profit: 70.0,
            detected_at: t(0),
        };

        let (quotes, opps) = engine.restore(
            vec![q("Binance", 67500.0, 0), q("Coinbase", 68200.0, 0)],
            vec![opp],
        );
        assert_eq!((quotes, opps), (2, 1));
        assert_eq!(engine.recent(10, None)[0].id, "persisted");
        assert_eq!(pushed.load(Ordering::SeqCst), 0);

        // Older than restored state
        assert_eq!(engine.ingest(q("Binance", 60000.0, -5)), IngestOutcome::Stale);
    }
}
