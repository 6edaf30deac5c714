//! Subscriber registry and synchronous broadcast.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::Opportunity;
use crate::engine::SharedLedger;

/// Subscriber callback. Runs on the ingest path, so it must not block.
pub type Handler = Arc<dyn Fn(&Opportunity) -> Result<(), SubscriberError> + Send + Sync>;

/// Errors a subscriber can report back to the publisher.
#[derive(Debug, Error)]
pub enum SubscriberError {
    /// The receiving side is gone; the subscription is removed.
    #[error("subscriber closed")]
    Closed,
    /// The subscriber's queue is full; the subscription is removed.
    #[error("subscriber queue full ({capacity} pending)")]
    Overflow { capacity: usize },
    /// Any other failure; logged and the subscription is kept.
    #[error("subscriber failed: {0}")]
    Failed(String),
}

impl SubscriberError {
    fn disconnects(&self) -> bool {
        matches!(self, SubscriberError::Closed | SubscriberError::Overflow { .. })
    }
}

/// Handle returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Publisher delivers opportunities to subscribers in subscription order.
pub struct Publisher {
    subscribers: Mutex<Vec<(SubscriptionId, Handler)>>,
    next_id: AtomicU64,
    ledger: SharedLedger,
}

impl Publisher {
    pub fn new(ledger: SharedLedger) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            ledger,
        }
    }

    /// Registers a handler invoked for every future broadcast.
    pub fn subscribe(&self, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscribers.lock().push((id, handler));
        debug!(subscription = %id, "Subscriber added");
        id
    }

    /// Registers a bounded queue subscriber.
    ///
    /// When the queue is full the subscriber is disconnected rather than
    /// stalling the broadcast.
    pub fn subscribe_channel(
        &self,
        capacity: usize,
    ) -> (SubscriptionId, mpsc::Receiver<Opportunity>) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);

        let handler: Handler = Arc::new(move |opp: &Opportunity| {
            tx.try_send(opp.clone()).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SubscriberError::Overflow { capacity },
                mpsc::error::TrySendError::Closed(_) => SubscriberError::Closed,
            })
        });

        (self.subscribe(handler), rx)
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        let removed = subscribers.len() != before;
        if removed {
            debug!(subscription = %id, "Subscriber removed");
        }
        removed
    }

    /// Delivers the opportunity to every current subscriber.
    ///
    /// Each handler call is isolated: an error or panic is logged and the
    /// remaining handlers still run. Returns the number of successful
    /// deliveries.
    pub fn broadcast(&self, opportunity: &Opportunity) -> usize {
        // Handlers run without the registry lock so they may unsubscribe
        let subscribers: Vec<(SubscriptionId, Handler)> = self.subscribers.lock().clone();

        let mut delivered = 0;
        let mut dropped = Vec::new();

        for (id, handler) in subscribers {
            match catch_unwind(AssertUnwindSafe(|| handler(opportunity))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) if e.disconnects() => {
                    warn!(subscription = %id, error = %e, "Disconnecting subscriber");
                    dropped.push(id);
                }
                Ok(Err(e)) => {
                    warn!(subscription = %id, error = %e, "Subscriber failed");
                }
                Err(_) => {
                    warn!(subscription = %id, "Subscriber panicked");
                }
            }
        }

        if !dropped.is_empty() {
            self.subscribers
                .lock()
                .retain(|(id, _)| !dropped.contains(id));
        }

        delivered
    }

    /// Most recent opportunities for catch-up, newest first.
    pub fn snapshot(&self, limit: usize) -> Vec<Opportunity> {
        self.ledger.lock().query(limit, None)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Ledger;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;

    fn opp(id: &str) -> Opportunity {
        Opportunity {
            id: id.to_string(),
            instrument: "BTCUSDT".to_string(),
            buy_venue: "Binance".to_string(),
            sell_venue: "Coinbase".to_string(),
            buy_price: 67500.0,
            sell_price: 68200.0,
            spread_percent: 1.037,
            potential_profit: 70.0,
            detected_at: Utc::now(),
        }
    }

    fn publisher() -> Publisher {
        Publisher::new(Arc::new(Mutex::new(Ledger::new(10))))
    }

    fn recorder(log: Arc<Mutex<Vec<String>>>, tag: &'static str) -> Handler {
        Arc::new(move |o: &Opportunity| {
            log.lock().push(format!("{}:{}", tag, o.id));
            Ok(())
        })
    }

    #[test]
    fn test_broadcast_in_subscription_order() {
        let publisher = publisher();
        let log = Arc::new(Mutex::new(Vec::new()));
        publisher.subscribe(recorder(log.clone(), "a"));
        publisher.subscribe(recorder(log.clone(), "b"));
        publisher.subscribe(recorder(log.clone(), "c"));

        assert_eq!(publisher.broadcast(&opp("x")), 3);
        assert_eq!(*log.lock(), vec!["a:x", "b:x", "c:x"]);
    }

    #[test]
    fn test_failing_handler_does_not_block_others() {
        let publisher = publisher();
        let log = Arc::new(Mutex::new(Vec::new()));
        publisher.subscribe(recorder(log.clone(), "a"));
        publisher.subscribe(Arc::new(|_: &Opportunity| {
            Err(SubscriberError::Failed("boom".to_string()))
        }));
        publisher.subscribe(Arc::new(|_: &Opportunity| -> Result<(), SubscriberError> {
            panic!("handler panic")
        }));
        publisher.subscribe(recorder(log.clone(), "d"));

        assert_eq!(publisher.broadcast(&opp("x")), 2);
        assert_eq!(*log.lock(), vec!["a:x", "d:x"]);
        // Plain failures keep their subscription
        assert_eq!(publisher.subscriber_count(), 4);
    }

    #[test]
    fn test_unsubscribe_before_next_broadcast() {
        let publisher = publisher();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = publisher.subscribe(recorder(log.clone(), "a"));
        publisher.subscribe(recorder(log.clone(), "b"));

        publisher.broadcast(&opp("1"));
        assert!(publisher.unsubscribe(a));
        assert!(!publisher.unsubscribe(a));
        publisher.broadcast(&opp("2"));

        assert_eq!(*log.lock(), vec!["a:1", "b:1", "b:2"]);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let publisher = Arc::new(publisher());
        let calls = Arc::new(AtomicUsize::new(0));
        let id_slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let handler: Handler = {
            let publisher = Arc::clone(&publisher);
            let calls = Arc::clone(&calls);
            let id_slot = Arc::clone(&id_slot);
            Arc::new(move |_: &Opportunity| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = *id_slot.lock() {
                    publisher.unsubscribe(id);
                }
                Ok(())
            })
        };
        let id = publisher.subscribe(handler);
        *id_slot.lock() = Some(id);

        publisher.broadcast(&opp("1"));
        publisher.broadcast(&opp("2"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_channel_subscriber_receives() {
        let publisher = publisher();
        let (_id, mut rx) = publisher.subscribe_channel(4);

        publisher.broadcast(&opp("1"));
        publisher.broadcast(&opp("2"));

        assert_eq!(rx.recv().await.unwrap().id, "1");
        assert_eq!(rx.recv().await.unwrap().id, "2");
    }

    #[test]
    fn test_channel_overflow_disconnects() {
        let publisher = publisher();
        let (_id, _rx) = publisher.subscribe_channel(2);

        assert_eq!(publisher.broadcast(&opp("1")), 1);
        assert_eq!(publisher.broadcast(&opp("2")), 1);
        assert_eq!(publisher.broadcast(&opp("3")), 0);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn test_closed_channel_is_removed() {
        let publisher = publisher();
        let (_id, rx) = publisher.subscribe_channel(2);
        drop(rx);

        publisher.broadcast(&opp("1"));
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn test_snapshot_delegates_to_ledger() {
        let ledger = Arc::new(Mutex::new(Ledger::new(10)));
        ledger.lock().append(opp("old"));
        ledger.lock().append(opp("new"));
        let publisher = Publisher::new(ledger);

        let ids: Vec<String> = publisher.snapshot(5).into_iter().map(|o| o.id).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(publisher.snapshot(1).len(), 1);
    }
}
