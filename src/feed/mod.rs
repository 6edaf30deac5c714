//! Opportunity feed: push delivery to subscribers and pull snapshots.
//! Live prices share the wire conventions through [`QuoteMessage`].

mod message;
mod publisher;

pub use message::{FeedMessage, QuoteMessage};
pub use publisher::{Handler, Publisher, SubscriberError, SubscriptionId};
