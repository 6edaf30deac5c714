//! Latest-quote store keyed by (venue, instrument).

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::Quote;

/// Result of offering a quote to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The quote replaced the stored one (or filled an empty slot).
    Accepted { previous: Option<Quote> },
    /// An equal or newer quote is already stored; nothing changed.
    Stale { stored_at: DateTime<Utc> },
}

impl UpdateOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, UpdateOutcome::Accepted { .. })
    }
}

/// QuoteStore holds the most recent quote per (venue, instrument).
///
/// Instruments are indexed separately so a snapshot only touches the venues
/// of one instrument.
#[derive(Debug, Default)]
pub struct QuoteStore {
    by_instrument: HashMap<String, HashMap<String, Quote>>,
}

impl QuoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the quote unless the slot already holds one observed at the same
    /// time or later.
    pub fn update(&mut self, quote: Quote) -> UpdateOutcome {
        let venues = self
            .by_instrument
            .entry(quote.instrument.clone())
            .or_default();

        if let Some(current) = venues.get(&quote.venue) {
            if current.observed_at >= quote.observed_at {
                return UpdateOutcome::Stale {
                    stored_at: current.observed_at,
                };
            }
        }

        let previous = venues.insert(quote.venue.clone(), quote);
        UpdateOutcome::Accepted { previous }
    }

    /// Returns one quote per venue currently known for the instrument.
    pub fn snapshot(&self, instrument: &str) -> Vec<Quote> {
        self.by_instrument
            .get(instrument)
            .map(|venues| venues.values().cloned().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn get(&self, venue: &str, instrument: &str) -> Option<&Quote> {
        self.by_instrument
            .get(instrument)
            .and_then(|venues| venues.get(venue))
    }

    /// Known instruments, sorted.
    #[cfg(test)]
    pub fn instruments(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_instrument.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every stored quote, ordered by instrument then venue.
    pub fn all(&self) -> Vec<Quote> {
        let mut quotes: Vec<Quote> = self
            .by_instrument
            .values()
            .flat_map(|venues| venues.values().cloned())
            .collect();
        quotes.sort_by(|a, b| {
            a.instrument
                .cmp(&b.instrument)
                .then_with(|| a.venue.cmp(&b.venue))
        });
        quotes
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.by_instrument.values().map(HashMap::len).sum()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
