//! Bounded, most-recent-first log of emitted opportunities.

use std::collections::{HashSet, VecDeque};

use crate::domain::Opportunity;

/// Default number of opportunities kept for the live feed.
pub const DEFAULT_LEDGER_CAPACITY: usize = 50;

/// An opportunity together with its insertion sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub sequence: u64,
    pub opportunity: Opportunity,
}

/// Ledger retains the most recent opportunities, newest at the head.
///
/// Appending past capacity evicts the entry with the lowest sequence number.
/// Ids already retained are rejected.
#[derive(Debug)]
pub struct Ledger {
    entries: VecDeque<LedgerEntry>,
    ids: HashSet<String>,
    capacity: usize,
    next_sequence: u64,
}

impl Ledger {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            ids: HashSet::with_capacity(capacity + 1),
            capacity,
            next_sequence: 0,
        }
    }

    /// Inserts at the head. Returns false if the id is already retained.
    pub fn append(&mut self, opportunity: Opportunity) -> bool {
        if !self.ids.insert(opportunity.id.clone()) {
            return false;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.push_front(LedgerEntry {
            sequence,
            opportunity,
        });

        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_back() {
                self.ids.remove(&evicted.opportunity.id);
            }
        }

        true
    }

    /// Most recent opportunities first, optionally for one instrument only.
    pub fn query(&self, limit: usize, instrument: Option<&str>) -> Vec<Opportunity> {
        self.entries
            .iter()
            .filter(|e| instrument.is_none_or(|i| e.opportunity.instrument == i))
            .take(limit)
            .map(|e| e.opportunity.clone())
            .collect()
    }

    /// The full retained history, most recent first.
    #[cfg(test)]
    pub fn all(&self) -> Vec<LedgerEntry> {
        self.entries.iter().cloned().collect()
    }

    #[cfg(test)]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_CAPACITY)
    }
}
