//! Cross-venue spread evaluation for a single instrument.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::domain::Quote;

/// Cheapest/most expensive venue pair for one instrument snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub instrument: String,
    pub buy_venue: String,
    pub sell_venue: String,
    pub buy_price: f64,
    pub sell_price: f64,
    pub spread_percent: f64,
    pub potential_profit: f64,
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} buy {} @ {} sell {} @ {} spread {:.3}%",
            self.instrument,
            self.buy_venue,
            self.buy_price,
            self.sell_venue,
            self.sell_price,
            self.spread_percent
        )
    }
}

/// Orders quotes so that the preferred venue among equal prices sorts first:
/// most recent observation, then smallest venue name.
fn tie_break(a: &Quote, b: &Quote) -> Ordering {
    b.observed_at
        .cmp(&a.observed_at)
        .then_with(|| a.venue.cmp(&b.venue))
}

/// Evaluates the spread across the given quotes.
///
/// Returns `None` when fewer than two distinct venues are present. Invalid
/// prices are ignored. Within equal prices the tie-break is most recent
/// `observed_at`, then lexicographically smallest venue.
pub fn evaluate(quotes: &[Quote], reference_volume: f64) -> Option<Evaluation> {
    let mut seen = HashSet::new();
    let candidates: Vec<&Quote> = quotes
        .iter()
        .filter(|q| q.is_valid())
        .filter(|q| seen.insert(q.venue.as_str()))
        .collect();

    if candidates.len() < 2 {
        return None;
    }

    let buy = candidates.iter().copied().min_by(|a, b| {
        a.price
            .total_cmp(&b.price)
            .then_with(|| tie_break(a, b))
    })?;

    // Highest price first, excluding the buy venue so the pair is always two
    // venues even when every price is equal.
    let sell = candidates
        .iter()
        .copied()
        .filter(|q| q.venue != buy.venue)
        .min_by(|a, b| {
            b.price
                .total_cmp(&a.price)
                .then_with(|| tie_break(a, b))
        })?;

    let gap = sell.price - buy.price;

    Some(Evaluation {
        instrument: buy.instrument.clone(),
        buy_venue: buy.venue.clone(),
        sell_venue: sell.venue.clone(),
        buy_price: buy.price,
        sell_price: sell.price,
        spread_percent: gap / buy.price * 100.0,
        potential_profit: gap * reference_volume,
    })
}
