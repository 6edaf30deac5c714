//! Locally generated prices for development and demos.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{QuoteSource, Result, display_name};
use crate::config::{SimulationConfig, VenueConfig};
use crate::domain::Quote;

const DEFAULT_VARIANCE: f64 = 0.008;
const DEFAULT_NOISE: f64 = 50.0;
const MAX_CHANGE_24H: f64 = 5.0;

fn default_base_prices() -> HashMap<String, f64> {
    HashMap::from([
        ("BTCUSDT".to_string(), 67500.0),
        ("ETHUSDT".to_string(), 3450.0),
    ])
}

/// Default per-venue offset so the simulated venues disagree a little.
fn default_offset(venue: &str) -> f64 {
    match venue.to_lowercase().as_str() {
        "binance" => 0.0,
        "coinbase" => 50.0,
        "kraken" => -30.0,
        _ => 0.0,
    }
}

/// SimulatedSource produces `base + variance + offset + noise` prices.
pub struct SimulatedSource {
    name: String,
    offset: f64,
    base_prices: HashMap<String, f64>,
    variance: f64,
    noise: f64,
    rng: Mutex<StdRng>,
}

impl SimulatedSource {
    pub fn from_config(key: &str, venue: &VenueConfig, sim: Option<&SimulationConfig>) -> Self {
        let base_prices = sim
            .map(|s| s.base_prices.clone())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(default_base_prices);

        Self {
            name: display_name(key),
            offset: venue.price_offset.unwrap_or_else(|| default_offset(key)),
            base_prices,
            variance: sim.and_then(|s| s.variance).unwrap_or(DEFAULT_VARIANCE).abs(),
            noise: sim.and_then(|s| s.noise).unwrap_or(DEFAULT_NOISE).abs(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replaces the random generator with a seeded one.
    #[cfg(test)]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    fn sample(rng: &mut StdRng, bound: f64) -> f64 {
        if bound > 0.0 {
            rng.gen_range(-bound..bound)
        } else {
            0.0
        }
    }

    fn generate(&self, instrument: &str) -> Option<Quote> {
        let base = *self.base_prices.get(instrument)?;
        let mut rng = self.rng.lock();

        let spread = Self::sample(&mut rng, base * self.variance / 2.0);
        let noise = Self::sample(&mut rng, self.noise);
        let change = Self::sample(&mut rng, MAX_CHANGE_24H);

        // Keep prices positive even with extreme settings
        let price = (base + spread + self.offset + noise).max(base * 0.01);

        Some(Quote::new(&self.name, instrument, price, Utc::now()).with_change_24h(change))
    }
}

#[async_trait]
impl QuoteSource for SimulatedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, instruments: &[String]) -> Result<Vec<Quote>> {
        Ok(instruments
            .iter()
            .filter_map(|i| self.generate(i))
            .collect())
    }
}
