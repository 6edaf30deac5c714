//! Registry of configured quote sources.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use super::{
    BinanceSource, CoinbaseSource, IngestError, KrakenSource, QuoteSource, Result, SimulatedSource,
};
use crate::config::{Config, SimulationConfig, VenueConfig, VenueKind};
use crate::domain::Quote;

/// SourceManager holds the pull sources built from configuration.
///
/// Stream venues are not registered here; they are driven by
/// [`TickerStream`](super::TickerStream).
pub struct SourceManager {
    /// Map of venue name to source instance.
    sources: Arc<RwLock<HashMap<String, Arc<dyn QuoteSource>>>>,
}

impl SourceManager {
    pub fn new() -> Self {
        Self {
            sources: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates a manager with every enabled pull venue from config.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let manager = Self::new();

        for (name, venue) in &config.venues {
            if !venue.enabled {
                info!(venue = %name, "Skipping disabled venue");
                continue;
            }
            if venue.kind == VenueKind::Stream {
                continue;
            }

            info!(venue = %name, kind = ?venue.kind, "Loading venue from config");

            let source = Self::create_source(name, venue, config.simulation.as_ref())?;
            manager.register(source).await;
        }

        Ok(manager)
    }

    /// Factory method to create a pull source from its config.
    fn create_source(
        name: &str,
        venue: &VenueConfig,
        simulation: Option<&SimulationConfig>,
    ) -> Result<Arc<dyn QuoteSource>> {
        match venue.kind {
            VenueKind::Simulated => Ok(Arc::new(SimulatedSource::from_config(
                name, venue, simulation,
            ))),
            VenueKind::Rest => match name.to_lowercase().as_str() {
                "binance" => Ok(Arc::new(BinanceSource::from_config(name, venue)?)),
                "coinbase" => Ok(Arc::new(CoinbaseSource::from_config(name, venue)?)),
                "kraken" => Ok(Arc::new(KrakenSource::from_config(name, venue)?)),
                _ => Err(IngestError::Config(format!("unknown venue: {}", name))),
            },
            VenueKind::Stream => Err(IngestError::Config(format!(
                "venue {} is a stream venue",
                name
            ))),
        }
    }

    /// Registers a source under its name.
    pub async fn register(&self, source: Arc<dyn QuoteSource>) {
        let name = source.name().to_string();
        let mut sources = self.sources.write().await;
        info!(venue = %name, "Registering source");
        sources.insert(name, source);
    }

    #[cfg(test)]
    pub async fn get(&self, name: &str) -> Option<Arc<dyn QuoteSource>> {
        self.sources.read().await.get(name).cloned()
    }

    /// Registered source names, sorted.
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// All registered sources.
    pub async fn sources(&self) -> Vec<Arc<dyn QuoteSource>> {
        self.sources.read().await.values().cloned().collect()
    }

    /// Fetches once from every source, keyed by source name.
    pub async fn fetch_all(&self, instruments: &[String]) -> HashMap<String, Result<Vec<Quote>>> {
        let sources = self.sources().await;
        let mut results = HashMap::with_capacity(sources.len());
        for source in sources {
            let result = source.fetch(instruments).await;
            results.insert(source.name().to_string(), result);
        }
        results
    }
}

impl Default for SourceManager {
    fn default() -> Self {
        Self::new()
    }
}
