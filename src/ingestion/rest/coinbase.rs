//! Coinbase spot price endpoint.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use super::{ClientConfig, RestClient, collect_quotes, parse_price};
use crate::config::VenueConfig;
use crate::domain::Quote;
use crate::ingestion::{QuoteSource, Result, display_name, venue_symbol};

const BASE_HTTP_API_URL: &str = "https://api.coinbase.com";

/// Response of `GET /v2/prices/{BASE-QUOTE}/spot`.
#[derive(Debug, Deserialize)]
struct SpotResponse {
    data: SpotPrice,
}

#[derive(Debug, Deserialize)]
struct SpotPrice {
    amount: String,
}

/// CoinbaseSource polls the spot price for each instrument.
///
/// The endpoint carries no timestamp, so quotes are stamped on receipt.
pub struct CoinbaseSource {
    name: String,
    client: RestClient,
    symbols: HashMap<String, String>,
}

impl CoinbaseSource {
    pub fn from_config(key: &str, config: &VenueConfig) -> Result<Self> {
        let base_url = config.base_url.as_deref().unwrap_or(BASE_HTTP_API_URL);
        Ok(Self {
            name: display_name(key),
            client: RestClient::new(ClientConfig::new(base_url, config.rate_limit))?,
            symbols: config.symbols.clone(),
        })
    }

    async fn fetch_one(&self, instrument: &str) -> Result<Quote> {
        let product = venue_symbol("coinbase", instrument, &self.symbols);
        let endpoint = format!("/v2/prices/{}/spot", urlencoding::encode(&product));
        let resp: SpotResponse = self.client.get_json(&endpoint, &[]).await?;
        let price = parse_price("data.amount", &resp.data.amount)?;
        Ok(Quote::new(&self.name, instrument, price, Utc::now()))
    }
}

#[async_trait]
impl QuoteSource for CoinbaseSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, instruments: &[String]) -> Result<Vec<Quote>> {
        let mut results = Vec::with_capacity(instruments.len());
        for instrument in instruments {
            results.push((instrument, self.fetch_one(instrument).await));
        }
        collect_quotes(&self.name, results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spot_response_shape() {
        let resp: SpotResponse = serde_json::from_str(
            r#"{"data":{"amount":"67550.12","base":"BTC","currency":"USD"}}"#,
        )
        .unwrap();
        assert_eq!(parse_price("data.amount", &resp.data.amount).unwrap(), 67550.12);
    }

    #[test]
    fn test_name_comes_from_config_key() {
        let config: VenueConfig = serde_yaml::from_str("enabled: true").unwrap();
        let source = CoinbaseSource::from_config("coinbase", &config).unwrap();
        assert_eq!(source.name(), "Coinbase");
    }
}
