//! Binance 24h ticker endpoint.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{ClientConfig, RestClient, collect_quotes, parse_price};
use crate::config::VenueConfig;
use crate::domain::Quote;
use crate::ingestion::{QuoteSource, Result, display_name, venue_symbol};

/// Production Binance HTTP API endpoint.
const BASE_HTTP_API_URL: &str = "https://api.binance.com";

const TICKER_ENDPOINT: &str = "/api/v3/ticker/24hr";

/// Response of `GET /api/v3/ticker/24hr?symbol=`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    last_price: String,
    price_change_percent: Option<String>,
    close_time: Option<i64>,
}

/// BinanceSource polls the 24h ticker for each instrument.
pub struct BinanceSource {
    name: String,
    client: RestClient,
    symbols: HashMap<String, String>,
}

impl BinanceSource {
    pub fn from_config(key: &str, config: &VenueConfig) -> Result<Self> {
        let base_url = config.base_url.as_deref().unwrap_or(BASE_HTTP_API_URL);
        Ok(Self {
            name: display_name(key),
            client: RestClient::new(ClientConfig::new(base_url, config.rate_limit))?,
            symbols: config.symbols.clone(),
        })
    }

    async fn fetch_one(&self, instrument: &str) -> Result<Quote> {
        let symbol = venue_symbol("binance", instrument, &self.symbols);
        let ticker: Ticker24h = self
            .client
            .get_json(TICKER_ENDPOINT, &[("symbol", symbol.as_str())])
            .await?;
        parse_ticker(&self.name, instrument, ticker)
    }
}

fn parse_ticker(venue: &str, instrument: &str, ticker: Ticker24h) -> Result<Quote> {
    let price = parse_price("lastPrice", &ticker.last_price)?;
    // closeTime is the venue's last update; fall back to receipt time
    let observed_at = ticker
        .close_time
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    let mut quote = Quote::new(venue, instrument, price, observed_at);
    if let Some(change) = ticker
        .price_change_percent
        .as_deref()
        .and_then(|c| c.trim().parse::<f64>().ok())
    {
        quote = quote.with_change_24h(change);
    }
    Ok(quote)
}

#[async_trait]
impl QuoteSource for BinanceSource {
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
    fn test_parse_ticker() {
        let ticker: Ticker24h = serde_json::from_str(
            r#"{
                "symbol": "BTCUSDT",
                "lastPrice": "67500.01000000",
                "priceChangePercent": "-1.250",
                "closeTime": 1700000000123
            }"#,
        )
        .unwrap();

        let quote = parse_ticker("Binance", "BTCUSDT", ticker).unwrap();
        assert_eq!(quote.venue, "Binance");
        assert_eq!(quote.instrument, "BTCUSDT");
        assert_eq!(quote.price, 67500.01);
        assert_eq!(quote.change_24h, Some(-1.25));
        assert_eq!(quote.observed_at.timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_parse_ticker_without_optional_fields() {
        let ticker: Ticker24h = serde_json::from_str(r#"{"lastPrice": "3450.5"}"#).unwrap();
        let quote = parse_ticker("Binance", "ETHUSDT", ticker).unwrap();
        assert_eq!(quote.price, 3450.5);
        assert_eq!(quote.change_24h, None);
    }

    #[test]
    fn test_parse_ticker_rejects_zero_price() {
        let ticker: Ticker24h = serde_json::from_str(r#"{"lastPrice": "0.0"}"#).unwrap();
        assert!(parse_ticker("Binance", "ETHUSDT", ticker).is_err());
    }
}
