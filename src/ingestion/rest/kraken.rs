//! Kraken public ticker endpoint.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use super::{ClientConfig, RestClient, collect_quotes, parse_price};
use crate::config::VenueConfig;
use crate::domain::Quote;
use crate::ingestion::{IngestError, QuoteSource, Result, display_name, venue_symbol};

const BASE_HTTP_API_URL: &str = "https://api.kraken.com";

const TICKER_ENDPOINT: &str = "/0/public/Ticker";

/// Response of `GET /0/public/Ticker?pair=`.
///
/// `result` is keyed by Kraken's own pair name, which may differ from the
/// requested one (XBTUSDT comes back as XBTUSDT or XXBTZUSD).
#[derive(Debug, Deserialize)]
struct TickerResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, PairTicker>,
}

#[derive(Debug, Deserialize)]
struct PairTicker {
    /// Last trade closed: [price, lot volume].
    c: Vec<String>,
    /// Today's opening price.
    o: Option<String>,
}

/// KrakenSource polls the ticker for each instrument.
pub struct KrakenSource {
    name: String,
    client: RestClient,
    symbols: HashMap<String, String>,
}

impl KrakenSource {
    pub fn from_config(key: &str, config: &VenueConfig) -> Result<Self> {
        let base_url = config.base_url.as_deref().unwrap_or(BASE_HTTP_API_URL);
        Ok(Self {
            name: display_name(key),
            client: RestClient::new(ClientConfig::new(base_url, config.rate_limit))?,
            symbols: config.symbols.clone(),
        })
    }

    async fn fetch_one(&self, instrument: &str) -> Result<Quote> {
        let pair = venue_symbol("kraken", instrument, &self.symbols);
        let resp: TickerResponse = self
            .client
            .get_json(TICKER_ENDPOINT, &[("pair", pair.as_str())])
            .await?;
        parse_ticker(&self.name, instrument, resp)
    }
}

fn parse_ticker(venue: &str, instrument: &str, resp: TickerResponse) -> Result<Quote> {
    if !resp.error.is_empty() {
        return Err(IngestError::Api {
            status: 200,
            message: resp.error.join("; "),
        });
    }

    let ticker = resp
        .result
        .into_values()
        .next()
        .ok_or_else(|| IngestError::Parse("empty ticker result".into()))?;

    let last = ticker
        .c
        .first()
        .ok_or_else(|| IngestError::Parse("missing last trade price".into()))?;
    let price = parse_price("c[0]", last)?;

    let mut quote = Quote::new(venue, instrument, price, Utc::now());
    if let Some(open) = ticker
        .o
        .as_deref()
        .and_then(|o| o.trim().parse::<f64>().ok())
        .filter(|o| *o > 0.0)
    {
        quote = quote.with_change_24h((price - open) / open * 100.0);
    }
    Ok(quote)
}

#[async_trait]
impl QuoteSource for KrakenSource {
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
        let resp: TickerResponse = serde_json::from_str(
            r#"{
                "error": [],
                "result": {
                    "XBTUSDT": {
                        "a": ["67480.0", "1", "1.000"],
                        "b": ["67470.0", "2", "2.000"],
                        "c": ["67470.00000", "0.00150000"],
                        "o": "66000.0"
                    }
                }
            }"#,
        )
        .unwrap();

        let quote = parse_ticker("Kraken", "BTCUSDT", resp).unwrap();
        assert_eq!(quote.venue, "Kraken");
        assert_eq!(quote.instrument, "BTCUSDT");
        assert_eq!(quote.price, 67470.0);
        let change = quote.change_24h.unwrap();
        assert!((change - (67470.0 - 66000.0) / 66000.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_error_payload() {
        let resp: TickerResponse =
            serde_json::from_str(r#"{"error":["EQuery:Unknown asset pair"]}"#).unwrap();
        let err = parse_ticker("Kraken", "FOOUSDT", resp).unwrap_err();
        assert!(err.to_string().contains("Unknown asset pair"));
    }

    #[test]
    fn test_empty_result() {
        let resp: TickerResponse = serde_json::from_str(r#"{"error":[],"result":{}}"#).unwrap();
        assert!(matches!(
            parse_ticker("Kraken", "BTCUSDT", resp),
            Err(IngestError::Parse(_))
        ));
    }
}
