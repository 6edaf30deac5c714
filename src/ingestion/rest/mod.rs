//! Public REST price endpoints.

mod binance;
mod client;
mod coinbase;
mod kraken;

pub use binance::BinanceSource;
pub use client::{ClientConfig, RestClient};
pub use coinbase::CoinbaseSource;
pub use kraken::KrakenSource;

use tracing::warn;

use super::{IngestError, Result};
use crate::domain::Quote;

/// Folds per-instrument results into one fetch result.
///
/// Partial failures are logged and dropped. The fetch fails only when no
/// instrument succeeded.
fn collect_quotes(venue: &str, results: Vec<(&String, Result<Quote>)>) -> Result<Vec<Quote>> {
    let mut quotes = Vec::with_capacity(results.len());
    let mut last_error: Option<IngestError> = None;

    for (instrument, result) in results {
        match result {
            Ok(quote) => quotes.push(quote),
            Err(e) => {
                warn!(venue = %venue, instrument = %instrument, error = %e, "Fetch failed");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if quotes.is_empty() => Err(e),
        _ => Ok(quotes),
    }
}

/// Parses a decimal price string, rejecting non-positive values.
fn parse_price(field: &str, raw: &str) -> Result<f64> {
    let price: f64 = raw
        .trim()
        .parse()
        .map_err(|_| IngestError::Parse(format!("{}: invalid number {:?}", field, raw)))?;
    if !price.is_finite() || price <= 0.0 {
        return Err(IngestError::Parse(format!("{}: non-positive price {}", field, raw)));
    }
    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_collect_keeps_partial_results() {
        let btc = "BTCUSDT".to_string();
        let eth = "ETHUSDT".to_string();
        let results = vec![
            (&btc, Ok(Quote::new("Kraken", "BTCUSDT", 67470.0, Utc::now()))),
            (&eth, Err(IngestError::Parse("bad".into()))),
        ];
        let quotes = collect_quotes("Kraken", results).unwrap();
        assert_eq!(quotes.len(), 1);
    }

    #[test]
    fn test_collect_fails_when_nothing_fetched() {
        let btc = "BTCUSDT".to_string();
        let results = vec![(&btc, Err(IngestError::Connection("refused".into())))];
        assert!(matches!(
            collect_quotes("Kraken", results),
            Err(IngestError::Connection(_))
        ));
        assert!(collect_quotes("Kraken", Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("price", "67500.10").unwrap(), 67500.10);
        assert!(parse_price("price", "abc").is_err());
        assert!(parse_price("price", "0").is_err());
        assert!(parse_price("price", "-1").is_err());
    }
}
