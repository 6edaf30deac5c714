//! Instrument to venue symbol mapping.

use std::collections::HashMap;

/// Quote assets recognised at the end of an instrument symbol, longest first.
const QUOTE_ASSETS: [&str; 6] = ["USDT", "USDC", "BUSD", "USD", "EUR", "BTC"];

/// Splits "BTCUSDT" into ("BTC", "USDT").
pub fn split_instrument(instrument: &str) -> Option<(&str, &str)> {
    QUOTE_ASSETS.iter().find_map(|quote| {
        let base = instrument.strip_suffix(quote)?;
        (!base.is_empty()).then_some((base, *quote))
    })
}

/// Returns the symbol a venue uses for an instrument.
///
/// Explicit overrides from config win. Otherwise Coinbase gets "BTC-USD"
/// (USD-stable quotes map to USD), Kraken gets "XBTUSDT", anything else
/// keeps the instrument symbol unchanged.
pub fn venue_symbol(venue: &str, instrument: &str, overrides: &HashMap<String, String>) -> String {
    if let Some(symbol) = overrides.get(instrument) {
        return symbol.clone();
    }

    match venue.to_lowercase().as_str() {
        "coinbase" => match split_instrument(instrument) {
            Some((base, quote)) => {
                let quote = if quote.starts_with("USD") { "USD" } else { quote };
                format!("{}-{}", base, quote)
            }
            None => instrument.to_string(),
        },
        "kraken" => match split_instrument(instrument) {
            Some(("BTC", quote)) => format!("XBT{}", quote),
            _ => instrument.to_string(),
        },
        _ => instrument.to_string(),
    }
}

/// Capitalizes a config key for display ("binance" -> "Binance").
pub fn display_name(venue: &str) -> String {
    let mut chars = venue.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_instrument() {
        assert_eq!(split_instrument("BTCUSDT"), Some(("BTC", "USDT")));
        assert_eq!(split_instrument("ETHUSD"), Some(("ETH", "USD")));
        assert_eq!(split_instrument("ETHBTC"), Some(("ETH", "BTC")));
        assert_eq!(split_instrument("USDT"), None);
        assert_eq!(split_instrument("FOO"), None);
    }

    #[test]
    fn test_coinbase_symbols() {
        let none = HashMap::new();
        assert_eq!(venue_symbol("coinbase", "BTCUSDT", &none), "BTC-USD");
        assert_eq!(venue_symbol("Coinbase", "ETHUSDT", &none), "ETH-USD");
        assert_eq!(venue_symbol("coinbase", "ETHEUR", &none), "ETH-EUR");
    }

    #[test]
    fn test_kraken_symbols() {
        let none = HashMap::new();
        assert_eq!(venue_symbol("kraken", "BTCUSDT", &none), "XBTUSDT");
        assert_eq!(venue_symbol("kraken", "ETHUSDT", &none), "ETHUSDT");
    }

    #[test]
    fn test_binance_keeps_instrument() {
        assert_eq!(venue_symbol("binance", "BTCUSDT", &HashMap::new()), "BTCUSDT");
    }

    #[test]
    fn test_override_wins() {
        let overrides = HashMap::from([("BTCUSDT".to_string(), "XXBTZUSD".to_string())]);
        assert_eq!(venue_symbol("kraken", "BTCUSDT", &overrides), "XXBTZUSD");
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("binance"), "Binance");
        assert_eq!(display_name("Kraken"), "Kraken");
        assert_eq!(display_name(""), "");
    }
}
