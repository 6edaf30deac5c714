//! Wire shape of feed events.

use serde::{Deserialize, Serialize};

use crate::domain::{Opportunity, Quote};

/// A pushed event is `{ "opportunity": {...} }`; catch-up is a bare array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeedMessage {
    Push { opportunity: Opportunity },
    CatchUp(Vec<Opportunity>),
}

impl FeedMessage {
    pub fn push(opportunity: Opportunity) -> Self {
        FeedMessage::Push { opportunity }
    }

    pub fn catch_up(opportunities: Vec<Opportunity>) -> Self {
        FeedMessage::CatchUp(opportunities)
    }
}

/// Live price event: `{ "quote": {...} }`, catch-up is a bare array of the
/// latest quotes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuoteMessage {
    Push { quote: Quote },
    CatchUp(Vec<Quote>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn opp() -> Opportunity {
        Opportunity {
            id: "id-1".to_string(),
            instrument: "ETHUSDT".to_string(),
            buy_venue: "Kraken".to_string(),
            sell_venue: "Binance".to_string(),
            buy_price: 3450.0,
            sell_price: 3470.0,
            spread_percent: 0.58,
            potential_profit: 2.0,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn test_push_shape() {
        let json = serde_json::to_value(FeedMessage::push(opp())).unwrap();
        assert_eq!(json["opportunity"]["id"], "id-1");
        assert_eq!(json["opportunity"]["buyVenue"], "Kraken");
    }

    #[test]
    fn test_catch_up_is_bare_array() {
        let json = serde_json::to_value(FeedMessage::catch_up(vec![opp(), opp()])).unwrap();
        assert!(json.is_array());
        assert_eq!(json.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_quote_push_shape() {
        let quote = Quote::new("Kraken", "BTCUSDT", 67470.0, Utc::now());
        let json = serde_json::to_value(QuoteMessage::Push { quote }).unwrap();
        assert_eq!(json["quote"]["venue"], "Kraken");
        assert_eq!(json["quote"]["price"], 67470.0);
    }

    #[test]
    fn test_push_parses_back() {
        let msg = FeedMessage::push(opp());
        let text = serde_json::to_string(&msg).unwrap();
        let parsed: FeedMessage = serde_json::from_str(&text).unwrap();
        assert!(matches!(parsed, FeedMessage::Push { .. }));
    }
}
