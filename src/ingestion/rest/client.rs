//! Rate-limited JSON HTTP client shared by the REST venues.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::ingestion::{IngestError, Result};

/// Default rate limit (requests per minute).
const DEFAULT_RATE_LIMIT: i64 = 600;

/// HTTP request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Rate limit accounting window.
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Configuration for creating a new RestClient.
pub struct ClientConfig {
    pub base_url: String,
    pub rate_limit: i64,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, rate_limit: Option<i32>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limit: rate_limit
                .map(i64::from)
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_RATE_LIMIT),
        }
    }
}

struct RateLimitState {
    window_start: Instant,
}

/// RestClient issues unauthenticated GET requests and decodes JSON bodies.
pub struct RestClient {
    config: ClientConfig,
    http_client: HttpClient,
    request_count: AtomicI64,
    rate_limit_state: Mutex<RateLimitState>,
}

impl RestClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http_client = HttpClient::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            config,
            http_client,
            request_count: AtomicI64::new(0),
            rate_limit_state: Mutex::new(RateLimitState {
                window_start: Instant::now(),
            }),
        })
    }

    /// Builds the full URL for an endpoint and query parameters.
    pub fn url(&self, endpoint: &str, params: &[(&str, &str)]) -> String {
        let query: String = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        if query.is_empty() {
            format!("{}{}", self.config.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.config.base_url, endpoint, query)
        }
    }

    /// Sends a GET request and decodes the JSON response.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        self.check_rate_limit()?;

        let url = self.url(endpoint, params);
        debug!(url = %url, "sending request");

        let response = self.http_client.get(&url).send().await?;
        self.increment_request_count();

        let status = response.status();
        let body = response.bytes().await?;

        if status.is_client_error() || status.is_server_error() {
            return Err(parse_error_response(status, &body));
        }

        Ok(serde_json::from_slice(&body)?)
    }

    /// Verifies we haven't exceeded the rate limit.
    fn check_rate_limit(&self) -> Result<()> {
        let mut state = self.rate_limit_state.lock();

        if state.window_start.elapsed() > RATE_LIMIT_WINDOW {
            self.request_count.store(0, Ordering::SeqCst);
            state.window_start = Instant::now();
        }

        let current = self.request_count.load(Ordering::SeqCst);
        if current >= self.config.rate_limit {
            return Err(IngestError::RateLimited {
                current,
                limit: self.config.rate_limit,
            });
        }

        Ok(())
    }

    fn increment_request_count(&self) {
        self.request_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns the maximum requests per minute.
    #[cfg(test)]
    pub fn rate_limit(&self) -> i64 {
        self.config.rate_limit
    }
}

/// Creates an Api error from an error response, using the venue's message
/// when the body carries one.
fn parse_error_response(status: StatusCode, body: &[u8]) -> IngestError {
    #[derive(Deserialize)]
    struct ErrorResponse {
        #[serde(alias = "msg")]
        message: Option<String>,
    }

    let message = serde_json::from_slice::<ErrorResponse>(body)
        .ok()
        .and_then(|r| r.message)
        .unwrap_or_else(|| String::from_utf8_lossy(body).to_string());

    warn!(status = status.as_u16(), message = %message, "api error");

    IngestError::Api {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(rate_limit: Option<i32>) -> RestClient {
        RestClient::new(ClientConfig::new("https://api.example.com/", rate_limit)).unwrap()
    }

    #[test]
    fn test_url_building() {
        let client = client(None);
        assert_eq!(
            client.url("/api/v3/ticker/24hr", &[("symbol", "BTCUSDT")]),
            "https://api.example.com/api/v3/ticker/24hr?symbol=BTCUSDT"
        );
        assert_eq!(
            client.url("/v2/prices/BTC-USD/spot", &[]),
            "https://api.example.com/v2/prices/BTC-USD/spot"
        );
        assert_eq!(
            client.url("/x", &[("pair", "a b")]),
            "https://api.example.com/x?pair=a%20b"
        );
    }

    #[test]
    fn test_rate_limit_defaults() {
        assert_eq!(client(None).rate_limit(), DEFAULT_RATE_LIMIT);
        assert_eq!(client(Some(0)).rate_limit(), DEFAULT_RATE_LIMIT);
        assert_eq!(client(Some(30)).rate_limit(), 30);
    }

    #[test]
    fn test_rate_limit_exceeded() {
        let client = client(Some(2));
        assert!(client.check_rate_limit().is_ok());
        client.increment_request_count();
        client.increment_request_count();

        let err = client.check_rate_limit().unwrap_err();
        assert!(matches!(
            err,
            IngestError::RateLimited {
                current: 2,
                limit: 2
            }
        ));
    }

    #[test]
    fn test_error_response_message() {
        let err = parse_error_response(
            StatusCode::BAD_REQUEST,
            br#"{"code":-1121,"msg":"Invalid symbol."}"#,
        );
        match err {
            IngestError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid symbol.");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = parse_error_response(StatusCode::BAD_GATEWAY, b"upstream down");
        assert!(matches!(err, IngestError::Api { status: 502, ref message } if message == "upstream down"));
    }
}
