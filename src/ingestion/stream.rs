//! Binance ticker stream over WebSocket.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use super::{
    BackoffPolicy, ConnectionMachine, HealthRegistry, IngestError, display_name, venue_symbol,
};
use crate::config::VenueConfig;
use crate::domain::Quote;

/// Binance combined stream endpoint.
const STREAM_URL: &str = "wss://stream.binance.com:9443/stream";

/// Default interval to send ping frames.
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(20);

/// Default bound for the connect and upgrade handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Missed ping intervals before a silent connection is dropped.
const IDLE_PING_INTERVALS: u32 = 3;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why a connection ended.
#[derive(Debug)]
enum Exit {
    Shutdown,
    ChannelClosed,
    Failed(IngestError),
}

/// Combined stream envelope: `{"stream":"btcusdt@ticker","data":{...}}`.
#[derive(Debug, Deserialize)]
struct CombinedMessage {
    data: TickerEvent,
}

/// 24hr ticker event. Only the fields we use are decoded.
#[derive(Debug, Deserialize)]
struct TickerEvent {
    /// Event time, ms since epoch.
    #[serde(rename = "E")]
    event_time: i64,
    #[serde(rename = "s")]
    symbol: String,
    /// Last price.
    #[serde(rename = "c")]
    last_price: String,
    /// 24h change percent.
    #[serde(rename = "P")]
    change_percent: Option<String>,
}

/// TickerStream pushes quotes from a streaming venue and reconnects with
/// backoff whenever the connection drops.
pub struct TickerStream {
    name: String,
    base_url: String,
    /// Upper-case venue symbol to instrument.
    instruments: HashMap<String, String>,
    ping_interval: Duration,
    connect_timeout: Duration,
    idle_timeout: Duration,
    machine: ConnectionMachine,
    health: Arc<HealthRegistry>,
}

impl TickerStream {
    pub fn from_config(
        key: &str,
        venue: &VenueConfig,
        instruments: &[String],
        health: Arc<HealthRegistry>,
    ) -> Self {
        let ws = venue.websocket.as_ref();

        let ping_interval = ws
            .map(|w| w.ping_interval)
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_PING_INTERVAL);

        let instruments = instruments
            .iter()
            .map(|i| (venue_symbol("binance", i, &venue.symbols).to_uppercase(), i.clone()))
            .collect();

        Self {
            name: display_name(key),
            base_url: ws
                .and_then(|w| w.url.clone())
                .unwrap_or_else(|| STREAM_URL.to_string()),
            instruments,
            ping_interval,
            connect_timeout: ws
                .map(|w| w.connect_timeout)
                .filter(|d| !d.is_zero())
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            idle_timeout: ws
                .map(|w| w.idle_timeout)
                .filter(|d| !d.is_zero())
                .unwrap_or(ping_interval * IDLE_PING_INTERVALS),
            machine: ConnectionMachine::new(BackoffPolicy::from_config(ws)),
            health,
        }
    }

    /// Combined stream URL subscribing to every instrument's ticker.
    pub fn stream_url(&self) -> String {
        let mut streams: Vec<String> = self
            .instruments
            .keys()
            .map(|s| format!("{}@ticker", s.to_lowercase()))
            .collect();
        streams.sort();
        format!("{}?streams={}", self.base_url, streams.join("/"))
    }

    fn set_state(&self) {
        self.health.set_connection(&self.name, self.machine.state());
    }

    /// Connects, reads and reconnects until shutdown or the quote channel
    /// closes.
    pub async fn run(mut self, tx: mpsc::Sender<Quote>, mut shutdown: watch::Receiver<bool>) {
        self.health.register(&self.name);
        let url = self.stream_url();

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.machine.begin_connect();
            self.set_state();
            info!(venue = %self.name, url = %url, "Connecting to stream");

            let connected = tokio::select! {
                result = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str())) => result,
                _ = shutdown_requested(&mut shutdown) => break,
            };

            let exit = match connected {
                Ok(Ok((ws, _response))) => {
                    self.machine.on_open();
                    self.set_state();
                    self.health.record_success(&self.name);
                    info!(venue = %self.name, "Stream connected");
                    self.read_loop(ws, &tx, &mut shutdown).await
                }
                Ok(Err(e)) => Exit::Failed(IngestError::Connection(e.to_string())),
                Err(_) => Exit::Failed(IngestError::Connection(format!(
                    "connect timed out after {:?}",
                    self.connect_timeout
                ))),
            };

            let reason = match exit {
                Exit::Shutdown => break,
                Exit::ChannelClosed => {
                    warn!(venue = %self.name, "Quote channel closed");
                    break;
                }
                Exit::Failed(e) => e.to_string(),
            };

            self.health.record_failure(&self.name, &reason);
            let Some(delay) = self.machine.on_failure() else {
                break;
            };
            self.set_state();
            warn!(
                venue = %self.name,
                reason = %reason,
                delay = ?delay,
                failures = self.machine.failures(),
                "Stream disconnected, backing off"
            );

            if wait_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }

        self.machine.shutdown();
        self.set_state();
        info!(venue = %self.name, "Stream stopped");
    }

    async fn read_loop(
        &self,
        ws: WsStream,
        tx: &mpsc::Sender<Quote>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Exit {
        let (mut sink, mut stream) = ws.split();
        let mut ping = tokio::time::interval(self.ping_interval);
        // First tick fires immediately
        ping.tick().await;
        let mut last_seen = Instant::now();

        loop {
            tokio::select! {
                msg = stream.next() => {
                    if matches!(msg, Some(Ok(_))) {
                        last_seen = Instant::now();
                    }
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            let Some(quote) = parse_message(&self.name, &self.instruments, &text) else {
                                continue;
                            };
                            if tx.send(quote).await.is_err() {
                                return Exit::ChannelClosed;
                            }
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            return disconnected(format!("closed by server: {:?}", frame));
                        }
                        Some(Ok(_)) => {
                            // Ping, Pong, Binary
                        }
                        Some(Err(e)) => return disconnected(e.to_string()),
                        None => return disconnected("stream ended".to_string()),
                    }
                }
                _ = ping.tick() => {
                    if let Err(e) = sink.send(WsMessage::Ping(Vec::new().into())).await {
                        return disconnected(format!("ping failed: {}", e));
                    }
                    debug!(venue = %self.name, "ping sent");
                }
                _ = tokio::time::sleep_until(last_seen + self.idle_timeout) => {
                    return disconnected(format!("idle timeout after {:?}", self.idle_timeout));
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let _ = sink.close().await;
                        return Exit::Shutdown;
                    }
                }
            }
        }
    }
}

fn disconnected(reason: String) -> Exit {
    Exit::Failed(IngestError::Connection(reason))
}

/// Resolves once shutdown is requested or the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Sleeps for `delay`. Returns true if shutdown was requested meanwhile.
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// Parses a combined-stream ticker message into a quote.
/// Returns None for anything else (subscription acks, unknown symbols).
fn parse_message(venue: &str, instruments: &HashMap<String, String>, text: &str) -> Option<Quote> {
    let msg: CombinedMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            debug!(error = %e, "not a ticker message");
            return None;
        }
    };
    let event = msg.data;

    let instrument = instruments.get(&event.symbol.to_uppercase())?;
    let price: f64 = event.last_price.trim().parse().ok()?;
    let observed_at = DateTime::from_timestamp_millis(event.event_time).unwrap_or_else(Utc::now);

    let mut quote = Quote::new(venue, instrument.as_str(), price, observed_at);
    if let Some(change) = event
        .change_percent
        .as_deref()
        .and_then(|c| c.trim().parse::<f64>().ok())
    {
        quote = quote.with_change_24h(change);
    }
    Some(quote)
}
