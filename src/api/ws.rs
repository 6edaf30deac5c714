//! WebSocket push feeds for opportunities and live prices.

use std::collections::HashSet;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::AppState;
use crate::feed::{FeedMessage, QuoteMessage};

pub(super) async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let publisher = state.engine.publisher();

    // Subscribe before taking the snapshot so nothing falls in between
    let (id, mut rx) = publisher.subscribe_channel(state.subscriber_queue);
    info!(subscription = %id, "WebSocket client connected");

    let catch_up = publisher.snapshot(state.engine.ledger_capacity());
    let mut seen: HashSet<String> = catch_up.iter().map(|o| o.id.clone()).collect();

    if send(&mut socket, &FeedMessage::catch_up(catch_up)).await {
        loop {
            tokio::select! {
                pushed = rx.recv() => {
                    let Some(opportunity) = pushed else {
                        warn!(subscription = %id, "Subscriber queue dropped, closing socket");
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    };
                    if seen.remove(&opportunity.id) {
                        continue;
                    }
                    if !send(&mut socket, &FeedMessage::push(opportunity)).await {
                        break;
                    }
                }
                incoming = socket.recv() => {
                    if !answer(&mut socket, incoming).await {
                        break;
                    }
                }
            }
        }
    }

    publisher.unsubscribe(id);
    info!(subscription = %id, "WebSocket client disconnected");
}

pub(super) async fn quotes_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_quotes_socket(socket, state))
}

async fn handle_quotes_socket(mut socket: WebSocket, state: AppState) {
    let mut rx = state.engine.subscribe_quotes();
    debug!("Live price client connected");

    // A replayed quote is harmless: clients keep the latest per venue
    let catch_up = QuoteMessage::CatchUp(state.engine.quotes(None));
    if send(&mut socket, &catch_up).await {
        loop {
            tokio::select! {
                received = rx.recv() => {
                    match received {
                        Ok(quote) => {
                            if !send(&mut socket, &QuoteMessage::Push { quote }).await {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(missed)) => {
                            warn!(missed = missed, "Live price client too slow, closing socket");
                            let _ = socket.send(Message::Close(None)).await;
                            break;
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
                incoming = socket.recv() => {
                    if !answer(&mut socket, incoming).await {
                        break;
                    }
                }
            }
        }
    }

    debug!("Live price client disconnected");
}

/// Handles one client frame. Returns false when the connection should end.
async fn answer(
    socket: &mut WebSocket,
    incoming: Option<Result<Message, axum::Error>>,
) -> bool {
    match incoming {
        Some(Ok(Message::Text(text))) if text.trim() == "ping" => socket
            .send(Message::Text("pong".to_string()))
            .await
            .is_ok(),
        Some(Ok(Message::Close(_))) | None => false,
        Some(Ok(_)) => true,
        Some(Err(e)) => {
            debug!(error = %e, "WebSocket receive error");
            false
        }
    }
}

/// Sends one feed message. Returns false once the socket is gone.
async fn send<M: Serialize>(socket: &mut WebSocket, message: &M) -> bool {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Failed to serialize feed message");
            return true;
        }
    };
    socket.send(Message::Text(text)).await.is_ok()
}
