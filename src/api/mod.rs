//! HTTP and WebSocket surface over the engine.
//!
//! `GET /health`, `GET /quotes`, `GET /quotes/history`, `GET /opportunities`
//! and `GET /opportunities/history` return JSON. `GET /ws/opportunities` and
//! `GET /ws/quotes` upgrade to push feeds that start with a catch-up array.

mod routes;
mod ws;

use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::engine::Engine;
use crate::ingestion::HealthRegistry;
use crate::storage::{Storage, StorageError};

/// Default queue size for a WebSocket subscriber.
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 64;

/// Default address the API binds to.
pub const DEFAULT_BIND: &str = "0.0.0.0:8000";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub health: Arc<HealthRegistry>,
    /// Persisted history, absent when storage is disabled.
    pub storage: Option<Arc<dyn Storage>>,
    pub subscriber_queue: usize,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, health: Arc<HealthRegistry>) -> Self {
        Self {
            engine,
            health,
            storage: None,
            subscriber_queue: DEFAULT_SUBSCRIBER_QUEUE,
            started_at: Utc::now(),
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_subscriber_queue(mut self, size: usize) -> Self {
        self.subscriber_queue = size.max(1);
        self
    }
}

/// Builds the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/quotes", get(routes::quotes))
        .route("/quotes/history", get(routes::quote_history))
        .route("/opportunities", get(routes::opportunities))
        .route("/opportunities/history", get(routes::history))
        .route("/ws/opportunities", get(ws::handler))
        .route("/ws/quotes", get(ws::quotes_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the API until shutdown is signalled.
pub async fn serve(
    bind: &str,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "API server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    info!("API server stopped");
    Ok(())
}

/// ApiError is returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Storage(err) => {
                error!(error = %err, "Storage error while serving request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
