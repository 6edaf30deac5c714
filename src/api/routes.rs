//! JSON route handlers.

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState};
use crate::domain::{Opportunity, Quote};
use crate::engine::Evaluation;
use crate::ingestion::{SourceHealth, SourceStatus};
use crate::storage::{OpportunityStorage, QuoteStorage, Storage};

/// Default page of persisted history.
const DEFAULT_HISTORY_LIMIT: usize = 100;
/// Upper bound on persisted history per request.
const MAX_HISTORY_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub(super) struct QuoteQuery {
    instrument: Option<String>,
}

/// Paging and filter parameters shared by the list endpoints.
#[derive(Debug, Deserialize)]
pub(super) struct ListQuery {
    limit: Option<usize>,
    instrument: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct HealthResponse {
    status: SourceStatus,
    version: &'static str,
    uptime_secs: i64,
    quotes: usize,
    opportunities: usize,
    ledger_capacity: usize,
    subscribers: usize,
    storage: bool,
    sources: BTreeMap<String, SourceHealth>,
}

#[derive(Debug, Serialize)]
pub(super) struct QuotesResponse {
    quotes: Vec<Quote>,
    /// Current best spread per instrument with at least two venues.
    spreads: Vec<Evaluation>,
}

fn normalize(instrument: Option<String>) -> Option<String> {
    instrument
        .map(|i| i.trim().to_uppercase())
        .filter(|i| !i.is_empty())
}

fn checked_limit(limit: Option<usize>, default: usize, max: usize) -> Result<usize, ApiError> {
    match limit {
        Some(0) => Err(ApiError::BadRequest("limit must be positive".into())),
        Some(limit) => Ok(limit.min(max)),
        None => Ok(default.min(max)),
    }
}

pub(super) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine = &state.engine;
    Json(HealthResponse {
        status: state.health.overall(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        quotes: engine.quotes(None).len(),
        opportunities: engine.ledger_len(),
        ledger_capacity: engine.ledger_capacity(),
        subscribers: engine.publisher().subscriber_count(),
        storage: state.storage.is_some(),
        sources: state.health.snapshot(),
    })
}

pub(super) async fn quotes(
    State(state): State<AppState>,
    Query(params): Query<QuoteQuery>,
) -> Json<QuotesResponse> {
    let instrument = normalize(params.instrument);
    let quotes = state.engine.quotes(instrument.as_deref());

    let mut instruments: Vec<&str> = quotes.iter().map(|q| q.instrument.as_str()).collect();
    instruments.dedup();
    let spreads = instruments
        .into_iter()
        .filter_map(|i| state.engine.evaluation(i))
        .collect();

    Json(QuotesResponse { quotes, spreads })
}

/// Live feed from the in-memory ledger, newest first.
pub(super) async fn opportunities(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<Opportunity>>, ApiError> {
    let capacity = state.engine.ledger_capacity();
    let limit = checked_limit(params.limit, capacity, capacity)?;
    let instrument = normalize(params.instrument);

    Ok(Json(state.engine.recent(limit, instrument.as_deref())))
}

fn history_storage(state: &AppState) -> Result<&dyn Storage, ApiError> {
    state
        .storage
        .as_deref()
        .ok_or_else(|| ApiError::Unavailable("history storage is disabled".into()))
}

/// Persisted opportunities, newest first.
pub(super) async fn history(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<Opportunity>>, ApiError> {
    let storage = history_storage(&state)?;
    let limit = checked_limit(params.limit, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT)? as u32;

    let opportunities = match normalize(params.instrument) {
        Some(instrument) => storage.get_by_instrument(&instrument, limit).await?,
        None => storage.recent(limit).await?,
    };

    Ok(Json(opportunities))
}

/// Recorded prices, newest first.
pub(super) async fn quote_history(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<Quote>>, ApiError> {
    let storage = history_storage(&state)?;
    let limit = checked_limit(params.limit, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT)? as u32;
    let instrument = normalize(params.instrument);

    Ok(Json(
        storage.price_history(instrument.as_deref(), limit).await?,
    ))
}
