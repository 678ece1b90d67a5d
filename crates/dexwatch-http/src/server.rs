//! Route handlers and server plumbing.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use dexwatch_core::CurrencyLeg;
use dexwatch_store::{HistoryFilter, OfferDb, OfferFilter};
use dexwatch_telemetry::ProcessState;
use dexwatch_tracker::{PairTracker, Window, DEFAULT_TOP_K};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<OfferDb>,
    pub tracker: Arc<PairTracker>,
    pub process_state: Arc<ProcessState>,
}

/// Build the router with all facade routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/top-pairs", get(top_pairs))
        .route("/api/xrp-pairs", get(xrp_pairs))
        .route("/api/pair-stats", get(pair_stats))
        .route("/api/memory-stats", get(memory_stats))
        .route("/api/offers", get(offers))
        .route("/api/offer-history", get(offer_history))
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn run_server(
    state: AppState,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "starting read facade");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Reject reads while the backfill gate is closed.
fn ensure_ready(state: &AppState) -> Result<(), Response> {
    if state.process_state.backfill_in_progress() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "message": "backfill in progress, please try again soon" })),
        )
            .into_response());
    }
    Ok(())
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message })),
    )
        .into_response()
}

fn internal_error(error: impl std::fmt::Display) -> Response {
    tracing::error!(error = %error, "facade read failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal server error" })),
    )
        .into_response()
}

async fn health(State(state): State<AppState>) -> Response {
    // Refresh store connectivity at health time so operators see the
    // current truth, not the last cached probe.
    state.process_state.set_store_connected(state.db.ping());
    Json(state.process_state.health()).into_response()
}

#[derive(Debug, Deserialize)]
struct WindowQuery {
    #[serde(default)]
    window: Option<String>,
    #[serde(default)]
    k: Option<usize>,
}

impl WindowQuery {
    fn window(&self) -> Result<Window, Response> {
        let raw = self.window.as_deref().unwrap_or("24h");
        Window::parse(raw).ok_or_else(|| bad_request("window must be one of 10m, 1h, 24h"))
    }

    fn k(&self) -> usize {
        self.k.unwrap_or(DEFAULT_TOP_K)
    }
}

async fn top_pairs(State(state): State<AppState>, Query(query): Query<WindowQuery>) -> Response {
    if let Err(resp) = ensure_ready(&state) {
        return resp;
    }
    let window = match query.window() {
        Ok(window) => window,
        Err(resp) => return resp,
    };
    Json(state.tracker.top_k(window, query.k())).into_response()
}

async fn xrp_pairs(State(state): State<AppState>, Query(query): Query<WindowQuery>) -> Response {
    if let Err(resp) = ensure_ready(&state) {
        return resp;
    }
    let window = match query.window() {
        Ok(window) => window,
        Err(resp) => return resp,
    };
    Json(state.tracker.top_k_xrp_pairs(window, query.k())).into_response()
}

#[derive(Debug, Deserialize)]
struct PairStatsQuery {
    taker_gets_currency: String,
    #[serde(default)]
    taker_gets_issuer: Option<String>,
    taker_pays_currency: String,
    #[serde(default)]
    taker_pays_issuer: Option<String>,
}

async fn pair_stats(
    State(state): State<AppState>,
    Query(query): Query<PairStatsQuery>,
) -> Response {
    if let Err(resp) = ensure_ready(&state) {
        return resp;
    }
    let gets = CurrencyLeg::new(query.taker_gets_currency, query.taker_gets_issuer);
    let pays = CurrencyLeg::new(query.taker_pays_currency, query.taker_pays_issuer);
    Json(state.tracker.pair_stats(&gets, &pays)).into_response()
}

async fn memory_stats(State(state): State<AppState>) -> Response {
    if let Err(resp) = ensure_ready(&state) {
        return resp;
    }
    Json(state.tracker.memory_stats()).into_response()
}

#[derive(Debug, Deserialize)]
struct OffersQuery {
    #[serde(default)]
    account: Option<String>,
    #[serde(default)]
    taker_gets_currency: Option<String>,
    #[serde(default)]
    taker_pays_currency: Option<String>,
    #[serde(default)]
    sort: Option<String>,
    #[serde(default)]
    order: Option<String>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    offset: Option<u32>,
}

async fn offers(State(state): State<AppState>, Query(query): Query<OffersQuery>) -> Response {
    if let Err(resp) = ensure_ready(&state) {
        return resp;
    }
    let filter = OfferFilter {
        account: query.account,
        taker_gets_currency: query.taker_gets_currency,
        taker_pays_currency: query.taker_pays_currency,
        sort: query.sort,
        ascending: query.order.as_deref() == Some("asc"),
        limit: query.limit,
        offset: query.offset,
    };
    match state.db.list_offers(&filter) {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    offer_id: Option<String>,
    #[serde(default)]
    account: Option<String>,
    #[serde(default)]
    event_type: Option<String>,
    #[serde(default)]
    sort: Option<String>,
    #[serde(default)]
    order: Option<String>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    offset: Option<u32>,
}

async fn offer_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    if let Err(resp) = ensure_ready(&state) {
        return resp;
    }
    let filter = HistoryFilter {
        offer_id: query.offer_id,
        account: query.account,
        event_type: query.event_type,
        sort: query.sort,
        ascending: query.order.as_deref() == Some("asc"),
        limit: query.limit,
        offset: query.offset,
    };
    match state.db.list_history(&filter) {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => internal_error(e),
    }
}
