//! Signal service: a synchronous request/response HTTP surface backed by a
//! single `axum::Router` built from an `Arc<AppState>`, permissive CORS,
//! and JSON responses built with `serde_json::json!` for ad-hoc shapes.
//! Every route here is public; no authentication surface is exposed.

use crate::errors::MarketDataError;
use crate::inference::engine::InferenceEngine;
use crate::infrastructure::market_data::MarketDataClient;
use crate::settings::{Settings, Timeframe};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

/// Shared, read-only (aside from the request counter) state for every
/// request; the request counter is the only mutable state here.
pub struct AppState {
    market_data: Arc<MarketDataClient>,
    engine: Arc<InferenceEngine>,
    seq_len: usize,
    request_count: AtomicU64,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        market_data: Arc<MarketDataClient>,
        engine: Arc<InferenceEngine>,
        settings: &Settings,
    ) -> Self {
        Self {
            market_data,
            engine,
            seq_len: settings.seq_len,
            request_count: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }
}

/// Builds the full router: `/signal`, `/healthz`, `/metrics`, `/` — all
/// public, CORS permissive.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(banner))
        .route("/signal", get(signal))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .layer(cors)
        .with_state(state)
}

async fn banner() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "nirvana-signal-service",
        "endpoints": ["/signal", "/healthz", "/metrics", "/"],
    }))
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "model_loaded": !state.engine.is_degraded(),
        "model_id": state.engine.model_id(),
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "total_requests": state.request_count.load(Ordering::Relaxed),
        "cache_hits": 0,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "last_model_update": state.engine.trained_at(),
        "model_id": state.engine.model_id(),
        "model_loaded": !state.engine.is_degraded(),
    }))
}

#[derive(Debug, Deserialize)]
struct SignalQuery {
    symbol: String,
    timeframe: String,
    #[serde(default)]
    uncertainty: bool,
}

/// `GET /signal?symbol=X&timeframe=T&uncertainty=bool`: fetches
/// `seq_len + 100` candles, runs inference, and returns the Signal plus
/// latency. Increments the request counter on every call, success or
/// failure.
async fn signal(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SignalQuery>,
) -> Response {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();

    let timeframe = match Timeframe::from_str(&params.timeframe) {
        Ok(tf) => tf,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    let warmup_candles = (state.seq_len + 100) as u32;
    let candles = match state
        .market_data
        .get_klines(&params.symbol, timeframe, warmup_candles)
        .await
    {
        Ok(c) => c,
        Err(e) => return market_data_error_response(e),
    };

    let result = state.engine.predict(candles.as_slice(), params.uncertainty);
    match result {
        Ok(sig) => {
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            Json(serde_json::json!({
                "symbol": params.symbol,
                "timeframe": params.timeframe,
                "signal": sig,
                "latency_ms": latency_ms,
            }))
            .into_response()
        }
        Err(e) => market_data_error_response(e),
    }
}

/// Maps the pipeline's error taxonomy onto HTTP status codes: insufficient
/// data is the caller's fault (400), anything upstream is a server-side
/// failure (502/503).
fn market_data_error_response(e: MarketDataError) -> Response {
    match e {
        MarketDataError::InsufficientData { got, need } => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": format!("got {got}, need {need}"),
            })),
        )
            .into_response(),
        MarketDataError::UpstreamClient { status, body } => {
            warn!(status, "upstream rejected request");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": body })),
            )
                .into_response()
        }
        MarketDataError::UpstreamUnavailable { reason, .. } => {
            warn!("upstream unavailable: {reason}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": reason })),
            )
                .into_response()
        }
    }
}
