use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::scheduler::{CycleReport, PollScheduler, SourceStatus};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<PollScheduler>,
    pub started_at: DateTime<Utc>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/check", post(check))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Serialize)]
struct StatusResponse {
    uptime_secs: i64,
    sources: Vec<SourceStatus>,
}

/// Cached per-source versions, optionally refreshed with a live fetch
/// (`?live=1`). A live fetch never touches the version store.
async fn status(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<StatusResponse> {
    let live = q
        .get("live")
        .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes"));
    let sources = state.scheduler.status(live).await;
    Json(StatusResponse {
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        sources,
    })
}

/// Manual trigger. Same detection semantics as a scheduled tick; reports
/// success/failure per source, including delivery errors. If a cycle is
/// already running the report comes back as `skipped`.
async fn check(State(state): State<AppState>) -> Json<CycleReport> {
    Json(state.scheduler.trigger_manual_check().await)
}
