use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"degraded"` when the database does not answer.
    pub status: &'static str,
    pub version: &'static str,
    /// Which lock store backs the coordinator: `"postgres"` or `"memory"`.
    pub store: &'static str,
    /// Absent when running in memory.
    pub db_healthy: Option<bool>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (store, db_healthy) = match &state.pool {
        Some(pool) => ("postgres", Some(editlock_db::health_check(pool).await.is_ok())),
        None => ("memory", None),
    };

    Json(HealthResponse {
        status: if db_healthy == Some(false) { "degraded" } else { "ok" },
        version: env!("CARGO_PKG_VERSION"),
        store,
        db_healthy,
    })
}

/// `GET /health`, mounted at the root rather than under the API prefix.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
