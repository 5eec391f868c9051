//! Handlers for the `/locks` resource.
//!
//! The authenticated user is always the requester. Lock-state outcomes are
//! returned in the `data` envelope; only infrastructure failures are errors.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use editlock_core::lock::{LockStatus, LockView, RefreshOutcome};
use editlock_core::types::{DbId, RecordId};
use serde::Serialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::{with_status, DataResponse};
use crate::state::AppState;

/// `GET /locks/{entity_type}/{entity_id}` payload: the raw status plus how
/// it looks to the caller.
#[derive(Debug, Serialize)]
pub struct LockStatusResponse {
    #[serde(flatten)]
    pub status: LockStatus,
    pub view: LockView,
}

/// POST /api/v1/locks/{entity_type}/{entity_id}/acquire
pub async fn acquire_lock(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, DbId)>,
) -> AppResult<impl IntoResponse> {
    let record_id = RecordId::new(entity_type, entity_id)?;
    let outcome = state.coordinator.acquire(&record_id, auth.user_id).await?;
    Ok(Json(DataResponse { data: outcome }))
}

/// POST /api/v1/locks/{entity_type}/{entity_id}/refresh
///
/// 200 when refreshed (including a re-take of a lapsed or missing lease),
/// 409 when another user holds the lock.
pub async fn refresh_lock(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, DbId)>,
) -> AppResult<impl IntoResponse> {
    let record_id = RecordId::new(entity_type, entity_id)?;
    let outcome = state.coordinator.refresh(&record_id, auth.user_id).await?;

    let status = match &outcome {
        RefreshOutcome::Refreshed(_) => StatusCode::OK,
        RefreshOutcome::Conflict(_) => StatusCode::CONFLICT,
        RefreshOutcome::NotFound => StatusCode::NOT_FOUND,
    };
    Ok(with_status(status, outcome))
}

/// POST /api/v1/locks/{entity_type}/{entity_id}/release
///
/// Releasing a lock the caller does not hold is reported, not rejected.
pub async fn release_lock(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, DbId)>,
) -> AppResult<impl IntoResponse> {
    let record_id = RecordId::new(entity_type, entity_id)?;
    let outcome = state.coordinator.release(&record_id, auth.user_id).await?;
    Ok(Json(DataResponse { data: outcome }))
}

/// GET /api/v1/locks/{entity_type}/{entity_id}
pub async fn get_lock_status(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, DbId)>,
) -> AppResult<impl IntoResponse> {
    let record_id = RecordId::new(entity_type, entity_id)?;
    let status = state.coordinator.inspect(&record_id).await?;
    let view = status.view_for(auth.user_id);
    Ok(Json(DataResponse {
        data: LockStatusResponse { status, view },
    }))
}
