//! Handlers for `/admin/locks`.
//!
//! All handlers require the `admin` role via [`RequireAdmin`].

use axum::extract::{Path, State};
use axum::Json;
use editlock_core::lock::LockRecord;
use editlock_core::types::{DbId, RecordId};
use serde::Serialize;

use crate::error::AppResult;
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ForceUnlockResponse {
    /// Whether a lock row existed and was removed.
    pub removed: bool,
}

/// GET /api/v1/admin/locks
pub async fn list_locks(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<LockRecord>>>> {
    let locks = state.coordinator.list_live().await?;
    Ok(Json(DataResponse { data: locks }))
}

/// POST /api/v1/admin/locks/{entity_type}/{entity_id}/force-unlock
pub async fn force_unlock(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, DbId)>,
) -> AppResult<Json<DataResponse<ForceUnlockResponse>>> {
    let record_id = RecordId::new(entity_type, entity_id)?;
    let removed = state.coordinator.force_unlock(&record_id).await?;

    tracing::info!(
        admin_id = admin.user_id,
        record = %record_id,
        removed,
        "Admin force-unlocked record"
    );

    Ok(Json(DataResponse {
        data: ForceUnlockResponse { removed },
    }))
}
