//! Handler for saving a lockable record.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use editlock_core::conflict::SaveOutcome;
use editlock_core::protocol::SaveRequest;
use editlock_core::types::{DbId, RecordId};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::with_status;
use crate::state::AppState;

/// POST /api/v1/records/{entity_type}/{entity_id}/save
///
/// 200 with the new version token, or 409 with the conflict classification.
/// `"force": true` re-takes the lease for this session first.
pub async fn save_record(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, DbId)>,
    Json(input): Json<SaveRequest>,
) -> AppResult<impl IntoResponse> {
    let record_id = RecordId::new(entity_type, entity_id)?;

    let outcome = if input.force {
        state
            .coordinator
            .force_save(&record_id, auth.user_id, &input.attempt)
            .await?
    } else {
        state
            .coordinator
            .save(&record_id, auth.user_id, &input.attempt)
            .await?
    };

    let status = match &outcome {
        SaveOutcome::Saved { .. } => StatusCode::OK,
        SaveOutcome::Rejected(_) => StatusCode::CONFLICT,
    };
    Ok(with_status(status, outcome))
}
