//! Wire shapes shared by the HTTP server and its client.
//!
//! Success bodies are wrapped in `{ "data": ... }`; failures are
//! `{ "error": ..., "code": ... }`.

use serde::{Deserialize, Serialize};

use crate::conflict::SaveAttempt;
use crate::types::RecordId;

/// Path prefix of every versioned endpoint.
pub const API_PREFIX: &str = "/api/v1";

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

/// Body of every non-2xx response that is not a protocol outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

/// Request body for `POST /records/{entity_type}/{entity_id}/save`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SaveRequest {
    #[serde(flatten)]
    pub attempt: SaveAttempt,
    /// Re-take the lease for this session before saving.
    #[serde(default)]
    pub force: bool,
}

/// How a release must be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseMode {
    /// The caller does not continue until the coordinator has processed it
    /// (page unload).
    Blocking,
    /// Fire and forget; a lost release only delays reclaim until expiry.
    BestEffort,
}

/// `/api/v1/locks/{entity_type}/{entity_id}[/{action}]`
pub fn lock_path(record_id: &RecordId, action: Option<&str>) -> String {
    let base = format!(
        "{API_PREFIX}/locks/{}/{}",
        record_id.entity_type, record_id.entity_id
    );
    match action {
        Some(action) => format!("{base}/{action}"),
        None => base,
    }
}

/// `/api/v1/records/{entity_type}/{entity_id}/save`
pub fn save_path(record_id: &RecordId) -> String {
    format!(
        "{API_PREFIX}/records/{}/{}/save",
        record_id.entity_type, record_id.entity_id
    )
}
