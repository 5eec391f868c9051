//! Shared response envelope types for API handlers.
//!
//! All successful responses use a `{ "data": ... }` envelope. Use
//! [`DataResponse`] instead of ad-hoc `serde_json::json!({ "data": ... })`.
//! The type lives in `editlock_core::protocol` so the client decodes the very
//! same shape.

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

pub use editlock_core::protocol::DataResponse;

/// Wrap `data` in the envelope with an explicit status, for protocol
/// outcomes that are not 200 (409 conflicts, 404 unknown records).
pub fn with_status<T: Serialize>(status: StatusCode, data: T) -> (StatusCode, Json<DataResponse<T>>) {
    (status, Json(DataResponse { data }))
}
