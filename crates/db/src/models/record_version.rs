//! Row model for the `record_versions` table.

use editlock_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `record_versions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RecordVersionRow {
    pub entity_type: String,
    pub entity_id: DbId,
    pub version_token: String,
    pub updated_at: Timestamp,
}
