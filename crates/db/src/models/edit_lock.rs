//! Row model for the `edit_locks` table.

use editlock_core::lock::LockRecord;
use editlock_core::types::{DbId, RecordId, Timestamp, VersionToken};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `edit_locks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EditLockRow {
    pub entity_type: String,
    pub entity_id: DbId,
    pub holder_id: DbId,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
    pub version_token: Option<String>,
}

impl From<EditLockRow> for LockRecord {
    fn from(row: EditLockRow) -> Self {
        LockRecord {
            record_id: RecordId {
                entity_type: row.entity_type,
                entity_id: row.entity_id,
            },
            holder: row.holder_id,
            acquired_at: row.acquired_at,
            expires_at: row.expires_at,
            version_token: row.version_token.map(VersionToken),
        }
    }
}
