//! Repository for the `record_versions` table.

use async_trait::async_trait;
use editlock_core::store::{StoreError, VersionStore};
use editlock_core::types::{RecordId, VersionToken};
use sqlx::PgPool;

use crate::models::record_version::RecordVersionRow;

use super::unavailable;

pub struct RecordVersionRepo;

impl RecordVersionRepo {
    pub async fn find(
        pool: &PgPool,
        record_id: &RecordId,
    ) -> Result<Option<RecordVersionRow>, sqlx::Error> {
        sqlx::query_as::<_, RecordVersionRow>(
            "SELECT entity_type, entity_id, version_token, updated_at FROM record_versions \
             WHERE entity_type = $1 AND entity_id = $2",
        )
        .bind(&record_id.entity_type)
        .bind(record_id.entity_id)
        .fetch_optional(pool)
        .await
    }

    /// Insert or replace the version of a record.
    pub async fn upsert(
        pool: &PgPool,
        record_id: &RecordId,
        token: &VersionToken,
    ) -> Result<RecordVersionRow, sqlx::Error> {
        sqlx::query_as::<_, RecordVersionRow>(
            "INSERT INTO record_versions (entity_type, entity_id, version_token) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (entity_type, entity_id) \
             DO UPDATE SET version_token = EXCLUDED.version_token, updated_at = NOW() \
             RETURNING entity_type, entity_id, version_token, updated_at",
        )
        .bind(&record_id.entity_type)
        .bind(record_id.entity_id)
        .bind(token.as_str())
        .fetch_one(pool)
        .await
    }
}

/// [`VersionStore`] backed by the `record_versions` table.
#[derive(Debug, Clone)]
pub struct PgVersionStore {
    pool: PgPool,
}

impl PgVersionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VersionStore for PgVersionStore {
    async fn current(&self, record_id: &RecordId) -> Result<Option<VersionToken>, StoreError> {
        let row = RecordVersionRepo::find(&self.pool, record_id)
            .await
            .map_err(unavailable)?;
        Ok(row.map(|r| VersionToken(r.version_token)))
    }

    async fn commit(&self, record_id: &RecordId) -> Result<VersionToken, StoreError> {
        let row = RecordVersionRepo::upsert(&self.pool, record_id, &VersionToken::generate())
            .await
            .map_err(unavailable)?;
        Ok(VersionToken(row.version_token))
    }
}
