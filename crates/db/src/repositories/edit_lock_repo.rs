//! Repository for the `edit_locks` table.

use async_trait::async_trait;
use editlock_core::lock::LockRecord;
use editlock_core::store::{LockStore, StoreError};
use editlock_core::types::{RecordId, Timestamp, UserId};
use sqlx::PgPool;

use crate::models::edit_lock::EditLockRow;

use super::unavailable;

/// Column list for `edit_locks` queries.
const COLUMNS: &str = "entity_type, entity_id, holder_id, acquired_at, expires_at, version_token";

/// Conditional writes on `edit_locks`. Every mutation is a single statement,
/// so PostgreSQL row locking makes it atomic per record.
pub struct EditLockRepo;

impl EditLockRepo {
    /// Fetch the stored row, expired or not.
    pub async fn find(
        pool: &PgPool,
        record_id: &RecordId,
    ) -> Result<Option<EditLockRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM edit_locks WHERE entity_type = $1 AND entity_id = $2"
        );
        sqlx::query_as::<_, EditLockRow>(&query)
            .bind(&record_id.entity_type)
            .bind(record_id.entity_id)
            .fetch_optional(pool)
            .await
    }

    /// Insert a lease only if no row exists for the record.
    pub async fn insert_if_absent(pool: &PgPool, lock: &LockRecord) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO edit_locks \
                 (entity_type, entity_id, holder_id, acquired_at, expires_at, version_token) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (entity_type, entity_id) DO NOTHING",
        )
        .bind(&lock.record_id.entity_type)
        .bind(lock.record_id.entity_id)
        .bind(lock.holder)
        .bind(lock.acquired_at)
        .bind(lock.expires_at)
        .bind(lock.version_token.as_ref().map(|t| t.as_str()))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Overwrite the row only if it still carries `prior`'s lease.
    pub async fn replace_if_unchanged(
        pool: &PgPool,
        prior: &LockRecord,
        next: &LockRecord,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE edit_locks \
             SET holder_id = $3, acquired_at = $4, expires_at = $5, version_token = $6, \
                 updated_at = NOW() \
             WHERE entity_type = $1 AND entity_id = $2 \
               AND holder_id = $7 AND acquired_at = $8 AND expires_at = $9",
        )
        .bind(&next.record_id.entity_type)
        .bind(next.record_id.entity_id)
        .bind(next.holder)
        .bind(next.acquired_at)
        .bind(next.expires_at)
        .bind(next.version_token.as_ref().map(|t| t.as_str()))
        .bind(prior.holder)
        .bind(prior.acquired_at)
        .bind(prior.expires_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Delete the row if `holder_id` matches.
    pub async fn delete_held_by(
        pool: &PgPool,
        record_id: &RecordId,
        holder: UserId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM edit_locks WHERE entity_type = $1 AND entity_id = $2 AND holder_id = $3",
        )
        .bind(&record_id.entity_type)
        .bind(record_id.entity_id)
        .bind(holder)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete the row only if it still carries `lock`'s lease.
    pub async fn delete_if_unchanged(pool: &PgPool, lock: &LockRecord) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM edit_locks \
             WHERE entity_type = $1 AND entity_id = $2 \
               AND holder_id = $3 AND acquired_at = $4 AND expires_at = $5",
        )
        .bind(&lock.record_id.entity_type)
        .bind(lock.record_id.entity_id)
        .bind(lock.holder)
        .bind(lock.acquired_at)
        .bind(lock.expires_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete the row regardless of holder.
    pub async fn delete(pool: &PgPool, record_id: &RecordId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM edit_locks WHERE entity_type = $1 AND entity_id = $2")
            .bind(&record_id.entity_type)
            .bind(record_id.entity_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Rows whose lease ends after `now`, ordered by record.
    pub async fn list_live(pool: &PgPool, now: Timestamp) -> Result<Vec<EditLockRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM edit_locks WHERE expires_at > $1 \
             ORDER BY entity_type, entity_id"
        );
        sqlx::query_as::<_, EditLockRow>(&query)
            .bind(now)
            .fetch_all(pool)
            .await
    }

    /// Delete rows whose lease ended at or before `now`. Returns the count.
    pub async fn delete_expired(pool: &PgPool, now: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM edit_locks WHERE expires_at <= $1")
            .bind(now)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// [`LockStore`] backed by the `edit_locks` table.
#[derive(Debug, Clone)]
pub struct PgLockStore {
    pool: PgPool,
}

impl PgLockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockStore for PgLockStore {
    async fn get(&self, record_id: &RecordId) -> Result<Option<LockRecord>, StoreError> {
        let row = EditLockRepo::find(&self.pool, record_id)
            .await
            .map_err(unavailable)?;
        Ok(row.map(LockRecord::from))
    }

    async fn compare_and_swap(
        &self,
        _record_id: &RecordId,
        expected_prior: Option<&LockRecord>,
        new_value: &LockRecord,
    ) -> Result<bool, StoreError> {
        let swapped = match expected_prior {
            None => EditLockRepo::insert_if_absent(&self.pool, new_value).await,
            Some(prior) => EditLockRepo::replace_if_unchanged(&self.pool, prior, new_value).await,
        };
        swapped.map_err(unavailable)
    }

    async fn delete(
        &self,
        record_id: &RecordId,
        expected_holder: UserId,
    ) -> Result<bool, StoreError> {
        EditLockRepo::delete_held_by(&self.pool, record_id, expected_holder)
            .await
            .map_err(unavailable)
    }

    async fn delete_lease(
        &self,
        _record_id: &RecordId,
        expected: &LockRecord,
    ) -> Result<bool, StoreError> {
        EditLockRepo::delete_if_unchanged(&self.pool, expected)
            .await
            .map_err(unavailable)
    }

    async fn force_delete(&self, record_id: &RecordId) -> Result<bool, StoreError> {
        EditLockRepo::delete(&self.pool, record_id)
            .await
            .map_err(unavailable)
    }

    async fn list_live(&self, now: Timestamp) -> Result<Vec<LockRecord>, StoreError> {
        let rows = EditLockRepo::list_live(&self.pool, now)
            .await
            .map_err(unavailable)?;
        Ok(rows.into_iter().map(LockRecord::from).collect())
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<u64, StoreError> {
        EditLockRepo::delete_expired(&self.pool, now)
            .await
            .map_err(unavailable)
    }
}
