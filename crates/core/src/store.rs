//! Storage seams for the coordinator.
//!
//! All operations on the same record must be atomic with respect to each
//! other. Different records are independent.

use async_trait::async_trait;

use crate::lock::LockRecord;
use crate::types::{RecordId, Timestamp, UserId, VersionToken};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Unavailable(String),
}

/// Durable keyed storage of lock rows. Rows are returned raw: expiry is the
/// coordinator's concern, so an expired row is still returned by `get`.
#[async_trait]
pub trait LockStore: Send + Sync {
    async fn get(&self, record_id: &RecordId) -> Result<Option<LockRecord>, StoreError>;

    /// Write `new_value` only if the stored row still equals `expected_prior`
    /// on holder and lease timestamps (`None` means "no row stored").
    async fn compare_and_swap(
        &self,
        record_id: &RecordId,
        expected_prior: Option<&LockRecord>,
        new_value: &LockRecord,
    ) -> Result<bool, StoreError>;

    /// Delete the row only if it is held by `expected_holder`.
    async fn delete(&self, record_id: &RecordId, expected_holder: UserId)
        -> Result<bool, StoreError>;

    /// Delete the row only if it still carries `expected`'s lease.
    async fn delete_lease(&self, record_id: &RecordId, expected: &LockRecord)
        -> Result<bool, StoreError>;

    /// Delete the row whoever holds it.
    async fn force_delete(&self, record_id: &RecordId) -> Result<bool, StoreError>;

    /// Rows whose lease ends after `now`.
    async fn list_live(&self, now: Timestamp) -> Result<Vec<LockRecord>, StoreError>;

    /// Physically remove rows whose lease ended at or before `now`.
    async fn purge_expired(&self, now: Timestamp) -> Result<u64, StoreError>;
}

/// Tracks the modification state of the lockable records themselves.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// The latest version, or `None` if the record has never been persisted.
    async fn current(&self, record_id: &RecordId) -> Result<Option<VersionToken>, StoreError>;

    /// Record a successful save and return the new version.
    async fn commit(&self, record_id: &RecordId) -> Result<VersionToken, StoreError>;
}

/// True when `stored` is the same lease as `expected` for CAS purposes.
pub fn same_lease(stored: &LockRecord, expected: &LockRecord) -> bool {
    stored.holder == expected.holder
        && stored.acquired_at == expected.acquired_at
        && stored.expires_at == expected.expires_at
}
