//! In-process stores backed by a mutex-guarded map.
//!
//! Used by the server when no database is configured, and by tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::lock::LockRecord;
use crate::store::{same_lease, LockStore, StoreError, VersionStore};
use crate::types::{RecordId, Timestamp, UserId, VersionToken};

fn guard<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("in-memory store mutex poisoned".into()))
}

#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    rows: Mutex<HashMap<RecordId, LockRecord>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a row unconditionally. Test setup only.
    pub fn insert_raw(&self, lock: LockRecord) {
        if let Ok(mut rows) = self.rows.lock() {
            rows.insert(lock.record_id.clone(), lock);
        }
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn get(&self, record_id: &RecordId) -> Result<Option<LockRecord>, StoreError> {
        Ok(guard(&self.rows)?.get(record_id).cloned())
    }

    async fn compare_and_swap(
        &self,
        record_id: &RecordId,
        expected_prior: Option<&LockRecord>,
        new_value: &LockRecord,
    ) -> Result<bool, StoreError> {
        let mut rows = guard(&self.rows)?;
        let matches = match (rows.get(record_id), expected_prior) {
            (None, None) => true,
            (Some(stored), Some(expected)) => same_lease(stored, expected),
            _ => false,
        };
        if matches {
            rows.insert(record_id.clone(), new_value.clone());
        }
        Ok(matches)
    }

    async fn delete(
        &self,
        record_id: &RecordId,
        expected_holder: UserId,
    ) -> Result<bool, StoreError> {
        let mut rows = guard(&self.rows)?;
        if rows.get(record_id).is_some_and(|l| l.holder == expected_holder) {
            rows.remove(record_id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn delete_lease(
        &self,
        record_id: &RecordId,
        expected: &LockRecord,
    ) -> Result<bool, StoreError> {
        let mut rows = guard(&self.rows)?;
        if rows.get(record_id).is_some_and(|l| same_lease(l, expected)) {
            rows.remove(record_id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn force_delete(&self, record_id: &RecordId) -> Result<bool, StoreError> {
        Ok(guard(&self.rows)?.remove(record_id).is_some())
    }

    async fn list_live(&self, now: Timestamp) -> Result<Vec<LockRecord>, StoreError> {
        let rows = guard(&self.rows)?;
        let mut live: Vec<LockRecord> = rows.values().filter(|l| l.is_live(now)).cloned().collect();
        live.sort_by(|a, b| a.record_id.cmp(&b.record_id));
        Ok(live)
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<u64, StoreError> {
        let mut rows = guard(&self.rows)?;
        let before = rows.len();
        rows.retain(|_, l| l.is_live(now));
        Ok((before - rows.len()) as u64)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryVersionStore {
    versions: Mutex<HashMap<RecordId, VersionToken>>,
}

impl InMemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend an out-of-band write produced `token`.
    pub fn set(&self, record_id: &RecordId, token: VersionToken) {
        if let Ok(mut versions) = self.versions.lock() {
            versions.insert(record_id.clone(), token);
        }
    }
}

#[async_trait]
impl VersionStore for InMemoryVersionStore {
    async fn current(&self, record_id: &RecordId) -> Result<Option<VersionToken>, StoreError> {
        Ok(guard(&self.versions)?.get(record_id).cloned())
    }

    async fn commit(&self, record_id: &RecordId) -> Result<VersionToken, StoreError> {
        let token = VersionToken::generate();
        guard(&self.versions)?.insert(record_id.clone(), token.clone());
        Ok(token)
    }
}
