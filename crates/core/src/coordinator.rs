//! Server-side lock protocol: acquire, refresh, release, inspect and save.
//!
//! Every mutation is a read-decide-CAS cycle against the [`LockStore`]. A lost
//! CAS means another request changed the row in between, so the cycle is
//! re-run against the fresh row. This is what makes operations on one record
//! linearizable without holding any lock inside the coordinator.

use std::sync::Arc;

use crate::clock::Clock;
use crate::conflict::{classify, Classification, ConflictKind, SaveAttempt, SaveConflict, SaveOutcome};
use crate::error::CoreError;
use crate::lock::{AcquireOutcome, LockRecord, LockStatus, RefreshOutcome, ReleaseOutcome};
use crate::settings::LockSettings;
use crate::store::{LockStore, VersionStore};
use crate::types::{RecordId, Timestamp, UserId, VersionToken};

/// Upper bound on read-decide-CAS cycles for a single request.
const MAX_CAS_ATTEMPTS: usize = 16;

pub struct LockCoordinator {
    locks: Arc<dyn LockStore>,
    versions: Arc<dyn VersionStore>,
    clock: Arc<dyn Clock>,
    settings: LockSettings,
}

impl LockCoordinator {
    pub fn new(
        locks: Arc<dyn LockStore>,
        versions: Arc<dyn VersionStore>,
        clock: Arc<dyn Clock>,
        settings: LockSettings,
    ) -> Self {
        Self {
            locks,
            versions,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &LockSettings {
        &self.settings
    }

    /// Acquire the lock, or report who already holds it.
    ///
    /// An already-live lease of the requester is returned untouched so the
    /// countdown of the session that took it is not restarted.
    pub async fn acquire(
        &self,
        record_id: &RecordId,
        requester: UserId,
    ) -> Result<AcquireOutcome, CoreError> {
        record_id.validate()?;

        for _ in 0..MAX_CAS_ATTEMPTS {
            let now = self.clock.now();
            let stored = self.locks.get(record_id).await?;

            match stored.as_ref().filter(|l| l.is_live(now)) {
                Some(lock) if lock.is_held_by(requester) => {
                    tracing::debug!(user_id = requester, record = %record_id, "Lock already held by requester");
                    return Ok(AcquireOutcome::AlreadyYours(lock.clone()));
                }
                Some(lock) => {
                    tracing::debug!(
                        user_id = requester,
                        holder = lock.holder,
                        record = %record_id,
                        "Lock held by another user"
                    );
                    return Ok(AcquireOutcome::HeldByOther(lock.clone()));
                }
                None => {}
            }

            let version = self.versions.current(record_id).await?;
            let fresh = self.fresh_lease(record_id, requester, now, version);
            if self
                .locks
                .compare_and_swap(record_id, stored.as_ref(), &fresh)
                .await?
            {
                tracing::info!(
                    user_id = requester,
                    record = %record_id,
                    expires_at = %fresh.expires_at,
                    reclaimed = stored.is_some(),
                    "Lock acquired"
                );
                return Ok(AcquireOutcome::Granted(fresh));
            }
        }

        Err(contention(record_id))
    }

    /// Extend the requester's lease, or re-take it if nothing holds the record.
    pub async fn refresh(
        &self,
        record_id: &RecordId,
        requester: UserId,
    ) -> Result<RefreshOutcome, CoreError> {
        record_id.validate()?;

        for _ in 0..MAX_CAS_ATTEMPTS {
            let now = self.clock.now();
            let stored = self.locks.get(record_id).await?;
            let version = self.versions.current(record_id).await?;

            let renewed = match stored.as_ref().filter(|l| l.is_live(now)) {
                Some(lock) if !lock.is_held_by(requester) => {
                    tracing::info!(
                        user_id = requester,
                        holder = lock.holder,
                        record = %record_id,
                        "Lock refresh refused, held by another user"
                    );
                    return Ok(RefreshOutcome::Conflict(lock.clone()));
                }
                Some(lock) => self.extended_lease(lock, now, version),
                None => self.fresh_lease(record_id, requester, now, version),
            };

            if self
                .locks
                .compare_and_swap(record_id, stored.as_ref(), &renewed)
                .await?
            {
                tracing::debug!(
                    user_id = requester,
                    record = %record_id,
                    new_expires_at = %renewed.expires_at,
                    "Lock refreshed"
                );
                return Ok(RefreshOutcome::Refreshed(renewed));
            }
        }

        Err(contention(record_id))
    }

    /// Release the requester's lease. Releasing someone else's lease, or an
    /// expired one, is a reported no-op.
    pub async fn release(
        &self,
        record_id: &RecordId,
        requester: UserId,
    ) -> Result<ReleaseOutcome, CoreError> {
        record_id.validate()?;

        for _ in 0..MAX_CAS_ATTEMPTS {
            let now = self.clock.now();
            let stored = self.locks.get(record_id).await?;

            match stored.filter(|l| l.is_live(now)) {
                None => return Ok(ReleaseOutcome::AlreadyFree),
                Some(lock) if !lock.is_held_by(requester) => {
                    tracing::debug!(
                        user_id = requester,
                        holder = lock.holder,
                        record = %record_id,
                        "Release ignored, not the holder"
                    );
                    return Ok(ReleaseOutcome::NotHolder);
                }
                Some(_) => {
                    if self.locks.delete(record_id, requester).await? {
                        tracing::info!(user_id = requester, record = %record_id, "Lock released");
                        return Ok(ReleaseOutcome::Released);
                    }
                }
            }
        }

        Err(contention(record_id))
    }

    /// Read-only snapshot of the live lock.
    pub async fn inspect(&self, record_id: &RecordId) -> Result<LockStatus, CoreError> {
        record_id.validate()?;
        let now = self.clock.now();
        let lock = self.locks.get(record_id).await?.filter(|l| l.is_live(now));
        Ok(LockStatus {
            record_id: record_id.clone(),
            lock,
            checked_at: now,
        })
    }

    /// Classify and, when allowed, persist a save. A successful save ends the
    /// lease.
    pub async fn save(
        &self,
        record_id: &RecordId,
        requester: UserId,
        attempt: &SaveAttempt,
    ) -> Result<SaveOutcome, CoreError> {
        record_id.validate()?;

        for _ in 0..MAX_CAS_ATTEMPTS {
            let now = self.clock.now();
            let stored = self.locks.get(record_id).await?;
            let live = stored.clone().filter(|l| l.is_live(now));
            let version = self.versions.current(record_id).await?;

            let basis = match classify(requester, live.as_ref(), attempt, version.as_ref()) {
                Classification::Proceed(basis) => basis,
                Classification::Conflict(kind) => {
                    tracing::info!(
                        user_id = requester,
                        record = %record_id,
                        conflict = ?kind,
                        "Save rejected"
                    );
                    return Ok(SaveOutcome::Rejected(SaveConflict::new(kind, live.as_ref())));
                }
            };

            // Fence the write: nobody acquires the record mid-save, and a
            // lease that changed since classification sends us round again.
            let fence = self.fresh_lease(record_id, requester, now, version);
            if !self
                .locks
                .compare_and_swap(record_id, stored.as_ref(), &fence)
                .await?
            {
                continue;
            }

            let version_token = match self.versions.commit(record_id).await {
                Ok(token) => token,
                Err(err) => {
                    self.lift_fence(record_id, stored.as_ref(), &fence).await;
                    return Err(err.into());
                }
            };
            self.locks.delete_lease(record_id, &fence).await?;
            tracing::info!(
                user_id = requester,
                record = %record_id,
                version = %version_token,
                basis = ?basis,
                "Record saved, lock released"
            );
            return Ok(SaveOutcome::Saved { version_token });
        }

        Err(contention(record_id))
    }

    /// Save after re-taking the lease for the calling session.
    ///
    /// Overrides a stale write or another session of the same user. Never
    /// overrides another user's live lease.
    pub async fn force_save(
        &self,
        record_id: &RecordId,
        requester: UserId,
        attempt: &SaveAttempt,
    ) -> Result<SaveOutcome, CoreError> {
        match self.refresh(record_id, requester).await? {
            RefreshOutcome::Refreshed(lock) => {
                tracing::info!(user_id = requester, record = %record_id, "Force-save took over the lease");
                let attempt = SaveAttempt {
                    version_token: attempt.version_token.clone(),
                    lease_acquired_at: Some(lock.acquired_at),
                };
                self.save(record_id, requester, &attempt).await
            }
            RefreshOutcome::Conflict(lock) => Ok(SaveOutcome::Rejected(SaveConflict::new(
                ConflictKind::LockedByOther,
                Some(&lock),
            ))),
            RefreshOutcome::NotFound => Err(CoreError::NotFound {
                entity: "Record",
                id: record_id.to_string(),
            }),
        }
    }

    /// Administrative override: drop the lock whoever holds it.
    pub async fn force_unlock(&self, record_id: &RecordId) -> Result<bool, CoreError> {
        record_id.validate()?;
        let removed = self.locks.force_delete(record_id).await?;
        tracing::warn!(record = %record_id, removed, "Lock force-unlocked");
        Ok(removed)
    }

    pub async fn list_live(&self) -> Result<Vec<LockRecord>, CoreError> {
        Ok(self.locks.list_live(self.clock.now()).await?)
    }

    /// Delete expired rows. Correctness never depends on this running.
    pub async fn purge_expired(&self) -> Result<u64, CoreError> {
        Ok(self.locks.purge_expired(self.clock.now()).await?)
    }

    /// Put back the row a save fenced over when the commit failed.
    async fn lift_fence(&self, record_id: &RecordId, prior: Option<&LockRecord>, fence: &LockRecord) {
        let restored = match prior {
            Some(prior) => self.locks.compare_and_swap(record_id, Some(fence), prior).await,
            None => self.locks.delete_lease(record_id, fence).await,
        };
        match restored {
            Ok(true) => tracing::debug!(record = %record_id, "Save fence lifted"),
            Ok(false) => tracing::warn!(record = %record_id, "Save fence was already replaced"),
            Err(e) => tracing::warn!(record = %record_id, error = %e, "Failed to lift save fence"),
        }
    }

    fn fresh_lease(
        &self,
        record_id: &RecordId,
        holder: UserId,
        now: Timestamp,
        version_token: Option<VersionToken>,
    ) -> LockRecord {
        LockRecord {
            record_id: record_id.clone(),
            holder,
            acquired_at: now,
            expires_at: now + self.settings.lease(),
            version_token,
        }
    }

    /// `expires_at` strictly increases even if the clock has not moved.
    fn extended_lease(
        &self,
        prior: &LockRecord,
        now: Timestamp,
        version_token: Option<VersionToken>,
    ) -> LockRecord {
        let lease = self.settings.lease();
        let expires_at = (now + lease).max(prior.expires_at + chrono::Duration::microseconds(1));
        LockRecord {
            record_id: prior.record_id.clone(),
            holder: prior.holder,
            acquired_at: expires_at - lease,
            expires_at,
            version_token,
        }
    }
}

fn contention(record_id: &RecordId) -> CoreError {
    tracing::warn!(record = %record_id, "Lock operation gave up under contention");
    CoreError::Conflict(format!("Lock on {record_id} is changing too fast, retry"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::{InMemoryLockStore, InMemoryVersionStore};
    use crate::store::StoreError;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::time::Duration as StdDuration;

    const ALICE: UserId = 1;
    const BOB: UserId = 2;

    struct Harness {
        coordinator: Arc<LockCoordinator>,
        locks: Arc<InMemoryLockStore>,
        versions: Arc<InMemoryVersionStore>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let locks = Arc::new(InMemoryLockStore::new());
        let versions = Arc::new(InMemoryVersionStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let settings =
            LockSettings::new(StdDuration::from_secs(120), StdDuration::from_secs(60)).unwrap();
        let coordinator = Arc::new(LockCoordinator::new(
            locks.clone(),
            versions.clone(),
            clock.clone(),
            settings,
        ));
        Harness {
            coordinator,
            locks,
            versions,
            clock,
        }
    }

    fn story() -> RecordId {
        RecordId::new("story", 1).unwrap()
    }

    // -----------------------------------------------------------------------
    // Acquire
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_acquire_grants_fresh_lease() {
        let h = harness();
        h.versions.set(&story(), "v1".into());

        let outcome = h.coordinator.acquire(&story(), ALICE).await.unwrap();
        let lock = assert_matches!(outcome, AcquireOutcome::Granted(lock) => lock);
        assert_eq!(lock.holder, ALICE);
        assert_eq!(lock.expires_at - lock.acquired_at, Duration::seconds(120));
        assert_eq!(lock.version_token, Some("v1".into()));
    }

    #[tokio::test]
    async fn test_acquire_twice_keeps_original_lease() {
        let h = harness();
        let first = h.coordinator.acquire(&story(), ALICE).await.unwrap();
        h.clock.advance(Duration::seconds(30));
        let second = h.coordinator.acquire(&story(), ALICE).await.unwrap();

        let lock = assert_matches!(second, AcquireOutcome::AlreadyYours(lock) => lock);
        assert_eq!(lock.acquired_at, first.lock().acquired_at);
        assert_eq!(lock.expires_at, first.lock().expires_at);
    }

    #[tokio::test]
    async fn test_acquire_held_by_other_does_not_mutate() {
        let h = harness();
        h.coordinator.acquire(&story(), BOB).await.unwrap();
        let before = h.locks.get(&story()).await.unwrap();

        let outcome = h.coordinator.acquire(&story(), ALICE).await.unwrap();
        let lock = assert_matches!(outcome, AcquireOutcome::HeldByOther(lock) => lock);
        assert_eq!(lock.holder, BOB);
        assert_eq!(h.locks.get(&story()).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_expired_lock_is_reclaimed_by_anyone() {
        let h = harness();
        h.coordinator.acquire(&story(), BOB).await.unwrap();
        h.clock.advance(Duration::seconds(121));

        let outcome = h.coordinator.acquire(&story(), ALICE).await.unwrap();
        assert_matches!(outcome, AcquireOutcome::Granted(lock) if lock.holder == ALICE);
    }

    #[tokio::test]
    async fn test_expired_lock_is_reclaimed_by_original_holder_with_new_lease() {
        let h = harness();
        let first = h.coordinator.acquire(&story(), ALICE).await.unwrap();
        h.clock.advance(Duration::seconds(120));

        let outcome = h.coordinator.acquire(&story(), ALICE).await.unwrap();
        let lock = assert_matches!(outcome, AcquireOutcome::Granted(lock) => lock);
        assert!(lock.acquired_at > first.lock().acquired_at);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_grants_exactly_one() {
        let h = harness();
        let mut handles = Vec::new();
        for user in 1..=16 {
            let coordinator = h.coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator.acquire(&story(), user).await
            }));
        }

        let mut granted = 0;
        let mut holders = std::collections::HashSet::new();
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            if matches!(outcome, AcquireOutcome::Granted(_)) {
                granted += 1;
            }
            holders.insert(outcome.lock().holder);
        }
        assert_eq!(granted, 1);
        assert_eq!(holders.len(), 1, "every caller must see the same holder");
    }

    #[tokio::test]
    async fn test_acquire_rejects_invalid_record() {
        let h = harness();
        let bad = RecordId {
            entity_type: "Story".into(),
            entity_id: 1,
        };
        assert_matches!(
            h.coordinator.acquire(&bad, ALICE).await,
            Err(CoreError::Validation(_))
        );
    }

    // -----------------------------------------------------------------------
    // Refresh
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_refresh_strictly_increases_expiry() {
        let h = harness();
        h.versions.set(&story(), "v1".into());
        let granted = h.coordinator.acquire(&story(), ALICE).await.unwrap();

        // Same instant: still moves forward.
        let same_instant = h.coordinator.refresh(&story(), ALICE).await.unwrap();
        let a = assert_matches!(same_instant, RefreshOutcome::Refreshed(lock) => lock);
        assert!(a.expires_at > granted.lock().expires_at);

        h.clock.advance(Duration::seconds(45));
        h.versions.set(&story(), "v2".into());
        let later = h.coordinator.refresh(&story(), ALICE).await.unwrap();
        let b = assert_matches!(later, RefreshOutcome::Refreshed(lock) => lock);
        assert!(b.expires_at > a.expires_at);
        assert_eq!(b.version_token, Some("v2".into()));
        assert_eq!(b.expires_at - b.acquired_at, Duration::seconds(120));
    }

    #[tokio::test]
    async fn test_refresh_by_non_holder_conflicts_without_mutation() {
        let h = harness();
        h.versions.set(&story(), "v1".into());
        h.coordinator.acquire(&story(), BOB).await.unwrap();
        let before = h.locks.get(&story()).await.unwrap();

        let outcome = h.coordinator.refresh(&story(), ALICE).await.unwrap();
        assert_matches!(outcome, RefreshOutcome::Conflict(lock) if lock.holder == BOB);
        assert_eq!(h.locks.get(&story()).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_refresh_without_lock_self_heals() {
        let h = harness();
        h.versions.set(&story(), "v1".into());
        let outcome = h.coordinator.refresh(&story(), ALICE).await.unwrap();
        assert_matches!(outcome, RefreshOutcome::Refreshed(lock) if lock.holder == ALICE);

        let status = h.coordinator.inspect(&story()).await.unwrap();
        assert!(!status.applies_to(ALICE));
        assert!(status.applies_to(BOB));
    }

    #[tokio::test]
    async fn test_refresh_takes_over_lapsed_lease_on_never_saved_record() {
        let h = harness();
        assert_matches!(
            h.coordinator.acquire(&story(), BOB).await.unwrap(),
            AcquireOutcome::Granted(_)
        );
        h.clock.advance(Duration::seconds(121));

        let outcome = h.coordinator.refresh(&story(), ALICE).await.unwrap();
        let lock = assert_matches!(outcome, RefreshOutcome::Refreshed(lock) => lock);
        assert_eq!(lock.holder, ALICE);
        assert_eq!(lock.version_token, None);
        assert_eq!(h.locks.get(&story()).await.unwrap(), Some(lock));
    }

    // -----------------------------------------------------------------------
    // Release / Inspect
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_release_by_holder_clears_lock() {
        let h = harness();
        h.coordinator.acquire(&story(), ALICE).await.unwrap();
        assert_eq!(
            h.coordinator.release(&story(), ALICE).await.unwrap(),
            ReleaseOutcome::Released
        );
        assert!(!h.coordinator.inspect(&story()).await.unwrap().is_locked());
    }

    #[tokio::test]
    async fn test_release_by_non_holder_keeps_lock() {
        let h = harness();
        h.coordinator.acquire(&story(), BOB).await.unwrap();
        assert_eq!(
            h.coordinator.release(&story(), ALICE).await.unwrap(),
            ReleaseOutcome::NotHolder
        );
        let status = h.coordinator.inspect(&story()).await.unwrap();
        assert_eq!(status.lock.map(|l| l.holder), Some(BOB));
    }

    #[tokio::test]
    async fn test_release_of_free_or_expired_lock() {
        let h = harness();
        assert_eq!(
            h.coordinator.release(&story(), ALICE).await.unwrap(),
            ReleaseOutcome::AlreadyFree
        );

        h.coordinator.acquire(&story(), ALICE).await.unwrap();
        h.clock.advance(Duration::seconds(200));
        assert_eq!(
            h.coordinator.release(&story(), ALICE).await.unwrap(),
            ReleaseOutcome::AlreadyFree
        );
    }

    #[tokio::test]
    async fn test_inspect_hides_expired_lock() {
        let h = harness();
        h.coordinator.acquire(&story(), ALICE).await.unwrap();
        h.clock.advance(Duration::seconds(30));
        let status = h.coordinator.inspect(&story()).await.unwrap();
        assert_eq!(status.seconds_remaining(), Some(90));

        h.clock.advance(Duration::seconds(100));
        let status = h.coordinator.inspect(&story()).await.unwrap();
        assert!(status.lock.is_none());
    }

    // -----------------------------------------------------------------------
    // Save scenarios
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_save_unlocked_unmodified_proceeds() {
        let h = harness();
        h.versions.set(&story(), "v1".into());
        let attempt = SaveAttempt {
            version_token: Some("v1".into()),
            lease_acquired_at: None,
        };

        let outcome = h.coordinator.save(&story(), ALICE, &attempt).await.unwrap();
        let token = assert_matches!(outcome, SaveOutcome::Saved { version_token } => version_token);
        assert_ne!(token, VersionToken::from("v1"));
        assert!(h.locks.get(&story()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_by_holder_ignores_token_mismatch_and_releases() {
        let h = harness();
        h.versions.set(&story(), "v1".into());
        let granted = h.coordinator.acquire(&story(), ALICE).await.unwrap();
        h.versions.set(&story(), "v5".into());

        let attempt = SaveAttempt {
            version_token: Some("v1".into()),
            lease_acquired_at: Some(granted.lock().acquired_at),
        };
        let outcome = h.coordinator.save(&story(), ALICE, &attempt).await.unwrap();
        assert_matches!(outcome, SaveOutcome::Saved { .. });
        assert!(!h.coordinator.inspect(&story()).await.unwrap().is_locked());
    }

    #[tokio::test]
    async fn test_save_locked_by_other_is_blocked_even_when_forced() {
        let h = harness();
        h.versions.set(&story(), "v1".into());
        h.coordinator.acquire(&story(), BOB).await.unwrap();
        let attempt = SaveAttempt {
            version_token: Some("v1".into()),
            lease_acquired_at: None,
        };

        let outcome = h.coordinator.save(&story(), ALICE, &attempt).await.unwrap();
        let conflict = assert_matches!(outcome, SaveOutcome::Rejected(c) => c);
        assert_eq!(conflict.kind, ConflictKind::LockedByOther);
        assert!(!conflict.force_save_offered);
        assert_eq!(conflict.holder, Some(BOB));

        let forced = h.coordinator.force_save(&story(), ALICE, &attempt).await.unwrap();
        assert_matches!(forced, SaveOutcome::Rejected(c) if c.kind == ConflictKind::LockedByOther);
        assert_eq!(h.versions.current(&story()).await.unwrap(), Some("v1".into()));
    }

    #[tokio::test]
    async fn test_stale_write_then_force_save_updates_token() {
        let h = harness();
        h.versions.set(&story(), "v2".into());
        let attempt = SaveAttempt {
            version_token: Some("v1".into()),
            lease_acquired_at: None,
        };

        let outcome = h.coordinator.save(&story(), ALICE, &attempt).await.unwrap();
        let conflict = assert_matches!(outcome, SaveOutcome::Rejected(c) => c);
        assert_eq!(conflict.kind, ConflictKind::StaleWrite);
        assert!(conflict.force_save_offered);

        let forced = h.coordinator.force_save(&story(), ALICE, &attempt).await.unwrap();
        let token = assert_matches!(forced, SaveOutcome::Saved { version_token } => version_token);
        assert_eq!(h.versions.current(&story()).await.unwrap(), Some(token));
        assert!(h.locks.get(&story()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_tab_gets_already_yours_and_was_already_locked() {
        let h = harness();
        h.versions.set(&story(), "v1".into());

        let tab_one = h.coordinator.acquire(&story(), ALICE).await.unwrap();
        h.clock.advance(Duration::seconds(10));
        let tab_two = h.coordinator.acquire(&story(), ALICE).await.unwrap();
        assert_matches!(tab_two, AcquireOutcome::AlreadyYours(_));
        assert_eq!(
            h.locks.get(&story()).await.unwrap().as_ref(),
            Some(tab_one.lock()),
            "tab one's lease must be untouched"
        );

        // Tab two never got a lease of its own.
        let tab_two_attempt = SaveAttempt {
            version_token: Some("v1".into()),
            lease_acquired_at: None,
        };
        let outcome = h.coordinator.save(&story(), ALICE, &tab_two_attempt).await.unwrap();
        assert_matches!(
            outcome,
            SaveOutcome::Rejected(c) if c.kind == ConflictKind::WasAlreadyLocked && c.force_save_offered
        );

        // Forcing takes the lease over, after which tab one is the stale session.
        let forced = h.coordinator.force_save(&story(), ALICE, &tab_two_attempt).await.unwrap();
        assert_matches!(forced, SaveOutcome::Saved { .. });
    }

    #[tokio::test]
    async fn test_force_save_on_never_saved_record_saves() {
        let h = harness();
        let attempt = SaveAttempt::default();

        let outcome = h.coordinator.force_save(&story(), ALICE, &attempt).await.unwrap();
        let token = assert_matches!(outcome, SaveOutcome::Saved { version_token } => version_token);
        assert_eq!(h.versions.current(&story()).await.unwrap(), Some(token));
        assert!(h.locks.get(&story()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_rechecks_lease_replaced_after_classification() {
        let clock = Arc::new(ManualClock::starting_now());
        let now = clock.now();
        let alice_lease = LockRecord {
            record_id: story(),
            holder: ALICE,
            acquired_at: now - Duration::seconds(119),
            expires_at: now + Duration::seconds(1),
            version_token: Some("v1".into()),
        };
        let bob_lease = LockRecord {
            holder: BOB,
            acquired_at: now,
            expires_at: now + Duration::seconds(120),
            ..alice_lease.clone()
        };
        let locks = Arc::new(InterleavedStore::new(bob_lease.clone()));
        locks.inner.insert_raw(alice_lease.clone());
        let versions = Arc::new(InMemoryVersionStore::new());
        versions.set(&story(), "v1".into());
        let coordinator = coordinator_over(locks.clone(), versions.clone(), clock);

        let attempt = SaveAttempt {
            version_token: Some("v1".into()),
            lease_acquired_at: Some(alice_lease.acquired_at),
        };
        let outcome = coordinator.save(&story(), ALICE, &attempt).await.unwrap();

        assert_matches!(
            outcome,
            SaveOutcome::Rejected(c) if c.kind == ConflictKind::LockedByOther && c.holder == Some(BOB)
        );
        assert_eq!(versions.current(&story()).await.unwrap(), Some("v1".into()));
        assert_eq!(locks.get(&story()).await.unwrap(), Some(bob_lease));
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_force_unlock_and_listing() {
        let h = harness();
        let other = RecordId::new("story", 2).unwrap();
        h.coordinator.acquire(&story(), BOB).await.unwrap();
        h.coordinator.acquire(&other, ALICE).await.unwrap();
        assert_eq!(h.coordinator.list_live().await.unwrap().len(), 2);

        assert!(h.coordinator.force_unlock(&story()).await.unwrap());
        assert!(!h.coordinator.force_unlock(&story()).await.unwrap());
        let live = h.coordinator.list_live().await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].record_id, other);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let h = harness();
        h.coordinator.acquire(&story(), BOB).await.unwrap();
        h.clock.advance(Duration::seconds(300));
        assert_eq!(h.coordinator.purge_expired().await.unwrap(), 1);
        assert!(h.locks.get(&story()).await.unwrap().is_none());
    }

    // -----------------------------------------------------------------------
    // Store failures
    // -----------------------------------------------------------------------

    struct DownStore;

    #[async_trait]
    impl LockStore for DownStore {
        async fn get(&self, _: &RecordId) -> Result<Option<LockRecord>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn compare_and_swap(
            &self,
            _: &RecordId,
            _: Option<&LockRecord>,
            _: &LockRecord,
        ) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn delete(&self, _: &RecordId, _: UserId) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn delete_lease(&self, _: &RecordId, _: &LockRecord) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn force_delete(&self, _: &RecordId) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn list_live(&self, _: Timestamp) -> Result<Vec<LockRecord>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn purge_expired(&self, _: Timestamp) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    /// Reads succeed, commits fail.
    struct FailingCommit;

    #[async_trait]
    impl VersionStore for FailingCommit {
        async fn current(&self, _: &RecordId) -> Result<Option<VersionToken>, StoreError> {
            Ok(Some("v1".into()))
        }
        async fn commit(&self, _: &RecordId) -> Result<VersionToken, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    /// In-memory store where `intruder` is written just before the first
    /// compare-and-swap, as if another request landed in between.
    struct InterleavedStore {
        inner: InMemoryLockStore,
        intruder: std::sync::Mutex<Option<LockRecord>>,
    }

    impl InterleavedStore {
        fn new(intruder: LockRecord) -> Self {
            Self {
                inner: InMemoryLockStore::new(),
                intruder: std::sync::Mutex::new(Some(intruder)),
            }
        }
    }

    #[async_trait]
    impl LockStore for InterleavedStore {
        async fn get(&self, record_id: &RecordId) -> Result<Option<LockRecord>, StoreError> {
            self.inner.get(record_id).await
        }
        async fn compare_and_swap(
            &self,
            record_id: &RecordId,
            expected_prior: Option<&LockRecord>,
            new_value: &LockRecord,
        ) -> Result<bool, StoreError> {
            if let Some(lock) = self.intruder.lock().unwrap().take() {
                self.inner.insert_raw(lock);
            }
            self.inner.compare_and_swap(record_id, expected_prior, new_value).await
        }
        async fn delete(&self, record_id: &RecordId, holder: UserId) -> Result<bool, StoreError> {
            self.inner.delete(record_id, holder).await
        }
        async fn delete_lease(&self, record_id: &RecordId, expected: &LockRecord) -> Result<bool, StoreError> {
            self.inner.delete_lease(record_id, expected).await
        }
        async fn force_delete(&self, record_id: &RecordId) -> Result<bool, StoreError> {
            self.inner.force_delete(record_id).await
        }
        async fn list_live(&self, now: Timestamp) -> Result<Vec<LockRecord>, StoreError> {
            self.inner.list_live(now).await
        }
        async fn purge_expired(&self, now: Timestamp) -> Result<u64, StoreError> {
            self.inner.purge_expired(now).await
        }
    }

    fn coordinator_over(
        locks: Arc<dyn LockStore>,
        versions: Arc<dyn VersionStore>,
        clock: Arc<ManualClock>,
    ) -> LockCoordinator {
        let settings =
            LockSettings::new(StdDuration::from_secs(120), StdDuration::from_secs(60)).unwrap();
        LockCoordinator::new(locks, versions, clock, settings)
    }

    #[tokio::test]
    async fn test_failed_commit_on_unlocked_record_leaves_no_lock() {
        let locks = Arc::new(InMemoryLockStore::new());
        let coordinator = coordinator_over(
            locks.clone(),
            Arc::new(FailingCommit),
            Arc::new(ManualClock::starting_now()),
        );
        let attempt = SaveAttempt {
            version_token: Some("v1".into()),
            lease_acquired_at: None,
        };

        assert_matches!(
            coordinator.save(&story(), ALICE, &attempt).await,
            Err(CoreError::StoreUnavailable(_))
        );
        assert!(locks.get(&story()).await.unwrap().is_none());
        assert_matches!(
            coordinator.acquire(&story(), BOB).await.unwrap(),
            AcquireOutcome::Granted(lock) if lock.holder == BOB
        );
    }

    #[tokio::test]
    async fn test_failed_commit_by_holder_restores_the_lease() {
        let locks = Arc::new(InMemoryLockStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let coordinator = coordinator_over(locks.clone(), Arc::new(FailingCommit), clock.clone());
        let granted = coordinator.acquire(&story(), ALICE).await.unwrap();
        clock.advance(Duration::seconds(30));

        let attempt = SaveAttempt {
            version_token: Some("v1".into()),
            lease_acquired_at: Some(granted.lock().acquired_at),
        };
        assert_matches!(
            coordinator.save(&story(), ALICE, &attempt).await,
            Err(CoreError::StoreUnavailable(_))
        );
        assert_eq!(locks.get(&story()).await.unwrap().as_ref(), Some(granted.lock()));
    }

    #[tokio::test]
    async fn test_store_outage_surfaces_as_store_unavailable() {
        let coordinator = LockCoordinator::new(
            Arc::new(DownStore),
            Arc::new(InMemoryVersionStore::new()),
            Arc::new(ManualClock::starting_now()),
            LockSettings::default(),
        );
        assert_matches!(
            coordinator.acquire(&story(), ALICE).await,
            Err(CoreError::StoreUnavailable(_))
        );
        assert_matches!(
            coordinator.release(&story(), ALICE).await,
            Err(CoreError::StoreUnavailable(_))
        );
    }
}
