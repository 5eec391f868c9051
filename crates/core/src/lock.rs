//! Lock records, status snapshots and coordinator outcomes.

use serde::{Deserialize, Serialize};

use crate::types::{RecordId, Timestamp, UserId, VersionToken};

/// One lease on one record. At most one is live per record at any instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub record_id: RecordId,
    pub holder: UserId,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
    /// The record's version when the lease was taken or last refreshed.
    pub version_token: Option<VersionToken>,
}

impl LockRecord {
    /// A lease whose `expires_at` is not in the future is logically absent.
    pub fn is_live(&self, now: Timestamp) -> bool {
        self.expires_at > now
    }

    pub fn is_held_by(&self, user: UserId) -> bool {
        self.holder == user
    }

    /// Seconds until expiry; negative once expired.
    pub fn seconds_remaining(&self, now: Timestamp) -> i64 {
        (self.expires_at - now).num_seconds()
    }
}

/// Read-only snapshot returned by `Inspect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStatus {
    pub record_id: RecordId,
    /// The live lock, if any. Expired rows are never reported here.
    pub lock: Option<LockRecord>,
    pub checked_at: Timestamp,
}

impl LockStatus {
    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    /// A lock never applies to its own holder.
    pub fn applies_to(&self, viewer: UserId) -> bool {
        self.lock.as_ref().is_some_and(|l| !l.is_held_by(viewer))
    }

    pub fn seconds_remaining(&self) -> Option<i64> {
        self.lock.as_ref().map(|l| l.seconds_remaining(self.checked_at))
    }

    /// How the lock looks from `viewer`'s seat, for list/detail displays.
    pub fn view_for(&self, viewer: UserId) -> LockView {
        match &self.lock {
            None => LockView::Unlocked,
            Some(lock) if lock.is_held_by(viewer) => LockView::HeldBySelf {
                seconds_remaining: lock.seconds_remaining(self.checked_at),
            },
            Some(lock) => LockView::HeldByOther {
                holder: lock.holder,
                seconds_remaining: lock.seconds_remaining(self.checked_at),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum LockView {
    Unlocked,
    HeldBySelf { seconds_remaining: i64 },
    HeldByOther { holder: UserId, seconds_remaining: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AcquireOutcome {
    /// A fresh lease was created for the requester.
    Granted(LockRecord),
    /// The requester already holds a live lease; it was left untouched.
    AlreadyYours(LockRecord),
    /// Someone else holds a live lease.
    HeldByOther(LockRecord),
}

impl AcquireOutcome {
    pub fn lock(&self) -> &LockRecord {
        match self {
            AcquireOutcome::Granted(lock)
            | AcquireOutcome::AlreadyYours(lock)
            | AcquireOutcome::HeldByOther(lock) => lock,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Refreshed(LockRecord),
    /// Another identity holds the live lease; carries it for display.
    Conflict(LockRecord),
    /// The underlying record does not exist. [`LockCoordinator::refresh`]
    /// never reports this: with no live lock it re-takes the lease.
    ///
    /// [`LockCoordinator::refresh`]: crate::coordinator::LockCoordinator::refresh
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReleaseOutcome {
    Released,
    NotHolder,
    AlreadyFree,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn lock(holder: UserId, now: Timestamp) -> LockRecord {
        LockRecord {
            record_id: RecordId::new("scene", 1).unwrap(),
            holder,
            acquired_at: now,
            expires_at: now + Duration::seconds(120),
            version_token: None,
        }
    }

    #[test]
    fn test_lock_liveness_boundary() {
        let now = Utc::now();
        let l = lock(1, now);
        assert!(l.is_live(now));
        assert!(l.is_live(now + Duration::seconds(119)));
        assert!(!l.is_live(now + Duration::seconds(120)));
    }

    #[test]
    fn test_lock_applies_only_to_others() {
        let now = Utc::now();
        let status = LockStatus {
            record_id: RecordId::new("scene", 1).unwrap(),
            lock: Some(lock(1, now)),
            checked_at: now,
        };
        assert!(!status.applies_to(1));
        assert!(status.applies_to(2));
    }

    #[test]
    fn test_view_for_viewer() {
        let now = Utc::now();
        let status = LockStatus {
            record_id: RecordId::new("scene", 1).unwrap(),
            lock: Some(lock(1, now)),
            checked_at: now + Duration::seconds(20),
        };
        assert_eq!(
            status.view_for(1),
            LockView::HeldBySelf {
                seconds_remaining: 100
            }
        );
        assert_eq!(
            status.view_for(2),
            LockView::HeldByOther {
                holder: 1,
                seconds_remaining: 100
            }
        );

        let unlocked = LockStatus {
            lock: None,
            ..status
        };
        assert_eq!(unlocked.view_for(2), LockView::Unlocked);
        assert!(!unlocked.applies_to(2));
    }

    #[test]
    fn test_acquire_outcome_wire_shape() {
        let now = Utc::now();
        let outcome = AcquireOutcome::HeldByOther(lock(7, now));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "held_by_other");
        assert_eq!(json["holder"], 7);

        let back: AcquireOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back, outcome);
    }

    #[test]
    fn test_release_outcome_wire_shape() {
        let json = serde_json::to_value(ReleaseOutcome::NotHolder).unwrap();
        assert_eq!(json, serde_json::json!({"outcome": "not_holder"}));
    }
}
