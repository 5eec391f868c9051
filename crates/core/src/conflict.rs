//! Save-time conflict classification.
//!
//! Evaluated once per save submission, first match wins:
//!
//! | # | live lock            | condition                          | result             |
//! |---|----------------------|------------------------------------|--------------------|
//! | 1 | none                 | client token == stored token       | proceed            |
//! | 2 | held by requester    | this session's lease is the live one | proceed          |
//! | 3 | none                 | tokens differ                      | `StaleWrite`       |
//! | 4 | held by someone else | -                                  | `LockedByOther`    |
//! | 5 | held by requester    | lease belongs to another session   | `WasAlreadyLocked` |

use serde::{Deserialize, Serialize};

use crate::lock::LockRecord;
use crate::types::{Timestamp, UserId, VersionToken};

/// What the client submits alongside its edits.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SaveAttempt {
    /// Version of the record when this session last read it.
    pub version_token: Option<VersionToken>,
    /// `acquired_at` of the lease this session was granted, if it was granted one.
    pub lease_acquired_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Unlocked, but modified since the session read it.
    StaleWrite,
    /// Another identity is editing right now.
    LockedByOther,
    /// Same identity, different session (another tab or window).
    WasAlreadyLocked,
}

impl ConflictKind {
    /// Another identity's live lock is never overridable from here.
    pub fn force_save_offered(self) -> bool {
        !matches!(self, ConflictKind::LockedByOther)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProceedBasis {
    /// No lock, record unchanged since the session read it.
    Unlocked,
    /// The requester's session holds the live lease.
    HeldByRequester,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Proceed(ProceedBasis),
    Conflict(ConflictKind),
}

/// Classify a save attempt against the live lock (expired rows must already
/// be filtered out) and the stored record version.
pub fn classify(
    requester: UserId,
    live_lock: Option<&LockRecord>,
    attempt: &SaveAttempt,
    stored_version: Option<&VersionToken>,
) -> Classification {
    match live_lock {
        None if attempt.version_token.as_ref() == stored_version => {
            Classification::Proceed(ProceedBasis::Unlocked)
        }
        Some(lock)
            if lock.is_held_by(requester)
                && attempt.lease_acquired_at == Some(lock.acquired_at) =>
        {
            Classification::Proceed(ProceedBasis::HeldByRequester)
        }
        None => Classification::Conflict(ConflictKind::StaleWrite),
        Some(lock) if !lock.is_held_by(requester) => {
            Classification::Conflict(ConflictKind::LockedByOther)
        }
        Some(_) => Classification::Conflict(ConflictKind::WasAlreadyLocked),
    }
}

/// A rejected save, as reported to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveConflict {
    pub kind: ConflictKind,
    /// Live holder, when there is one.
    pub holder: Option<UserId>,
    pub force_save_offered: bool,
}

impl SaveConflict {
    pub fn new(kind: ConflictKind, live_lock: Option<&LockRecord>) -> Self {
        Self {
            kind,
            holder: live_lock.map(|l| l.holder),
            force_save_offered: kind.force_save_offered(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved { version_token: VersionToken },
    Rejected(SaveConflict),
}
