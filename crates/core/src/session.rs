//! One client editing session as an explicit state machine.
//!
//! [`Session::handle`] takes an event and the current instant and returns the
//! effects to perform. It never performs I/O and never reads a clock; the
//! driver in `editlock-client` executes the effects and feeds back results.
//!
//! ```text
//!   Unlocked --Granted/AlreadyYours--> Editing --warning--> Warning --expiry--> Expired
//!       \                                 |  \________________________________/  |
//!        --HeldByOther--> LockedOut       |            submit                    |
//!                                         +-----------> Saving <-----------------+
//!                                                         | saved
//!                                                         v
//!                                                      Closed <-- navigate away (any state)
//! ```

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::conflict::{ConflictKind, SaveAttempt, SaveConflict, SaveOutcome};
use crate::lock::{AcquireOutcome, LockRecord, RefreshOutcome};
use crate::protocol::ReleaseMode;
use crate::settings::LockSettings;
use crate::types::{Timestamp, UserId, VersionToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Opened, no lock confirmed yet.
    Unlocked,
    /// Someone else holds the lock; the form is disabled.
    LockedOut,
    Editing,
    /// The lease is about to run out.
    Warning,
    /// The client-side countdown ran out. The form stays enabled; the
    /// server decides at save time.
    Expired,
    /// A save is in flight.
    Saving,
    /// Saved or navigated away. Terminal.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Warning,
    Expiry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Acquire,
    Refresh,
    Save,
}

impl Operation {
    fn verb(self) -> &'static str {
        match self {
            Operation::Acquire => "acquire the lock",
            Operation::Refresh => "refresh the lock",
            Operation::Save => "save the record",
        }
    }
}

/// The single manual override the session currently offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeHatch {
    ForceRelease,
    ForceSave,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The editor was opened.
    Open,
    AcquireCompleted(AcquireOutcome),
    RefreshCompleted(RefreshOutcome),
    SaveCompleted(SaveOutcome),
    /// The coordinator could not be reached or failed.
    RequestFailed { operation: Operation, message: String },
    TimerFired(TimerKind),
    /// The user submitted the form.
    Submit,
    ForceSave,
    ForceRelease,
    NavigateAway,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Acquire,
    Refresh,
    Release { mode: ReleaseMode },
    Save { attempt: SaveAttempt, force: bool },
    /// Arm a one-shot timer. Re-arming a kind replaces its previous deadline.
    ScheduleTimer { timer: TimerKind, at: Instant },
    CancelTimers,
    BindReleaseHook,
    UnbindReleaseHook,
    DisableForm,
    EnableForm,
    Notify(Notice),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    LockedBy { holder: UserId, expires_at: Timestamp },
    WasAlreadyLocked,
    ExpiryWarning { minutes: u64 },
    LockExpired,
    LockTakenOver,
    SaveRejected(SaveConflict),
    RecordNotFound,
    Saved,
    RequestFailed { operation: Operation, message: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::LockedBy { holder, expires_at } => write!(
                f,
                "This record is being edited by user {holder}. The form is read-only until \
                 their lock expires at {}.",
                expires_at.format("%H:%M:%S UTC")
            ),
            Notice::WasAlreadyLocked => f.write_str(
                "You are already editing this record in another window. \
                 Use force-release to continue here instead.",
            ),
            Notice::ExpiryWarning { minutes } => {
                let unit = if *minutes == 1 { "minute" } else { "minutes" };
                write!(
                    f,
                    "Your lock on this record expires in {minutes} {unit}. Save now to keep your changes."
                )
            }
            Notice::LockExpired => f.write_str(
                "Your lock has expired. You can still save, but someone else may have changed the record.",
            ),
            Notice::LockTakenOver => f.write_str("You now hold the lock on this record."),
            Notice::SaveRejected(conflict) => match conflict.kind {
                ConflictKind::StaleWrite => f.write_str(
                    "The record was changed by someone else since you opened it. \
                     Force-save to overwrite those changes.",
                ),
                ConflictKind::LockedByOther => match conflict.holder {
                    Some(holder) => write!(
                        f,
                        "User {holder} is editing this record. Your changes were not saved; \
                         coordinate with them before trying again."
                    ),
                    None => f.write_str("Another user is editing this record. Your changes were not saved."),
                },
                ConflictKind::WasAlreadyLocked => f.write_str(
                    "Your session in another window holds the lock on this record. \
                     Force-save to take it over.",
                ),
            },
            Notice::RecordNotFound => f.write_str("This record no longer exists."),
            Notice::Saved => f.write_str("Changes saved."),
            Notice::RequestFailed { operation, message } => write!(
                f,
                "Could not {}: {message}. Nothing was changed; try again.",
                operation.verb()
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Deadlines {
    warning: Instant,
    expiry: Instant,
}

#[derive(Debug, Clone)]
pub struct Session {
    settings: LockSettings,
    state: SessionState,
    /// State to return to when a save does not go through.
    resume_to: SessionState,
    /// `acquired_at` of the lease this session owns.
    lease_acquired_at: Option<Timestamp>,
    version_token: Option<VersionToken>,
    deadlines: Option<Deadlines>,
    hook_bound: bool,
    escape_hatch: Option<EscapeHatch>,
    in_flight: Option<Operation>,
}

impl Session {
    pub fn new(settings: LockSettings) -> Self {
        Self {
            settings,
            state: SessionState::Unlocked,
            resume_to: SessionState::Unlocked,
            lease_acquired_at: None,
            version_token: None,
            deadlines: None,
            hook_bound: false,
            escape_hatch: None,
            in_flight: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn settings(&self) -> &LockSettings {
        &self.settings
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// True when the live lease was granted to this session, not to another
    /// session of the same user.
    pub fn owns_lease(&self) -> bool {
        self.lease_acquired_at.is_some()
    }

    pub fn lease_acquired_at(&self) -> Option<Timestamp> {
        self.lease_acquired_at
    }

    pub fn version_token(&self) -> Option<&VersionToken> {
        self.version_token.as_ref()
    }

    pub fn release_hook_bound(&self) -> bool {
        self.hook_bound
    }

    pub fn escape_hatch(&self) -> Option<EscapeHatch> {
        self.escape_hatch
    }

    pub fn deadline(&self, timer: TimerKind) -> Option<Instant> {
        self.deadlines.map(|d| match timer {
            TimerKind::Warning => d.warning,
            TimerKind::Expiry => d.expiry,
        })
    }

    /// Apply one event. Events that do not apply to the current state are
    /// ignored and produce no effects.
    pub fn handle(&mut self, event: SessionEvent, now: Instant) -> Vec<Effect> {
        if self.is_closed() {
            return Vec::new();
        }

        match event {
            SessionEvent::Open => self.on_open(),
            SessionEvent::AcquireCompleted(outcome) => self.on_acquired(outcome, now),
            SessionEvent::RefreshCompleted(outcome) => self.on_refreshed(outcome, now),
            SessionEvent::SaveCompleted(outcome) => self.on_saved(outcome),
            SessionEvent::RequestFailed { operation, message } => {
                self.on_failure(operation, message)
            }
            SessionEvent::TimerFired(timer) => self.on_timer(timer),
            SessionEvent::Submit => self.on_submit(false),
            SessionEvent::ForceSave => self.on_submit(true),
            SessionEvent::ForceRelease => self.on_force_release(),
            SessionEvent::NavigateAway => self.on_navigate_away(),
        }
    }

    fn on_open(&mut self) -> Vec<Effect> {
        if self.state != SessionState::Unlocked || self.in_flight.is_some() {
            return Vec::new();
        }
        self.in_flight = Some(Operation::Acquire);
        vec![Effect::Acquire]
    }

    fn on_acquired(&mut self, outcome: AcquireOutcome, now: Instant) -> Vec<Effect> {
        if self.in_flight != Some(Operation::Acquire) {
            return Vec::new();
        }
        self.in_flight = None;

        match outcome {
            AcquireOutcome::Granted(lock) => {
                self.lease_acquired_at = Some(lock.acquired_at);
                self.version_token = lock.version_token;
                self.escape_hatch = None;
                self.start_editing(now)
            }
            AcquireOutcome::AlreadyYours(lock) => {
                self.lease_acquired_at = None;
                self.version_token = lock.version_token;
                self.escape_hatch = Some(EscapeHatch::ForceRelease);
                let mut effects = self.start_editing(now);
                effects.push(Effect::Notify(Notice::WasAlreadyLocked));
                effects
            }
            AcquireOutcome::HeldByOther(lock) => self.lock_out(&lock),
        }
    }

    fn on_refreshed(&mut self, outcome: RefreshOutcome, now: Instant) -> Vec<Effect> {
        if self.in_flight != Some(Operation::Refresh) {
            return Vec::new();
        }
        self.in_flight = None;

        match outcome {
            RefreshOutcome::Refreshed(lock) => {
                self.lease_acquired_at = Some(lock.acquired_at);
                self.version_token = lock.version_token;
                self.escape_hatch = None;
                let mut effects = self.start_editing(now);
                effects.push(Effect::Notify(Notice::LockTakenOver));
                effects
            }
            RefreshOutcome::Conflict(lock) => self.lock_out(&lock),
            RefreshOutcome::NotFound => vec![Effect::Notify(Notice::RecordNotFound)],
        }
    }

    fn on_saved(&mut self, outcome: SaveOutcome) -> Vec<Effect> {
        if self.state != SessionState::Saving {
            return Vec::new();
        }
        self.in_flight = None;

        match outcome {
            SaveOutcome::Saved { version_token } => {
                self.state = SessionState::Closed;
                self.version_token = Some(version_token);
                self.lease_acquired_at = None;
                self.deadlines = None;
                self.escape_hatch = None;
                vec![Effect::Notify(Notice::Saved)]
            }
            SaveOutcome::Rejected(conflict) => {
                self.escape_hatch = conflict
                    .force_save_offered
                    .then_some(EscapeHatch::ForceSave);
                let mut effects = self.resume();
                effects.push(Effect::Notify(Notice::SaveRejected(conflict)));
                effects
            }
        }
    }

    fn on_failure(&mut self, operation: Operation, message: String) -> Vec<Effect> {
        let mut effects = match operation {
            Operation::Save if self.state == SessionState::Saving => self.resume(),
            Operation::Acquire | Operation::Refresh if self.in_flight == Some(operation) => {
                Vec::new()
            }
            _ => return Vec::new(),
        };
        self.in_flight = None;
        effects.push(Effect::Notify(Notice::RequestFailed { operation, message }));
        effects
    }

    fn on_timer(&mut self, timer: TimerKind) -> Vec<Effect> {
        match (self.state, timer) {
            (SessionState::Editing, TimerKind::Warning) => {
                self.state = SessionState::Warning;
                vec![Effect::Notify(Notice::ExpiryWarning {
                    minutes: self.settings.warning_minutes(),
                })]
            }
            (SessionState::Editing | SessionState::Warning, TimerKind::Expiry) => {
                self.state = SessionState::Expired;
                vec![Effect::Notify(Notice::LockExpired)]
            }
            // Late callback from a state already left.
            _ => Vec::new(),
        }
    }

    fn on_submit(&mut self, force: bool) -> Vec<Effect> {
        if !self.is_editable() {
            return Vec::new();
        }
        if force {
            if self.escape_hatch != Some(EscapeHatch::ForceSave) {
                return Vec::new();
            }
            self.escape_hatch = None;
        }

        self.resume_to = self.state;
        self.state = SessionState::Saving;
        self.in_flight = Some(Operation::Save);

        let mut effects = vec![Effect::CancelTimers];
        if self.hook_bound {
            self.hook_bound = false;
            effects.push(Effect::UnbindReleaseHook);
        }
        effects.push(Effect::Save {
            attempt: SaveAttempt {
                version_token: self.version_token.clone(),
                lease_acquired_at: self.lease_acquired_at,
            },
            force,
        });
        effects
    }

    fn on_force_release(&mut self) -> Vec<Effect> {
        let reachable = self.state == SessionState::LockedOut || self.is_editable();
        if !reachable
            || self.escape_hatch != Some(EscapeHatch::ForceRelease)
            || self.in_flight.is_some()
        {
            return Vec::new();
        }
        self.in_flight = Some(Operation::Refresh);
        vec![Effect::Refresh]
    }

    fn on_navigate_away(&mut self) -> Vec<Effect> {
        let mut effects = vec![Effect::CancelTimers];
        if self.hook_bound {
            effects.push(Effect::Release {
                mode: ReleaseMode::Blocking,
            });
            effects.push(Effect::UnbindReleaseHook);
        }
        self.state = SessionState::Closed;
        self.hook_bound = false;
        self.deadlines = None;
        self.escape_hatch = None;
        self.in_flight = None;
        effects
    }

    fn is_editable(&self) -> bool {
        matches!(
            self.state,
            SessionState::Editing | SessionState::Warning | SessionState::Expired
        )
    }

    /// Enter Editing with timers measured from `now`, the moment the lease
    /// was confirmed.
    fn start_editing(&mut self, now: Instant) -> Vec<Effect> {
        let deadlines = Deadlines {
            warning: now + self.settings.warning_delay(),
            expiry: now + self.settings.expiry_delay(),
        };
        self.deadlines = Some(deadlines);
        self.state = SessionState::Editing;

        let mut effects = vec![
            Effect::CancelTimers,
            Effect::ScheduleTimer {
                timer: TimerKind::Warning,
                at: deadlines.warning,
            },
            Effect::ScheduleTimer {
                timer: TimerKind::Expiry,
                at: deadlines.expiry,
            },
            Effect::EnableForm,
        ];
        effects.extend(self.sync_release_hook());
        effects
    }

    fn lock_out(&mut self, lock: &LockRecord) -> Vec<Effect> {
        self.state = SessionState::LockedOut;
        self.lease_acquired_at = None;
        self.deadlines = None;
        self.escape_hatch = Some(EscapeHatch::ForceRelease);

        let mut effects = vec![Effect::CancelTimers];
        effects.extend(self.sync_release_hook());
        effects.push(Effect::DisableForm);
        effects.push(Effect::Notify(Notice::LockedBy {
            holder: lock.holder,
            expires_at: lock.expires_at,
        }));
        effects
    }

    /// Return from Saving to the state the save started in, re-arming the
    /// timers that state still waits on. Deadlines keep their original
    /// instants; a deadline that passed meanwhile fires straight away.
    fn resume(&mut self) -> Vec<Effect> {
        self.state = self.resume_to;
        let mut effects = Vec::new();
        if let Some(deadlines) = self.deadlines {
            if self.state == SessionState::Editing {
                effects.push(Effect::ScheduleTimer {
                    timer: TimerKind::Warning,
                    at: deadlines.warning,
                });
            }
            if matches!(self.state, SessionState::Editing | SessionState::Warning) {
                effects.push(Effect::ScheduleTimer {
                    timer: TimerKind::Expiry,
                    at: deadlines.expiry,
                });
            }
        }
        effects.extend(self.sync_release_hook());
        effects
    }

    /// The release hook is bound exactly while an editable session owns its lease.
    fn sync_release_hook(&mut self) -> Option<Effect> {
        let wanted = self.owns_lease() && self.is_editable();
        match (self.hook_bound, wanted) {
            (false, true) => {
                self.hook_bound = true;
                Some(Effect::BindReleaseHook)
            }
            (true, false) => {
                self.hook_bound = false;
                Some(Effect::UnbindReleaseHook)
            }
            _ => None,
        }
    }
}
