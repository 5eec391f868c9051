//! Runs one editing session.
//!
//! The driver owns the [`Session`] state machine and performs what it asks
//! for: transport calls (whose results are fed back in as events), form
//! updates, the navigate-away release hook and the two one-shot timers.
//! Timers are plain deadlines polled with `tokio::time::sleep_until`, so
//! re-arming one simply replaces its deadline.

use std::collections::VecDeque;
use std::sync::Arc;

use editlock_core::session::{Effect, Operation, Session, SessionEvent, SessionState, TimerKind};
use editlock_core::settings::LockSettings;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::form::EditForm;
use crate::transport::{LockTransport, ReleaseMode, TransportError};

/// Something the user did in the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Submit,
    ForceSave,
    ForceRelease,
    NavigateAway,
}

impl From<UserAction> for SessionEvent {
    fn from(action: UserAction) -> Self {
        match action {
            UserAction::Submit => SessionEvent::Submit,
            UserAction::ForceSave => SessionEvent::ForceSave,
            UserAction::ForceRelease => SessionEvent::ForceRelease,
            UserAction::NavigateAway => SessionEvent::NavigateAway,
        }
    }
}

pub struct SessionDriver<F: EditForm> {
    session: Session,
    transport: Arc<dyn LockTransport>,
    form: F,
    warning_at: Option<Instant>,
    expiry_at: Option<Instant>,
    release_hook: bool,
}

impl<F: EditForm> SessionDriver<F> {
    pub fn new(settings: LockSettings, transport: Arc<dyn LockTransport>, form: F) -> Self {
        Self {
            session: Session::new(settings),
            transport,
            form,
            warning_at: None,
            expiry_at: None,
            release_hook: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn form(&self) -> &F {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut F {
        &mut self.form
    }

    /// Whether leaving the page would currently release the lock.
    pub fn release_hook_bound(&self) -> bool {
        self.release_hook
    }

    /// The earliest armed timer.
    pub fn next_timer(&self) -> Option<(TimerKind, Instant)> {
        let warning = self.warning_at.map(|at| (TimerKind::Warning, at));
        let expiry = self.expiry_at.map(|at| (TimerKind::Expiry, at));
        match (warning, expiry) {
            (Some(w), Some(e)) => Some(if e.1 < w.1 { e } else { w }),
            (w, e) => w.or(e),
        }
    }

    /// Open the editor: ask for the lock and settle into the resulting state.
    pub async fn open(&mut self) {
        self.dispatch(SessionEvent::Open).await;
    }

    pub async fn act(&mut self, action: UserAction) {
        self.dispatch(action.into()).await;
    }

    /// Fire every timer whose deadline has passed, earliest first. Returns
    /// how many fired.
    pub async fn fire_due_timers(&mut self) -> usize {
        let mut fired = 0;
        while let Some((timer, at)) = self.next_timer() {
            if at > Instant::now() {
                break;
            }
            self.fire(timer).await;
            fired += 1;
        }
        fired
    }

    /// Sleep until the next timer and fire it. `None` when no timer is armed.
    pub async fn wait_for_timer(&mut self) -> Option<TimerKind> {
        let (timer, at) = self.next_timer()?;
        tokio::time::sleep_until(at).await;
        self.fire(timer).await;
        Some(timer)
    }

    /// Open the session and drive it from `actions` and its timers until it
    /// closes. A closed channel counts as navigating away.
    pub async fn run(&mut self, mut actions: mpsc::Receiver<UserAction>) {
        self.open().await;

        while !self.session.is_closed() {
            let next = self.next_timer();

            tokio::select! {
                action = actions.recv() => {
                    self.act(action.unwrap_or(UserAction::NavigateAway)).await;
                }
                _ = tokio::time::sleep_until(next.map_or_else(Instant::now, |(_, at)| at)), if next.is_some() => {
                    if let Some((timer, _)) = next {
                        self.fire(timer).await;
                    }
                }
            }
        }
    }

    async fn fire(&mut self, timer: TimerKind) {
        match timer {
            TimerKind::Warning => self.warning_at = None,
            TimerKind::Expiry => self.expiry_at = None,
        }
        self.dispatch(SessionEvent::TimerFired(timer)).await;
    }

    /// Feed `event` to the session, execute the effects, and keep feeding
    /// completions back until the session has nothing left to do.
    async fn dispatch(&mut self, event: SessionEvent) {
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            let before = self.session.state();
            let effects = self.session.handle(event, Instant::now().into_std());
            if self.session.state() != before {
                tracing::debug!(from = ?before, to = ?self.session.state(), "Session transition");
            }

            for effect in effects {
                if let Some(completion) = self.execute(effect).await {
                    queue.push_back(completion);
                }
            }
        }
    }

    async fn execute(&mut self, effect: Effect) -> Option<SessionEvent> {
        match effect {
            Effect::Acquire => Some(completion(
                Operation::Acquire,
                self.transport.acquire().await,
                SessionEvent::AcquireCompleted,
            )),
            Effect::Refresh => Some(completion(
                Operation::Refresh,
                self.transport.refresh().await,
                SessionEvent::RefreshCompleted,
            )),
            Effect::Save { attempt, force } => Some(completion(
                Operation::Save,
                self.transport.save(&attempt, force).await,
                SessionEvent::SaveCompleted,
            )),
            Effect::Release { mode } => {
                self.release(mode).await;
                None
            }
            Effect::ScheduleTimer { timer, at } => {
                let at = Instant::from_std(at);
                match timer {
                    TimerKind::Warning => self.warning_at = Some(at),
                    TimerKind::Expiry => self.expiry_at = Some(at),
                }
                None
            }
            Effect::CancelTimers => {
                self.warning_at = None;
                self.expiry_at = None;
                None
            }
            Effect::BindReleaseHook => {
                self.release_hook = true;
                None
            }
            Effect::UnbindReleaseHook => {
                self.release_hook = false;
                None
            }
            Effect::DisableForm => {
                self.form.disable_all();
                None
            }
            Effect::EnableForm => {
                self.form.enable_all();
                None
            }
            Effect::Notify(notice) => {
                self.form.show_notice(&notice);
                None
            }
        }
    }

    async fn release(&self, mode: ReleaseMode) {
        match mode {
            ReleaseMode::Blocking => match self.transport.release(mode).await {
                Ok(outcome) => tracing::debug!(?outcome, "Lock released on navigate-away"),
                Err(e) => tracing::warn!(error = %e, "Release failed, lock will lapse at expiry"),
            },
            ReleaseMode::BestEffort => spawn_best_effort_release(self.transport.clone()),
        }
    }
}

impl<F: EditForm> Drop for SessionDriver<F> {
    /// A session torn down without navigating away still gives its lease
    /// back, without waiting for the answer.
    fn drop(&mut self) {
        if self.release_hook {
            spawn_best_effort_release(self.transport.clone());
        }
    }
}

fn completion<T>(
    operation: Operation,
    result: Result<T, TransportError>,
    on_success: impl FnOnce(T) -> SessionEvent,
) -> SessionEvent {
    match result {
        Ok(value) => on_success(value),
        Err(e) => {
            tracing::warn!(?operation, error = %e, "Lock request failed");
            SessionEvent::RequestFailed {
                operation,
                message: e.to_string(),
            }
        }
    }
}

fn spawn_best_effort_release(transport: Arc<dyn LockTransport>) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!("No runtime to release the lock on, it will lapse at expiry");
        return;
    };
    runtime.spawn(async move {
        if let Err(e) = transport.release(ReleaseMode::BestEffort).await {
            tracing::debug!(error = %e, "Best-effort release failed");
        }
    });
}
