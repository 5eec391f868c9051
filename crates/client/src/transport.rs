//! The request/response seam between a session and the lock coordinator.

use async_trait::async_trait;
use editlock_core::conflict::{SaveAttempt, SaveOutcome};
use editlock_core::error::CoreError;
use editlock_core::lock::{AcquireOutcome, LockStatus, RefreshOutcome, ReleaseOutcome};

pub use editlock_core::protocol::ReleaseMode;

/// Infrastructure failures. Lock-state outcomes (held by another user,
/// stale write, ...) are never errors; they come back as outcome values.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request itself failed (connect, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-outcome status.
    #[error("Server error ({status}) {code}: {message}")]
    Server {
        status: u16,
        code: String,
        message: String,
    },

    /// A success body did not match the expected shape.
    #[error("Malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// An in-process coordinator call failed.
    #[error(transparent)]
    Coordinator(#[from] CoreError),
}

/// Lock operations for one record, on behalf of one identity.
#[async_trait]
pub trait LockTransport: Send + Sync {
    async fn acquire(&self) -> Result<AcquireOutcome, TransportError>;

    async fn refresh(&self) -> Result<RefreshOutcome, TransportError>;

    /// With [`ReleaseMode::Blocking`] the call returns only once the
    /// coordinator has processed the release.
    async fn release(&self, mode: ReleaseMode) -> Result<ReleaseOutcome, TransportError>;

    async fn inspect(&self) -> Result<LockStatus, TransportError>;

    /// Submit a save; `force` re-takes the lease for this session first.
    async fn save(&self, attempt: &SaveAttempt, force: bool)
        -> Result<SaveOutcome, TransportError>;
}
