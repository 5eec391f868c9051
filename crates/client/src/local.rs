//! [`LockTransport`] that calls a coordinator in the same process.

use std::sync::Arc;

use async_trait::async_trait;
use editlock_core::conflict::{SaveAttempt, SaveOutcome};
use editlock_core::coordinator::LockCoordinator;
use editlock_core::lock::{AcquireOutcome, LockStatus, RefreshOutcome, ReleaseOutcome};
use editlock_core::types::{RecordId, UserId};

use crate::transport::{LockTransport, ReleaseMode, TransportError};

#[derive(Clone)]
pub struct LocalTransport {
    coordinator: Arc<LockCoordinator>,
    record_id: RecordId,
    user_id: UserId,
}

impl LocalTransport {
    pub fn new(coordinator: Arc<LockCoordinator>, record_id: RecordId, user_id: UserId) -> Self {
        Self {
            coordinator,
            record_id,
            user_id,
        }
    }
}

#[async_trait]
impl LockTransport for LocalTransport {
    async fn acquire(&self) -> Result<AcquireOutcome, TransportError> {
        Ok(self.coordinator.acquire(&self.record_id, self.user_id).await?)
    }

    async fn refresh(&self) -> Result<RefreshOutcome, TransportError> {
        Ok(self.coordinator.refresh(&self.record_id, self.user_id).await?)
    }

    // Delivery is synchronous in-process; both modes behave the same.
    async fn release(&self, _mode: ReleaseMode) -> Result<ReleaseOutcome, TransportError> {
        Ok(self.coordinator.release(&self.record_id, self.user_id).await?)
    }

    async fn inspect(&self) -> Result<LockStatus, TransportError> {
        Ok(self.coordinator.inspect(&self.record_id).await?)
    }

    async fn save(
        &self,
        attempt: &SaveAttempt,
        force: bool,
    ) -> Result<SaveOutcome, TransportError> {
        let outcome = if force {
            self.coordinator
                .force_save(&self.record_id, self.user_id, attempt)
                .await?
        } else {
            self.coordinator
                .save(&self.record_id, self.user_id, attempt)
                .await?
        };
        Ok(outcome)
    }
}
