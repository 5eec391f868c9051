//! Periodic purge of expired lock rows.
//!
//! Expired rows are already treated as absent by every lock operation, so
//! this only keeps the table small. Runs on a fixed `tokio::time::interval`.

use std::sync::Arc;
use std::time::Duration;

use editlock_core::coordinator::LockCoordinator;
use tokio_util::sync::CancellationToken;

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(coordinator: Arc<LockCoordinator>, every: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = every.as_secs(), "Lock sweeper started");

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Lock sweeper stopping");
                break;
            }
            _ = interval.tick() => {
                match coordinator.purge_expired().await {
                    Ok(0) => tracing::debug!("Lock sweeper: nothing to purge"),
                    Ok(purged) => tracing::info!(purged, "Lock sweeper: purged expired locks"),
                    Err(e) => tracing::error!(error = %e, "Lock sweeper: purge failed"),
                }
            }
        }
    }
}
