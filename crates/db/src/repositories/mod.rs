use editlock_core::store::StoreError;

pub mod edit_lock_repo;
pub mod record_version_repo;

pub use edit_lock_repo::{EditLockRepo, PgLockStore};
pub use record_version_repo::{PgVersionStore, RecordVersionRepo};

/// Any database failure means the store is unreachable from the coordinator's
/// point of view.
fn unavailable(err: sqlx::Error) -> StoreError {
    tracing::error!(error = %err, "Lock store query failed");
    StoreError::Unavailable(err.to_string())
}
