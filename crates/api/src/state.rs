use std::sync::Arc;

use editlock_core::coordinator::LockCoordinator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// The lock coordinator, over PostgreSQL or in-memory stores.
    pub coordinator: Arc<LockCoordinator>,
    /// Database pool, when the server runs on PostgreSQL.
    pub pool: Option<editlock_db::DbPool>,
    pub config: Arc<ServerConfig>,
}
