//! Route definitions for record locks.
//!
//! All endpoints require authentication via `AuthUser` extractor.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::locks;
use crate::state::AppState;

/// Lock routes mounted at `/locks`.
///
/// ```text
/// GET  /{entity_type}/{entity_id}           -> get_lock_status
/// POST /{entity_type}/{entity_id}/acquire   -> acquire_lock
/// POST /{entity_type}/{entity_id}/refresh   -> refresh_lock
/// POST /{entity_type}/{entity_id}/release   -> release_lock
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{entity_type}/{entity_id}", get(locks::get_lock_status))
        .route("/{entity_type}/{entity_id}/acquire", post(locks::acquire_lock))
        .route("/{entity_type}/{entity_id}/refresh", post(locks::refresh_lock))
        .route("/{entity_type}/{entity_id}/release", post(locks::release_lock))
}
