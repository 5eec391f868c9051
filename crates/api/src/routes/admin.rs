//! Admin lock management routes. Every handler requires `RequireAdmin`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::admin;
use crate::state::AppState;

/// Admin routes, merged at the `/api/v1` level.
///
/// ```text
/// GET  /admin/locks                                       -> list_locks
/// POST /admin/locks/{entity_type}/{entity_id}/force-unlock -> force_unlock
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/locks", get(admin::list_locks))
        .route(
            "/admin/locks/{entity_type}/{entity_id}/force-unlock",
            post(admin::force_unlock),
        )
}
