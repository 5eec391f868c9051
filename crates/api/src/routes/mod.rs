pub mod admin;
pub mod health;
pub mod locks;
pub mod records;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /locks/{entity_type}/{entity_id}                      lock status (GET)
/// /locks/{entity_type}/{entity_id}/acquire              acquire (POST)
/// /locks/{entity_type}/{entity_id}/refresh              refresh (POST)
/// /locks/{entity_type}/{entity_id}/release              release (POST)
///
/// /records/{entity_type}/{entity_id}/save               save (POST)
///
/// /admin/locks                                          live locks (admin only)
/// /admin/locks/{entity_type}/{entity_id}/force-unlock   force unlock (admin only)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/locks", locks::router())
        .nest("/records", records::router())
        .merge(admin::router())
}
