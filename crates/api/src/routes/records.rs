use axum::routing::post;
use axum::Router;

use crate::handlers::records;
use crate::state::AppState;

/// Record routes mounted at `/records`.
///
/// ```text
/// POST /{entity_type}/{entity_id}/save   -> save_record
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/{entity_type}/{entity_id}/save", post(records::save_record))
}
