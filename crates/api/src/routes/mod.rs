pub mod health;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the service route tree.
///
/// ```text
/// /explain-concept         POST   run the pipeline
/// /delete-video            DELETE remove a stored video
/// /debug/config            GET    non-secret settings
/// /debug/tools             GET    binary availability
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/explain-concept", post(handlers::concept::explain_concept))
        .route("/delete-video", delete(handlers::video::delete_video))
        .nest("/debug", debug_routes())
}

fn debug_routes() -> Router<AppState> {
    Router::new()
        .route("/config", get(handlers::debug::config))
        .route("/tools", get(handlers::debug::tools))
}
