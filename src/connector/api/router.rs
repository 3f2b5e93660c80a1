use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{get_status, post_index, post_query};
use super::state::AppState;

/// Builds the daemon's HTTP surface: `/index`, `/query`, `/status`.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/index", post(post_index))
        .route("/query", post(post_query))
        .route("/status", get(get_status))
        .with_state(state)
}
