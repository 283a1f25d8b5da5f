pub mod metadata;
pub mod redirect;
pub mod update;

use crate::AppState;
use axum::{http::StatusCode, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the HTTP surface around a shared store.
pub fn router(state: Arc<AppState>) -> Router {
    let update_path = state.config.update_path.clone();
    let metadata_route = format!("{}:resource", state.config.metadata_path);

    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route(&update_path, get(update::update).post(update::update))
        .route(&metadata_route, get(metadata::metadata))
        // Short-link redirect: must come LAST so the fixed routes take priority
        .route("/:token", get(redirect::redirect))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
