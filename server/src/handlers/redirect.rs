use crate::{error::StoreError, AppState};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// GET /:token
///
/// Permanent redirect to the stored URL, 404 for unknown tokens.
pub async fn redirect(State(state): State<Arc<AppState>>, Path(token): Path<String>) -> Response {
    match state.store.query(&token) {
        Ok(url) => (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, url)]).into_response(),
        Err(e @ StoreError::NotFound(_)) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
        Err(e) => {
            tracing::error!("Lookup of '{}' failed: {}", token, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}
