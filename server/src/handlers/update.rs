use crate::{archive::ArchiveTask, AppState};
use askama::Template;
use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

// ── Templates ──────────────────────────────────────────────────────────────

#[derive(Template)]
#[template(path = "update_form.html")]
struct UpdateFormTemplate {
    action: String,
}

#[derive(Template)]
#[template(path = "short_link.html")]
struct ShortLinkTemplate {
    short_url: String,
}

// ── Form ───────────────────────────────────────────────────────────────────

/// Read from the query string on GET and from the urlencoded body on POST.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateForm {
    #[serde(default)]
    url: String,
    /// "form" when submitted from the HTML form; switches the reply to HTML.
    #[serde(default)]
    source: String,
}

// ── Handler ────────────────────────────────────────────────────────────────

/// GET|POST {UPDATE_PATH}
///
/// 1. No `url` → render the submission form.
/// 2. Parse the URL and check its scheme against the allow-list.
/// 3. Mint (or reuse) a token and queue a page capture if none exists yet.
/// 4. Persist the store, then reply with the short URL.
pub async fn update(State(state): State<Arc<AppState>>, Form(form): Form<UpdateForm>) -> Response {
    if form.url.is_empty() {
        return UpdateFormTemplate {
            action: state.config.update_path.clone(),
        }
        .into_response();
    }

    // ── 1. Validate ────────────────────────────────────────────────────────
    let target = match Url::parse(form.url.trim()) {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!("Rejected target URL {:?}: {}", form.url, e);
            return (StatusCode::BAD_REQUEST, "cannot parse target URL").into_response();
        }
    };
    if !state.config.allowed_schemes.contains(target.scheme()) {
        return (StatusCode::NOT_IMPLEMENTED, "URL scheme is not supported").into_response();
    }
    let is_web_page = matches!(target.scheme(), "http" | "https");
    let target = String::from(target);

    // ── 2. Mint ────────────────────────────────────────────────────────────
    let token = match state.store.add_link(&target) {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("Failed to add link {}: {}", target, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    // ── 3. Archive ─────────────────────────────────────────────────────────
    if let Some(archive) = state.archive.as_ref().filter(|_| is_web_page) {
        if !archive.has_capture(&token).await {
            archive
                .enqueue(ArchiveTask {
                    url: target.clone(),
                    token: token.clone(),
                })
                .await;
        }
    }

    // ── 4. Persist ─────────────────────────────────────────────────────────
    // The snapshot write is blocking file I/O under the store lock.
    let state_bg = state.clone();
    let dumped =
        tokio::task::spawn_blocking(move || state_bg.store.dump_to_disk(&state_bg.config.data_path))
            .await;
    match dumped {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!("Failed to persist store: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
        Err(e) => {
            tracing::error!("Snapshot task panicked: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response();
        }
    }

    tracing::info!("Shortened {} as '{}'", target, token);
    let short_url = state.config.short_url(&token);
    if form.source == "form" {
        ShortLinkTemplate { short_url }.into_response()
    } else {
        format!("{short_url}\n").into_response()
    }
}
