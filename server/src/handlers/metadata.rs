use crate::{archive::ArchiveTask, store::is_token, AppState};
use askama::Template;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::{io, sync::Arc};

#[derive(Template)]
#[template(path = "link_info.html")]
struct LinkInfoTemplate {
    target_url: String,
    pdf_link: String,
    png_link: String,
}

/// Archive formats and the content type they are served with.
const FORMATS: [(&str, &str); 2] = [("png", "image/png"), ("pdf", "application/pdf")];

/// GET {METADATA_PATH}:resource
///
/// `resource` is either a bare token, which renders a page pointing at the
/// archives, or `<token>.png` / `<token>.pdf`, which serves the capture. A
/// missing capture is queued and reported as not found for now.
pub async fn metadata(
    State(state): State<Arc<AppState>>,
    Path(resource): Path<String>,
) -> Response {
    let (token, ext) = match resource.rsplit_once('.') {
        Some((token, ext)) => (token, Some(ext.to_ascii_lowercase())),
        None => (resource.as_str(), None),
    };

    let content_type = match ext.as_deref() {
        None => None,
        Some(ext) => match FORMATS.iter().find(|(known, _)| *known == ext) {
            Some((_, content_type)) => Some(*content_type),
            None => {
                return (StatusCode::NOT_IMPLEMENTED, "extension is not supported")
                    .into_response()
            }
        },
    };

    if !is_token(token) {
        return (StatusCode::BAD_REQUEST, "malformed token").into_response();
    }

    let target_url = match state.store.query(token) {
        Ok(url) => url,
        Err(e) => return (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    };
    if !target_url.starts_with("http") {
        return (
            StatusCode::NOT_IMPLEMENTED,
            "archive is not supported for non-http pages",
        )
            .into_response();
    }

    let (Some(ext), Some(content_type)) = (ext, content_type) else {
        return LinkInfoTemplate {
            target_url,
            pdf_link: state.config.archive_link(&format!("{token}.pdf")),
            png_link: state.config.archive_link(&format!("{token}.png")),
        }
        .into_response();
    };

    let Some(archive) = state.archive.as_ref() else {
        return (StatusCode::NOT_FOUND, "archiving is disabled").into_response();
    };

    let file = archive.file_path(&format!("{token}.{ext}"));
    match tokio::fs::read(&file).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type)], bytes).into_response(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if !archive.is_pending(token) {
                archive
                    .enqueue(ArchiveTask {
                        url: target_url,
                        token: token.to_owned(),
                    })
                    .await;
            }
            (
                StatusCode::NOT_FOUND,
                "archive is being generated, try again later",
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Failed to read archive {}: {}", file.display(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}
