// SPDX-License-Identifier: GPL-3.0-or-later
use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::Path;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{debug, warn};
use tunebridge_application::{AppState, MediaCacheError, MediaSource};
use utoipa::IntoParams;

const HOP_BY_HOP: [HeaderName; 4] = [
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::TE,
    header::UPGRADE,
];

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    /// Catalog track id to stream.
    pub track_id: Option<String>,
    /// Downloaded file to serve instead of fetching. Must live under the
    /// download directory or be recorded in the download history.
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ImageQuery {
    pub url: Option<String>,
}

fn media_error(err: MediaCacheError) -> Response {
    let status = match &err {
        MediaCacheError::MissingParameter(_) => StatusCode::BAD_REQUEST,
        MediaCacheError::Resolve(_) => StatusCode::INTERNAL_SERVER_ERROR,
        MediaCacheError::Upstream(_) => StatusCode::BAD_GATEWAY,
        MediaCacheError::Io(io) if io.kind() == ErrorKind::NotFound => StatusCode::NOT_FOUND,
        MediaCacheError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(target: "api", error = %err, "media request failed");
    }
    (status, err.to_string()).into_response()
}

async fn respond(source: MediaSource, request: Request) -> Response {
    match source {
        MediaSource::File(path) => match ServeFile::new(path).oneshot(request).await {
            Ok(response) => response.map(Body::new),
            Err(never) => match never {},
        },
        MediaSource::Upstream {
            status,
            headers,
            body,
        } => {
            let mut response = Response::new(Body::from_stream(body));
            *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            for (name, value) in headers.iter() {
                if !HOP_BY_HOP.contains(name) {
                    response.headers_mut().append(name.clone(), value.clone());
                }
            }
            response
        }
        MediaSource::Memory {
            content_type,
            bytes,
        } => {
            let content_type = content_type.unwrap_or_else(|| "image/jpeg".to_string());
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
    }
}

/// Stream a track's audio, from a local file, the cache, or upstream.
#[utoipa::path(
    get,
    path = "/stream",
    params(StreamQuery),
    responses(
        (status = 200, description = "Audio bytes"),
        (status = 400, description = "trackId missing"),
        (status = 403, description = "Local path is not a downloaded file"),
        (status = 404, description = "Local file not found"),
        (status = 500, description = "Stream url could not be resolved"),
        (status = 502, description = "Upstream fetch failed")
    ),
    tag = "media"
)]
pub async fn stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    request: Request,
) -> Response {
    debug!(target: "api", track_id = ?query.track_id, path = ?query.path, "stream request");
    let local = match query.path.as_deref().filter(|raw| !raw.is_empty()) {
        None => None,
        Some(raw) => match state.downloads.downloaded_file(Path::new(raw)).await {
            Ok(Some(path)) => Some(path),
            Ok(None) => {
                warn!(target: "api", path = %raw, "refusing to serve file outside the download directory");
                return (StatusCode::FORBIDDEN, "path is not a downloaded file").into_response();
            }
            Err(err) => return media_error(MediaCacheError::Io(err)),
        },
    };
    match state
        .media_cache
        .open_stream(query.track_id.as_deref(), local.as_deref())
        .await
    {
        Ok(source) => respond(source, request).await,
        Err(err) => media_error(err),
    }
}

/// Serve a cover image through the cache.
#[utoipa::path(
    get,
    path = "/image",
    params(ImageQuery),
    responses(
        (status = 200, description = "Image bytes"),
        (status = 400, description = "url missing"),
        (status = 502, description = "Upstream fetch failed")
    ),
    tag = "media"
)]
pub async fn image(
    State(state): State<AppState>,
    Query(query): Query<ImageQuery>,
    request: Request,
) -> Response {
    match state.media_cache.open_image(query.url.as_deref()).await {
        Ok(source) => respond(source, request).await,
        Err(err) => media_error(err),
    }
}
