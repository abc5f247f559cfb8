// SPDX-License-Identifier: GPL-3.0-or-later
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use tunebridge_application::AppState;
use tunebridge_domain::{CandidateTrack, DownloadItem};
use utoipa::ToSchema;

use super::{error_response, ErrorResponse};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    /// Destination-catalog track id.
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album_title: String,
    #[serde(default)]
    pub album_cover: String,
}

impl From<DownloadRequest> for CandidateTrack {
    fn from(request: DownloadRequest) -> Self {
        CandidateTrack {
            album_title: request.album_title,
            album_cover: request.album_cover,
            ..CandidateTrack::new(request.id, request.artist, request.title)
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EnqueuedResponse {
    pub id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DownloadItemResponse {
    pub id: String,
    pub track_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub cover_art: String,
    pub status: String,
    pub progress: f64,
    pub total_bytes: Option<u64>,
    pub downloaded_bytes: u64,
    pub file_path: Option<String>,
    pub error: Option<String>,
}

impl From<DownloadItem> for DownloadItemResponse {
    fn from(item: DownloadItem) -> Self {
        Self {
            id: item.id.to_string(),
            track_id: item.track_id,
            title: item.title,
            artist: item.artist,
            album: item.album,
            cover_art: item.cover_art,
            status: item.status.to_string(),
            progress: item.progress,
            total_bytes: item.total_bytes,
            downloaded_bytes: item.downloaded_bytes,
            file_path: item.file_path.map(|path| path.display().to_string()),
            error: item.error,
        }
    }
}

fn to_responses(items: Vec<DownloadItem>) -> Json<Vec<DownloadItemResponse>> {
    Json(items.into_iter().map(DownloadItemResponse::from).collect())
}

/// Queue a track for download. Returns as soon as the item is queued.
#[utoipa::path(
    post,
    path = "/api/v1/downloads",
    request_body = DownloadRequest,
    responses(
        (status = 202, description = "Download queued", body = EnqueuedResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    ),
    tag = "downloads"
)]
pub async fn enqueue_download(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> Response {
    if request.id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Track id is required");
    }
    debug!(target: "api", track_id = %request.id, "enqueue download");
    let id = state.downloads.enqueue(&CandidateTrack::from(request));
    (
        StatusCode::ACCEPTED,
        Json(EnqueuedResponse { id: id.to_string() }),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/api/v1/downloads/queue",
    responses((status = 200, description = "Pending and running downloads", body = Vec<DownloadItemResponse>)),
    tag = "downloads"
)]
pub async fn download_queue(State(state): State<AppState>) -> impl IntoResponse {
    to_responses(state.downloads.queue())
}

#[utoipa::path(
    get,
    path = "/api/v1/downloads/failed",
    responses((status = 200, description = "Downloads that failed this session", body = Vec<DownloadItemResponse>)),
    tag = "downloads"
)]
pub async fn failed_downloads(State(state): State<AppState>) -> impl IntoResponse {
    to_responses(state.downloads.failed())
}

#[utoipa::path(
    get,
    path = "/api/v1/downloads/history",
    responses((status = 200, description = "Completed downloads", body = Vec<DownloadItemResponse>)),
    tag = "downloads"
)]
pub async fn download_history(State(state): State<AppState>) -> impl IntoResponse {
    to_responses(state.downloads.history())
}

#[utoipa::path(
    delete,
    path = "/api/v1/downloads/history",
    responses(
        (status = 204, description = "History cleared"),
        (status = 500, description = "History could not be written", body = ErrorResponse)
    ),
    tag = "downloads"
)]
pub async fn clear_download_history(State(state): State<AppState>) -> Response {
    match state.downloads.clear_history().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}
