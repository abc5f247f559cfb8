// SPDX-License-Identifier: GPL-3.0-or-later
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use tunebridge_application::{
    AppState, ObserverSet, TracingObserver, TransferError, TransferLog, TransferObserver,
};
use tunebridge_domain::{
    SourceTrack, TrackStatusUpdate, TransferRecord, TransferRecordId, TransferStats,
};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{error_response, ErrorResponse};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album_title: Option<String>,
    #[serde(default)]
    pub album_cover: Option<String>,
    #[serde(default)]
    pub isrc: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub source_id: Option<String>,
}

impl From<TrackRequest> for SourceTrack {
    fn from(track: TrackRequest) -> Self {
        SourceTrack {
            title: track.title,
            artist: track.artist,
            album_title: track.album_title,
            album_cover: track.album_cover,
            isrc: track.isrc,
            duration_ms: track.duration_ms,
            source_id: track.source_id,
            ..SourceTrack::default()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTransferRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Where the tracks came from, recorded in the transfer history.
    #[serde(default)]
    pub source: Option<String>,
    pub tracks: Vec<TrackRequest>,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct StatsResponse {
    pub total: usize,
    pub matched: usize,
    pub added: usize,
    pub failed: usize,
}

impl From<TransferStats> for StatsResponse {
    fn from(stats: TransferStats) -> Self {
        Self {
            total: stats.total,
            matched: stats.matched,
            added: stats.added,
            failed: stats.failed,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TrackStatusResponse {
    pub index: usize,
    pub status: String,
    pub error: Option<String>,
}

impl From<TrackStatusUpdate> for TrackStatusResponse {
    fn from(update: TrackStatusUpdate) -> Self {
        Self {
            index: update.index,
            status: update.status.to_string(),
            error: update.error,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransferResponse {
    pub record_id: String,
    pub container_id: Option<String>,
    pub stats: StatsResponse,
    pub statuses: Vec<TrackStatusResponse>,
    pub log: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransferRecordResponse {
    pub id: String,
    pub container_name: String,
    pub source: Option<String>,
    pub stats: StatsResponse,
    pub status: String,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub duration_secs: i64,
    pub container_id: Option<String>,
    pub error_message: Option<String>,
}

impl From<TransferRecord> for TransferRecordResponse {
    fn from(record: TransferRecord) -> Self {
        let status = serde_json::to_value(record.status)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            id: record.id.to_string(),
            container_name: record.container_name,
            source: record.source,
            stats: record.stats.into(),
            status,
            created_at: record.created_at.to_rfc3339(),
            completed_at: record.completed_at.map(|at| at.to_rfc3339()),
            duration_secs: record.duration_secs,
            container_id: record.container_id,
            error_message: record.error_message,
        }
    }
}

fn transfer_error_status(err: &TransferError) -> StatusCode {
    match err {
        TransferError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        TransferError::NoTracksMatched { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        TransferError::ContainerCreation { .. } => StatusCode::BAD_GATEWAY,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Match the given tracks against the destination catalog and copy the
/// matches into a new container.
#[utoipa::path(
    post,
    path = "/api/v1/transfers",
    request_body = CreateTransferRequest,
    responses(
        (status = 200, description = "Transfer finished", body = TransferResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 401, description = "No catalog credential configured", body = TransferResponse),
        (status = 422, description = "No track matched", body = TransferResponse),
        (status = 502, description = "Container creation failed", body = TransferResponse)
    ),
    tag = "transfers"
)]
pub async fn create_transfer(
    State(state): State<AppState>,
    Json(request): Json<CreateTransferRequest>,
) -> Response {
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Container name is required");
    }
    if request.tracks.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "At least one track is required");
    }

    let tracks: Vec<SourceTrack> = request.tracks.into_iter().map(SourceTrack::from).collect();
    let total = tracks.len();
    info!(target: "api", container = %name, tracks = total, "starting transfer");

    let log = TransferLog::new();
    let observer: Arc<dyn TransferObserver> = Arc::new(ObserverSet(vec![
        Arc::new(TracingObserver),
        Arc::new(log.clone()),
    ]));

    let mut record = TransferRecord::started(&name, request.source);
    let result = state
        .transfer_pipeline()
        .run(&name, &request.description, &tracks, observer)
        .await;

    let (status, container_id, stats, error) = match result {
        Ok(report) => (StatusCode::OK, Some(report.container_id), report.stats, None),
        Err(err) => {
            let stats = err.stats().unwrap_or(TransferStats {
                total,
                failed: total,
                ..TransferStats::default()
            });
            (transfer_error_status(&err), None, stats, Some(err.to_string()))
        }
    };

    record.finish(stats, container_id.clone(), error.clone());
    let record_id = record.id.to_string();
    if let Err(err) = state.transfers.add(record).await {
        warn!(target: "api", error = %err, "failed to save transfer history");
    }

    let body = TransferResponse {
        record_id,
        container_id,
        stats: stats.into(),
        statuses: log
            .final_statuses(total)
            .into_iter()
            .map(TrackStatusResponse::from)
            .collect(),
        log: log.lines(),
        error,
    };
    (status, Json(body)).into_response()
}

/// List recorded transfer runs, oldest first.
#[utoipa::path(
    get,
    path = "/api/v1/transfers",
    responses(
        (status = 200, description = "Transfer history", body = Vec<TransferRecordResponse>)
    ),
    tag = "transfers"
)]
pub async fn list_transfers(State(state): State<AppState>) -> impl IntoResponse {
    let records: Vec<TransferRecordResponse> = state
        .transfers
        .records()
        .into_iter()
        .map(TransferRecordResponse::from)
        .collect();
    Json(records)
}

#[utoipa::path(
    delete,
    path = "/api/v1/transfers",
    responses(
        (status = 204, description = "History cleared"),
        (status = 500, description = "History could not be written", body = ErrorResponse)
    ),
    tag = "transfers"
)]
pub async fn clear_transfers(State(state): State<AppState>) -> Response {
    match state.transfers.clear().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/transfers/{id}",
    params(
        ("id" = String, Path, description = "Transfer record ID")
    ),
    responses(
        (status = 204, description = "Record deleted"),
        (status = 400, description = "Malformed id", body = ErrorResponse),
        (status = 404, description = "Record not found", body = ErrorResponse)
    ),
    tag = "transfers"
)]
pub async fn delete_transfer(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Ok(uuid) = Uuid::parse_str(&id) else {
        return error_response(StatusCode::BAD_REQUEST, format!("Invalid transfer id {id}"));
    };

    match state.transfers.delete(TransferRecordId::from_uuid(uuid)).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, format!("Transfer {id} not found")),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}
