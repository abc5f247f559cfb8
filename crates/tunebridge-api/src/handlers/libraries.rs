// SPDX-License-Identifier: GPL-3.0-or-later
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use tunebridge_application::{AppState, CatalogError, DestinationCatalog};
use tunebridge_domain::{
    normalize_track_id, CandidateTrack, ContainerDetails, ContainerSummary, ContainerUpdate,
};
use utoipa::{IntoParams, ToSchema};

use super::{catalog_error, error_response, ErrorResponse};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListLibrariesQuery {
    /// Skip the response cache.
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LibraryResponse {
    pub id: String,
    pub name: String,
    pub track_count: u32,
}

impl From<ContainerSummary> for LibraryResponse {
    fn from(summary: ContainerSummary) -> Self {
        Self {
            id: summary.id,
            name: summary.name,
            track_count: summary.track_count,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LibraryTrackResponse {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album_title: String,
    pub album_cover: String,
}

impl From<CandidateTrack> for LibraryTrackResponse {
    fn from(track: CandidateTrack) -> Self {
        Self {
            id: track.id,
            title: track.title,
            artist: track.artist,
            album_title: track.album_title,
            album_cover: track.album_cover,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LibraryDetailsResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub is_public: bool,
    pub tracks: Vec<LibraryTrackResponse>,
}

impl From<ContainerDetails> for LibraryDetailsResponse {
    fn from(details: ContainerDetails) -> Self {
        Self {
            id: details.id,
            name: details.name,
            description: details.description,
            is_public: details.is_public,
            tracks: details
                .tracks
                .into_iter()
                .map(LibraryTrackResponse::from)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateLibraryRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddLibraryTrackRequest {
    /// Destination-catalog track id.
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album_title: String,
    #[serde(default)]
    pub album_cover: String,
}

impl From<AddLibraryTrackRequest> for CandidateTrack {
    fn from(request: AddLibraryTrackRequest) -> Self {
        CandidateTrack {
            album_title: request.album_title,
            album_cover: request.album_cover,
            ..CandidateTrack::new(request.id, request.artist, request.title)
        }
    }
}

fn no_content(result: Result<(), CatalogError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => catalog_error(err),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// List the account's containers on the destination catalog.
#[utoipa::path(
    get,
    path = "/api/v1/libraries",
    params(ListLibrariesQuery),
    responses(
        (status = 200, description = "Libraries", body = Vec<LibraryResponse>),
        (status = 401, description = "No catalog credential configured", body = ErrorResponse),
        (status = 502, description = "Catalog request failed", body = ErrorResponse)
    ),
    tag = "libraries"
)]
pub async fn list_libraries(
    State(state): State<AppState>,
    Query(query): Query<ListLibrariesQuery>,
) -> Response {
    let result = if query.refresh {
        state.catalog.refresh_containers().await
    } else {
        state.catalog.containers().await
    };
    match result {
        Ok(containers) => {
            let body: Vec<LibraryResponse> =
                containers.into_iter().map(LibraryResponse::from).collect();
            Json(body).into_response()
        }
        Err(err) => catalog_error(err),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/libraries/{id}",
    params(("id" = String, Path, description = "Library ID")),
    responses(
        (status = 200, description = "Library with its tracks", body = LibraryDetailsResponse),
        (status = 404, description = "Library not found", body = ErrorResponse),
        (status = 502, description = "Catalog request failed", body = ErrorResponse)
    ),
    tag = "libraries"
)]
pub async fn get_library(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    debug!(target: "api", %id, "fetching library");
    match state.catalog.container_details(&id).await {
        Ok(details) => Json(LibraryDetailsResponse::from(details)).into_response(),
        Err(err) => catalog_error(err),
    }
}

#[utoipa::path(
    patch,
    path = "/api/v1/libraries/{id}",
    params(("id" = String, Path, description = "Library ID")),
    request_body = UpdateLibraryRequest,
    responses(
        (status = 204, description = "Library updated"),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 502, description = "Catalog request failed", body = ErrorResponse)
    ),
    tag = "libraries"
)]
pub async fn update_library(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateLibraryRequest>,
) -> Response {
    if request.name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Library name is required");
    }
    let update = ContainerUpdate {
        name: request.name,
        description: request.description,
        is_public: request.is_public,
    };
    no_content(state.catalog.update_container(&id, &update).await)
}

#[utoipa::path(
    delete,
    path = "/api/v1/libraries/{id}",
    params(("id" = String, Path, description = "Library ID")),
    responses(
        (status = 204, description = "Library deleted"),
        (status = 502, description = "Catalog request failed", body = ErrorResponse)
    ),
    tag = "libraries"
)]
pub async fn delete_library(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    no_content(state.catalog.delete_container(&id).await)
}

/// Add one track to an existing library. Tracks already in the library are
/// rejected with 409.
#[utoipa::path(
    post,
    path = "/api/v1/libraries/{id}/tracks",
    params(("id" = String, Path, description = "Library ID")),
    request_body = AddLibraryTrackRequest,
    responses(
        (status = 204, description = "Track added"),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 409, description = "Track already in library", body = ErrorResponse),
        (status = 502, description = "Catalog request failed", body = ErrorResponse)
    ),
    tag = "libraries"
)]
pub async fn add_library_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AddLibraryTrackRequest>,
) -> Response {
    if request.id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Track id is required");
    }
    let track = CandidateTrack::from(request);
    let track_id = normalize_track_id(&track.id);

    // A failed membership lookup does not block the add.
    if let Ok(details) = state.catalog.live_container_details(&id).await {
        if details.contains_track(&track_id) {
            return catalog_error(CatalogError::AlreadyInContainer(track_id));
        }
    }

    debug!(target: "api", library = %id, %track_id, "adding track to library");
    no_content(state.catalog.add_track(&id, &track).await)
}

#[utoipa::path(
    delete,
    path = "/api/v1/libraries/{id}/tracks/{track_id}",
    params(
        ("id" = String, Path, description = "Library ID"),
        ("track_id" = String, Path, description = "Track ID")
    ),
    responses(
        (status = 204, description = "Track removed"),
        (status = 502, description = "Catalog request failed", body = ErrorResponse)
    ),
    tag = "libraries"
)]
pub async fn remove_library_track(
    State(state): State<AppState>,
    Path((id, track_id)): Path<(String, String)>,
) -> Response {
    no_content(state.catalog.remove_track(&id, &track_id).await)
}
