// SPDX-License-Identifier: GPL-3.0-or-later
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use tunebridge_application::{AppState, DestinationCatalog};
use tunebridge_domain::CandidateTrack;
use utoipa::{IntoParams, ToSchema};

use super::{catalog_error, error_response, ErrorResponse};

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchQuery {
    /// Free-text query, usually "artist title".
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CatalogTrackResponse {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album_title: String,
    pub album_cover: String,
    pub release_date: String,
    pub genre: String,
    pub duration: Option<f64>,
    pub maximum_bit_depth: u32,
    pub maximum_sampling_rate: f64,
    pub is_hi_res: bool,
}

impl From<CandidateTrack> for CatalogTrackResponse {
    fn from(track: CandidateTrack) -> Self {
        Self {
            id: track.id,
            title: track.title,
            artist: track.artist,
            album_title: track.album_title,
            album_cover: track.album_cover,
            release_date: track.release_date,
            genre: track.genre,
            duration: track.duration,
            maximum_bit_depth: track.audio_quality.maximum_bit_depth,
            maximum_sampling_rate: track.audio_quality.maximum_sampling_rate,
            is_hi_res: track.audio_quality.is_hi_res,
        }
    }
}

/// Search the destination catalog for tracks. Results carry the ids that
/// downloads and library adds expect.
#[utoipa::path(
    get,
    path = "/api/v1/search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching tracks", body = Vec<CatalogTrackResponse>),
        (status = 400, description = "Empty query", body = ErrorResponse),
        (status = 502, description = "Catalog request failed", body = ErrorResponse)
    ),
    tag = "search"
)]
pub async fn search_tracks(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Response {
    let q = query.q.trim();
    if q.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Query is required");
    }
    debug!(target: "api", query = %q, "catalog search");
    match state.catalog.search(q).await {
        Ok(tracks) => {
            let body: Vec<CatalogTrackResponse> =
                tracks.into_iter().map(CatalogTrackResponse::from).collect();
            Json(body).into_response()
        }
        Err(err) => catalog_error(err),
    }
}
