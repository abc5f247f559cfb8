// SPDX-License-Identifier: GPL-3.0-or-later
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use tunebridge_application::AppState;
use utoipa::ToSchema;

use super::{error_response, ErrorResponse};

#[derive(Debug, Serialize, ToSchema)]
pub struct CacheStatusResponse {
    pub total_bytes: u64,
    pub budget_bytes: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CacheBudgetRequest {
    /// New budget in bytes. Zero or negative restores the default.
    pub bytes: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CacheBudgetResponse {
    pub budget_bytes: u64,
    pub removed: usize,
    pub remaining_bytes: u64,
}

#[utoipa::path(
    get,
    path = "/api/v1/cache",
    responses(
        (status = 200, description = "Cache usage", body = CacheStatusResponse),
        (status = 500, description = "Cache directory unreadable", body = ErrorResponse)
    ),
    tag = "cache"
)]
pub async fn cache_status(State(state): State<AppState>) -> Response {
    match state.media_cache.total_size().await {
        Ok(total_bytes) => Json(CacheStatusResponse {
            total_bytes,
            budget_bytes: state.media_cache.budget(),
        })
        .into_response(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/cache",
    responses(
        (status = 204, description = "Cache cleared"),
        (status = 500, description = "Cache could not be cleared", body = ErrorResponse)
    ),
    tag = "cache"
)]
pub async fn clear_cache(State(state): State<AppState>) -> Response {
    state.catalog.clear();
    match state.media_cache.clear().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

#[utoipa::path(
    put,
    path = "/api/v1/cache/budget",
    request_body = CacheBudgetRequest,
    responses(
        (status = 200, description = "Budget applied and cache swept", body = CacheBudgetResponse),
        (status = 500, description = "Sweep failed", body = ErrorResponse)
    ),
    tag = "cache"
)]
pub async fn set_cache_budget(
    State(state): State<AppState>,
    Json(request): Json<CacheBudgetRequest>,
) -> Response {
    match state.media_cache.set_budget(request.bytes).await {
        Ok(report) => {
            info!(target: "api", removed = report.removed, "cache budget changed");
            Json(CacheBudgetResponse {
                budget_bytes: state.media_cache.budget(),
                removed: report.removed,
                remaining_bytes: report.remaining_bytes,
            })
            .into_response()
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}
