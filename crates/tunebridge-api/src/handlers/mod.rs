// SPDX-License-Identifier: GPL-3.0-or-later
pub mod cache;
pub mod downloads;
pub mod libraries;
pub mod media;
pub mod search;
pub mod tracks;
pub mod transfers;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::warn;
use tunebridge_application::CatalogError;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

pub(crate) fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// Map a destination-catalog failure onto a client-facing status.
pub(crate) fn catalog_error(err: CatalogError) -> Response {
    let status = match &err {
        CatalogError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        CatalogError::AlreadyInContainer(_) => StatusCode::CONFLICT,
        CatalogError::HttpStatus { status: 404, .. } => StatusCode::NOT_FOUND,
        CatalogError::HttpStatus { status: 429, .. } => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::BAD_GATEWAY,
    };
    warn!(target: "api", error = %err, "catalog request failed");
    error_response(status, err.to_string())
}
