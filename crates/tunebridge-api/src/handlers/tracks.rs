// SPDX-License-Identifier: GPL-3.0-or-later
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tunebridge_application::AppState;
use tunebridge_config::HttpConfig;
use tunebridge_domain::normalize_track_id;
use url::Url;
use utoipa::ToSchema;

use super::{error_response, ErrorResponse};

#[derive(Debug, Serialize, ToSchema)]
pub struct StreamUrlResponse {
    pub url: String,
    /// Whether the url points at an already downloaded file.
    pub local: bool,
}

/// Host part of a URL that reaches this server. IPv6 literals are bracketed
/// and wildcard binds are reached through loopback.
fn url_host(host: &str) -> String {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) if v4.is_unspecified() => Ipv4Addr::LOCALHOST.to_string(),
        Ok(IpAddr::V6(v6)) if v6.is_unspecified() => format!("[{}]", Ipv6Addr::LOCALHOST),
        Ok(IpAddr::V6(v6)) => format!("[{}]", v6),
        _ => host.to_string(),
    }
}

pub(crate) fn local_stream_url(
    http: &HttpConfig,
    track_id: &str,
    local_path: Option<&std::path::Path>,
) -> Result<Url, url::ParseError> {
    let base = format!("http://{}:{}/stream", url_host(&http.host), http.port);
    let mut params = vec![("trackId", track_id.to_string())];
    if let Some(path) = local_path {
        params.push(("path", path.display().to_string()));
    }
    Url::parse_with_params(&base, &params)
}

/// Playback url for a track on this server. Downloaded tracks are served
/// straight from disk.
#[utoipa::path(
    get,
    path = "/api/v1/tracks/{id}/stream-url",
    params(
        ("id" = String, Path, description = "Destination-catalog track ID")
    ),
    responses(
        (status = 200, description = "Stream url", body = StreamUrlResponse),
        (status = 500, description = "Url could not be built", body = ErrorResponse)
    ),
    tag = "media"
)]
pub async fn stream_url(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let track_id = normalize_track_id(&id);
    let cached = state.downloads.resolve_cached_path(&track_id).await;

    match local_stream_url(&state.config.http, &track_id, cached.as_deref()) {
        Ok(url) => Json(StreamUrlResponse {
            url: url.to_string(),
            local: cached.is_some(),
        })
        .into_response(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}
