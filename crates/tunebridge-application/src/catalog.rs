// SPDX-License-Identifier: GPL-3.0-or-later

//! Destination-catalog boundary: the traits the pipeline, download queue and
//! media cache depend on, plus the reqwest-backed implementation.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, COOKIE, ORIGIN, REFERER};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace};
use tunebridge_config::CatalogConfig;
use tunebridge_domain::{
    normalize_track_id, CandidateTrack, ContainerDetails, ContainerSummary, ContainerUpdate,
};

use crate::http::{http_client, origin_of};

const MAX_ERROR_BODY: usize = 2048;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("catalog responded with status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("deserialization failed: {0}")]
    Deserialization(String),
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
    #[error("not authenticated with the destination catalog")]
    NotAuthenticated,
    #[error("track {0} already exists in container")]
    AlreadyInContainer(String),
}

impl CatalogError {
    /// HTTP status of the failed call, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Only a 429 response is worth retrying.
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }
}

#[async_trait]
pub trait DestinationCatalog: Send + Sync {
    /// Whether a credential is available for authenticated operations.
    fn is_authenticated(&self) -> bool {
        true
    }

    async fn search(&self, query: &str) -> Result<Vec<CandidateTrack>, CatalogError>;
    async fn create_container(&self, name: &str, description: &str)
        -> Result<String, CatalogError>;
    async fn add_track(&self, container_id: &str, track: &CandidateTrack)
        -> Result<(), CatalogError>;
    async fn container_details(&self, container_id: &str)
        -> Result<ContainerDetails, CatalogError>;

    /// Container details read straight from the catalog, skipping any cache.
    /// Used where membership must be current, such as the duplicate guard.
    async fn live_container_details(
        &self,
        container_id: &str,
    ) -> Result<ContainerDetails, CatalogError> {
        self.container_details(container_id).await
    }
    async fn containers(&self) -> Result<Vec<ContainerSummary>, CatalogError>;
    async fn remove_track(&self, container_id: &str, track_id: &str)
        -> Result<(), CatalogError>;
    async fn update_container(
        &self,
        container_id: &str,
        update: &ContainerUpdate,
    ) -> Result<(), CatalogError>;
    async fn delete_container(&self, container_id: &str) -> Result<(), CatalogError>;
}

/// Resolves a catalog track id to a fetchable media URL.
#[async_trait]
pub trait StreamResolver: Send + Sync {
    async fn resolve_stream_url(&self, track_id: &str) -> Result<String, CatalogError>;
}

#[derive(Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    tracks: Vec<CandidateTrack>,
}

#[derive(Deserialize)]
struct StreamUrlResponse {
    #[serde(default)]
    url: String,
    #[serde(default, rename = "streamUrl")]
    stream_url: String,
}

#[derive(Deserialize)]
struct LibrariesResponse {
    #[serde(default)]
    libraries: Vec<ContainerSummary>,
}

#[derive(Deserialize)]
struct LibraryEnvelope {
    library: ContainerDetails,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLibraryRequest<'a> {
    name: &'a str,
    description: &'a str,
    is_public: bool,
}

#[derive(Serialize)]
struct AddTrackRequest<'a> {
    track: TrackPayload<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrackPayload<'a> {
    id: String,
    title: &'a str,
    artist: &'a str,
    artist_id: Value,
    album_title: &'a str,
    album_cover: &'a str,
    album_id: &'a str,
    release_date: &'a str,
    genre: &'a str,
    duration: f64,
    audio_quality: tunebridge_domain::AudioQuality,
}

impl<'a> From<&'a CandidateTrack> for TrackPayload<'a> {
    fn from(track: &'a CandidateTrack) -> Self {
        Self {
            id: normalize_track_id(&track.id),
            title: &track.title,
            artist: &track.artist,
            artist_id: track
                .artist_id
                .as_ref()
                .map(|id| Value::String(id.clone()))
                .unwrap_or_else(|| Value::from(0)),
            album_title: &track.album_title,
            album_cover: &track.album_cover,
            album_id: track.album_id.as_deref().unwrap_or_default(),
            release_date: &track.release_date,
            genre: &track.genre,
            duration: track.duration.unwrap_or_default(),
            audio_quality: track.audio_quality.or_hi_res_default(),
        }
    }
}

/// reqwest-backed client for the destination catalog's REST API.
///
/// Implements both [`DestinationCatalog`] and [`StreamResolver`]. Calls that
/// need a session fail with [`CatalogError::NotAuthenticated`] before any
/// request is sent when no credential is configured.
pub struct HttpCatalogClient {
    client: Client,
    base_url: String,
    origin: Option<String>,
    credential: Option<String>,
}

impl HttpCatalogClient {
    pub fn new(base_url: impl Into<String>, credential: Option<String>) -> Result<Self, CatalogError> {
        let client = http_client().map_err(|e| CatalogError::Request(e.to_string()))?;
        Ok(Self::with_client(client, base_url, credential))
    }

    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        credential: Option<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            origin: origin_of(&base_url),
            base_url,
            credential: credential.filter(|token| !token.trim().is_empty()),
        }
    }

    /// Build a client from the `[catalog]` config section.
    pub fn from_config(config: &CatalogConfig) -> Result<Self, CatalogError> {
        Self::new(
            config.normalized_base_url(),
            config.credential().map(str::to_string),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    fn endpoint(&self, path: &str) -> Result<Url, CatalogError> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|err| CatalogError::InvalidBaseUrl(err.to_string()))
    }

    fn require_credential(&self) -> Result<&str, CatalogError> {
        self.credential().ok_or(CatalogError::NotAuthenticated)
    }

    fn decorate(&self, builder: RequestBuilder) -> RequestBuilder {
        let mut builder = builder.header(ACCEPT, "application/json, text/plain, */*");
        if let Some(origin) = &self.origin {
            builder = builder
                .header(ORIGIN, origin.as_str())
                .header(REFERER, format!("{}/", origin));
        }
        if let Some(token) = &self.credential {
            builder = builder
                .header(AUTHORIZATION, format!("Bearer {}", token))
                .header(COOKIE, format!("session={}", token));
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, CatalogError> {
        let response = self
            .decorate(builder)
            .send()
            .await
            .map_err(|e| CatalogError::Request(e.to_string()))?;

        let status = response.status();
        trace!(target: "catalog", url = %response.url(), status = status.as_u16(), "catalog response");
        if status.is_success() {
            return Ok(response);
        }

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.to_ascii_lowercase().contains("text/html"));
        let body = response.text().await.unwrap_or_default();
        Err(CatalogError::HttpStatus {
            status: status.as_u16(),
            body: error_body(&body, is_html),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, CatalogError> {
        let response = self.send(self.client.get(url)).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| CatalogError::Deserialization(e.to_string()))
    }
}

/// Truncate error bodies and drop HTML error pages entirely.
fn error_body(raw: &str, is_html: bool) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    if is_html || lower.starts_with("<!doctype") || lower.starts_with("<html") {
        return String::new();
    }
    let mut end = trimmed.len().min(MAX_ERROR_BODY);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

fn parse_search_body(body: &str) -> Result<Vec<CandidateTrack>, CatalogError> {
    if let Ok(envelope) = serde_json::from_str::<SearchEnvelope>(body) {
        return Ok(envelope.tracks);
    }
    serde_json::from_str::<Vec<CandidateTrack>>(body)
        .map_err(|e| CatalogError::Deserialization(e.to_string()))
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(normalize_track_id(&id.to_string())),
        _ => None,
    }
}

#[async_trait]
impl DestinationCatalog for HttpCatalogClient {
    fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    async fn search(&self, query: &str) -> Result<Vec<CandidateTrack>, CatalogError> {
        let mut url = self.endpoint("/search")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("type", "track");

        debug!(target: "catalog", query, "searching catalog");
        let body = self
            .send(self.client.get(url))
            .await?
            .text()
            .await
            .map_err(|e| CatalogError::Request(e.to_string()))?;
        parse_search_body(&body)
    }

    async fn create_container(
        &self,
        name: &str,
        description: &str,
    ) -> Result<String, CatalogError> {
        self.require_credential()?;
        let url = self.endpoint("/libraries")?;
        let request = CreateLibraryRequest {
            name,
            description,
            is_public: true,
        };

        let created: Value = self
            .send(self.client.post(url).json(&request))
            .await?
            .json()
            .await
            .map_err(|e| CatalogError::Deserialization(e.to_string()))?;

        id_from_value(&created["library"]["id"]).ok_or_else(|| {
            CatalogError::Deserialization("response is missing library.id".to_string())
        })
    }

    async fn add_track(
        &self,
        container_id: &str,
        track: &CandidateTrack,
    ) -> Result<(), CatalogError> {
        self.require_credential()?;
        let url = self.endpoint(&format!("/libraries/{}/tracks", container_id))?;
        let request = AddTrackRequest {
            track: TrackPayload::from(track),
        };
        self.send(self.client.post(url).json(&request)).await?;
        Ok(())
    }

    async fn container_details(
        &self,
        container_id: &str,
    ) -> Result<ContainerDetails, CatalogError> {
        let mut private = self.endpoint(&format!("/libraries/{}", container_id))?;
        private.query_pairs_mut().append_pair("limit", "1000");
        let private_err = match self.get_json::<LibraryEnvelope>(private).await {
            Ok(envelope) => return Ok(envelope.library),
            Err(err) => err,
        };

        let mut shared = self.endpoint(&format!("/shared/library/{}", container_id))?;
        shared.query_pairs_mut().append_pair("limit", "1000");
        match self.get_json::<LibraryEnvelope>(shared).await {
            Ok(envelope) => Ok(envelope.library),
            Err(shared_err) => {
                debug!(
                    target: "catalog",
                    container_id,
                    private = %private_err,
                    shared = %shared_err,
                    "container details unavailable"
                );
                Err(private_err)
            }
        }
    }

    async fn containers(&self) -> Result<Vec<ContainerSummary>, CatalogError> {
        let url = self.endpoint("/libraries")?;
        let response: LibrariesResponse = self.get_json(url).await?;
        Ok(response.libraries)
    }

    async fn remove_track(&self, container_id: &str, track_id: &str) -> Result<(), CatalogError> {
        self.require_credential()?;
        let url = self.endpoint(&format!(
            "/libraries/{}/tracks/{}",
            container_id,
            normalize_track_id(track_id)
        ))?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn update_container(
        &self,
        container_id: &str,
        update: &ContainerUpdate,
    ) -> Result<(), CatalogError> {
        self.require_credential()?;
        let url = self.endpoint(&format!("/libraries/{}", container_id))?;
        self.send(self.client.patch(url).json(update)).await?;
        Ok(())
    }

    async fn delete_container(&self, container_id: &str) -> Result<(), CatalogError> {
        self.require_credential()?;
        let url = self.endpoint(&format!("/libraries/{}", container_id))?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }
}

#[async_trait]
impl StreamResolver for HttpCatalogClient {
    async fn resolve_stream_url(&self, track_id: &str) -> Result<String, CatalogError> {
        let mut url = self.endpoint("/stream")?;
        url.query_pairs_mut()
            .append_pair("trackId", &normalize_track_id(track_id));

        let response: StreamUrlResponse = self.get_json(url).await?;
        if !response.url.is_empty() {
            return Ok(response.url);
        }
        if !response.stream_url.is_empty() {
            return Ok(response.stream_url);
        }
        Err(CatalogError::Deserialization(
            "stream response did not include a url".to_string(),
        ))
    }
}
