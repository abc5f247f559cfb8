// SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::{MusicBrainzError, Result};
use crate::models::{RecordingSearchResult, ResolvedRecording, SearchQuery, SearchResponse};
use crate::rate_limiter::RateLimiter;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace, warn};
use url::Url;

const MUSICBRAINZ_API_BASE: &str = "https://musicbrainz.org/ws/2";
const USER_AGENT: &str = concat!("Tunebridge/", env!("CARGO_PKG_VERSION"));

/// Characters with meaning in the Lucene query syntax.
const LUCENE_SPECIAL: &[char] = &[
    '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\', '/',
];

/// MusicBrainz API client with rate limiting.
#[derive(Debug, Clone)]
pub struct MusicBrainzClient {
    client: Client,
    base_url: String,
    rate_limiter: RateLimiter,
}

impl MusicBrainzClient {
    /// Create a new MusicBrainz client with default settings.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> MusicBrainzClientBuilder {
        MusicBrainzClientBuilder::default()
    }

    /// Run a raw Lucene recording search.
    pub async fn search_recordings(
        &self,
        query: SearchQuery,
    ) -> Result<SearchResponse<RecordingSearchResult>> {
        let mut url = Url::parse(&format!("{}/recording", self.base_url))
            .map_err(|e| MusicBrainzError::InvalidBaseUrl(e.to_string()))?;

        url.query_pairs_mut()
            .append_pair("query", &query.query)
            .append_pair("fmt", "json");

        if let Some(limit) = query.limit {
            url.query_pairs_mut()
                .append_pair("limit", &limit.to_string());
        }

        if let Some(offset) = query.offset {
            url.query_pairs_mut()
                .append_pair("offset", &offset.to_string());
        }

        self.get(url.as_str()).await
    }

    /// Resolve a free-form title/artist pair to its canonical recording.
    ///
    /// Searches `recording:(title) AND artist:(artist)` first, then the title
    /// alone. `Ok(None)` means neither query produced a recording; a failing
    /// fallback query is treated the same way.
    pub async fn resolve_recording(
        &self,
        title: &str,
        artist: &str,
    ) -> Result<Option<ResolvedRecording>> {
        let title = escape_lucene(&clean_query_term(title));
        let artist = escape_lucene(&clean_query_term(artist));
        if title.is_empty() {
            return Ok(None);
        }

        let combined = format!("recording:({}) AND artist:({})", title, artist);
        let response = self
            .search_recordings(SearchQuery::new(combined).limit(1))
            .await?;
        if let Some(recording) = response.results.recordings.into_iter().next() {
            return Ok(Some(recording.into()));
        }

        let fallback = format!("recording:({})", title);
        match self
            .search_recordings(SearchQuery::new(fallback).limit(1))
            .await
        {
            Ok(response) => Ok(response.results.recordings.into_iter().next().map(Into::into)),
            Err(err) => {
                warn!(target: "musicbrainz", error = %err, "title-only recording search failed");
                Ok(None)
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.rate_limiter.acquire().await;

        trace!(target: "musicbrainz", "GET {}", url);

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        debug!(target: "musicbrainz", "response status: {}", status);

        if status == 503 {
            return Err(MusicBrainzError::RateLimitExceeded);
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(MusicBrainzError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            MusicBrainzError::InvalidResponse(format!("Failed to parse response: {}", e))
        })
    }
}

/// Strip decorations that confuse recording search: anything from the first
/// `(`, `[`, ` - ` or `,` onwards.
pub fn clean_query_term(raw: &str) -> String {
    let mut value = raw;
    for marker in ["(", "[", " - ", ","] {
        if let Some(idx) = value.find(marker) {
            value = &value[..idx];
        }
    }
    value.trim().to_string()
}

pub fn escape_lucene(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if LUCENE_SPECIAL.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Builder for configuring a MusicBrainz client.
#[derive(Debug)]
pub struct MusicBrainzClientBuilder {
    base_url: String,
    timeout: Duration,
    rate_limit_interval: Duration,
}

impl Default for MusicBrainzClientBuilder {
    fn default() -> Self {
        Self {
            base_url: MUSICBRAINZ_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
            rate_limit_interval: Duration::from_secs(1),
        }
    }
}

impl MusicBrainzClientBuilder {
    /// Set a custom base URL (useful for testing with mock servers).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn rate_limit_interval(mut self, interval: Duration) -> Self {
        self.rate_limit_interval = interval;
        self
    }

    pub fn build(self) -> Result<MusicBrainzClient> {
        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(MusicBrainzClient {
            client,
            base_url: self.base_url,
            rate_limiter: RateLimiter::new(self.rate_limit_interval),
        })
    }
}
