// SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};

/// Recording (track) as returned by the search endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recording {
    /// MusicBrainz recording ID (MBID).
    pub id: String,
    pub title: String,
    /// Length in milliseconds.
    #[serde(default)]
    pub length: Option<u64>,
    #[serde(rename = "artist-credit", default)]
    pub artist_credit: Vec<ArtistCredit>,
    #[serde(default)]
    pub releases: Vec<ReleaseRef>,
    #[serde(default)]
    pub isrcs: Vec<String>,
    #[serde(default)]
    pub score: Option<u32>,
}

impl Recording {
    /// Name of the first credited artist.
    pub fn primary_artist(&self) -> Option<&str> {
        self.artist_credit
            .first()
            .map(|credit| credit.artist.name.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtistCredit {
    /// Name as credited on the recording.
    pub name: String,
    pub artist: ArtistRef,
    /// Join phrase (e.g., " & ", " feat. ").
    #[serde(default)]
    pub joinphrase: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtistRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleaseRef {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub date: Option<String>,
}

/// Search query parameters.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Lucene query string.
    pub query: String,
    /// Maximum number of results (default 25, max 100).
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: None,
            offset: None,
        }
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Generic search response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse<T> {
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(flatten)]
    pub results: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSearchResult {
    #[serde(default)]
    pub recordings: Vec<Recording>,
}

/// Canonical title/artist pair resolved for a free-form track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRecording {
    pub mbid: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub length_ms: Option<u64>,
    pub isrc: Option<String>,
}

impl From<Recording> for ResolvedRecording {
    fn from(recording: Recording) -> Self {
        let artist = recording.primary_artist().unwrap_or_default().to_string();
        Self {
            album: recording.releases.first().map(|release| release.title.clone()),
            isrc: recording.isrcs.first().cloned(),
            mbid: recording.id,
            title: recording.title,
            artist,
            length_ms: recording.length,
        }
    }
}
