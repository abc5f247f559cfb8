// SPDX-License-Identifier: GPL-3.0-or-later
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

// ============================================================================
// Value Objects & IDs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DownloadId(pub Uuid);

impl DownloadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for DownloadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DownloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferRecordId(pub Uuid);

impl TransferRecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for TransferRecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransferRecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog ids arrive as strings or as JSON numbers (`123`, `123.0`); this
/// renders integral numeric ids without a fractional part.
pub fn normalize_track_id(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 && trimmed.contains('.') => {
            format!("{:.0}", value)
        }
        _ => trimmed.to_string(),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Int(i64),
    Float(f64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(text) => normalize_track_id(&text),
            RawId::Int(value) => value.to_string(),
            RawId::Float(value) => format!("{:.0}", value),
        }
    }
}

fn flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(RawId::into_string)
}

fn flexible_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?
        .map(RawId::into_string)
        .filter(|id| !id.is_empty()))
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Tracks
// ============================================================================

/// A track imported from the source catalog. Read-only input to matching.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceTrack {
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
    pub release_date: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
}

impl SourceTrack {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioQuality {
    #[serde(rename = "maximumBitDepth", default)]
    pub maximum_bit_depth: u32,
    #[serde(rename = "maximumSamplingRate", default)]
    pub maximum_sampling_rate: f64,
    #[serde(rename = "isHiRes", default)]
    pub is_hi_res: bool,
}

impl AudioQuality {
    /// Quality assumed when the catalog omitted it.
    pub const HI_RES_DEFAULT: AudioQuality = AudioQuality {
        maximum_bit_depth: 24,
        maximum_sampling_rate: 96.0,
        is_hi_res: true,
    };

    pub fn is_unknown(&self) -> bool {
        self.maximum_bit_depth == 0 && self.maximum_sampling_rate == 0.0
    }

    pub fn or_hi_res_default(self) -> Self {
        if self.is_unknown() {
            Self::HI_RES_DEFAULT
        } else {
            self
        }
    }
}

/// A destination-catalog search result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTrack {
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub artist: String,
    #[serde(default, deserialize_with = "flexible_optional_id")]
    pub artist_id: Option<String>,
    #[serde(default, deserialize_with = "nullable_string")]
    pub album_title: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub album_cover: String,
    #[serde(default, deserialize_with = "flexible_optional_id")]
    pub album_id: Option<String>,
    #[serde(default, deserialize_with = "nullable_string")]
    pub release_date: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub genre: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub audio_quality: AudioQuality,
}

impl CandidateTrack {
    pub fn new(
        id: impl Into<String>,
        artist: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            ..Self::default()
        }
    }
}

// ============================================================================
// Containers (destination libraries)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub track_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub description: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub tracks: Vec<CandidateTrack>,
}

impl ContainerDetails {
    pub fn contains_track(&self, track_id: &str) -> bool {
        self.tracks.iter().any(|track| track.id == track_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerUpdate {
    pub name: String,
    pub description: String,
    pub is_public: bool,
}

// ============================================================================
// Transfer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferStats {
    pub total: usize,
    pub matched: usize,
    pub added: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackStatus {
    Pending,
    Searching,
    Found,
    NotFound,
    Adding,
    Added,
    Error,
}

impl TrackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Searching => "searching",
            Self::Found => "found",
            Self::NotFound => "not-found",
            Self::Adding => "adding",
            Self::Added => "added",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NotFound | Self::Added | Self::Error)
    }
}

impl std::fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackStatusUpdate {
    pub index: usize,
    pub status: TrackStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferOutcome {
    Completed,
    Failed,
}

/// Persisted summary of one transfer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub id: TransferRecordId,
    pub container_name: String,
    #[serde(default)]
    pub source: Option<String>,
    pub stats: TransferStats,
    pub status: TransferOutcome,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_secs: i64,
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TransferRecord {
    pub fn started(container_name: impl Into<String>, source: Option<String>) -> Self {
        Self {
            id: TransferRecordId::new(),
            container_name: container_name.into(),
            source,
            stats: TransferStats::default(),
            status: TransferOutcome::Failed,
            created_at: Utc::now(),
            completed_at: None,
            duration_secs: 0,
            container_id: None,
            error_message: None,
        }
    }

    pub fn finish(
        &mut self,
        stats: TransferStats,
        container_id: Option<String>,
        error_message: Option<String>,
    ) {
        let completed_at = Utc::now();
        self.stats = stats;
        self.status = if error_message.is_none() {
            TransferOutcome::Completed
        } else {
            TransferOutcome::Failed
        };
        self.duration_secs = (completed_at - self.created_at).num_seconds();
        self.completed_at = Some(completed_at);
        self.container_id = container_id;
        self.error_message = error_message;
    }
}

// ============================================================================
// Downloads
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Downloading => write!(f, "downloading"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadItem {
    pub id: DownloadId,
    pub track_id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub cover_art: String,
    pub status: DownloadStatus,
    /// Fraction of the body received, 0.0 to 1.0. Stays 0.0 while the size is unknown.
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub total_bytes: Option<u64>,
    #[serde(default)]
    pub downloaded_bytes: u64,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    #[serde(default)]
    pub error: Option<String>,
}

impl DownloadItem {
    pub fn pending(track: &CandidateTrack) -> Self {
        Self {
            id: DownloadId::new(),
            track_id: normalize_track_id(&track.id),
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album_title.clone(),
            cover_art: track.album_cover.clone(),
            status: DownloadStatus::Pending,
            progress: 0.0,
            total_bytes: None,
            downloaded_bytes: 0,
            file_path: None,
            error: None,
        }
    }

    pub fn record_chunk(&mut self, len: u64) {
        self.downloaded_bytes += len;
        if let Some(total) = self.total_bytes.filter(|total| *total > 0) {
            self.progress = (self.downloaded_bytes as f64 / total as f64).min(1.0);
        }
    }
}
