// SPDX-License-Identifier: GPL-3.0-or-later

//! Download queue with bounded concurrency, byte-level progress and a JSON
//! history of completed items.
//!
//! Queue state lives behind one std mutex that is only held for in-memory
//! updates; network and file I/O always happen outside it.

use futures_util::StreamExt;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use tunebridge_config::AppConfig;
use tunebridge_domain::{normalize_track_id, CandidateTrack, DownloadId, DownloadItem, DownloadStatus};
use uuid::Uuid;

use crate::catalog::{CatalogError, StreamResolver};
use crate::http::{http_client, media_request_headers};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to resolve stream url: {0}")]
    Resolve(#[from] CatalogError),
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {0}")]
    HttpStatus(u16),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to persist download history: {0}")]
    Persist(String),
}

#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub download_dir: PathBuf,
    pub history_file: PathBuf,
    pub max_concurrency: usize,
    pub catalog_base: String,
    pub credential: Option<String>,
}

impl DownloadSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            download_dir: config.storage.download_path.clone(),
            history_file: config.storage.download_history_file(),
            max_concurrency: config.workers.effective_max_concurrency(),
            catalog_base: config.catalog.normalized_base_url(),
            credential: config.catalog.credential().map(str::to_string),
        }
    }
}

#[derive(Default)]
struct QueueState {
    queue: Vec<DownloadItem>,
    history: Vec<DownloadItem>,
    failed: Vec<DownloadItem>,
    active: usize,
}

struct Inner {
    state: Mutex<QueueState>,
    persist: tokio::sync::Mutex<()>,
    resolver: Arc<dyn StreamResolver>,
    client: Client,
    settings: DownloadSettings,
}

/// FIFO download queue with a fixed number of concurrent slots.
///
/// Progress, queue and failure state live in memory behind one lock; only
/// completed items are persisted, to `{data_dir}/download_history.json`.
/// Each download writes to a unique temp file and is renamed into place once
/// the body is complete.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<Inner>,
}

const TEMP_EXTENSION: &str = "part";

/// Replace characters that are invalid in file names on common platforms.
pub fn clean_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect()
}

/// File name for a downloaded track. The catalog id keeps two tracks that
/// share an artist and title from landing on the same file.
pub fn download_file_name(item: &DownloadItem) -> String {
    clean_file_name(&format!(
        "{} - {} [{}].flac",
        item.artist, item.title, item.track_id
    ))
}

impl DownloadManager {
    /// Build a manager and reload any persisted history.
    pub async fn load(
        resolver: Arc<dyn StreamResolver>,
        settings: DownloadSettings,
    ) -> Result<Self, DownloadError> {
        let client = http_client().map_err(|e| DownloadError::Request(e.to_string()))?;
        let history = read_history(&settings.history_file).await;
        info!(
            target: "downloads",
            entries = history.len(),
            max_concurrency = settings.max_concurrency,
            "download manager ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    history,
                    ..QueueState::default()
                }),
                persist: tokio::sync::Mutex::new(()),
                resolver,
                client,
                settings,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn max_concurrency(&self) -> usize {
        self.inner.settings.max_concurrency.max(1)
    }

    /// Queue a track and return immediately.
    pub fn enqueue(&self, track: &CandidateTrack) -> DownloadId {
        let item = DownloadItem::pending(track);
        let id = item.id;
        debug!(target: "downloads", id = %id, track_id = %item.track_id, "queued download");
        self.state().queue.push(item);
        self.schedule();
        id
    }

    /// Pending and running items in enqueue order.
    pub fn queue(&self) -> Vec<DownloadItem> {
        self.state().queue.clone()
    }

    /// Completed items, oldest first, as persisted to the history file.
    pub fn history(&self) -> Vec<DownloadItem> {
        self.state().history.clone()
    }

    /// Items that ended in failure. Not persisted.
    pub fn failed(&self) -> Vec<DownloadItem> {
        self.state().failed.clone()
    }

    /// Number of downloads currently holding a concurrency slot.
    pub fn active_count(&self) -> usize {
        self.state().active
    }

    /// Forget every completed item and rewrite the history file. Downloaded
    /// files stay on disk.
    pub async fn clear_history(&self) -> Result<(), DownloadError> {
        self.state().history.clear();
        self.persist_history().await
    }

    /// Path of a completed download for `track_id` whose file still exists.
    pub async fn resolve_cached_path(&self, track_id: &str) -> Option<PathBuf> {
        let track_id = normalize_track_id(track_id);
        let candidates: Vec<PathBuf> = self
            .state()
            .history
            .iter()
            .filter(|item| item.status == DownloadStatus::Completed && item.track_id == track_id)
            .filter_map(|item| item.file_path.clone())
            .collect();

        for path in candidates {
            if tokio::fs::metadata(&path)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false)
            {
                return Some(path);
            }
        }
        None
    }

    /// Canonical form of `path` when it names a file this manager produced:
    /// anything under the download directory, or a file recorded as a
    /// completed download. `Ok(None)` means the file exists but is not ours.
    pub async fn downloaded_file(&self, path: &Path) -> std::io::Result<Option<PathBuf>> {
        let canonical = tokio::fs::canonicalize(path).await?;

        if let Ok(root) = tokio::fs::canonicalize(&self.inner.settings.download_dir).await {
            if canonical.starts_with(&root) {
                return Ok(Some(canonical));
            }
        }

        let recorded: Vec<PathBuf> = self
            .state()
            .history
            .iter()
            .filter(|item| item.status == DownloadStatus::Completed)
            .filter_map(|item| item.file_path.clone())
            .collect();
        for file in recorded {
            if tokio::fs::canonicalize(&file).await.ok().as_ref() == Some(&canonical) {
                return Ok(Some(canonical));
            }
        }
        Ok(None)
    }

    /// Start pending items, oldest first, until every slot is busy.
    fn schedule(&self) {
        loop {
            let next = {
                let mut state = self.state();
                if state.active >= self.max_concurrency() {
                    return;
                }
                let Some(item) = state
                    .queue
                    .iter_mut()
                    .find(|item| item.status == DownloadStatus::Pending)
                else {
                    return;
                };
                item.status = DownloadStatus::Downloading;
                let started = item.clone();
                state.active += 1;
                started
            };

            let manager = self.clone();
            tokio::spawn(async move { manager.run(next).await });
        }
    }

    async fn run(self, item: DownloadItem) {
        let result = self.download(&item).await;

        let completed = {
            let mut state = self.state();
            state.active = state.active.saturating_sub(1);
            let position = state.queue.iter().position(|queued| queued.id == item.id);
            let mut finished = match position {
                Some(position) => state.queue.remove(position),
                None => item.clone(),
            };

            match &result {
                Ok(path) => {
                    finished.status = DownloadStatus::Completed;
                    finished.progress = 1.0;
                    finished.file_path = Some(path.clone());
                    state.history.push(finished);
                    true
                }
                Err(err) => {
                    finished.status = DownloadStatus::Failed;
                    finished.error = Some(err.to_string());
                    state.failed.push(finished);
                    false
                }
            }
        };

        match result {
            Ok(path) => {
                info!(target: "downloads", id = %item.id, path = %path.display(), "download completed");
            }
            Err(err) => {
                warn!(target: "downloads", id = %item.id, track_id = %item.track_id, error = %err, "download failed");
            }
        }

        if completed {
            if let Err(err) = self.persist_history().await {
                warn!(target: "downloads", error = %err, "failed to save download history");
            }
        }

        self.schedule();
    }

    fn update_item(&self, id: DownloadId, apply: impl FnOnce(&mut DownloadItem)) {
        if let Some(item) = self.state().queue.iter_mut().find(|item| item.id == id) {
            apply(item);
        }
    }

    async fn download(&self, item: &DownloadItem) -> Result<PathBuf, DownloadError> {
        let settings = &self.inner.settings;
        let url = self.inner.resolver.resolve_stream_url(&item.track_id).await?;
        let headers = media_request_headers(
            &url,
            &settings.catalog_base,
            settings.credential.as_deref(),
        );

        tokio::fs::create_dir_all(&settings.download_dir).await?;
        let path = settings.download_dir.join(download_file_name(item));

        let head_size = match self
            .inner
            .client
            .head(&url)
            .headers(headers.clone())
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .filter(|len| *len > 0),
            _ => None,
        };

        let response = self
            .inner
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| DownloadError::Request(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            return Err(DownloadError::HttpStatus(status.as_u16()));
        }

        let total = head_size.or_else(|| response.content_length().filter(|len| *len > 0));
        self.update_item(item.id, |queued| {
            queued.total_bytes = total;
            queued.file_path = Some(path.clone());
        });

        // Each attempt writes its own temp file; the final name only ever
        // holds a complete download.
        let temp = path.with_extension(format!("{}.{}", Uuid::new_v4(), TEMP_EXTENSION));
        let written = match self.write_body(item.id, &temp, response).await {
            Ok(()) => tokio::fs::rename(&temp, &path).await.map_err(DownloadError::from),
            Err(err) => Err(err),
        };
        match written {
            Ok(()) => Ok(path),
            Err(err) => {
                let _ = tokio::fs::remove_file(&temp).await;
                Err(err)
            }
        }
    }

    async fn write_body(
        &self,
        id: DownloadId,
        path: &Path,
        response: reqwest::Response,
    ) -> Result<(), DownloadError> {
        let mut file = tokio::fs::File::create(path).await?;
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| DownloadError::Request(e.to_string()))?;
            file.write_all(&chunk).await?;
            self.update_item(id, |queued| queued.record_chunk(chunk.len() as u64));
        }

        file.flush().await?;
        Ok(())
    }

    async fn persist_history(&self) -> Result<(), DownloadError> {
        let _guard = self.inner.persist.lock().await;
        let snapshot = self.history();
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| DownloadError::Persist(e.to_string()))?;

        let target = &self.inner.settings.history_file;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp = target.with_extension("json.tmp");
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, target).await?;
        Ok(())
    }
}

async fn read_history(path: &Path) -> Vec<DownloadItem> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            warn!(target: "downloads", path = %path.display(), error = %err, "could not read download history");
            return Vec::new();
        }
    };

    serde_json::from_slice(&data).unwrap_or_else(|err| {
        warn!(target: "downloads", path = %path.display(), error = %err, "ignoring malformed download history");
        Vec::new()
    })
}
