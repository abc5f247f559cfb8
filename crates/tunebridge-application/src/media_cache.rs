// SPDX-License-Identifier: GPL-3.0-or-later

//! Disk cache for audio streams and cover images.
//!
//! Streams are fetched once, relayed to the caller while being written to a
//! uniquely named `.part` file, and only renamed into place after the upstream
//! body finished cleanly. A size sweep evicts the oldest files once the cache
//! grows past its budget.

use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tunebridge_config::{cache_budget_from, AppConfig};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::catalog::{CatalogError, StreamResolver};
use crate::http::{http_client, media_request_headers};

const TEMP_EXTENSION: &str = "part";
const RELAY_BUFFER: usize = 16;

/// Failures while serving or maintaining the media cache.
#[derive(Debug, Error)]
pub enum MediaCacheError {
    #[error("{0} required")]
    MissingParameter(&'static str),
    #[error("failed to get stream url: {0}")]
    Resolve(#[from] CatalogError),
    #[error("failed to fetch upstream media: {0}")]
    Upstream(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type MediaBody = BoxStream<'static, Result<Bytes, io::Error>>;

/// What the HTTP layer should send back.
pub enum MediaSource {
    /// A file on disk, either a cache hit or a caller-supplied local path.
    File(PathBuf),
    /// A relayed upstream response. Successful stream bodies are also being
    /// written to the cache in the background.
    Upstream {
        status: u16,
        headers: HeaderMap,
        body: MediaBody,
    },
    /// A fully buffered body, used when an image could not be written to disk.
    Memory {
        content_type: Option<String>,
        bytes: Bytes,
    },
}

impl std::fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Upstream { status, .. } => {
                f.debug_struct("Upstream").field("status", status).finish()
            }
            Self::Memory { bytes, .. } => f.debug_struct("Memory").field("len", &bytes.len()).finish(),
        }
    }
}

/// Outcome of an eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub remaining_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct MediaCacheSettings {
    pub root: PathBuf,
    pub budget_bytes: u64,
    pub catalog_base: String,
    pub credential: Option<String>,
}

impl MediaCacheSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            root: config.storage.cache_dir(),
            budget_bytes: config.storage.cache_budget_bytes(),
            catalog_base: config.catalog.normalized_base_url(),
            credential: config.catalog.credential().map(str::to_string),
        }
    }
}

struct CacheInner {
    root: PathBuf,
    images: PathBuf,
    budget: RwLock<u64>,
    sweep: tokio::sync::Mutex<()>,
    client: Client,
    resolver: Arc<dyn StreamResolver>,
    catalog_base: String,
    credential: Option<String>,
}

/// Disk cache for streamed audio and cover images, bounded by a byte budget.
///
/// Cloning is cheap; clones share the same directory, budget and HTTP client.
/// Completed files only appear under the cache root through a rename, so a
/// reader never sees a partially written entry.
#[derive(Clone)]
pub struct MediaCache {
    inner: Arc<CacheInner>,
}

/// File name for a cached stream. Ids that are not plain tokens are hashed so
/// they can never escape the cache directory.
fn stream_file_name(track_id: &str) -> String {
    let plain = !track_id.is_empty()
        && track_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if plain {
        format!("{track_id}.flac")
    } else {
        format!("{}.flac", hex_digest(track_id))
    }
}

fn image_file_name(url: &str) -> String {
    format!("{}.jpg", hex_digest(url))
}

fn hex_digest(input: &str) -> String {
    Sha256::digest(input.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

fn relay(response: reqwest::Response) -> MediaBody {
    response
        .bytes_stream()
        .map(|chunk| chunk.map_err(io::Error::other))
        .boxed()
}

impl MediaCache {
    /// Create the cache layout under `settings.root` with a default client.
    pub async fn open(
        resolver: Arc<dyn StreamResolver>,
        settings: MediaCacheSettings,
    ) -> Result<Self, MediaCacheError> {
        let client = http_client().map_err(|e| MediaCacheError::Upstream(e.to_string()))?;
        Self::with_client(client, resolver, settings)
            .await
            .map_err(MediaCacheError::from)
    }

    pub async fn with_client(
        client: Client,
        resolver: Arc<dyn StreamResolver>,
        settings: MediaCacheSettings,
    ) -> io::Result<Self> {
        let images = settings.root.join("images");
        tokio::fs::create_dir_all(&images).await?;
        info!(
            target: "media_cache",
            root = %settings.root.display(),
            budget_bytes = settings.budget_bytes,
            "media cache ready"
        );

        Ok(Self {
            inner: Arc::new(CacheInner {
                root: settings.root,
                images,
                budget: RwLock::new(settings.budget_bytes),
                sweep: tokio::sync::Mutex::new(()),
                client,
                resolver,
                catalog_base: settings.catalog_base,
                credential: settings.credential,
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Where a track's audio lives once cached. Odd ids are hashed.
    pub fn stream_cache_path(&self, track_id: &str) -> PathBuf {
        self.inner.root.join(stream_file_name(track_id))
    }

    /// Where an image fetched from `url` lives once cached.
    pub fn image_cache_path(&self, url: &str) -> PathBuf {
        self.inner.images.join(image_file_name(url))
    }

    /// Current size budget in bytes.
    pub fn budget(&self) -> u64 {
        *self
            .inner
            .budget
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the size budget and sweep against it right away. Non-positive
    /// values fall back to the default budget.
    pub async fn set_budget(&self, bytes: i64) -> Result<SweepReport, MediaCacheError> {
        let budget = cache_budget_from(bytes);
        *self
            .inner
            .budget
            .write()
            .unwrap_or_else(PoisonError::into_inner) = budget;
        info!(target: "media_cache", budget_bytes = budget, "cache budget updated");
        self.sweep().await
    }

    /// Serve audio for a track.
    ///
    /// A caller-supplied local path wins over everything else. Otherwise a
    /// cached copy is served from disk, and on a miss the upstream stream is
    /// relayed to the caller while being cached.
    pub async fn open_stream(
        &self,
        track_id: Option<&str>,
        local_path: Option<&Path>,
    ) -> Result<MediaSource, MediaCacheError> {
        if let Some(path) = local_path.filter(|p| !p.as_os_str().is_empty()) {
            if !is_file(path).await {
                return Err(io::Error::new(io::ErrorKind::NotFound, "file not found").into());
            }
            return Ok(MediaSource::File(path.to_path_buf()));
        }

        let track_id = track_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(MediaCacheError::MissingParameter("trackId"))?;

        let cached = self.stream_cache_path(track_id);
        if is_file(&cached).await {
            debug!(target: "media_cache", track_id, "stream cache hit");
            return Ok(MediaSource::File(cached));
        }

        let url = self.inner.resolver.resolve_stream_url(track_id).await?;
        let headers = media_request_headers(
            &url,
            &self.inner.catalog_base,
            self.inner.credential.as_deref(),
        );
        let response = self
            .inner
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| MediaCacheError::Upstream(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        if !status.is_success() {
            warn!(target: "media_cache", track_id, status = status.as_u16(), "upstream stream not cached");
            return Ok(MediaSource::Upstream {
                status: status.as_u16(),
                headers,
                body: relay(response),
            });
        }

        debug!(target: "media_cache", track_id, "stream cache miss, relaying");
        Ok(MediaSource::Upstream {
            status: status.as_u16(),
            headers,
            body: self.tee(response, cached),
        })
    }

    /// Relay `response` to the returned body while writing it to a temp file
    /// that is renamed to `target` once the upstream body ended cleanly. The
    /// copy keeps going if the caller disconnects.
    fn tee(&self, response: reqwest::Response, target: PathBuf) -> MediaBody {
        let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(RELAY_BUFFER);
        let cache = self.clone();

        tokio::spawn(async move {
            let file_name = target
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let temp = target.with_file_name(format!(
                "{file_name}.{}.{TEMP_EXTENSION}",
                Uuid::new_v4().simple()
            ));

            let mut file = match tokio::fs::File::create(&temp).await {
                Ok(file) => Some(file),
                Err(err) => {
                    warn!(target: "media_cache", path = %temp.display(), error = %err, "cannot create cache file, relaying only");
                    None
                }
            };
            let mut complete = true;
            let mut client_open = true;
            let mut upstream = response.bytes_stream();

            while let Some(chunk) = upstream.next().await {
                match chunk {
                    Ok(bytes) => {
                        if let Some(out) = file.as_mut() {
                            if let Err(err) = out.write_all(&bytes).await {
                                warn!(target: "media_cache", error = %err, "cache write failed, relaying only");
                                file = None;
                                complete = false;
                            }
                        }
                        if client_open && tx.send(Ok(bytes)).await.is_err() {
                            client_open = false;
                        }
                        if !client_open && file.is_none() {
                            break;
                        }
                    }
                    Err(err) => {
                        complete = false;
                        warn!(target: "media_cache", error = %err, "upstream stream interrupted");
                        if client_open {
                            let _ = tx.send(Err(io::Error::other(err))).await;
                        }
                        break;
                    }
                }
            }
            drop(tx);

            let finished = match file {
                Some(mut out) if complete => out.flush().await.is_ok(),
                _ => false,
            };

            if finished && tokio::fs::rename(&temp, &target).await.is_ok() {
                debug!(target: "media_cache", path = %target.display(), "stream cached");
                if let Err(err) = cache.sweep().await {
                    warn!(target: "media_cache", error = %err, "cache sweep failed");
                }
            } else {
                let _ = tokio::fs::remove_file(&temp).await;
            }
        });

        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
    }

    /// Serve a cover image, caching successful fetches by URL hash.
    pub async fn open_image(&self, url: Option<&str>) -> Result<MediaSource, MediaCacheError> {
        let url = url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(MediaCacheError::MissingParameter("url"))?;

        let cached = self.image_cache_path(url);
        if is_file(&cached).await {
            return Ok(MediaSource::File(cached));
        }

        let response = self
            .inner
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MediaCacheError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Ok(MediaSource::Upstream {
                status: status.as_u16(),
                headers: response.headers().clone(),
                body: relay(response),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| MediaCacheError::Upstream(e.to_string()))?;

        match tokio::fs::write(&cached, &bytes).await {
            Ok(()) => {
                let cache = self.clone();
                tokio::spawn(async move {
                    if let Err(err) = cache.sweep().await {
                        warn!(target: "media_cache", error = %err, "cache sweep failed");
                    }
                });
                Ok(MediaSource::File(cached))
            }
            Err(err) => {
                warn!(target: "media_cache", error = %err, "cannot cache image");
                let _ = tokio::fs::remove_file(&cached).await;
                Ok(MediaSource::Memory {
                    content_type,
                    bytes,
                })
            }
        }
    }

    /// Total size in bytes of every file under the cache root.
    pub async fn total_size(&self) -> Result<u64, MediaCacheError> {
        let root = self.inner.root.clone();
        tokio::task::spawn_blocking(move || {
            WalkDir::new(&root)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_file())
                .filter_map(|entry| entry.metadata().ok())
                .map(|meta| meta.len())
                .sum::<u64>()
        })
        .await
        .map_err(|e| MediaCacheError::Io(io::Error::other(e)))
    }

    /// Remove every cached file and recreate the empty layout.
    pub async fn clear(&self) -> Result<(), MediaCacheError> {
        let _guard = self.inner.sweep.lock().await;
        match tokio::fs::remove_dir_all(&self.inner.root).await {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        tokio::fs::create_dir_all(&self.inner.images).await?;
        info!(target: "media_cache", "cache cleared");
        Ok(())
    }

    /// Evict oldest files until the cache fits its budget.
    pub async fn sweep(&self) -> Result<SweepReport, MediaCacheError> {
        let _guard = self.inner.sweep.lock().await;
        let root = self.inner.root.clone();
        let budget = self.budget();

        let report = tokio::task::spawn_blocking(move || evict_oldest(&root, budget))
            .await
            .map_err(|e| MediaCacheError::Io(io::Error::other(e)))??;

        if report.removed > 0 {
            info!(
                target: "media_cache",
                removed = report.removed,
                remaining_bytes = report.remaining_bytes,
                budget_bytes = budget,
                "evicted cached media"
            );
        }
        Ok(report)
    }
}

struct CachedFile {
    path: PathBuf,
    len: u64,
    modified: SystemTime,
}

/// Oldest-first eviction. Each removal scans the remaining list, so a sweep
/// is O(n^2) in the number of cached files.
fn evict_oldest(root: &Path, budget: u64) -> io::Result<SweepReport> {
    let mut files: Vec<CachedFile> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry.path().extension().and_then(|ext| ext.to_str()) != Some(TEMP_EXTENSION)
        })
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            Some(CachedFile {
                path: entry.into_path(),
                len: meta.len(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            })
        })
        .collect();

    let mut total: u64 = files.iter().map(|file| file.len).sum();
    let mut removed = 0;

    while total > budget && !files.is_empty() {
        let oldest = files
            .iter()
            .enumerate()
            .min_by_key(|(_, file)| file.modified)
            .map(|(index, _)| index)
            .unwrap_or(0);
        let victim = files.swap_remove(oldest);

        match std::fs::remove_file(&victim.path) {
            Ok(()) => {
                total = total.saturating_sub(victim.len);
                removed += 1;
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                total = total.saturating_sub(victim.len);
            }
            Err(err) => {
                warn!(target: "media_cache", path = %victim.path.display(), error = %err, "could not evict cached file");
            }
        }
    }

    Ok(SweepReport {
        removed,
        remaining_bytes: total,
    })
}
