// SPDX-License-Identifier: GPL-3.0-or-later

//! Two-phase transfer of a source track list into a new destination container.
//!
//! Phase one searches and matches every track with bounded concurrency. Phase
//! two creates the container and adds each matched track, retrying only on
//! rate-limit responses. Statuses are reported by input index so callers can
//! present results in input order while workers finish in any order.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, warn};
use tunebridge_config::AppConfig;
use tunebridge_domain::{
    normalize_track_id, CandidateTrack, SourceTrack, TrackStatus, TrackStatusUpdate, TransferStats,
};

use crate::catalog::{CatalogError, DestinationCatalog};
use crate::events::TransferObserver;
use crate::matching::{clean_metadata, TrackMatcher};

/// Fallback source of canonical artist/title pairs.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn resolve(&self, title: &str, artist: &str) -> anyhow::Result<Option<SourceTrack>>;
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("not authenticated with the destination catalog")]
    NotAuthenticated,
    #[error("no tracks matched")]
    NoTracksMatched { stats: TransferStats },
    #[error("failed to create container: {source}")]
    ContainerCreation {
        stats: TransferStats,
        #[source]
        source: CatalogError,
    },
}

impl TransferError {
    /// Statistics gathered before the run was aborted.
    pub fn stats(&self) -> Option<TransferStats> {
        match self {
            Self::NotAuthenticated => None,
            Self::NoTracksMatched { stats } | Self::ContainerCreation { stats, .. } => Some(*stats),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub max_concurrency: usize,
    pub match_delay: Duration,
    pub add_delay: Duration,
    pub retry_backoff: Duration,
    pub max_add_attempts: u32,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl TransferSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_concurrency: config.workers.effective_max_concurrency(),
            match_delay: config.transfer.match_delay(),
            add_delay: config.transfer.add_delay(),
            retry_backoff: config.transfer.retry_backoff(),
            max_add_attempts: config.transfer.max_add_attempts.max(1),
        }
    }
}

/// Result of a run that reached the commit phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub container_id: String,
    pub stats: TransferStats,
}

/// Match-then-commit orchestration of one transfer into a new container.
#[derive(Clone)]
pub struct TransferPipeline {
    catalog: Arc<dyn DestinationCatalog>,
    resolver: Option<Arc<dyn MetadataResolver>>,
    matcher: TrackMatcher,
    settings: TransferSettings,
}

struct Matched {
    index: usize,
    candidate: CandidateTrack,
}

impl TransferPipeline {
    pub fn new(
        catalog: Arc<dyn DestinationCatalog>,
        matcher: TrackMatcher,
        settings: TransferSettings,
    ) -> Self {
        Self {
            catalog,
            resolver: None,
            matcher,
            settings,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn MetadataResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Search and match every track, then create the container `name` and
    /// add the matches. Statuses reach `observer` keyed by input index; the
    /// run fails early when nothing matched or the container cannot be made.
    pub async fn run(
        &self,
        name: &str,
        description: &str,
        tracks: &[SourceTrack],
        observer: Arc<dyn TransferObserver>,
    ) -> Result<TransferReport, TransferError> {
        if !self.catalog.is_authenticated() {
            observer.on_log("Not logged in to the destination catalog.");
            return Err(TransferError::NotAuthenticated);
        }

        let total = tracks.len();
        let mut stats = TransferStats {
            total,
            ..TransferStats::default()
        };

        observer.on_log("Searching and matching tracks...");
        let matched = self.match_phase(tracks, &observer).await;
        stats.matched = matched.len();

        if matched.is_empty() {
            observer.on_log("No tracks matched. Aborting container creation.");
            stats.failed = total;
            return Err(TransferError::NoTracksMatched { stats });
        }

        observer.on_log(&format!(
            "Creating container '{}' with {} tracks...",
            name,
            matched.len()
        ));
        let container_id = match self.catalog.create_container(name, description).await {
            Ok(id) => id,
            Err(source) => {
                observer.on_log(&format!("Failed to create container: {}", source));
                stats.failed = total - stats.matched;
                return Err(TransferError::ContainerCreation { stats, source });
            }
        };
        observer.on_log("Container created. Adding tracks...");

        let commit_failures = self.commit_phase(&container_id, matched, &observer).await;
        stats.added = stats.matched - commit_failures;
        stats.failed = commit_failures + (total - stats.matched);

        observer.on_log("Transfer complete!");
        debug!(
            target: "transfer",
            container_id = %container_id,
            total = stats.total,
            matched = stats.matched,
            added = stats.added,
            failed = stats.failed,
            "transfer finished"
        );

        Ok(TransferReport {
            container_id,
            stats,
        })
    }

    /// Search and match every track; returns matches ordered by input index.
    async fn match_phase(
        &self,
        tracks: &[SourceTrack],
        observer: &Arc<dyn TransferObserver>,
    ) -> Vec<Matched> {
        let total = tracks.len();
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));
        let mut workers = JoinSet::new();

        for (index, track) in tracks.iter().cloned().enumerate() {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let pipeline = self.clone();
            let observer = observer.clone();
            workers.spawn(async move {
                let candidate = pipeline.match_one(index, total, &track, &observer).await;
                drop(permit);
                (index, candidate)
            });
        }

        let mut slots: Vec<Option<CandidateTrack>> = vec![None; total];
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, candidate)) => slots[index] = candidate,
                Err(err) => warn!(target: "transfer", error = %err, "match worker failed"),
            }
        }

        slots
            .into_iter()
            .enumerate()
            .filter_map(|(index, candidate)| candidate.map(|candidate| Matched { index, candidate }))
            .collect()
    }

    async fn match_one(
        &self,
        index: usize,
        total: usize,
        track: &SourceTrack,
        observer: &Arc<dyn TransferObserver>,
    ) -> Option<CandidateTrack> {
        let prefix = format!("[{}/{}]", index + 1, total);
        observer.on_track_status(status(index, TrackStatus::Searching, None));

        let found = match self.search_with_fallbacks(&prefix, track, observer).await {
            Err(err) => {
                observer.on_log(&format!(
                    "{} ✗ Search failed for '{}': {}",
                    prefix, track.title, err
                ));
                observer.on_track_status(status(index, TrackStatus::NotFound, Some(err.to_string())));
                None
            }
            Ok((reference, candidates)) => {
                let result = self.matcher.find_match(&reference, &candidates);
                match result.candidate {
                    Some(candidate) => {
                        observer.on_log(&format!(
                            "{} ✓ Matched: {} - {} (Score: {}%)",
                            prefix, candidate.artist, candidate.title, result.score
                        ));
                        observer.on_track_status(status(index, TrackStatus::Found, None));
                        Some(candidate)
                    }
                    None => {
                        observer.on_log(&format!(
                            "{} ⚠ No match found for '{} - {}' (Best Score: {}%, Candidates: {})",
                            prefix,
                            track.artist,
                            track.title,
                            result.score,
                            candidates.len()
                        ));
                        observer.on_track_status(status(index, TrackStatus::NotFound, None));
                        None
                    }
                }
            }
        };

        sleep(self.settings.match_delay).await;
        found
    }

    /// Escalating search. Returns the track to match against (possibly the
    /// resolver's canonical version) and the first non-empty candidate list.
    async fn search_with_fallbacks(
        &self,
        prefix: &str,
        track: &SourceTrack,
        observer: &Arc<dyn TransferObserver>,
    ) -> Result<(SourceTrack, Vec<CandidateTrack>), CatalogError> {
        let mut results = self
            .catalog
            .search(&format!("{} {}", track.artist, track.title))
            .await?;

        let clean_artist = clean_metadata(&track.artist);
        let clean_title = clean_metadata(&track.title);

        if results.is_empty() && (clean_artist != track.artist || clean_title != track.title) {
            results = self
                .catalog
                .search(&format!("{} {}", clean_artist, clean_title))
                .await?;
        }

        if results.is_empty() && !clean_title.is_empty() {
            results = self.catalog.search(&clean_title).await?;
        }

        let mut reference = track.clone();
        if results.is_empty() {
            if let Some(resolver) = &self.resolver {
                observer.on_log(&format!("{} ℹ Resolving canonical metadata...", prefix));
                match resolver.resolve(&track.title, &track.artist).await {
                    Err(err) => {
                        observer.on_log(&format!("{} ⚠ Metadata lookup error: {}", prefix, err));
                    }
                    Ok(None) => {
                        observer.on_log(&format!("{} ℹ Metadata lookup found no match", prefix));
                    }
                    Ok(Some(canonical)) => {
                        observer.on_log(&format!(
                            "{} ℹ Metadata lookup found: {} - {}",
                            prefix, canonical.artist, canonical.title
                        ));
                        results = self
                            .catalog
                            .search(&format!("{} {}", canonical.artist, canonical.title))
                            .await?;
                        if results.is_empty() {
                            results = self.catalog.search(&canonical.title).await?;
                        }
                        reference = canonical;
                    }
                }
            }
        }

        if results.is_empty() {
            let words: Vec<&str> = clean_title.split_whitespace().collect();
            if words.len() > 3 {
                results = self.catalog.search(&words[..3].join(" ")).await?;
            }
        }

        Ok((reference, results))
    }

    /// Add every matched track; returns the number of failures.
    async fn commit_phase(
        &self,
        container_id: &str,
        matched: Vec<Matched>,
        observer: &Arc<dyn TransferObserver>,
    ) -> usize {
        let count = matched.len();
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));
        let mut workers = JoinSet::new();

        for (position, item) in matched.into_iter().enumerate() {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let pipeline = self.clone();
            let observer = observer.clone();
            let container_id = container_id.to_string();
            workers.spawn(async move {
                let prefix = format!("[{}/{}]", position + 1, count);
                let added = pipeline
                    .add_one(&prefix, &container_id, &item, &observer)
                    .await;
                drop(permit);
                added
            });
        }

        let mut failures = 0;
        let mut finished = 0;
        while let Some(joined) = workers.join_next().await {
            finished += 1;
            match joined {
                Ok(true) => {}
                Ok(false) => failures += 1,
                Err(err) => {
                    warn!(target: "transfer", error = %err, "add worker failed");
                    failures += 1;
                }
            }
        }
        failures + (count - finished)
    }

    async fn add_one(
        &self,
        prefix: &str,
        container_id: &str,
        item: &Matched,
        observer: &Arc<dyn TransferObserver>,
    ) -> bool {
        observer.on_track_status(status(item.index, TrackStatus::Adding, None));

        let result = self
            .add_with_retry(prefix, container_id, &item.candidate, observer)
            .await;

        let added = match result {
            Ok(()) => {
                observer.on_log(&format!("{} ✓ Added '{}'", prefix, item.candidate.title));
                observer.on_track_status(status(item.index, TrackStatus::Added, None));
                true
            }
            Err(err) => {
                observer.on_log(&format!(
                    "{} ✗ Failed to add '{}': {}",
                    prefix, item.candidate.title, err
                ));
                observer.on_track_status(status(item.index, TrackStatus::Error, Some(err.to_string())));
                false
            }
        };

        sleep(self.settings.add_delay).await;
        added
    }

    async fn add_with_retry(
        &self,
        prefix: &str,
        container_id: &str,
        candidate: &CandidateTrack,
        observer: &Arc<dyn TransferObserver>,
    ) -> Result<(), CatalogError> {
        // A failed membership lookup does not block the add.
        if let Ok(details) = self.catalog.live_container_details(container_id).await {
            let track_id = normalize_track_id(&candidate.id);
            if details.contains_track(&track_id) {
                return Err(CatalogError::AlreadyInContainer(track_id));
            }
        }

        let max_attempts = self.settings.max_add_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            if attempt > 0 {
                let delay = self.settings.retry_backoff * attempt;
                observer.on_log(&format!(
                    "{} ⏳ Retry {}/{} after {:?}...",
                    prefix,
                    attempt,
                    max_attempts - 1,
                    delay
                ));
                sleep(delay).await;
            }

            match self.catalog.add_track(container_id, candidate).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_rate_limited() && attempt + 1 < max_attempts => {
                    debug!(target: "transfer", attempt = attempt + 1, track_id = %candidate.id, "rate limited");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn status(index: usize, status: TrackStatus, error: Option<String>) -> TrackStatusUpdate {
    TrackStatusUpdate {
        index,
        status,
        error,
    }
}
