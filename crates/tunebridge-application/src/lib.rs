// SPDX-License-Identifier: GPL-3.0-or-later
pub mod cached_catalog;
pub mod catalog;
pub mod downloads;
pub mod events;
pub mod http;
pub mod matching;
pub mod media_cache;
#[cfg(test)]
mod media_cache_tests;
pub mod metadata;
pub mod transfer;
pub mod transfer_history;
#[cfg(test)]
mod test_support;
#[cfg(test)]
mod transfer_tests;

pub use cached_catalog::CachedCatalog;
pub use catalog::{CatalogError, DestinationCatalog, HttpCatalogClient, StreamResolver};
pub use downloads::{DownloadError, DownloadManager, DownloadSettings};
pub use events::{ObserverSet, TracingObserver, TransferLog, TransferObserver};
pub use matching::{MatchResult, MatchingError, TrackMatcher};
pub use media_cache::{MediaCache, MediaCacheError, MediaCacheSettings, MediaSource, SweepReport};
pub use metadata::MusicBrainzResolver;
pub use transfer::{
    MetadataResolver, TransferError, TransferPipeline, TransferReport, TransferSettings,
};
pub use transfer_history::{HistoryError, TransferHistory};

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tunebridge_config::AppConfig;
use tunebridge_musicbrainz::MusicBrainzClient;

/// Every long-lived service, built once at startup and shared by the HTTP
/// layer and the CLI.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub catalog: Arc<CachedCatalog>,
    pub resolver: Option<Arc<dyn MetadataResolver>>,
    pub matcher: TrackMatcher,
    pub downloads: DownloadManager,
    pub media_cache: MediaCache,
    pub transfers: Arc<TransferHistory>,
}

impl AppState {
    /// Wire the real HTTP collaborators from configuration.
    pub async fn initialize(config: AppConfig) -> anyhow::Result<Self> {
        let client = Arc::new(
            HttpCatalogClient::from_config(&config.catalog)
                .context("failed to build destination catalog client")?,
        );

        let resolver: Option<Arc<dyn MetadataResolver>> = if config.metadata.musicbrainz_enabled {
            let mut builder = MusicBrainzClient::builder();
            if let Some(base) = config.metadata.musicbrainz_base_url.as_deref() {
                builder = builder.base_url(base);
            }
            match builder.build() {
                Ok(mb) => Some(Arc::new(MusicBrainzResolver::new(mb))),
                Err(err) => {
                    warn!(target: "application", error = %err, "metadata resolution disabled");
                    None
                }
            }
        } else {
            None
        };

        Self::with_services(config, client.clone(), client, resolver).await
    }

    /// Wire the services around already-built collaborators.
    pub async fn with_services(
        config: AppConfig,
        catalog: Arc<dyn DestinationCatalog>,
        streams: Arc<dyn StreamResolver>,
        resolver: Option<Arc<dyn MetadataResolver>>,
    ) -> anyhow::Result<Self> {
        let matcher = TrackMatcher::new(config.matching.effective_threshold())
            .context("invalid match threshold")?;
        let catalog = Arc::new(CachedCatalog::new(
            catalog,
            Duration::from_secs(config.api_cache.ttl_secs),
        ));
        let downloads = DownloadManager::load(streams.clone(), DownloadSettings::from_config(&config))
            .await
            .context("failed to start download manager")?;
        let media_cache = MediaCache::open(streams, MediaCacheSettings::from_config(&config))
            .await
            .context("failed to open media cache")?;
        let transfers = Arc::new(
            TransferHistory::load(config.storage.transfer_history_file()).await,
        );

        Ok(Self {
            config: Arc::new(config),
            catalog,
            resolver,
            matcher,
            downloads,
            media_cache,
            transfers,
        })
    }

    pub fn transfer_pipeline(&self) -> TransferPipeline {
        let pipeline = TransferPipeline::new(
            self.catalog.clone(),
            self.matcher,
            TransferSettings::from_config(&self.config),
        );
        match &self.resolver {
            Some(resolver) => pipeline.with_resolver(resolver.clone()),
            None => pipeline,
        }
    }

    pub fn on_start(&self) {
        info!(
            target: "application",
            catalog = %self.config.catalog.normalized_base_url(),
            threshold = self.matcher.threshold(),
            max_concurrency = self.config.workers.effective_max_concurrency(),
            metadata_resolution = self.resolver.is_some(),
            "application state initialized"
        );
    }
}
