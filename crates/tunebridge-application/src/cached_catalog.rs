// SPDX-License-Identifier: GPL-3.0-or-later

//! Time-boxed cache in front of the container-listing calls of a
//! [`DestinationCatalog`]. Structural changes made through the decorator
//! evict the affected entries so membership is never served stale.
//!
//! Every key carries a generation number that invalidation bumps. A fetch
//! that started before an invalidation finds the generation changed when it
//! returns and hands its result to the caller without caching it.

use async_trait::async_trait;
use moka::sync::Cache;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;
use tunebridge_domain::{CandidateTrack, ContainerDetails, ContainerSummary, ContainerUpdate};

use crate::catalog::{CatalogError, DestinationCatalog};

const LIBRARIES_KEY: &str = "libraries";

fn details_key(container_id: &str) -> String {
    format!("lib_details_{}", container_id)
}

/// Invalidation counters. `all` moves on a full clear, `keys` per entry.
#[derive(Default)]
struct Generations {
    all: u64,
    keys: HashMap<String, u64>,
}

impl Generations {
    fn of(&self, key: &str) -> (u64, u64) {
        (self.all, self.keys.get(key).copied().unwrap_or(0))
    }

    fn bump(&mut self, key: &str) {
        *self.keys.entry(key.to_string()).or_default() += 1;
    }
}

pub struct CachedCatalog {
    inner: Arc<dyn DestinationCatalog>,
    containers: Cache<String, Vec<ContainerSummary>>,
    details: Cache<String, ContainerDetails>,
    generations: Mutex<Generations>,
}

impl CachedCatalog {
    pub fn new(inner: Arc<dyn DestinationCatalog>, ttl: Duration) -> Self {
        Self {
            inner,
            containers: Cache::builder().max_capacity(16).time_to_live(ttl).build(),
            details: Cache::builder().max_capacity(1_000).time_to_live(ttl).build(),
            generations: Mutex::new(Generations::default()),
        }
    }

    fn generations(&self) -> MutexGuard<'_, Generations> {
        self.generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// List containers from the remote catalog, replacing the cached list.
    pub async fn refresh_containers(&self) -> Result<Vec<ContainerSummary>, CatalogError> {
        let seen = self.generations().of(LIBRARIES_KEY);
        let fresh = self.inner.containers().await?;
        let generations = self.generations();
        if generations.of(LIBRARIES_KEY) == seen {
            self.containers
                .insert(LIBRARIES_KEY.to_string(), fresh.clone());
        }
        Ok(fresh)
    }

    /// Fetch one container's details and cache them unless an invalidation
    /// for that container landed while the request was in flight.
    pub async fn refresh_details(
        &self,
        container_id: &str,
    ) -> Result<ContainerDetails, CatalogError> {
        let key = details_key(container_id);
        let seen = self.generations().of(&key);
        let details = self.inner.container_details(container_id).await?;
        let generations = self.generations();
        if generations.of(&key) == seen {
            self.details.insert(key, details.clone());
        } else {
            debug!(target: "catalog", container_id, "container changed during fetch, not caching");
        }
        Ok(details)
    }

    pub fn invalidate_container(&self, container_id: &str) {
        debug!(target: "catalog", container_id, "invalidating cached container entries");
        let key = details_key(container_id);
        let mut generations = self.generations();
        generations.bump(LIBRARIES_KEY);
        generations.bump(&key);
        self.containers.invalidate(LIBRARIES_KEY);
        self.details.invalidate(&key);
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        let mut generations = self.generations();
        generations.all += 1;
        self.containers.invalidate_all();
        self.details.invalidate_all();
    }
}

#[async_trait]
impl DestinationCatalog for CachedCatalog {
    fn is_authenticated(&self) -> bool {
        self.inner.is_authenticated()
    }

    async fn search(&self, query: &str) -> Result<Vec<CandidateTrack>, CatalogError> {
        self.inner.search(query).await
    }

    async fn create_container(
        &self,
        name: &str,
        description: &str,
    ) -> Result<String, CatalogError> {
        let id = self.inner.create_container(name, description).await?;
        self.invalidate_container(&id);
        Ok(id)
    }

    async fn add_track(
        &self,
        container_id: &str,
        track: &CandidateTrack,
    ) -> Result<(), CatalogError> {
        self.inner.add_track(container_id, track).await?;
        self.invalidate_container(container_id);
        Ok(())
    }

    async fn container_details(
        &self,
        container_id: &str,
    ) -> Result<ContainerDetails, CatalogError> {
        if let Some(cached) = self.details.get(&details_key(container_id)) {
            return Ok(cached);
        }
        self.refresh_details(container_id).await
    }

    async fn live_container_details(
        &self,
        container_id: &str,
    ) -> Result<ContainerDetails, CatalogError> {
        self.refresh_details(container_id).await
    }

    async fn containers(&self) -> Result<Vec<ContainerSummary>, CatalogError> {
        if let Some(cached) = self.containers.get(LIBRARIES_KEY) {
            return Ok(cached);
        }
        self.refresh_containers().await
    }

    async fn remove_track(&self, container_id: &str, track_id: &str) -> Result<(), CatalogError> {
        self.inner.remove_track(container_id, track_id).await?;
        self.invalidate_container(container_id);
        Ok(())
    }

    async fn update_container(
        &self,
        container_id: &str,
        update: &ContainerUpdate,
    ) -> Result<(), CatalogError> {
        self.inner.update_container(container_id, update).await?;
        self.invalidate_container(container_id);
        Ok(())
    }

    async fn delete_container(&self, container_id: &str) -> Result<(), CatalogError> {
        self.inner.delete_container(container_id).await?;
        self.invalidate_container(container_id);
        Ok(())
    }
}
