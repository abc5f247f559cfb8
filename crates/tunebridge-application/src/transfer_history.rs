// SPDX-License-Identifier: GPL-3.0-or-later
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{info, warn};
use tunebridge_domain::{TransferRecord, TransferRecordId};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Record of past transfer runs, kept as a pretty-printed JSON array.
///
/// Writers serialize on `persist`; the record list itself is only locked for
/// in-memory edits and snapshots.
pub struct TransferHistory {
    path: PathBuf,
    records: Mutex<Vec<TransferRecord>>,
    persist: tokio::sync::Mutex<()>,
}

impl TransferHistory {
    /// Read the history file at `path`. A missing or malformed file starts
    /// an empty history rather than failing.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = read_records(&path).await;
        Self {
            path,
            records: Mutex::new(records),
            persist: tokio::sync::Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TransferRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of every record, oldest first.
    pub fn records(&self) -> Vec<TransferRecord> {
        self.lock().clone()
    }

    /// Append a record and persist the whole history.
    pub async fn add(&self, record: TransferRecord) -> Result<(), HistoryError> {
        let _persist = self.persist.lock().await;
        info!(target: "transfer", id = %record.id, container = %record.container_name, "recording transfer");
        let snapshot = {
            let mut records = self.lock();
            records.push(record);
            records.clone()
        };
        self.write(&snapshot).await
    }

    /// Returns whether a record was removed.
    pub async fn delete(&self, id: TransferRecordId) -> Result<bool, HistoryError> {
        let _persist = self.persist.lock().await;
        let snapshot = {
            let mut records = self.lock();
            let before = records.len();
            records.retain(|record| record.id != id);
            if records.len() == before {
                return Ok(false);
            }
            records.clone()
        };
        self.write(&snapshot).await?;
        Ok(true)
    }

    pub async fn clear(&self) -> Result<(), HistoryError> {
        let _persist = self.persist.lock().await;
        self.lock().clear();
        self.write(&[]).await
    }

    async fn write(&self, records: &[TransferRecord]) -> Result<(), HistoryError> {
        let json = serde_json::to_vec_pretty(records)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

async fn read_records(path: &Path) -> Vec<TransferRecord> {
    match tokio::fs::read(path).await {
        Ok(data) => serde_json::from_slice(&data).unwrap_or_else(|err| {
            warn!(target: "transfer", path = %path.display(), error = %err, "ignoring malformed transfer history");
            Vec::new()
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(err) => {
            warn!(target: "transfer", path = %path.display(), error = %err, "could not read transfer history");
            Vec::new()
        }
    }
}
