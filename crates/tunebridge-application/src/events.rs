// SPDX-License-Identifier: GPL-3.0-or-later
use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;
use tunebridge_domain::{TrackStatus, TrackStatusUpdate};

/// Receives transfer progress: free-form log lines and per-track status
/// transitions keyed by the track's position in the input list.
pub trait TransferObserver: Send + Sync {
    fn on_log(&self, line: &str);
    fn on_track_status(&self, update: TrackStatusUpdate);
}

/// Forwards progress to the `transfer` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl TransferObserver for TracingObserver {
    fn on_log(&self, line: &str) {
        info!(target: "transfer", "{}", line);
    }

    fn on_track_status(&self, update: TrackStatusUpdate) {
        info!(
            target: "transfer",
            index = update.index,
            status = %update.status,
            error = update.error.as_deref().unwrap_or(""),
            "track status"
        );
    }
}

#[derive(Default)]
struct LogState {
    lines: Vec<String>,
    updates: Vec<TrackStatusUpdate>,
}

/// In-memory collector of everything a transfer reported.
#[derive(Clone, Default)]
pub struct TransferLog {
    inner: Arc<Mutex<LogState>>,
}

impl TransferLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lock().lines.clone()
    }

    /// Every status update in arrival order.
    pub fn updates(&self) -> Vec<TrackStatusUpdate> {
        self.lock().updates.clone()
    }

    /// Latest status per input index, `pending` where nothing was reported.
    pub fn final_statuses(&self, total: usize) -> Vec<TrackStatusUpdate> {
        let mut statuses: Vec<TrackStatusUpdate> = (0..total)
            .map(|index| TrackStatusUpdate {
                index,
                status: TrackStatus::Pending,
                error: None,
            })
            .collect();
        for update in self.lock().updates.iter() {
            if let Some(slot) = statuses.get_mut(update.index) {
                *slot = update.clone();
            }
        }
        statuses
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LogState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TransferObserver for TransferLog {
    fn on_log(&self, line: &str) {
        self.lock().lines.push(line.to_string());
    }

    fn on_track_status(&self, update: TrackStatusUpdate) {
        self.lock().updates.push(update);
    }
}

/// Fans progress out to several observers.
pub struct ObserverSet(pub Vec<Arc<dyn TransferObserver>>);

impl TransferObserver for ObserverSet {
    fn on_log(&self, line: &str) {
        for observer in &self.0 {
            observer.on_log(line);
        }
    }

    fn on_track_status(&self, update: TrackStatusUpdate) {
        for observer in &self.0 {
            observer.on_track_status(update.clone());
        }
    }
}
