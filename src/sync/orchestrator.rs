// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, Local, Utc};
use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::backup::BackupClient;
use crate::error::{SyncError, SyncResult};
use crate::snapshot::{self, export_file_name};
use crate::store::{LocalStore, ReplaceSummary};
use crate::sync::status::{
    HistoryOutcome, OperationKind, ReplaceSource, SyncEvent, SyncHistoryEntry, SyncOutcome,
    SyncStatus,
};

/// Number of past attempts kept for `get_sync_history`
pub const HISTORY_LIMIT: usize = 50;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Drives sync, restore, export and import against the injected store and backup client.
///
/// One instance per process, shared behind an `Arc`. At most one of sync,
/// restore or import runs at a time.
pub struct SyncOrchestrator {
    store: Arc<dyn LocalStore>,
    backup: Arc<dyn BackupClient>,
    interval: Duration,
    status: RwLock<SyncStatus>,
    in_flight: Arc<AtomicBool>,
    timer: Mutex<Option<JoinHandle<()>>>,
    history: RwLock<VecDeque<SyncHistoryEntry>>,
    events: broadcast::Sender<SyncEvent>,
}

/// Releases the in-flight flag when the operation ends, however it ends.
///
/// Owns its flag so it can move into the task that runs the operation.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncOrchestrator {
    pub fn new(store: Arc<dyn LocalStore>, backup: Arc<dyn BackupClient>, interval: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            backup,
            interval,
            status: RwLock::new(SyncStatus::default()),
            in_flight: Arc::new(AtomicBool::new(false)),
            timer: Mutex::new(None),
            history: RwLock::new(VecDeque::with_capacity(HISTORY_LIMIT)),
            events,
        }
    }

    fn try_begin(&self) -> Option<InFlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(Arc::clone(&self.in_flight)))
    }

    /// Receive events for every state change, sync result and store replacement.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    async fn publish_status(&self) {
        let status = self.status.read().await.clone();
        self.emit(SyncEvent::StatusChanged { status });
    }

    async fn record_history(&self, kind: OperationKind, started_at: DateTime<Utc>, outcome: HistoryOutcome) {
        let mut history = self.history.write().await;
        if history.len() == HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(SyncHistoryEntry::new(kind, started_at, outcome));
    }

    /// Current status with `total_records` recounted from the store.
    pub async fn get_sync_status(&self) -> SyncStatus {
        let mut status = self.status.read().await.clone();
        match self.store.count().await {
            Ok(counts) => status.total_records = counts.total(),
            Err(e) => warn!(error = %e, "Failed to count records, reporting last known total"),
        }
        status
    }

    /// Past attempts, oldest first.
    pub async fn get_sync_history(&self) -> Vec<SyncHistoryEntry> {
        self.history.read().await.iter().cloned().collect()
    }

    /// Whether a periodic sync task is currently armed.
    pub async fn auto_sync_armed(&self) -> bool {
        self.timer.lock().await.is_some()
    }

    /// Enable or disable periodic sync. Calling with the current value does nothing.
    ///
    /// Disabling only stops future attempts; a running sync finishes normally.
    pub async fn toggle_sync(self: &Arc<Self>, enabled: bool) {
        let mut timer = self.timer.lock().await;
        {
            let mut status = self.status.write().await;
            if status.is_enabled == enabled && timer.is_some() == enabled {
                return;
            }
            status.is_enabled = enabled;
        }

        if enabled {
            let handle = tokio::spawn(run_periodic_sync(Arc::downgrade(self), self.interval));
            *timer = Some(handle);
            info!(interval_secs = self.interval.as_secs(), "Automatic sync enabled");
        } else if let Some(handle) = timer.take() {
            handle.abort();
            info!("Automatic sync disabled");
        }
        drop(timer);

        self.publish_status().await;
    }

    /// Push a full snapshot of the local store to the backup endpoint.
    ///
    /// Runs regardless of whether automatic sync is enabled. Returns
    /// `AlreadyInProgress` without doing anything if another operation is running.
    ///
    /// The attempt runs on its own task: dropping the returned future does not
    /// abandon it halfway.
    pub async fn perform_sync(self: &Arc<Self>) -> SyncResult<SyncOutcome> {
        let Some(guard) = self.try_begin() else {
            debug!("Sync requested while another operation is running, skipping");
            return Ok(SyncOutcome::AlreadyInProgress);
        };

        let this = Arc::clone(self);
        let attempt = tokio::spawn(async move {
            let _guard = guard;
            this.run_sync().await
        });
        join_attempt(attempt).await
    }

    async fn run_sync(&self) -> SyncResult<SyncOutcome> {
        let started_at = Utc::now();
        {
            let mut status = self.status.write().await;
            status.sync_in_progress = true;
            status.error = None;
        }
        self.publish_status().await;
        info!("Starting sync");

        let result = self.push_snapshot().await;

        {
            let mut status = self.status.write().await;
            status.sync_in_progress = false;
            match result {
                Ok(records) => {
                    status.last_sync = Some(Utc::now());
                    status.total_records = records;
                    status.synced_records = records;
                }
                Err(ref e) => {
                    status.error = Some(e.to_string());
                }
            }
        }

        match result {
            Ok(records) => {
                info!(records, "Sync completed");
                self.record_history(OperationKind::Sync, started_at, HistoryOutcome::Success { records })
                    .await;
                self.emit(SyncEvent::SyncCompleted {
                    records,
                    at: Utc::now(),
                });
                self.publish_status().await;
                Ok(SyncOutcome::Completed { records })
            }
            Err(e) => {
                error!(error = %e, "Sync failed");
                self.record_history(
                    OperationKind::Sync,
                    started_at,
                    HistoryOutcome::Failure {
                        message: e.to_string(),
                    },
                )
                .await;
                self.emit(SyncEvent::SyncFailed {
                    message: e.to_string(),
                });
                self.publish_status().await;
                Err(e)
            }
        }
    }

    // Local data is only read here, so a failed push needs no rollback.
    async fn push_snapshot(&self) -> SyncResult<u64> {
        let collections = self.store.read_all().await?;
        let records = collections.total_records();
        let text = snapshot::encode(&collections)?;
        let ack = self.backup.push(&text).await?;
        debug!(status = ack.status, bytes = ack.bytes, "Backup endpoint acknowledged snapshot");
        Ok(records)
    }

    /// Replace the local store with the latest snapshot from the backup endpoint.
    ///
    /// Nothing local changes unless the pull, the decode and the replace all succeed.
    pub async fn restore_from_cloud(self: &Arc<Self>) -> SyncResult<ReplaceSummary> {
        let Some(guard) = self.try_begin() else {
            warn!("Restore requested while another operation is running");
            return Err(SyncError::Busy);
        };

        let this = Arc::clone(self);
        let attempt = tokio::spawn(async move {
            let _guard = guard;
            this.run_restore().await
        });
        join_attempt(attempt).await
    }

    async fn run_restore(&self) -> SyncResult<ReplaceSummary> {
        let started_at = Utc::now();
        self.status.write().await.error = None;
        info!("Starting restore from backup endpoint");

        let result = self.pull_and_replace().await;
        match result {
            Ok(summary) => {
                info!(records = summary.records_written, "Restore completed");
                self.record_history(
                    OperationKind::Restore,
                    started_at,
                    HistoryOutcome::Success {
                        records: summary.records_written,
                    },
                )
                .await;
                self.emit(SyncEvent::StoreReplaced {
                    source: ReplaceSource::Restore,
                    records: summary.records_written,
                });
                self.publish_status().await;
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, "Restore failed");
                let message = format!("Restore failed: {}", e);
                self.status.write().await.error = Some(message.clone());
                self.record_history(OperationKind::Restore, started_at, HistoryOutcome::Failure { message: message.clone() })
                    .await;
                self.emit(SyncEvent::SyncFailed { message });
                self.publish_status().await;
                Err(e)
            }
        }
    }

    async fn pull_and_replace(&self) -> SyncResult<ReplaceSummary> {
        let text = self.backup.pull().await?;
        let snapshot = snapshot::decode(&text)?;
        debug!(version = %snapshot.version, "Decoded remote snapshot");
        self.store.replace_all(snapshot.collections).await
    }

    /// Snapshot of the local store as JSON text. No network, no status change.
    pub async fn export_data(&self) -> SyncResult<String> {
        let collections = self.store.read_all().await?;
        let text = snapshot::encode(&collections)?;
        info!(records = collections.total_records(), "Exported local data");
        Ok(text)
    }

    /// Write an export into `dir` as `<prefix>-<YYYY-MM-DD>.json`.
    pub async fn export_to_file(&self, dir: &Path, prefix: &str) -> SyncResult<PathBuf> {
        let text = self.export_data().await?;
        let target = dir.join(export_file_name(prefix, Local::now().date_naive()));

        tokio::fs::create_dir_all(dir).await?;

        let dir = dir.to_path_buf();
        let path = target.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut file = tempfile::NamedTempFile::new_in(&dir)?;
            file.write_all(text.as_bytes())?;
            file.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)??;

        info!(path = %target.display(), "Wrote export file");
        Ok(target)
    }

    /// Replace the local store with a user-supplied snapshot.
    ///
    /// Same commit-or-nothing guarantee as `restore_from_cloud`. Failures are
    /// reported through the return value only.
    pub async fn import_data(self: &Arc<Self>, text: &str) -> SyncResult<ReplaceSummary> {
        let Some(guard) = self.try_begin() else {
            warn!("Import requested while another operation is running");
            return Err(SyncError::Busy);
        };

        let this = Arc::clone(self);
        let text = text.to_string();
        let attempt = tokio::spawn(async move {
            let _guard = guard;
            this.run_import(&text).await
        });
        join_attempt(attempt).await
    }

    async fn run_import(&self, text: &str) -> SyncResult<ReplaceSummary> {
        let started_at = Utc::now();
        let result = match snapshot::decode(text) {
            Ok(snapshot) => self.store.replace_all(snapshot.collections).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(summary) => {
                info!(records = summary.records_written, "Import completed");
                self.record_history(
                    OperationKind::Import,
                    started_at,
                    HistoryOutcome::Success {
                        records: summary.records_written,
                    },
                )
                .await;
                self.emit(SyncEvent::StoreReplaced {
                    source: ReplaceSource::Import,
                    records: summary.records_written,
                });
                Ok(summary)
            }
            Err(e) => {
                let message = match e {
                    SyncError::InvalidFormat(_) => format!("Import file rejected: {}", e),
                    _ => format!("Import could not be saved: {}", e),
                };
                error!(error = %e, "{}", message);
                self.record_history(OperationKind::Import, started_at, HistoryOutcome::Failure { message })
                    .await;
                Err(e)
            }
        }
    }

    pub async fn import_from_file(self: &Arc<Self>, path: &Path) -> SyncResult<ReplaceSummary> {
        info!(path = %path.display(), "Importing snapshot file");
        let text = tokio::fs::read_to_string(path).await?;
        self.import_data(&text).await
    }

    /// Disarm the timer and return status to its initial state.
    pub async fn reset_status(&self) {
        if let Some(handle) = self.timer.lock().await.take() {
            handle.abort();
        }
        {
            let mut status = self.status.write().await;
            let in_progress = status.sync_in_progress;
            *status = SyncStatus::default();
            // A running attempt still owns this flag until it finishes.
            status.sync_in_progress = in_progress;
        }
        info!("Sync status reset");
        self.publish_status().await;
    }
}

impl Drop for SyncOrchestrator {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}

/// Wait for an operation task. A join error only happens if the task panicked.
async fn join_attempt<T>(attempt: JoinHandle<SyncResult<T>>) -> SyncResult<T> {
    attempt.await.map_err(std::io::Error::other)?
}

async fn run_periodic_sync(orchestrator: Weak<SyncOrchestrator>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let Some(orchestrator) = orchestrator.upgrade() else {
            debug!("Orchestrator dropped, stopping periodic sync");
            break;
        };

        // Detached so the ticker keeps its schedule while an attempt runs.
        tokio::spawn(async move {
            match orchestrator.perform_sync().await {
                Ok(SyncOutcome::Completed { records }) => {
                    debug!(records, "Scheduled sync completed");
                }
                Ok(SyncOutcome::AlreadyInProgress) => {
                    debug!("Scheduled sync skipped, another operation is running");
                }
                Err(e) => {
                    warn!(error = %e, "Scheduled sync failed");
                }
            }
        });
    }
}
