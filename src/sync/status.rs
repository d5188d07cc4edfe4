// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Observable state of the sync engine.
///
/// Handed out by value; observers never hold a reference into the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_enabled: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub sync_in_progress: bool,
    pub error: Option<String>,
    pub total_records: u64,
    pub synced_records: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Sync,
    Restore,
    Import,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum HistoryOutcome {
    Success { records: u64 },
    Failure { message: String },
}

/// One past sync, restore or import attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncHistoryEntry {
    pub id: Uuid,
    pub kind: OperationKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: HistoryOutcome,
}

impl SyncHistoryEntry {
    pub fn new(kind: OperationKind, started_at: DateTime<Utc>, outcome: HistoryOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            started_at,
            finished_at: Utc::now(),
            outcome,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, HistoryOutcome::Success { .. })
    }
}

/// What a sync request ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum SyncOutcome {
    Completed { records: u64 },
    /// Another attempt was running; nothing was started.
    AlreadyInProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplaceSource {
    Restore,
    Import,
}

/// Pushed to subscribers as the engine changes state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// The local store was fully replaced; in-memory views should reload.
    StoreReplaced { source: ReplaceSource, records: u64 },
    SyncCompleted { records: u64, at: DateTime<Utc> },
    SyncFailed { message: String },
    StatusChanged { status: SyncStatus },
}
