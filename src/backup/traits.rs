// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::SyncResult;

/// Acknowledgement returned by the backup endpoint for a stored snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupAck {
    pub status: u16,
    pub bytes: usize,
}

#[async_trait]
pub trait BackupClient: Send + Sync {
    /// Store a full snapshot, replacing whatever the endpoint held before
    async fn push(&self, snapshot: &str) -> SyncResult<BackupAck>;

    /// Fetch the most recently stored snapshot
    async fn pull(&self) -> SyncResult<String>;
}
