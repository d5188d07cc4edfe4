// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use std::path::Path;
use crate::error::SyncResult;
use crate::store::models::{CollectionCounts, Collections, MigrationReport, ReplaceSummary};

#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Read every collection as one consistent view
    async fn read_all(&self) -> SyncResult<Collections>;

    /// Clear every collection and insert the given records atomically.
    /// On failure the previous contents are kept.
    async fn replace_all(&self, collections: Collections) -> SyncResult<ReplaceSummary>;

    /// Per-collection record counts
    async fn count(&self) -> SyncResult<CollectionCounts>;

    /// One-shot import of the legacy per-collection JSON layout
    async fn migrate_from_legacy(&self, dir: &Path) -> SyncResult<MigrationReport>;
}
