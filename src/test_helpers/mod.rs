// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use crate::backup::{BackupAck, BackupClient};
use crate::config::Config;
use crate::error::{SyncError, SyncResult};
use crate::store::{
    CollectionCounts, CollectionName, Collections, LocalStore, MigrationReport, ReplaceSummary,
    SqliteStore,
};

/// Create an in-memory SQLite store for testing
pub async fn setup_test_store() -> SyncResult<SqliteStore> {
    SqliteStore::in_memory().await
}

/// Create a test configuration with temporary paths
pub fn create_test_config() -> Config {
    use std::net::SocketAddr;
    use std::str::FromStr;

    let temp_dir = std::env::temp_dir().join(format!("garage-sync-test-{}", uuid::Uuid::new_v4()));

    Config {
        store_db_path: temp_dir.join("test_store.db"),
        backup_api_url: "http://localhost:3000/api".to_string(),
        backup_api_key: None,
        backup_timeout_secs: 5,
        local_api_bind: SocketAddr::from_str("127.0.0.1:0").unwrap(), // Use port 0 to auto-assign
        sync_interval_secs: 60,
        auto_sync_enabled: false,
        export_dir: temp_dir.join("exports"),
        export_file_prefix: "garage-backup".to_string(),
        log_level: "error".to_string(), // Reduce log noise in tests
        log_json: false,
    }
}

/// Create a temporary directory for tests
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::TempDir::new().expect("Failed to create temp directory")
}

/// Collections holding `count` customers and nothing else
pub fn collections_with_customers(count: usize) -> Collections {
    let mut collections = Collections::new();
    for i in 0..count {
        let record = json!({"name": format!("Customer {}", i), "phone": format!("555-{:04}", i)});
        if let Some(record) = record.as_object() {
            collections.push(CollectionName::Customers, record.clone());
        }
    }
    collections
}

/// Store kept in memory with switchable failures
pub struct MemoryStore {
    collections: Mutex<Collections>,
    fail_reads: AtomicBool,
    fail_replaces: AtomicBool,
    replace_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with(Collections::new())
    }

    pub fn with(collections: Collections) -> Self {
        Self {
            collections: Mutex::new(collections),
            fail_reads: AtomicBool::new(false),
            fail_replaces: AtomicBool::new(false),
            replace_calls: AtomicUsize::new(0),
        }
    }

    pub async fn snapshot(&self) -> Collections {
        self.collections.lock().await.clone()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_replaces(&self, fail: bool) {
        self.fail_replaces.store(fail, Ordering::SeqCst);
    }

    pub fn replace_calls(&self) -> usize {
        self.replace_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn read_all(&self) -> SyncResult<Collections> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SyncError::Storage("simulated read failure".to_string()));
        }
        Ok(self.collections.lock().await.clone())
    }

    async fn replace_all(&self, collections: Collections) -> SyncResult<ReplaceSummary> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_replaces.load(Ordering::SeqCst) {
            return Err(SyncError::Storage("simulated write failure".to_string()));
        }
        let records_written = collections.total_records();
        *self.collections.lock().await = collections;
        Ok(ReplaceSummary { records_written })
    }

    async fn count(&self) -> SyncResult<CollectionCounts> {
        let collections = self.collections.lock().await;
        Ok(CollectionCounts(
            collections
                .iter()
                .map(|(name, records)| (name, records.len() as u64))
                .collect(),
        ))
    }

    async fn migrate_from_legacy(&self, _dir: &Path) -> SyncResult<MigrationReport> {
        Ok(MigrationReport {
            skipped: true,
            migrated: BTreeMap::new(),
        })
    }
}

/// Backup endpoint double that keeps the last pushed snapshot
pub struct FakeBackup {
    stored: Mutex<Option<String>>,
    pushes: AtomicUsize,
    fail_network: AtomicBool,
    gate: Option<Arc<Notify>>,
}

impl FakeBackup {
    pub fn new() -> Self {
        Self {
            stored: Mutex::new(None),
            pushes: AtomicUsize::new(0),
            fail_network: AtomicBool::new(false),
            gate: None,
        }
    }

    pub fn with_snapshot(text: String) -> Self {
        Self {
            stored: Mutex::new(Some(text)),
            ..Self::new()
        }
    }

    /// Every push and pull waits for one `notify_one` on `gate` before completing
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn gated_with_snapshot(gate: Arc<Notify>, text: String) -> Self {
        Self {
            stored: Mutex::new(Some(text)),
            ..Self::gated(gate)
        }
    }

    pub fn fail_network(&self, fail: bool) {
        self.fail_network.store(fail, Ordering::SeqCst);
    }

    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    pub async fn stored(&self) -> Option<String> {
        self.stored.lock().await.clone()
    }
}

#[async_trait]
impl BackupClient for FakeBackup {
    async fn push(&self, snapshot: &str) -> SyncResult<BackupAck> {
        if let Some(ref gate) = self.gate {
            gate.notified().await;
        }
        if self.fail_network.load(Ordering::SeqCst) {
            return Err(SyncError::Network("simulated connection reset".to_string()));
        }
        self.pushes.fetch_add(1, Ordering::SeqCst);
        *self.stored.lock().await = Some(snapshot.to_string());
        Ok(BackupAck {
            status: 200,
            bytes: snapshot.len(),
        })
    }

    async fn pull(&self) -> SyncResult<String> {
        if let Some(ref gate) = self.gate {
            gate.notified().await;
        }
        if self.fail_network.load(Ordering::SeqCst) {
            return Err(SyncError::Network("simulated connection reset".to_string()));
        }
        self.stored.lock().await.clone().ok_or(SyncError::NotFound)
    }
}
