// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::snapshot::codec::records_from_value;
use crate::store::models::{
    CollectionCounts, CollectionName, Collections, MigrationReport, Record, ReplaceSummary,
    ID_FIELD, KEY_FIELD,
};
use crate::store::traits::LocalStore;

/// Document store backed by one SQLite table per collection.
///
/// Each row keeps the record as JSON text in `body`. Regular collections use
/// the SQLite rowid as the record identifier; `key_value` is keyed by the
/// record's own `key` field.
pub struct SqliteStore {
    pool: SqlitePool,
    // Keeps read_all from interleaving with replace_all inside this process.
    lock: RwLock<()>,
}

impl SqliteStore {
    pub async fn new(db_path: &Path) -> SyncResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self::with_pool(pool).await?;
        info!(path = %db_path.display(), "Opened SQLite store");
        Ok(store)
    }

    /// Single-connection in-memory store, used by tests and dry runs.
    pub async fn in_memory() -> SyncResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> SyncResult<Self> {
        let store = Self {
            pool,
            lock: RwLock::new(()),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> SyncResult<()> {
        for name in CollectionName::ALL {
            let sql = if name.has_natural_key() {
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, body TEXT NOT NULL)",
                    name.table_name()
                )
            } else {
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY, body TEXT NOT NULL)",
                    name.table_name()
                )
            };
            sqlx::query(&sql).execute(&self.pool).await?;
        }

        debug!("Initialized SQLite store schema");
        Ok(())
    }

    fn record_from_row(name: CollectionName, row: &SqliteRow) -> SyncResult<Record> {
        let body: String = row.try_get("body")?;
        let mut record = match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(SyncError::Storage(format!(
                    "{} row does not hold a JSON object",
                    name
                )))
            }
            Err(e) => {
                return Err(SyncError::Storage(format!(
                    "{} row holds malformed JSON: {}",
                    name, e
                )))
            }
        };

        if !name.has_natural_key() {
            let id: i64 = row.try_get("id")?;
            record.insert(ID_FIELD.to_string(), Value::from(id));
        }

        Ok(record)
    }
}

/// Natural key of a key-value entry. Only string keys are accepted.
fn natural_key(record: &Record) -> SyncResult<String> {
    match record.get(KEY_FIELD) {
        Some(Value::String(key)) => Ok(key.clone()),
        Some(Value::Null) | None => Err(SyncError::Storage(format!(
            "{} entry is missing its '{}' field",
            CollectionName::KeyValue,
            KEY_FIELD
        ))),
        Some(other) => Err(SyncError::Storage(format!(
            "{} entry has a non-string '{}' field: {}",
            CollectionName::KeyValue,
            KEY_FIELD,
            other
        ))),
    }
}

fn encode_body(record: &Record) -> SyncResult<String> {
    serde_json::to_string(record)
        .map_err(|e| SyncError::Storage(format!("failed to serialize record: {}", e)))
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn read_all(&self) -> SyncResult<Collections> {
        let _guard = self.lock.read().await;
        let mut tx = self.pool.begin().await?;

        let mut collections = Collections::new();
        for name in CollectionName::ALL {
            let sql = if name.has_natural_key() {
                format!("SELECT key, body FROM {} ORDER BY rowid", name.table_name())
            } else {
                format!("SELECT id, body FROM {} ORDER BY id", name.table_name())
            };
            let rows = sqlx::query(&sql).fetch_all(&mut *tx).await?;

            let records = rows
                .iter()
                .map(|row| Self::record_from_row(name, row))
                .collect::<SyncResult<Vec<Record>>>()?;
            collections.set(name, records);
        }

        tx.commit().await?;

        debug!(total = collections.total_records(), "Read all collections");
        Ok(collections)
    }

    async fn replace_all(&self, collections: Collections) -> SyncResult<ReplaceSummary> {
        let _guard = self.lock.write().await;

        // Dropping the transaction on any early return rolls it back.
        let mut tx = self.pool.begin().await?;

        for name in CollectionName::ALL {
            sqlx::query(&format!("DELETE FROM {}", name.table_name()))
                .execute(&mut *tx)
                .await?;
        }

        let mut records_written = 0u64;
        for (name, records) in collections.iter() {
            if name.has_natural_key() {
                let sql = format!("INSERT INTO {} (key, body) VALUES (?1, ?2)", name.table_name());
                for record in records {
                    let key = natural_key(record)?;
                    sqlx::query(&sql)
                        .bind(key)
                        .bind(encode_body(record)?)
                        .execute(&mut *tx)
                        .await?;
                    records_written += 1;
                }
            } else {
                let sql = format!("INSERT INTO {} (body) VALUES (?1)", name.table_name());
                for record in records {
                    let mut body = record.clone();
                    body.remove(ID_FIELD);
                    sqlx::query(&sql)
                        .bind(encode_body(&body)?)
                        .execute(&mut *tx)
                        .await?;
                    records_written += 1;
                }
            }
        }

        tx.commit().await?;

        info!(records = records_written, "Replaced all collections");
        Ok(ReplaceSummary { records_written })
    }

    async fn count(&self) -> SyncResult<CollectionCounts> {
        let _guard = self.lock.read().await;

        let mut counts = BTreeMap::new();
        for name in CollectionName::ALL {
            let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", name.table_name()))
                .fetch_one(&self.pool)
                .await?;
            let n: i64 = row.try_get("n")?;
            counts.insert(name, n.max(0) as u64);
        }

        Ok(CollectionCounts(counts))
    }

    async fn migrate_from_legacy(&self, dir: &Path) -> SyncResult<MigrationReport> {
        let existing = self.count().await?;
        if existing.total() > 0 {
            warn!(
                records = existing.total(),
                "Store already holds data, skipping legacy migration"
            );
            return Ok(MigrationReport {
                skipped: true,
                migrated: BTreeMap::new(),
            });
        }

        let mut collections = Collections::new();
        let mut migrated = BTreeMap::new();
        for name in CollectionName::ALL {
            let path = dir.join(format!("{}.json", name.as_str()));
            if !tokio::fs::try_exists(&path).await? {
                continue;
            }

            let contents = tokio::fs::read_to_string(&path).await?;
            let value: Value = serde_json::from_str(&contents).map_err(|e| {
                SyncError::InvalidFormat(format!("{}: {}", path.display(), e))
            })?;
            let records = records_from_value(name, value)?;

            info!(collection = %name, count = records.len(), "Loaded legacy collection");
            migrated.insert(name, records.len() as u64);
            collections.set(name, records);
        }

        self.replace_all(collections).await?;

        Ok(MigrationReport {
            skipped: false,
            migrated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup_test_store() -> (TempDir, SqliteStore) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("store.db");
        let store = SqliteStore::new(&db_path).await.unwrap();
        (temp_dir, store)
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn sample_collections() -> Collections {
        let mut collections = Collections::new();
        collections.push(CollectionName::Customers, record(json!({"name": "Ada", "phone": "555-0100"})));
        collections.push(CollectionName::Customers, record(json!({"name": "Grace"})));
        collections.push(CollectionName::Vehicles, record(json!({"plate": "KT-1234", "customerId": 1})));
        collections.push(CollectionName::Repairs, record(json!({"description": "Brake pads", "cost": 120.5})));
        collections.push(CollectionName::KeyValue, record(json!({"key": "currency", "value": "EUR"})));
        collections
    }

    #[tokio::test]
    async fn test_schema_initialization() {
        let (_dir, store) = setup_test_store().await;
        let collections = store.read_all().await.unwrap();
        assert_eq!(collections.total_records(), 0);
        assert_eq!(store.count().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_replace_and_read_all() {
        let (_dir, store) = setup_test_store().await;

        let summary = store.replace_all(sample_collections()).await.unwrap();
        assert_eq!(summary.records_written, 5);

        let collections = store.read_all().await.unwrap();
        let customers = collections.get(CollectionName::Customers);
        assert_eq!(customers.len(), 2);
        assert_eq!(customers[0]["name"], json!("Ada"));
        assert_eq!(customers[0]["id"], json!(1));
        assert_eq!(customers[1]["id"], json!(2));

        let entries = collections.get(CollectionName::KeyValue);
        assert_eq!(entries[0], record(json!({"key": "currency", "value": "EUR"})));
    }

    #[tokio::test]
    async fn test_replace_assigns_fresh_ids() {
        let (_dir, store) = setup_test_store().await;

        let mut collections = Collections::new();
        collections.push(CollectionName::Invoices, record(json!({"id": 77, "total": 10})));
        store.replace_all(collections).await.unwrap();

        let invoices = store.read_all().await.unwrap();
        assert_eq!(invoices.get(CollectionName::Invoices)[0]["id"], json!(1));
    }

    #[tokio::test]
    async fn test_read_replace_roundtrip_preserves_ids() {
        let (_dir, store) = setup_test_store().await;
        store.replace_all(sample_collections()).await.unwrap();

        let before = store.read_all().await.unwrap();
        store.replace_all(before.clone()).await.unwrap();
        let after = store.read_all().await.unwrap();

        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_roundtrip_matches_input_apart_from_ids() {
        let (_dir, store) = setup_test_store().await;

        let mut input = sample_collections();
        input.push(CollectionName::Appointments, record(json!({"id": 40, "at": "2024-05-01T09:00"})));
        input.push(CollectionName::Appointments, record(json!({"id": 41, "at": "2024-05-02T09:00"})));
        store.replace_all(input.clone()).await.unwrap();

        let output = store.read_all().await.unwrap();
        assert_eq!(output.without_ids(), input.without_ids());
        assert_eq!(output.get(CollectionName::Appointments)[1]["id"], json!(2));
    }

    #[tokio::test]
    async fn test_non_string_key_is_rejected() {
        let (_dir, store) = setup_test_store().await;
        store.replace_all(sample_collections()).await.unwrap();
        let before = store.read_all().await.unwrap();

        let mut collections = Collections::new();
        collections.push(CollectionName::KeyValue, record(json!({"key": "1", "value": "text"})));
        collections.push(CollectionName::KeyValue, record(json!({"key": 1, "value": "number"})));

        match store.replace_all(collections).await {
            Err(SyncError::Storage(message)) => assert!(message.contains("non-string")),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(store.read_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_replace_clears_previous_contents() {
        let (_dir, store) = setup_test_store().await;
        store.replace_all(sample_collections()).await.unwrap();

        let mut collections = Collections::new();
        collections.push(CollectionName::Users, record(json!({"name": "admin"})));
        store.replace_all(collections).await.unwrap();

        let counts = store.count().await.unwrap();
        assert_eq!(counts.get(CollectionName::Customers), 0);
        assert_eq!(counts.get(CollectionName::Users), 1);
        assert_eq!(counts.total(), 1);
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_previous_state() {
        let (_dir, store) = setup_test_store().await;
        store.replace_all(sample_collections()).await.unwrap();
        let before = store.read_all().await.unwrap();

        // Clearing succeeds, then the key-value insert without a key fails.
        let mut collections = Collections::new();
        collections.push(CollectionName::Customers, record(json!({"name": "Replacement"})));
        collections.push(CollectionName::KeyValue, record(json!({"value": "orphan"})));

        let result = store.replace_all(collections).await;
        assert!(matches!(result, Err(SyncError::Storage(_))));

        let after = store.read_all().await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_duplicate_natural_key_rolls_back() {
        let (_dir, store) = setup_test_store().await;
        store.replace_all(sample_collections()).await.unwrap();

        let mut collections = Collections::new();
        collections.push(CollectionName::KeyValue, record(json!({"key": "a"})));
        collections.push(CollectionName::KeyValue, record(json!({"key": "a"})));

        assert!(store.replace_all(collections).await.is_err());
        assert_eq!(store.count().await.unwrap().total(), 5);
    }

    #[tokio::test]
    async fn test_count_per_collection() {
        let (_dir, store) = setup_test_store().await;
        store.replace_all(sample_collections()).await.unwrap();

        let counts = store.count().await.unwrap();
        assert_eq!(counts.get(CollectionName::Customers), 2);
        assert_eq!(counts.get(CollectionName::Vehicles), 1);
        assert_eq!(counts.get(CollectionName::Appointments), 0);
        assert_eq!(counts.get(CollectionName::KeyValue), 1);
        assert_eq!(counts.total(), 5);
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.replace_all(sample_collections()).await.unwrap();
        assert_eq!(store.count().await.unwrap().total(), 5);
    }

    #[tokio::test]
    async fn test_migrate_from_legacy() {
        let (_dir, store) = setup_test_store().await;
        let legacy_dir = TempDir::new().unwrap();
        std::fs::write(
            legacy_dir.path().join("customers.json"),
            r#"[{"id": 5, "name": "Ada"}, {"id": 9, "name": "Grace"}]"#,
        )
        .unwrap();
        std::fs::write(
            legacy_dir.path().join("keyValue.json"),
            r#"[{"key": "locale", "value": "pl-PL"}]"#,
        )
        .unwrap();

        let report = store.migrate_from_legacy(legacy_dir.path()).await.unwrap();
        assert!(!report.skipped);
        assert_eq!(report.migrated.get(&CollectionName::Customers), Some(&2));
        assert_eq!(report.migrated.get(&CollectionName::KeyValue), Some(&1));
        assert_eq!(report.migrated.get(&CollectionName::Repairs), None);

        let counts = store.count().await.unwrap();
        assert_eq!(counts.get(CollectionName::Customers), 2);
        assert_eq!(counts.get(CollectionName::KeyValue), 1);
    }

    #[tokio::test]
    async fn test_migrate_skipped_when_store_has_data() {
        let (_dir, store) = setup_test_store().await;
        store.replace_all(sample_collections()).await.unwrap();

        let legacy_dir = TempDir::new().unwrap();
        std::fs::write(legacy_dir.path().join("customers.json"), "[]").unwrap();

        let report = store.migrate_from_legacy(legacy_dir.path()).await.unwrap();
        assert!(report.skipped);
        assert_eq!(store.count().await.unwrap().total(), 5);
    }

    #[tokio::test]
    async fn test_migrate_rejects_malformed_file() {
        let (_dir, store) = setup_test_store().await;
        let legacy_dir = TempDir::new().unwrap();
        std::fs::write(legacy_dir.path().join("customers.json"), "{not json").unwrap();

        let result = store.migrate_from_legacy(legacy_dir.path()).await;
        assert!(matches!(result, Err(SyncError::InvalidFormat(_))));
        assert_eq!(store.count().await.unwrap().total(), 0);
    }
}
