// SPDX-License-Identifier: GPL-3.0-only
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A stored document. Opaque to the sync engine apart from its identifier field.
pub type Record = Map<String, Value>;

/// Identifier field assigned by the local store.
pub const ID_FIELD: &str = "id";

/// Natural key field carried by key-value entries.
pub const KEY_FIELD: &str = "key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollectionName {
    Customers,
    Vehicles,
    Repairs,
    Appointments,
    Invoices,
    Users,
    Settings,
    KeyValue,
}

impl CollectionName {
    /// Every collection, in the fixed order used for reads, writes and snapshots.
    pub const ALL: [CollectionName; 8] = [
        CollectionName::Customers,
        CollectionName::Vehicles,
        CollectionName::Repairs,
        CollectionName::Appointments,
        CollectionName::Invoices,
        CollectionName::Users,
        CollectionName::Settings,
        CollectionName::KeyValue,
    ];

    /// Name used as the snapshot key.
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionName::Customers => "customers",
            CollectionName::Vehicles => "vehicles",
            CollectionName::Repairs => "repairs",
            CollectionName::Appointments => "appointments",
            CollectionName::Invoices => "invoices",
            CollectionName::Users => "users",
            CollectionName::Settings => "settings",
            CollectionName::KeyValue => "keyValue",
        }
    }

    /// SQLite table backing the collection.
    pub fn table_name(&self) -> &'static str {
        match self {
            CollectionName::KeyValue => "key_value",
            other => other.as_str(),
        }
    }

    /// Whether records bring their own key instead of a store-assigned id.
    pub fn has_natural_key(&self) -> bool {
        matches!(self, CollectionName::KeyValue)
    }
}

impl std::fmt::Display for CollectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full contents of every fixed collection.
///
/// Always holds an entry (possibly empty) for each [`CollectionName`].
#[derive(Debug, Clone, PartialEq)]
pub struct Collections {
    inner: BTreeMap<CollectionName, Vec<Record>>,
}

impl Collections {
    pub fn new() -> Self {
        Self {
            inner: CollectionName::ALL
                .iter()
                .map(|name| (*name, Vec::new()))
                .collect(),
        }
    }

    pub fn get(&self, name: CollectionName) -> &[Record] {
        self.inner.get(&name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set(&mut self, name: CollectionName, records: Vec<Record>) {
        self.inner.insert(name, records);
    }

    pub fn push(&mut self, name: CollectionName, record: Record) {
        self.inner.entry(name).or_default().push(record);
    }

    /// Collections in fixed order.
    pub fn iter(&self) -> impl Iterator<Item = (CollectionName, &[Record])> {
        self.inner.iter().map(|(name, records)| (*name, records.as_slice()))
    }

    pub fn total_records(&self) -> u64 {
        self.inner.values().map(|records| records.len() as u64).sum()
    }

    /// Copy with store-assigned identifiers removed. Key-value entries are left as-is.
    pub fn without_ids(&self) -> Self {
        let mut stripped = self.clone();
        for (name, records) in stripped.inner.iter_mut() {
            if name.has_natural_key() {
                continue;
            }
            for record in records.iter_mut() {
                record.remove(ID_FIELD);
            }
        }
        stripped
    }
}

impl Default for Collections {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-collection record counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionCounts(pub BTreeMap<CollectionName, u64>);

impl CollectionCounts {
    pub fn get(&self, name: CollectionName) -> u64 {
        self.0.get(&name).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }
}

/// Result of a committed `replace_all`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceSummary {
    pub records_written: u64,
}

/// Result of a legacy migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// True when the store already held data and nothing was migrated
    pub skipped: bool,
    pub migrated: BTreeMap<CollectionName, u64>,
}
