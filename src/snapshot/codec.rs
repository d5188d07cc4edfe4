// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::store::models::{CollectionName, Collections, Record};

/// Version tag written into every snapshot
pub const SNAPSHOT_VERSION: &str = "2.0";

/// Version reported for snapshots that carry no tag
pub const UNKNOWN_VERSION: &str = "unknown";

/// A decoded snapshot document.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub version: String,
    pub export_date: Option<DateTime<Utc>>,
    pub collections: Collections,
}

// Field order here is the key order of the encoded document.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotDocument<'a> {
    customers: &'a [Record],
    vehicles: &'a [Record],
    repairs: &'a [Record],
    appointments: &'a [Record],
    invoices: &'a [Record],
    users: &'a [Record],
    settings: &'a [Record],
    key_value: &'a [Record],
    export_date: DateTime<Utc>,
    version: &'a str,
}

/// Encode collections as snapshot JSON stamped with the current time.
pub fn encode(collections: &Collections) -> SyncResult<String> {
    encode_at(collections, Utc::now())
}

/// Encode collections as snapshot JSON with an explicit export timestamp.
pub fn encode_at(collections: &Collections, export_date: DateTime<Utc>) -> SyncResult<String> {
    let document = SnapshotDocument {
        customers: collections.get(CollectionName::Customers),
        vehicles: collections.get(CollectionName::Vehicles),
        repairs: collections.get(CollectionName::Repairs),
        appointments: collections.get(CollectionName::Appointments),
        invoices: collections.get(CollectionName::Invoices),
        users: collections.get(CollectionName::Users),
        settings: collections.get(CollectionName::Settings),
        key_value: collections.get(CollectionName::KeyValue),
        export_date,
        version: SNAPSHOT_VERSION,
    };

    serde_json::to_string_pretty(&document)
        .map_err(|e| SyncError::InvalidFormat(format!("failed to encode snapshot: {}", e)))
}

/// Decode snapshot JSON.
///
/// `customers` is required. Other collections may be absent (older snapshots)
/// and decode as empty. Unknown top-level keys are ignored.
pub fn decode(text: &str) -> SyncResult<Snapshot> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| SyncError::InvalidFormat(format!("not valid JSON: {}", e)))?;

    let Value::Object(mut root) = value else {
        return Err(SyncError::InvalidFormat(
            "snapshot root must be a JSON object".to_string(),
        ));
    };

    let mut collections = Collections::new();
    for name in CollectionName::ALL {
        match root.remove(name.as_str()) {
            Some(value) => collections.set(name, records_from_value(name, value)?),
            None if name == CollectionName::Customers => {
                return Err(SyncError::InvalidFormat(format!(
                    "missing required '{}' collection",
                    name
                )));
            }
            None => {}
        }
    }

    let version = root
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_VERSION)
        .to_string();
    let export_date = root
        .get("exportDate")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|date| date.with_timezone(&Utc));

    Ok(Snapshot {
        version,
        export_date,
        collections,
    })
}

/// Convert one collection's JSON value into records.
///
/// `null` is read as empty, customers excepted. Anything other than an array
/// of objects is rejected.
pub fn records_from_value(name: CollectionName, value: Value) -> SyncResult<Vec<Record>> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(record) => Ok(record),
                _ => Err(SyncError::InvalidFormat(format!(
                    "'{}' entry {} is not an object",
                    name, index
                ))),
            })
            .collect(),
        Value::Null if name != CollectionName::Customers => Ok(Vec::new()),
        _ => Err(SyncError::InvalidFormat(format!(
            "'{}' must be an array",
            name
        ))),
    }
}

/// File name used for exported snapshots, e.g. `garage-backup-2024-05-01.json`.
pub fn export_file_name(prefix: &str, date: NaiveDate) -> String {
    format!("{}-{}.json", prefix, date.format("%Y-%m-%d"))
}
