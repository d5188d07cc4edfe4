// SPDX-License-Identifier: GPL-3.0-only
pub mod models;
pub mod traits;
pub mod sqlite;

pub use models::{CollectionCounts, CollectionName, Collections, MigrationReport, Record, ReplaceSummary};
pub use traits::LocalStore;
pub use sqlite::SqliteStore;
