// SPDX-License-Identifier: GPL-3.0-only
pub mod status;
pub mod orchestrator;

pub use status::{SyncEvent, SyncHistoryEntry, SyncOutcome, SyncStatus};
pub use orchestrator::SyncOrchestrator;
