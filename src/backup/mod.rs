// SPDX-License-Identifier: GPL-3.0-only
pub mod traits;
pub mod backend;

pub use traits::{BackupAck, BackupClient};
pub use backend::HttpBackupClient;
