// SPDX-License-Identifier: GPL-3.0-only

/// Failure taxonomy shared by the store, the backup client and the orchestrator.
///
/// None of these are fatal: every operation can be retried by calling it again.
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("Invalid snapshot format: {0}")]
    InvalidFormat(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Backup endpoint rejected the request: HTTP {status} - {body}")]
    RemoteRejected { status: u16, body: String },

    #[error("No backup found on the remote endpoint")]
    NotFound,

    #[error("Another sync operation is already in progress")]
    Busy,

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        SyncError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SyncError::Network(format!("request timed out: {}", e))
        } else {
            SyncError::Network(e.to_string())
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
