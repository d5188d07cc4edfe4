// SPDX-License-Identifier: GPL-3.0-only
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::SyncError;
use crate::snapshot::export_file_name;
use crate::store::ReplaceSummary;
use crate::sync::{SyncHistoryEntry, SyncOrchestrator, SyncOutcome, SyncStatus};

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleSyncRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

pub type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

fn status_for(e: &SyncError) -> StatusCode {
    match e {
        SyncError::InvalidFormat(_) => StatusCode::BAD_REQUEST,
        SyncError::NotFound => StatusCode::NOT_FOUND,
        SyncError::Busy => StatusCode::CONFLICT,
        SyncError::Network(_) | SyncError::RemoteRejected { .. } => StatusCode::BAD_GATEWAY,
        SyncError::Storage(_) | SyncError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn ok<T>(data: T) -> ApiResult<T> {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

fn fail<T>(e: &SyncError) -> ApiResult<T> {
    (status_for(e), Json(ApiResponse::error(e.to_string())))
}

pub struct ApiHandlers {
    orchestrator: Arc<SyncOrchestrator>,
    export_prefix: String,
}

impl ApiHandlers {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, export_prefix: String) -> Self {
        Self {
            orchestrator,
            export_prefix,
        }
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }
}

impl ApiHandlers {
    pub async fn health() -> Json<ApiResponse<&'static str>> {
        Json(ApiResponse::success("ok"))
    }

    pub async fn sync_status(&self) -> ApiResult<SyncStatus> {
        ok(self.orchestrator.get_sync_status().await)
    }

    pub async fn toggle_sync(&self, Json(request): Json<ToggleSyncRequest>) -> ApiResult<SyncStatus> {
        info!(enabled = request.enabled, "Toggle sync request received");
        self.orchestrator.toggle_sync(request.enabled).await;
        ok(self.orchestrator.get_sync_status().await)
    }

    pub async fn perform_sync(&self) -> ApiResult<SyncOutcome> {
        match self.orchestrator.perform_sync().await {
            Ok(outcome) => ok(outcome),
            Err(e) => {
                error!(error = %e, "Manual sync failed");
                fail(&e)
            }
        }
    }

    pub async fn restore(&self) -> ApiResult<ReplaceSummary> {
        info!("Restore request received");
        match self.orchestrator.restore_from_cloud().await {
            Ok(summary) => ok(summary),
            Err(e) => {
                error!(error = %e, "Restore failed");
                fail(&e)
            }
        }
    }

    /// Snapshot as a downloadable JSON attachment
    pub async fn export(&self) -> Response {
        match self.orchestrator.export_data().await {
            Ok(text) => {
                let file_name = export_file_name(&self.export_prefix, Local::now().date_naive());
                (
                    StatusCode::OK,
                    [
                        (header::CONTENT_TYPE, "application/json".to_string()),
                        (
                            header::CONTENT_DISPOSITION,
                            format!("attachment; filename=\"{}\"", file_name),
                        ),
                    ],
                    text,
                )
                    .into_response()
            }
            Err(e) => {
                error!(error = %e, "Export failed");
                fail::<()>(&e).into_response()
            }
        }
    }

    pub async fn import(&self, body: String) -> ApiResult<ReplaceSummary> {
        info!(bytes = body.len(), "Import request received");
        match self.orchestrator.import_data(&body).await {
            Ok(summary) => ok(summary),
            Err(e) => {
                warn!(error = %e, "Import rejected");
                fail(&e)
            }
        }
    }

    pub async fn history(&self) -> ApiResult<Vec<SyncHistoryEntry>> {
        ok(self.orchestrator.get_sync_history().await)
    }

    pub async fn reset(&self) -> ApiResult<SyncStatus> {
        self.orchestrator.reset_status().await;
        ok(self.orchestrator.get_sync_status().await)
    }
}
