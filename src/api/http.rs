// SPDX-License-Identifier: GPL-3.0-only
use axum::{
    extract::State,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use crate::api::handlers::{ApiHandlers, ApiResponse, ApiResult, ToggleSyncRequest};
use crate::api::websocket::WebSocketServer;
use crate::store::ReplaceSummary;
use crate::sync::{SyncHistoryEntry, SyncOrchestrator, SyncOutcome, SyncStatus};

pub struct HttpServer {
    handlers: Arc<ApiHandlers>,
    addr: SocketAddr,
}

impl HttpServer {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        export_prefix: String,
        addr: SocketAddr,
    ) -> Self {
        Self {
            handlers: Arc::new(ApiHandlers::new(orchestrator, export_prefix)),
            addr,
        }
    }

    pub fn router(&self) -> Router {
        let websocket = WebSocketServer::new(self.handlers.clone());

        Router::new()
            .route("/api/health", get(health_handler))
            .route("/api/sync/status", get(status_handler))
            .route("/api/sync/toggle", post(toggle_handler))
            .route("/api/sync/run", post(run_handler))
            .route("/api/sync/restore", post(restore_handler))
            .route("/api/sync/export", get(export_handler))
            .route("/api/sync/import", post(import_handler))
            .route("/api/sync/history", get(history_handler))
            .route("/api/sync/reset", post(reset_handler))
            .with_state(self.handlers.clone())
            .merge(websocket.router())
    }

    pub async fn serve(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.addr).await?;
        self.serve_on(listener).await
    }

    pub async fn serve_on(self, listener: TcpListener) -> anyhow::Result<()> {
        let app = self.router();

        info!(addr = %listener.local_addr()?, "Starting HTTP server");
        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn health_handler() -> Json<ApiResponse<&'static str>> {
    ApiHandlers::health().await
}

async fn status_handler(State(handlers): State<Arc<ApiHandlers>>) -> ApiResult<SyncStatus> {
    handlers.sync_status().await
}

async fn toggle_handler(
    State(handlers): State<Arc<ApiHandlers>>,
    Json(request): Json<ToggleSyncRequest>,
) -> ApiResult<SyncStatus> {
    handlers.toggle_sync(Json(request)).await
}

async fn run_handler(State(handlers): State<Arc<ApiHandlers>>) -> ApiResult<SyncOutcome> {
    handlers.perform_sync().await
}

async fn restore_handler(State(handlers): State<Arc<ApiHandlers>>) -> ApiResult<ReplaceSummary> {
    handlers.restore().await
}

async fn export_handler(State(handlers): State<Arc<ApiHandlers>>) -> Response {
    handlers.export().await
}

async fn import_handler(
    State(handlers): State<Arc<ApiHandlers>>,
    body: String,
) -> ApiResult<ReplaceSummary> {
    handlers.import(body).await
}

async fn history_handler(State(handlers): State<Arc<ApiHandlers>>) -> ApiResult<Vec<SyncHistoryEntry>> {
    handlers.history().await
}

async fn reset_handler(State(handlers): State<Arc<ApiHandlers>>) -> ApiResult<SyncStatus> {
    handlers.reset().await
}
