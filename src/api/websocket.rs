// SPDX-License-Identifier: GPL-3.0-only
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::Json;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use crate::api::handlers::{ApiHandlers, ApiResponse};
use crate::sync::SyncEvent;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum WsMessage {
    GetStatus,
    GetHistory,
    PerformSync,
}

/// Everything the server writes to a socket.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "lowercase")]
enum WsOutbound {
    Event {
        event: SyncEvent,
    },
    Response {
        success: bool,
        data: Option<serde_json::Value>,
        error: Option<String>,
    },
}

impl WsOutbound {
    fn from_api<T: Serialize>(response: ApiResponse<T>) -> Self {
        WsOutbound::Response {
            success: response.success,
            data: response
                .data
                .and_then(|v| serde_json::to_value(v).ok()),
            error: response.error,
        }
    }

    fn into_message(self) -> anyhow::Result<Message> {
        Ok(Message::Text(serde_json::to_string(&self)?))
    }
}

pub struct WebSocketServer {
    handlers: Arc<ApiHandlers>,
}

impl WebSocketServer {
    pub fn new(handlers: Arc<ApiHandlers>) -> Self {
        Self { handlers }
    }

    pub fn router(&self) -> Router {
        let handlers = self.handlers.clone();
        Router::new().route(
            "/ws",
            get(move |ws: WebSocketUpgrade| async move {
                ws.on_upgrade(move |socket| handle_socket(socket, handlers))
            }),
        )
    }
}

async fn handle_socket(socket: WebSocket, handlers: Arc<ApiHandlers>) {
    let (sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    // Subscribe before the first message so no event slips between the two.
    let mut events = handlers.orchestrator().subscribe();
    let status = handlers.orchestrator().get_sync_status().await;
    match (WsOutbound::Event { event: SyncEvent::StatusChanged { status } }).into_message() {
        Ok(msg) => {
            let _ = tx.send(msg);
        }
        Err(e) => error!(error = %e, "Failed to encode initial status"),
    }

    let mut send_task = tokio::spawn(async move {
        let mut sender = sender;
        while let Some(msg) = rx.recv().await {
            if let Err(e) = sender.send(msg).await {
                error!(error = %e, "Failed to send WebSocket message");
                break;
            }
        }
    });

    let event_tx = tx.clone();
    let mut event_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let msg = match (WsOutbound::Event { event }).into_message() {
                        Ok(msg) => msg,
                        Err(e) => {
                            error!(error = %e, "Failed to encode sync event");
                            continue;
                        }
                    };
                    if event_tx.send(msg).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "WebSocket client fell behind on sync events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let handlers_clone = handlers.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Err(e) = handle_message(text, &handlers_clone, &tx).await {
                        error!(error = %e, "Failed to handle WebSocket message");
                    }
                }
                Message::Close(_) => {
                    info!("WebSocket connection closed");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
            event_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
            event_task.abort();
        }
        _ = (&mut event_task) => {
            send_task.abort();
            recv_task.abort();
        }
    };
}

async fn handle_message(
    text: String,
    handlers: &ApiHandlers,
    tx: &mpsc::UnboundedSender<Message>,
) -> anyhow::Result<()> {
    let msg: WsMessage = match serde_json::from_str(&text) {
        Ok(m) => m,
        Err(e) => {
            let response = WsOutbound::Response {
                success: false,
                data: None,
                error: Some(format!("Invalid message format: {}", e)),
            };
            tx.send(response.into_message()?)?;
            return Ok(());
        }
    };

    debug!(message = ?msg, "WebSocket request");

    let response = match msg {
        WsMessage::GetStatus => {
            let (_, Json(api_response)) = handlers.sync_status().await;
            WsOutbound::from_api(api_response)
        }
        WsMessage::GetHistory => {
            let (_, Json(api_response)) = handlers.history().await;
            WsOutbound::from_api(api_response)
        }
        WsMessage::PerformSync => {
            let (_, Json(api_response)) = handlers.perform_sync().await;
            WsOutbound::from_api(api_response)
        }
    };

    tx.send(response.into_message()?)?;
    Ok(())
}
