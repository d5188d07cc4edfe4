// SPDX-License-Identifier: GPL-3.0-only
//! Local HTTP and WebSocket surface over the sync orchestrator.
pub mod handlers;
pub mod http;
pub mod websocket;

pub use http::HttpServer;
