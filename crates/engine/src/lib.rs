//! Consultchat Backend - in-memory reference chat backend.
//!
//! Serves the chat API the client consumes:
//! - `POST/GET /api/chat/sessions/{id}/messages` (request/response)
//! - `GET /ws/chat/{id}` (persistent channel)
//!
//! History lives in memory only; this backend exists for local development and
//! the client's end-to-end tests.

pub mod api;
pub mod app;
pub mod config;
pub mod infrastructure;
pub mod stores;
pub mod use_cases;

use std::sync::Arc;

pub use api::router;
pub use app::App;
pub use config::{BackendConfig, ConfigError};

/// Serve `app` on an already bound listener until the task is dropped.
pub async fn serve(listener: tokio::net::TcpListener, app: Arc<App>) -> std::io::Result<()> {
    axum::serve(listener, router(app)).await
}
