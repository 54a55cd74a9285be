//! API layer - HTTP and WebSocket entry points.

pub mod auth;
pub mod dto;
pub mod http;
pub mod websocket;

use std::sync::Arc;

use axum::{middleware, Router};

use crate::app::App;

/// Full router: public routes plus the authenticated chat routes.
///
/// Transport layers (tracing, CORS) are added by the binary.
pub fn router(app: Arc<App>) -> Router {
    let chat = http::chat_routes()
        .merge(websocket::routes())
        .route_layer(middleware::from_fn_with_state(
            app.clone(),
            auth::require_bearer,
        ));

    http::public_routes().merge(chat).with_state(app)
}
