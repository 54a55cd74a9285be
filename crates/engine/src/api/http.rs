//! HTTP routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use consultchat_domain::{MessageId, PollingCursor, SessionId};
use consultchat_shared::{
    ErrorResponse, FetchMessagesQuery, FetchMessagesResponse, SendMessageRequest,
    SendMessageResponse,
};

use crate::api::dto::{cursor_dto, cursor_from_query, message_dto};
use crate::app::App;
use crate::use_cases::ChatError;

/// Routes that never require authentication.
pub fn public_routes() -> Router<Arc<App>> {
    Router::new()
        .route("/", get(health))
        .route("/api/health", get(health))
}

/// Chat routes; the caller adds the auth layer.
pub fn chat_routes() -> Router<Arc<App>> {
    Router::new().route(
        "/api/chat/sessions/{id}/messages",
        get(fetch_messages).post(send_message),
    )
}

async fn health() -> &'static str {
    "OK"
}

async fn send_message(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let session_id = SessionId::from_uuid(id);
    let (stored, reply) = app
        .submit
        .execute(
            session_id,
            MessageId::from_uuid(request.client_message_id),
            &request.content,
        )
        .await?;

    Ok(Json(SendMessageResponse {
        server_message_id: stored.message.id.to_uuid(),
        echoed_client_message_id: Some(request.client_message_id),
        created_at: stored.message.created_at,
        inline_reply: reply.as_ref().map(message_dto),
    }))
}

async fn fetch_messages(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Query(query): Query<FetchMessagesQuery>,
) -> Json<FetchMessagesResponse> {
    let cursor = cursor_from_query(query);
    let messages = app
        .store
        .messages_after(SessionId::from_uuid(id), &cursor);
    let next_cursor = messages.last().map(PollingCursor::after).unwrap_or(cursor);

    Json(FetchMessagesResponse {
        messages: messages.iter().map(message_dto).collect(),
        next_cursor: cursor_dto(&next_cursor),
    })
}

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
    Unauthorized,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", "Not found".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Missing or invalid bearer token".to_string(),
            ),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "Internal error".to_string(),
                )
            }
        };
        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::EmptyMessage => ApiError::BadRequest(e.to_string()),
        }
    }
}
