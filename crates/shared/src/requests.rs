//! REST request/response bodies for the chat backend.
//!
//! - `POST /api/chat/sessions/{id}/messages` with [`SendMessageRequest`]
//!   answers [`SendMessageResponse`]
//! - `GET /api/chat/sessions/{id}/messages?after_id=&after_ts=`
//!   ([`FetchMessagesQuery`]) answers [`FetchMessagesResponse`]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dto::{CursorDto, MessageDto};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    pub client_message_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub server_message_id: Uuid,
    /// Must equal the request's `client_message_id`
    #[serde(default)]
    pub echoed_client_message_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    /// Assistant reply produced synchronously, if any
    #[serde(default)]
    pub inline_reply: Option<MessageDto>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FetchMessagesQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_ts: Option<DateTime<Utc>>,
}

impl From<CursorDto> for FetchMessagesQuery {
    fn from(cursor: CursorDto) -> Self {
        Self {
            after_id: cursor.last_seen_message_id,
            after_ts: cursor.last_seen_timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchMessagesResponse {
    /// Messages strictly newer than the query cursor, oldest first
    pub messages: Vec<MessageDto>,
    pub next_cursor: CursorDto,
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_response_without_inline_reply_decodes() {
        let json = r#"{
            "server_message_id": "6f1c1c34-7c43-4a47-9d6e-8ad1f1d8f7a1",
            "echoed_client_message_id": "0b8a1c9e-2f7e-4e39-8f37-2b8f8f0d6c11",
            "created_at": "2024-05-01T10:00:00Z"
        }"#;
        let response: SendMessageResponse = serde_json::from_str(json).expect("decodes");
        assert!(response.inline_reply.is_none());
        assert!(response.echoed_client_message_id.is_some());
    }

    #[test]
    fn empty_query_serializes_without_fields() {
        let query = FetchMessagesQuery::default();
        assert_eq!(serde_json::to_string(&query).expect("serialize"), "{}");
    }
}
