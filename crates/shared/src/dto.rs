//! Message payloads shared by REST responses and WebSocket frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author of a message on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRoleData {
    User,
    Assistant,
    System,
    /// Unknown role for forward compatibility
    #[serde(other)]
    Unknown,
}

/// A persisted chat message as the backend reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: Uuid,
    /// Client-provided id, echoed verbatim when the message came from a client
    #[serde(default)]
    pub client_message_id: Option<Uuid>,
    pub session_id: Uuid,
    pub role: MessageRoleData,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Position of the last message a client has seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CursorDto {
    #[serde(default)]
    pub last_seen_message_id: Option<Uuid>,
    #[serde(default)]
    pub last_seen_timestamp: Option<DateTime<Utc>>,
}
