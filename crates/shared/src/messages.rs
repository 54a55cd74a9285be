//! WebSocket frame types for the persistent chat channel
//!
//! ## Versioning Policy
//!
//! - New variants can be added at the end (forward compatible)
//! - Renaming variants is a breaking change
//! - Unknown server frames deserialize to `Unknown`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dto::MessageDto;

// =============================================================================
// Client Frames (client → backend)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Submit a user message; acknowledged with `ServerFrame::Ack`
    SendMessage {
        client_message_id: Uuid,
        content: String,
    },
    /// Liveness probe; answered with `ServerFrame::Pong`
    Ping,
}

// =============================================================================
// Server Frames (backend → client)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// A `SendMessage` was persisted
    Ack {
        client_message_id: Uuid,
        server_message_id: Uuid,
        created_at: DateTime<Utc>,
    },
    /// A new message in the session (assistant replies, other participants)
    Message { message: MessageDto },
    Pong,
    Error { code: String, message: String },
    /// Unknown frame type for forward compatibility
    #[serde(other)]
    Unknown,
}
