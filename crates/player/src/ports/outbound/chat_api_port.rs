//! Chat API Port - request/response boundary to the chat backend

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use consultchat_domain::{ChatMessage, MessageId, PollingCursor, SessionId};

/// Failure of a single transport operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Operation timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    /// Credential rejected by the backend; never retried
    #[error("Credential rejected: {0}")]
    Unauthorized(String),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection closed")]
    Closed,
}

impl TransportError {
    /// Only credential rejection ends a session; everything else degrades.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Unauthorized(_))
    }
}

/// Backend acknowledgment of a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendAck {
    pub server_message_id: MessageId,
    pub echoed_client_message_id: Option<MessageId>,
    pub created_at: DateTime<Utc>,
    /// Assistant reply returned in the same response; must be surfaced like a
    /// polled message
    pub inline_reply: Option<ChatMessage>,
}

/// One page of messages newer than the requested cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPage {
    /// Oldest first
    pub messages: Vec<ChatMessage>,
    pub next_cursor: PollingCursor,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ChatApiPort: Send + Sync {
    /// Submit a user message. The backend must echo `client_message_id`.
    async fn send_message(
        &self,
        session_id: SessionId,
        content: String,
        client_message_id: MessageId,
    ) -> Result<SendAck, TransportError>;

    /// Fetch messages strictly newer than `cursor`. An empty page is success.
    async fn fetch_messages_since(
        &self,
        session_id: SessionId,
        cursor: PollingCursor,
    ) -> Result<FetchPage, TransportError>;
}
