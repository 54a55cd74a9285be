//! Chat messages and their delivery lifecycle.
//!
//! A message written by the local user starts life in `Sending` with a
//! provisional (client-generated) id. Once the backend confirms persistence the
//! provisional id is kept in `client_id` and `id` becomes the server id.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DomainError, MessageId, SessionId};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        };
        f.write_str(s)
    }
}

impl FromStr for MessageRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(DomainError::parse(format!("Unknown message role: {}", other))),
        }
    }
}

/// Delivery progress of a message as seen by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Created locally, not yet acknowledged by any transport
    Sending,
    /// Accepted by the transport, persistence not yet confirmed
    Sent,
    /// Persisted by the server (always the case for server-originated messages)
    Delivered,
    /// Retry budget exhausted; only a manual retry moves it again
    Failed,
}

impl DeliveryStatus {
    /// Whether `self -> next` is a legal lifecycle step.
    ///
    /// Re-entering the same state is allowed for `Sending` (another attempt) and
    /// `Delivered` (duplicate confirmation). `Sent -> Sending` is a retry after
    /// the delivery ack never arrived; `Failed -> Delivered` covers a send that
    /// timed out locally but was persisted by the server anyway.
    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        matches!(
            (self, next),
            (Sending, Sending)
                | (Sending, Sent)
                | (Sending, Delivered)
                | (Sending, Failed)
                | (Sent, Sending)
                | (Sent, Delivered)
                | (Sent, Failed)
                | (Failed, Sending)
                | (Failed, Delivered)
                | (Delivered, Delivered)
        )
    }

    pub fn is_pending(self) -> bool {
        matches!(self, DeliveryStatus::Sending | DeliveryStatus::Sent)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeliveryStatus::Sending => "sending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    /// Provisional id generated by the client, kept after confirmation
    pub client_id: Option<MessageId>,
    pub session_id: SessionId,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub delivery_status: DeliveryStatus,
}

impl ChatMessage {
    /// Create an optimistic outgoing user message in `Sending` state.
    pub fn outgoing(
        session_id: SessionId,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(DomainError::validation("Message content cannot be empty"));
        }
        let id = MessageId::new();
        Ok(Self {
            id,
            client_id: Some(id),
            session_id,
            role: MessageRole::User,
            content,
            created_at: now,
            delivery_status: DeliveryStatus::Sending,
        })
    }

    /// A message as reported by the server; always `Delivered`.
    pub fn from_server(
        id: MessageId,
        client_id: Option<MessageId>,
        session_id: SessionId,
        role: MessageRole,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            client_id,
            session_id,
            role,
            content: content.into(),
            created_at,
            delivery_status: DeliveryStatus::Delivered,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.delivery_status == DeliveryStatus::Delivered
    }

    /// Move to `next`, rejecting steps the lifecycle does not allow.
    pub fn transition(&mut self, next: DeliveryStatus) -> Result<(), DomainError> {
        if !self.delivery_status.can_transition_to(next) {
            return Err(DomainError::invalid_state_transition(format!(
                "message {}: {} -> {}",
                self.id, self.delivery_status, next
            )));
        }
        self.delivery_status = next;
        Ok(())
    }

    /// Adopt the server identity and timestamp and mark the message delivered.
    ///
    /// The server's timestamp replaces the optimistic one so server ordering
    /// wins when both are known.
    pub fn confirm(
        &mut self,
        server_id: MessageId,
        server_created_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.transition(DeliveryStatus::Delivered)?;
        if self.client_id.is_none() {
            self.client_id = Some(self.id);
        }
        self.id = server_id;
        self.created_at = server_created_at;
        Ok(())
    }

    /// Whether `id` names this message, either by server or provisional id.
    pub fn answers_to(&self, id: MessageId) -> bool {
        self.id == id || self.client_id == Some(id)
    }
}
