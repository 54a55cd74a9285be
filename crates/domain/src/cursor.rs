//! Polling cursor: where the last fetch left off.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ChatMessage, MessageId};

/// Marker used to request only messages newer than what was already seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PollingCursor {
    pub last_seen_message_id: Option<MessageId>,
    pub last_seen_timestamp: Option<DateTime<Utc>>,
}

impl PollingCursor {
    /// A cursor that fetches the full history.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen_message_id.is_none() && self.last_seen_timestamp.is_none()
    }

    /// Cursor positioned right after `message`.
    pub fn after(message: &ChatMessage) -> Self {
        Self {
            last_seen_message_id: Some(message.id),
            last_seen_timestamp: Some(message.created_at),
        }
    }

    /// Move forward past `message`; never moves backwards in time.
    pub fn advance(&mut self, message: &ChatMessage) {
        let newer = match self.last_seen_timestamp {
            Some(ts) => message.created_at >= ts,
            None => true,
        };
        if newer {
            *self = Self::after(message);
        }
    }
}
