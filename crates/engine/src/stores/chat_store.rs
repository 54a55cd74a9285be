//! Per-session message logs with live fan-out.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use consultchat_domain::{ChatMessage, MessageId, MessageRole, PollingCursor, SessionId};

use crate::infrastructure::ports::ClockPort;

/// Capacity of each session's live channel; slow subscribers lag past this.
const LIVE_BUFFER: usize = 256;

/// A stored message as pushed to live subscribers.
#[derive(Debug, Clone)]
pub struct LiveMessage {
    /// Connection that submitted the message, if it came over a channel
    pub origin: Option<Uuid>,
    pub message: ChatMessage,
}

/// Result of appending a user message.
#[derive(Debug, Clone)]
pub struct Stored {
    pub message: ChatMessage,
    /// `false` when the client id was already stored (a resend)
    pub is_new: bool,
}

struct SessionLog {
    messages: Vec<ChatMessage>,
    last_created_at: Option<DateTime<Utc>>,
    live: broadcast::Sender<LiveMessage>,
}

impl SessionLog {
    fn new() -> Self {
        let (live, _) = broadcast::channel(LIVE_BUFFER);
        Self {
            messages: Vec::new(),
            last_created_at: None,
            live,
        }
    }

    /// Timestamps are strictly increasing within a session so that timestamp
    /// cursors never skip or repeat a message.
    fn next_timestamp(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let ts = match self.last_created_at {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_created_at = Some(ts);
        ts
    }

    fn push(&mut self, message: ChatMessage, origin: Option<Uuid>) {
        self.messages.push(message.clone());
        // No subscribers is fine; polling clients read the log
        let _ = self.live.send(LiveMessage { origin, message });
    }
}

/// In-memory chat history, one ordered log per session.
pub struct ChatStore {
    sessions: DashMap<SessionId, SessionLog>,
    clock: Arc<dyn ClockPort>,
}

impl ChatStore {
    pub fn new(clock: Arc<dyn ClockPort>) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
        }
    }

    /// Append a user message, idempotent on `client_message_id`.
    ///
    /// A resend of an already stored id returns the stored message untouched
    /// and is not pushed to subscribers again.
    pub fn append_user(
        &self,
        session_id: SessionId,
        client_message_id: MessageId,
        content: &str,
        origin: Option<Uuid>,
    ) -> Stored {
        let now = self.clock.now();
        let mut log = self.sessions.entry(session_id).or_insert_with(SessionLog::new);

        if let Some(existing) = log
            .messages
            .iter()
            .find(|m| m.client_id == Some(client_message_id))
        {
            return Stored {
                message: existing.clone(),
                is_new: false,
            };
        }

        let created_at = log.next_timestamp(now);
        let message = ChatMessage::from_server(
            MessageId::new(),
            Some(client_message_id),
            session_id,
            MessageRole::User,
            content,
            created_at,
        );
        log.push(message.clone(), origin);
        Stored {
            message,
            is_new: true,
        }
    }

    pub fn append_assistant(&self, session_id: SessionId, content: &str) -> ChatMessage {
        let now = self.clock.now();
        let mut log = self.sessions.entry(session_id).or_insert_with(SessionLog::new);

        let created_at = log.next_timestamp(now);
        let message = ChatMessage::from_server(
            MessageId::new(),
            None,
            session_id,
            MessageRole::Assistant,
            content,
            created_at,
        );
        log.push(message.clone(), None);
        message
    }

    /// Messages strictly after `cursor`, oldest first.
    ///
    /// The message id wins when it is known; otherwise the timestamp is used.
    /// An empty cursor returns the whole history.
    pub fn messages_after(&self, session_id: SessionId, cursor: &PollingCursor) -> Vec<ChatMessage> {
        let Some(log) = self.sessions.get(&session_id) else {
            return Vec::new();
        };

        let position = cursor
            .last_seen_message_id
            .and_then(|id| log.messages.iter().position(|m| m.id == id));

        match (position, cursor.last_seen_timestamp) {
            (Some(index), _) => log.messages[index + 1..].to_vec(),
            (None, Some(after)) => log
                .messages
                .iter()
                .filter(|m| m.created_at > after)
                .cloned()
                .collect(),
            (None, None) => log.messages.clone(),
        }
    }

    /// Live feed of every message stored in `session_id` from now on.
    pub fn subscribe(&self, session_id: SessionId) -> broadcast::Receiver<LiveMessage> {
        self.sessions
            .entry(session_id)
            .or_insert_with(SessionLog::new)
            .live
            .subscribe()
    }
}
