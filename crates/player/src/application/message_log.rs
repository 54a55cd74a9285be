//! Ordered, deduplicated message list of one session.
//!
//! Local optimistic messages and server-reported messages meet here. A server
//! message is matched to its local counterpart by echoed client id first, then
//! by a content/timestamp heuristic, and only appended when neither matches.
//! The list is kept sorted by `created_at` (stable, so ties keep arrival order).
//!
//! Only ordered feeds (fetched pages and the live channel) move the polling
//! cursor. A send ack or an inline reply can be newer than messages other
//! writers stored since the last fetch, so it never does.

use chrono::{DateTime, Duration, Utc};

use consultchat_domain::{
    ChatMessage, DeliveryStatus, DomainError, MessageId, MessageRole, PollingCursor,
};

/// What [`MessageLog::merge_server`] did with a server message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    /// Confirmed the local message with this provisional id
    Confirmed(MessageId),
    Duplicate,
}

#[derive(Debug, Clone)]
pub struct MessageLog {
    messages: Vec<ChatMessage>,
    cursor: PollingCursor,
    reconcile_window: Duration,
}

impl MessageLog {
    pub fn new(reconcile_window: Duration) -> Self {
        Self {
            messages: Vec::new(),
            cursor: PollingCursor::empty(),
            reconcile_window,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn cursor(&self) -> PollingCursor {
        self.cursor
    }

    /// Look a message up by server or provisional id.
    pub fn get(&self, id: MessageId) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.answers_to(id))
    }

    /// Append an optimistic local message.
    pub fn push_local(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.sort();
    }

    /// Change the delivery status of a local message.
    ///
    /// Returns `Ok(false)` when the message is unknown or already in `status`.
    pub fn set_status(&mut self, id: MessageId, status: DeliveryStatus) -> Result<bool, DomainError> {
        let Some(message) = self.messages.iter_mut().find(|m| m.answers_to(id)) else {
            return Ok(false);
        };
        if message.delivery_status == status {
            return Ok(false);
        }
        message.transition(status)?;
        Ok(true)
    }

    /// Confirm the local message `client_id` with the server's identity.
    ///
    /// Returns false when no unconfirmed local message has that id.
    pub fn confirm_local(
        &mut self,
        client_id: MessageId,
        server_id: MessageId,
        created_at: DateTime<Utc>,
    ) -> bool {
        let Some(index) = self
            .messages
            .iter()
            .position(|m| m.client_id == Some(client_id))
        else {
            return false;
        };

        let message = &mut self.messages[index];
        if message.is_confirmed() {
            return message.id == server_id;
        }
        if let Err(e) = message.confirm(server_id, created_at) {
            tracing::warn!(error = %e, "Could not confirm local message");
            return false;
        }
        self.sort();
        true
    }

    /// Merge a message from an ordered feed (poll page or live channel) and
    /// move the cursor past it.
    pub fn merge_server(&mut self, message: ChatMessage) -> MergeOutcome {
        self.cursor.advance(&message);
        self.reconcile(message)
    }

    /// Merge a reply carried by a send response; the cursor stays put.
    pub fn merge_reply(&mut self, message: ChatMessage) -> MergeOutcome {
        self.reconcile(message)
    }

    fn reconcile(&mut self, message: ChatMessage) -> MergeOutcome {
        if self.messages.iter().any(|m| m.id == message.id) {
            return MergeOutcome::Duplicate;
        }

        if let Some(client_id) = message.client_id {
            if let Some(local) = self.messages.iter().find(|m| m.client_id == Some(client_id)) {
                if local.is_confirmed() {
                    // Confirmed under a different server id; keep the first
                    return MergeOutcome::Duplicate;
                }
                self.confirm_local(client_id, message.id, message.created_at);
                return MergeOutcome::Confirmed(client_id);
            }
        } else if let Some(client_id) = self.heuristic_match(&message) {
            tracing::debug!(%client_id, server_id = %message.id, "Reconciled unechoed message by content");
            self.confirm_local(client_id, message.id, message.created_at);
            return MergeOutcome::Confirmed(client_id);
        }

        self.messages.push(message);
        self.sort();
        MergeOutcome::Inserted
    }

    /// Take the server's cursor when it is ahead of ours.
    pub fn adopt_cursor(&mut self, next: PollingCursor) {
        let ahead = match (next.last_seen_timestamp, self.cursor.last_seen_timestamp) {
            (Some(theirs), Some(ours)) => theirs >= ours,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if ahead {
            self.cursor = next;
        }
    }

    /// Unconfirmed local message that an unechoed server message most likely
    /// confirms: same author and content, created within the window.
    fn heuristic_match(&self, server: &ChatMessage) -> Option<MessageId> {
        if server.role != MessageRole::User {
            return None;
        }
        self.messages
            .iter()
            .filter(|m| !m.is_confirmed() && m.role == server.role && m.content == server.content)
            .filter(|m| (m.created_at - server.created_at).abs() <= self.reconcile_window)
            .min_by_key(|m| (m.created_at - server.created_at).abs())
            .and_then(|m| m.client_id)
    }

    fn sort(&mut self) {
        self.messages.sort_by_key(|m| m.created_at);
    }
}
