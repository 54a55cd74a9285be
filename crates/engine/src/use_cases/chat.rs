//! Submit message use case.
//!
//! Stores a user message and produces the assistant's reply. Accepting and
//! replying are separate steps so the WebSocket handler can acknowledge the
//! message before the reply is generated.

use std::sync::Arc;

use uuid::Uuid;

use consultchat_domain::{ChatMessage, MessageId, SessionId};

use crate::infrastructure::ports::ReplyPort;
use crate::stores::{ChatStore, Stored};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("Message content cannot be empty")]
    EmptyMessage,
}

pub struct SubmitMessage {
    store: Arc<ChatStore>,
    replier: Arc<dyn ReplyPort>,
}

impl SubmitMessage {
    pub fn new(store: Arc<ChatStore>, replier: Arc<dyn ReplyPort>) -> Self {
        Self { store, replier }
    }

    /// Persist the user message. Resends of a known client id are no-ops.
    pub fn accept(
        &self,
        session_id: SessionId,
        client_message_id: MessageId,
        content: &str,
        origin: Option<Uuid>,
    ) -> Result<Stored, ChatError> {
        if content.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let stored = self
            .store
            .append_user(session_id, client_message_id, content, origin);
        if stored.is_new {
            tracing::debug!(
                %session_id,
                client_message_id = %client_message_id,
                server_message_id = %stored.message.id,
                "Stored user message"
            );
        } else {
            tracing::debug!(
                %session_id,
                client_message_id = %client_message_id,
                "Duplicate submission, returning stored message"
            );
        }
        Ok(stored)
    }

    /// Generate and store the assistant's answer to `stored`.
    ///
    /// Returns `None` for resends and when the reply service fails; the
    /// user message stays stored either way.
    pub async fn reply(&self, stored: &Stored) -> Option<ChatMessage> {
        if !stored.is_new {
            return None;
        }
        let session_id = stored.message.session_id;
        match self.replier.reply(&stored.message.content).await {
            Ok(text) => Some(self.store.append_assistant(session_id, &text)),
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "Failed to generate reply");
                None
            }
        }
    }

    /// Accept and reply in one step (request/response transport).
    pub async fn execute(
        &self,
        session_id: SessionId,
        client_message_id: MessageId,
        content: &str,
    ) -> Result<(Stored, Option<ChatMessage>), ChatError> {
        let stored = self.accept(session_id, client_message_id, content, None)?;
        let reply = self.reply(&stored).await;
        Ok((stored, reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consultchat_domain::{MessageRole, PollingCursor};

    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::ports::{MockReplyPort, ReplyError};

    fn use_case(replier: MockReplyPort) -> (SubmitMessage, Arc<ChatStore>) {
        let store = Arc::new(ChatStore::new(Arc::new(SystemClock::new())));
        (SubmitMessage::new(store.clone(), Arc::new(replier)), store)
    }

    #[tokio::test]
    async fn stores_message_and_reply() {
        let mut replier = MockReplyPort::new();
        replier
            .expect_reply()
            .withf(|prompt| prompt == "Hello")
            .times(1)
            .returning(|_| Ok("Hi, how can I help?".to_string()));
        let (submit, store) = use_case(replier);
        let session = SessionId::new();
        let client_id = MessageId::new();

        let (stored, reply) = submit
            .execute(session, client_id, "Hello")
            .await
            .expect("accepted");

        assert_eq!(stored.message.client_id, Some(client_id));
        let reply = reply.expect("reply");
        assert_eq!(reply.role, MessageRole::Assistant);
        assert_eq!(reply.content, "Hi, how can I help?");
        assert_eq!(store.messages_after(session, &PollingCursor::empty()).len(), 2);
    }

    #[tokio::test]
    async fn resend_produces_no_second_reply() {
        let mut replier = MockReplyPort::new();
        replier
            .expect_reply()
            .times(1)
            .returning(|_| Ok("Hi, how can I help?".to_string()));
        let (submit, store) = use_case(replier);
        let session = SessionId::new();
        let client_id = MessageId::new();

        submit.execute(session, client_id, "Hello").await.expect("first");
        let (stored, reply) = submit.execute(session, client_id, "Hello").await.expect("resend");

        assert!(!stored.is_new);
        assert!(reply.is_none());
        assert_eq!(store.messages_after(session, &PollingCursor::empty()).len(), 2);
    }

    #[tokio::test]
    async fn reply_failure_keeps_the_user_message() {
        let mut replier = MockReplyPort::new();
        replier
            .expect_reply()
            .returning(|_| Err(ReplyError::Unavailable));
        let (submit, store) = use_case(replier);
        let session = SessionId::new();

        let (_, reply) = submit
            .execute(session, MessageId::new(), "Hello")
            .await
            .expect("accepted");

        assert!(reply.is_none());
        assert_eq!(store.messages_after(session, &PollingCursor::empty()).len(), 1);
    }

    #[test]
    fn blank_messages_are_rejected() {
        let (submit, _) = use_case(MockReplyPort::new());
        let err = submit
            .accept(SessionId::new(), MessageId::new(), "  \n", None)
            .unwrap_err();
        assert_eq!(err, ChatError::EmptyMessage);
    }
}
