//! Chat session client - the transport-agnostic API the UI talks to.
//!
//! [`ChatSessionClient::start`] spawns the session task and returns a cheap,
//! cloneable handle. Commands are fire-and-forget; their effects are observed
//! through the message, connection-state and notice streams.

mod observers;
mod outbound;
mod task;


use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::BoxStream;
use tokio::sync::{mpsc, watch};

use consultchat_domain::{ChatMessage, ConnectionState, MessageId, SessionId, TransportMode};

use crate::application::transport::polling::PollingTransport;
use crate::application::transport::probe::TransportProbe;
use crate::config::{ChatConfig, ConfigError};
use crate::ports::outbound::{ChannelConnectorPort, ChatApiPort};
use crate::session_types::{SessionError, SessionNotice};

pub use observers::{watch_stream, NoticeBus};
pub use outbound::{FailureOutcome, OutboundDue, OutboundQueue, Route};

use task::{Publishers, SessionTask};

const NOTICE_CAPACITY: usize = 64;

#[derive(Debug)]
pub(crate) enum SessionCommand {
    Send(ChatMessage),
    Retry(MessageId),
    RequestMode(TransportMode),
    SetTyping(bool),
    SetVisible(bool),
    Close,
}

/// Handle to one running chat session.
#[derive(Clone)]
pub struct ChatSessionClient {
    session_id: SessionId,
    commands: mpsc::UnboundedSender<SessionCommand>,
    messages: watch::Receiver<Vec<ChatMessage>>,
    state: watch::Receiver<ConnectionState>,
    notices: NoticeBus,
    outcome: watch::Receiver<Option<Result<(), SessionError>>>,
}

impl ChatSessionClient {
    /// Validate `config` and spawn the session task on the current runtime.
    pub fn start(
        session_id: SessionId,
        config: ChatConfig,
        api: Arc<dyn ChatApiPort>,
        connector: Arc<dyn ChannelConnectorPort>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (messages_tx, messages) = watch::channel(Vec::new());
        let (state_tx, state) = watch::channel(ConnectionState::new(config.mode));
        let (outcome_tx, outcome) = watch::channel(None);
        let notices = NoticeBus::new(NOTICE_CAPACITY);

        let probe = TransportProbe::new(
            connector,
            config.connect_timeout(),
            config.heartbeat_interval(),
        );
        let polling = PollingTransport::new(api, session_id, config.send_timeout());
        let task = SessionTask::new(
            session_id,
            config,
            probe,
            polling,
            command_rx,
            Publishers {
                messages: messages_tx,
                state: state_tx,
                notices: notices.clone(),
            },
        );

        tokio::spawn(async move {
            let outcome = task.run().await;
            let _ = outcome_tx.send(Some(outcome));
        });

        Ok(Self {
            session_id,
            commands,
            messages,
            state,
            notices,
            outcome,
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Append an optimistic message and hand it to the active transport.
    ///
    /// Returns the provisional id, which stays valid for [`Self::retry_message`]
    /// after the server assigns its own.
    pub fn send_message(&self, content: impl Into<String>) -> Result<MessageId, SessionError> {
        let message = ChatMessage::outgoing(self.session_id, content, Utc::now())?;
        let id = message.id;
        self.command(SessionCommand::Send(message))?;
        Ok(id)
    }

    /// Retry a `Failed` message from the start of the retry schedule.
    pub fn retry_message(&self, id: MessageId) -> Result<(), SessionError> {
        self.command(SessionCommand::Retry(id))
    }

    /// Ask for persistent mode now, without waiting for the next recovery probe.
    pub fn retry_persistent(&self) -> Result<(), SessionError> {
        self.request_mode(TransportMode::Persistent)
    }

    pub fn request_mode(&self, mode: TransportMode) -> Result<(), SessionError> {
        self.command(SessionCommand::RequestMode(mode))
    }

    pub fn set_typing(&self, typing: bool) -> Result<(), SessionError> {
        self.command(SessionCommand::SetTyping(typing))
    }

    /// Polling pauses while hidden and polls once immediately when shown again.
    pub fn set_visible(&self, visible: bool) -> Result<(), SessionError> {
        self.command(SessionCommand::SetVisible(visible))
    }

    /// Ordered snapshots of the message list, starting with the current one.
    pub fn observe_messages(&self) -> BoxStream<'static, Vec<ChatMessage>> {
        watch_stream(self.messages.clone())
    }

    pub fn observe_connection_state(&self) -> BoxStream<'static, ConnectionState> {
        watch_stream(self.state.clone())
    }

    /// Notices published after this call.
    pub fn observe_notices(&self) -> BoxStream<'static, SessionNotice> {
        self.notices.subscribe()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.borrow().clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Tear the session down. In-flight results arriving later are discarded.
    pub fn close(&self) {
        let _ = self.commands.send(SessionCommand::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.outcome.borrow().is_some() || self.commands.is_closed()
    }

    /// Resolves when the session task has ended, with the fatal error that
    /// ended it, if any.
    pub async fn closed(&self) -> Result<(), SessionError> {
        let mut outcome = self.outcome.clone();
        let result = match outcome.wait_for(Option::is_some).await {
            Ok(done) => Option::clone(&done).unwrap_or(Ok(())),
            Err(_) => Err(SessionError::Closed),
        };
        result
    }

    fn command(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::Closed)
    }
}
