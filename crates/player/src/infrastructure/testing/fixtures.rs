//! Fakes for the two outbound ports, sharing one in-memory message log.
//!
//! [`FakeChatApi`] behaves like the HTTP API and [`ScriptedConnector`] like
//! the WebSocket endpoint of the same backend, so a message sent over one
//! transport is visible through the other.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;

use consultchat_domain::{ChatMessage, CloseReason, MessageId, MessageRole, PollingCursor, SessionId};

use crate::ports::outbound::{
    ChannelConnectorPort, ChannelEvent, ChatApiPort, FetchPage, InboundFrame, OutboundFrame,
    RawChannel, SendAck, TransportError,
};

const FAKE_CHANNEL_BUFFER: usize = 64;

#[derive(Default)]
struct ServerLog {
    messages: Vec<ChatMessage>,
    auto_reply: Option<String>,
    inline_replies: bool,
    send_failures: VecDeque<TransportError>,
    fetch_failures: VecDeque<TransportError>,
    failing_sends: Option<TransportError>,
    failing_fetches: Option<TransportError>,
    send_attempts: Vec<(MessageId, String)>,
    fetch_cursors: Vec<PollingCursor>,
    last_created_at: Option<DateTime<Utc>>,
}

impl ServerLog {
    /// Strictly increasing server timestamps, even within one clock tick.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let at = match self.last_created_at {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_created_at = Some(at);
        at
    }

    /// Persist a user message; the same client id is stored only once.
    fn persist_user(
        &mut self,
        session_id: SessionId,
        client_message_id: MessageId,
        content: String,
    ) -> (ChatMessage, bool) {
        if let Some(existing) = self
            .messages
            .iter()
            .find(|m| m.session_id == session_id && m.client_id == Some(client_message_id))
        {
            return (existing.clone(), false);
        }
        let created_at = self.next_timestamp();
        let message = ChatMessage::from_server(
            MessageId::new(),
            Some(client_message_id),
            session_id,
            MessageRole::User,
            content,
            created_at,
        );
        self.messages.push(message.clone());
        (message, true)
    }

    fn persist_assistant(&mut self, session_id: SessionId, content: String) -> ChatMessage {
        let created_at = self.next_timestamp();
        let message = ChatMessage::from_server(
            MessageId::new(),
            None,
            session_id,
            MessageRole::Assistant,
            content,
            created_at,
        );
        self.messages.push(message.clone());
        message
    }

    fn reply_to(&mut self, session_id: SessionId) -> Option<ChatMessage> {
        let reply = self.auto_reply.clone()?;
        Some(self.persist_assistant(session_id, reply))
    }

    fn page_after(&self, session_id: SessionId, cursor: PollingCursor) -> FetchPage {
        let session: Vec<&ChatMessage> = self
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .collect();

        let start = match cursor.last_seen_message_id {
            Some(id) => session.iter().position(|m| m.id == id).map(|i| i + 1),
            None => None,
        };
        let messages: Vec<ChatMessage> = match (start, cursor.last_seen_timestamp) {
            (Some(start), _) => session[start..].iter().map(|m| (*m).clone()).collect(),
            (None, Some(ts)) => session
                .iter()
                .filter(|m| m.created_at > ts)
                .map(|m| (*m).clone())
                .collect(),
            (None, None) => session.iter().map(|m| (*m).clone()).collect(),
        };

        let next_cursor = messages.last().map(PollingCursor::after).unwrap_or(cursor);
        FetchPage {
            messages,
            next_cursor,
        }
    }
}

/// In-memory chat API.
#[derive(Clone, Default)]
pub struct FakeChatApi {
    log: Arc<Mutex<ServerLog>>,
}

impl FakeChatApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every newly stored user message with `reply`.
    pub fn with_auto_reply(self, reply: impl Into<String>) -> Self {
        self.lock().auto_reply = Some(reply.into());
        self
    }

    /// Return the auto reply inline in the send response as well.
    pub fn set_inline_replies(&self, inline: bool) {
        self.lock().inline_replies = inline;
    }

    pub fn fail_next_sends(&self, count: usize, error: TransportError) {
        self.lock()
            .send_failures
            .extend(std::iter::repeat(error).take(count));
    }

    pub fn fail_next_fetches(&self, count: usize, error: TransportError) {
        self.lock()
            .fetch_failures
            .extend(std::iter::repeat(error).take(count));
    }

    /// Fail every send until cleared with `None`.
    pub fn set_sends_failing(&self, error: Option<TransportError>) {
        self.lock().failing_sends = error;
    }

    /// Fail every fetch until cleared with `None`.
    pub fn set_fetches_failing(&self, error: Option<TransportError>) {
        self.lock().failing_fetches = error;
    }

    /// Store an assistant message as if another process wrote it.
    pub fn push_assistant_message(
        &self,
        session_id: SessionId,
        content: impl Into<String>,
    ) -> ChatMessage {
        self.lock().persist_assistant(session_id, content.into())
    }

    pub fn messages(&self, session_id: SessionId) -> Vec<ChatMessage> {
        self.lock()
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect()
    }

    /// Every HTTP send attempt, including failed and duplicate ones.
    pub fn send_attempts(&self) -> Vec<(MessageId, String)> {
        self.lock().send_attempts.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.lock().fetch_cursors.len()
    }

    /// Cursor of every fetch, in call order.
    pub fn fetch_cursors(&self) -> Vec<PollingCursor> {
        self.lock().fetch_cursors.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ServerLog> {
        // A panicking test thread poisons the lock; the data is still usable
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ChatApiPort for FakeChatApi {
    async fn send_message(
        &self,
        session_id: SessionId,
        content: String,
        client_message_id: MessageId,
    ) -> Result<SendAck, TransportError> {
        let mut log = self.lock();
        log.send_attempts.push((client_message_id, content.clone()));
        if let Some(error) = log.send_failures.pop_front() {
            return Err(error);
        }
        if let Some(error) = log.failing_sends.clone() {
            return Err(error);
        }

        let (stored, is_new) = log.persist_user(session_id, client_message_id, content);
        let reply = if is_new { log.reply_to(session_id) } else { None };
        Ok(SendAck {
            server_message_id: stored.id,
            echoed_client_message_id: Some(client_message_id),
            created_at: stored.created_at,
            inline_reply: reply.filter(|_| log.inline_replies),
        })
    }

    async fn fetch_messages_since(
        &self,
        session_id: SessionId,
        cursor: PollingCursor,
    ) -> Result<FetchPage, TransportError> {
        let mut log = self.lock();
        log.fetch_cursors.push(cursor);
        if let Some(error) = log.fetch_failures.pop_front() {
            return Err(error);
        }
        if let Some(error) = log.failing_fetches.clone() {
            return Err(error);
        }
        Ok(log.page_after(session_id, cursor))
    }
}

/// What the next [`ScriptedConnector::open`] call does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectBehavior {
    Accept,
    Refuse(TransportError),
    /// Never completes; the caller's handshake timeout fires
    Hang,
}

struct LiveChannel {
    session_id: SessionId,
    inbound: mpsc::Sender<ChannelEvent>,
    kill: mpsc::UnboundedSender<CloseReason>,
}

struct ConnectorState {
    script: VecDeque<ConnectBehavior>,
    otherwise: ConnectBehavior,
    opens: usize,
    acks: bool,
    pongs: bool,
    /// Assistant message stored and pushed the moment a channel opens
    greeting: Option<String>,
    received: Vec<OutboundFrame>,
    live: Vec<LiveChannel>,
}

/// Channel connector whose handshakes follow a script.
///
/// Accepted channels answer `Ping` with `Pong` and `SendMessage` with an
/// `Ack` followed by the auto reply, if one is configured.
#[derive(Clone)]
pub struct ScriptedConnector {
    backend: FakeChatApi,
    state: Arc<Mutex<ConnectorState>>,
}

impl ScriptedConnector {
    pub fn new(backend: &FakeChatApi) -> Self {
        Self {
            backend: backend.clone(),
            state: Arc::new(Mutex::new(ConnectorState {
                script: VecDeque::new(),
                otherwise: ConnectBehavior::Accept,
                opens: 0,
                acks: true,
                pongs: true,
                greeting: None,
                received: Vec::new(),
                live: Vec::new(),
            })),
        }
    }

    /// Behaviors for the next handshakes, in order.
    pub fn script(&self, behaviors: impl IntoIterator<Item = ConnectBehavior>) {
        self.lock().script.extend(behaviors);
    }

    /// Behavior once the script is used up.
    pub fn set_default(&self, behavior: ConnectBehavior) {
        self.lock().otherwise = behavior;
    }

    pub fn set_acks(&self, enabled: bool) {
        self.lock().acks = enabled;
    }

    pub fn set_pongs(&self, enabled: bool) {
        self.lock().pongs = enabled;
    }

    /// Push a freshly stored assistant message on every accepted channel
    /// before the client can write to it.
    pub fn greet_on_open(&self, greeting: impl Into<String>) {
        self.lock().greeting = Some(greeting.into());
    }

    /// Frames the far side read, across all channels, in arrival order.
    pub fn received_frames(&self) -> Vec<OutboundFrame> {
        self.lock().received.clone()
    }

    pub fn open_count(&self) -> usize {
        self.lock().opens
    }

    pub fn live_channels(&self) -> usize {
        self.lock()
            .live
            .iter()
            .filter(|c| !c.inbound.is_closed())
            .count()
    }

    /// Close every open channel from the server side.
    pub fn drop_channels(&self, reason: CloseReason) {
        for channel in self.lock().live.drain(..) {
            let _ = channel.kill.send(reason);
        }
    }

    /// Store an assistant message and push it to open channels of its session.
    pub fn push_assistant_message(
        &self,
        session_id: SessionId,
        content: impl Into<String>,
    ) -> ChatMessage {
        let message = self.backend.push_assistant_message(session_id, content);
        for channel in self.lock().live.iter().filter(|c| c.session_id == session_id) {
            let _ = channel
                .inbound
                .try_send(ChannelEvent::Frame(InboundFrame::Message(message.clone())));
        }
        message
    }

    fn lock(&self) -> MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn accept(&self, session_id: SessionId) -> RawChannel {
        let (outbound_tx, outbound_rx) = mpsc::channel(FAKE_CHANNEL_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel(FAKE_CHANNEL_BUFFER);
        let (kill_tx, kill_rx) = mpsc::unbounded_channel();

        let greeting = self.lock().greeting.clone();
        if let Some(greeting) = greeting {
            let message = self.backend.push_assistant_message(session_id, greeting);
            let _ = inbound_tx.try_send(ChannelEvent::Frame(InboundFrame::Message(message)));
        }

        self.lock().live.push(LiveChannel {
            session_id,
            inbound: inbound_tx.clone(),
            kill: kill_tx,
        });
        tokio::spawn(far_side(
            self.clone(),
            session_id,
            outbound_rx,
            inbound_tx,
            kill_rx,
        ));

        RawChannel {
            outbound: outbound_tx,
            inbound: inbound_rx,
        }
    }
}

async fn far_side(
    connector: ScriptedConnector,
    session_id: SessionId,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    inbound: mpsc::Sender<ChannelEvent>,
    mut kill: mpsc::UnboundedReceiver<CloseReason>,
) {
    loop {
        tokio::select! {
            Some(reason) = kill.recv() => {
                let _ = inbound.send(ChannelEvent::Closed(reason)).await;
                return;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else { return };
                let (acks, pongs) = {
                    let mut state = connector.lock();
                    state.received.push(frame.clone());
                    (state.acks, state.pongs)
                };
                let replies = match frame {
                    OutboundFrame::Ping if pongs => vec![InboundFrame::Pong],
                    OutboundFrame::Ping => Vec::new(),
                    OutboundFrame::SendMessage { .. } if !acks => Vec::new(),
                    OutboundFrame::SendMessage { client_message_id, content } => {
                        let mut log = connector.backend.lock();
                        let (stored, is_new) = log.persist_user(session_id, client_message_id, content);
                        let mut replies = vec![InboundFrame::Ack {
                            client_message_id,
                            server_message_id: stored.id,
                            created_at: stored.created_at,
                        }];
                        if is_new {
                            replies.extend(log.reply_to(session_id).map(InboundFrame::Message));
                        }
                        replies
                    }
                };
                for reply in replies {
                    if inbound.send(ChannelEvent::Frame(reply)).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ChannelConnectorPort for ScriptedConnector {
    async fn open(&self, session_id: SessionId) -> Result<RawChannel, TransportError> {
        let behavior = {
            let mut state = self.lock();
            state.opens += 1;
            let otherwise = state.otherwise.clone();
            state.script.pop_front().unwrap_or(otherwise)
        };
        match behavior {
            ConnectBehavior::Accept => Ok(self.accept(session_id)),
            ConnectBehavior::Refuse(error) => Err(error),
            ConnectBehavior::Hang => std::future::pending().await,
        }
    }
}
