//! Channel Connector Port - persistent bidirectional channel to the chat backend

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use consultchat_domain::{ChatMessage, CloseReason, MessageId, SessionId};

use super::TransportError;

/// A frame received on the persistent channel, already translated from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// A `SendMessage` was persisted under `server_message_id`
    Ack {
        client_message_id: MessageId,
        server_message_id: MessageId,
        created_at: DateTime<Utc>,
    },
    Message(ChatMessage),
    Pong,
    Error { code: String, message: String },
}

/// A frame to write on the persistent channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    SendMessage {
        client_message_id: MessageId,
        content: String,
    },
    Ping,
}

/// Something that happened on an open channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Frame(InboundFrame),
    /// Last event of a channel
    Closed(CloseReason),
}

/// An open channel as handed out by a connector.
///
/// Dropping `outbound` asks the adapter to close the channel.
#[derive(Debug)]
pub struct RawChannel {
    pub outbound: mpsc::Sender<OutboundFrame>,
    pub inbound: mpsc::Receiver<ChannelEvent>,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ChannelConnectorPort: Send + Sync {
    /// Perform the handshake for `session_id`. Timeouts are applied by the caller.
    async fn open(&self, session_id: SessionId) -> Result<RawChannel, TransportError>;
}
