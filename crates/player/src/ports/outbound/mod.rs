//! Outbound ports - what the session needs from the chat backend.
//!
//! - `ChatApiPort`: discrete request/response calls (HTTP-equivalent)
//! - `ChannelConnectorPort`: one long-lived bidirectional channel (WebSocket-equivalent)

mod channel_port;
mod chat_api_port;

pub use channel_port::{
    ChannelConnectorPort, ChannelEvent, InboundFrame, OutboundFrame, RawChannel,
};
pub use chat_api_port::{ChatApiPort, FetchPage, SendAck, TransportError};

#[cfg(any(test, feature = "testing"))]
pub use channel_port::MockChannelConnectorPort;
#[cfg(any(test, feature = "testing"))]
pub use chat_api_port::MockChatApiPort;
