//! Adapters for the outbound ports.

pub mod http_client;
pub mod message_translator;
pub mod websocket;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use http_client::HttpChatApi;
pub use websocket::WsChannelConnector;
