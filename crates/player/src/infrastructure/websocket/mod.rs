//! WebSocket channel adapter
//!
//! - `client`: tokio-tungstenite connector implementing `ChannelConnectorPort`
//! - `shared`: URL building and frame parsing

mod client;
mod shared;

pub use client::WsChannelConnector;
pub use shared::{channel_url, parse_server_frame, DEFAULT_WS_BASE_URL};
