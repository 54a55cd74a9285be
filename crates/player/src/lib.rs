//! Consultchat client.
//!
//! A chat session that carries messages over a persistent WebSocket channel
//! and falls back to HTTP polling when the channel is unavailable, then
//! returns to the channel once it recovers. The UI layer only talks to
//! [`ChatSessionClient`] and never sees which transport is active.

pub mod application;
pub mod config;
pub mod infrastructure;
pub mod ports;
pub mod session_types;

pub use application::ChatSessionClient;
pub use config::{ChatConfig, ConfigError};
pub use session_types::{FallbackReason, SessionError, SessionNotice};
