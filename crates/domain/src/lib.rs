//! Consultchat Domain - the vocabulary of the consultant chat transport.
//!
//! Pure data and invariants: no runtime, no I/O.

extern crate self as consultchat_domain;

pub mod chat_message;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod ids;

pub use chat_message::{ChatMessage, DeliveryStatus, MessageRole};
pub use connection::{CloseReason, ConnectionState, TransportMode};
pub use cursor::PollingCursor;
pub use error::DomainError;
pub use ids::{MessageId, SessionId};
