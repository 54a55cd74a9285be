//! Consultchat Protocol - Shared types for the chat client and backend
//!
//! This crate contains all types exchanged between the chat client and the chat
//! backend:
//! - REST request/response bodies (send, fetch-since-cursor)
//! - WebSocket frames (`ClientFrame`, `ServerFrame`)
//! - Message and cursor DTOs
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde, uuid, chrono and serde_json
//! 2. **No business logic** - Pure data types and serialization
//! 3. **No domain IDs** - use raw `uuid::Uuid` in DTOs

pub mod dto;
pub mod messages;
pub mod requests;

pub use dto::{CursorDto, MessageDto, MessageRoleData};
pub use messages::{ClientFrame, ServerFrame};
pub use requests::{
    ErrorResponse, FetchMessagesQuery, FetchMessagesResponse, SendMessageRequest,
    SendMessageResponse,
};
