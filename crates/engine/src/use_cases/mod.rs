//! Use cases - orchestration shared by the HTTP and WebSocket entry points.

pub mod chat;

pub use chat::{ChatError, SubmitMessage};
