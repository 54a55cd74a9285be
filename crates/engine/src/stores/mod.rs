//! In-memory state storage modules.
//!
//! - `ChatStore` - per-session message logs and live subscriptions

pub mod chat_store;

pub use chat_store::{ChatStore, LiveMessage, Stored};
