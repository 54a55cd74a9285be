//! In-memory backend fakes for session tests.

mod fixtures;

pub use fixtures::{ConnectBehavior, FakeChatApi, ScriptedConnector};
