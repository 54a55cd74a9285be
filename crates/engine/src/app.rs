//! Application state and composition.

use std::sync::Arc;

use crate::infrastructure::{
    clock::SystemClock,
    ports::{ClockPort, ReplyPort},
    replier::CannedReplier,
};
use crate::stores::ChatStore;
use crate::use_cases::SubmitMessage;

/// Main application state.
///
/// Passed to HTTP/WebSocket handlers via Axum state.
pub struct App {
    pub store: Arc<ChatStore>,
    pub submit: SubmitMessage,
    /// Bearer token required on chat routes; `None` disables authentication
    pub api_token: Option<String>,
}

impl App {
    pub fn new(
        clock: Arc<dyn ClockPort>,
        replier: Arc<dyn ReplyPort>,
        api_token: Option<String>,
    ) -> Self {
        let store = Arc::new(ChatStore::new(clock));
        Self {
            submit: SubmitMessage::new(store.clone(), replier),
            store,
            api_token: api_token.filter(|t| !t.is_empty()),
        }
    }

    /// System clock and canned replies.
    pub fn in_memory(api_token: Option<String>) -> Self {
        Self::new(
            Arc::new(SystemClock::new()),
            Arc::new(CannedReplier::new()),
            api_token,
        )
    }
}
