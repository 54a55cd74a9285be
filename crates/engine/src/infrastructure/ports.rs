//! Port traits for the backend's external collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("Reply generation failed: {0}")]
    Failed(String),
    #[error("Reply service unavailable")]
    Unavailable,
}

/// Produces the assistant's answer to a user message.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReplyPort: Send + Sync {
    async fn reply(&self, prompt: &str) -> Result<String, ReplyError>;
}

// =============================================================================
// Testability Ports
// =============================================================================

#[cfg_attr(test, mockall::automock)]
pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
