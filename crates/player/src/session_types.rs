//! Types the session reports to its consumer (the UI layer).

use chrono::{DateTime, Utc};
use thiserror::Error;

use consultchat_domain::{DomainError, MessageId};

use crate::config::ConfigError;

/// Why the session left persistent mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// `max_reconnect_attempts` consecutive failures
    ReconnectThreshold { failures: u32 },
    /// First handshake of the session timed out
    ConnectTimeout,
}

/// Informational events for connection indicators and toasts.
///
/// None of these end the session except `AuthRejected`, which is followed by
/// the session terminating with [`SessionError::Unauthorized`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    FellBack {
        reason: FallbackReason,
        at: DateTime<Utc>,
    },
    PersistentRestored {
        at: DateTime<Utc>,
    },
    PollingDegraded,
    PollingRecovered,
    MessageFailed {
        id: MessageId,
    },
    AuthRejected {
        message: String,
    },
}

/// Errors surfaced to the session-lifecycle handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Credential rejected; the session is over
    #[error("Credential rejected: {0}")]
    Unauthorized(String),

    #[error("Session is closed")]
    Closed,

    #[error(transparent)]
    InvalidMessage(#[from] DomainError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
