//! Transport mode and connection state vocabulary.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DomainError;

/// Which transport carries the chat.
///
/// `Auto` is only ever a configured preference; a running session is always
/// concretely in `Persistent` or `Polling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Persistent,
    Polling,
    #[default]
    Auto,
}

impl TransportMode {
    /// The concrete mode a session starts in for this preference.
    pub fn initial(self) -> TransportMode {
        match self {
            TransportMode::Polling => TransportMode::Polling,
            TransportMode::Persistent | TransportMode::Auto => TransportMode::Persistent,
        }
    }

    pub fn is_concrete(self) -> bool {
        !matches!(self, TransportMode::Auto)
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportMode::Persistent => "persistent",
            TransportMode::Polling => "polling",
            TransportMode::Auto => "auto",
        };
        f.write_str(s)
    }
}

impl FromStr for TransportMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "persistent" | "websocket" | "ws" => Ok(Self::Persistent),
            "polling" | "poll" | "http" => Ok(Self::Polling),
            "auto" => Ok(Self::Auto),
            other => Err(DomainError::parse(format!("Unknown transport mode: {}", other))),
        }
    }
}

/// Why a persistent connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Closed locally on purpose
    Normal,
    /// Liveness or handshake deadline missed
    Timeout,
    /// Socket-level error or unexpected end of stream
    Error,
    /// The server sent a close frame
    ServerClosed,
}

impl CloseReason {
    /// Everything except a deliberate local close counts against the channel.
    pub fn is_failure(self) -> bool {
        !matches!(self, CloseReason::Normal)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::Normal => "normal",
            CloseReason::Timeout => "timeout",
            CloseReason::Error => "error",
            CloseReason::ServerClosed => "server_closed",
        };
        f.write_str(s)
    }
}

/// Observable transport state of one chat session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    /// Always concrete (`Persistent` or `Polling`)
    pub mode: TransportMode,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub reconnect_attempts: u32,
    /// Polling has crossed its failure threshold and is retrying with backoff
    pub degraded: bool,
}

impl ConnectionState {
    pub fn new(preference: TransportMode) -> Self {
        Self {
            mode: preference.initial(),
            consecutive_failures: 0,
            last_failure_at: None,
            last_success_at: None,
            reconnect_attempts: 0,
            degraded: false,
        }
    }

    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.consecutive_failures = 0;
        self.last_success_at = Some(at);
    }

    pub fn record_failure(&mut self, at: DateTime<Utc>) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure_at = Some(at);
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(TransportMode::Auto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_preference_starts_persistent() {
        assert_eq!(TransportMode::Auto.initial(), TransportMode::Persistent);
        assert_eq!(TransportMode::Persistent.initial(), TransportMode::Persistent);
        assert_eq!(TransportMode::Polling.initial(), TransportMode::Polling);
        assert!(ConnectionState::new(TransportMode::Auto).mode.is_concrete());
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let mut state = ConnectionState::default();
        let now = Utc::now();
        state.record_failure(now);
        state.record_failure(now);
        assert_eq!(state.consecutive_failures, 2);

        state.record_success(now);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.last_success_at, Some(now));
        assert_eq!(state.last_failure_at, Some(now));
    }

    #[test]
    fn only_normal_close_is_not_a_failure() {
        assert!(!CloseReason::Normal.is_failure());
        assert!(CloseReason::Timeout.is_failure());
        assert!(CloseReason::Error.is_failure());
        assert!(CloseReason::ServerClosed.is_failure());
    }

    #[test]
    fn mode_parses_aliases() {
        assert_eq!("WebSocket".parse::<TransportMode>(), Ok(TransportMode::Persistent));
        assert_eq!("poll".parse::<TransportMode>(), Ok(TransportMode::Polling));
        assert!("carrier-pigeon".parse::<TransportMode>().is_err());
    }
}
