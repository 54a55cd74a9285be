//! Session configuration.
//!
//! Loaded once when a session starts. Every numeric default is a starting point
//! and can be overridden from the environment (`CHAT_*` variables).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use consultchat_domain::TransportMode;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub mode: TransportMode,
    pub base_poll_interval_ms: u64,
    pub idle_poll_interval_ms: u64,
    pub active_poll_interval_ms: u64,
    pub max_reconnect_attempts: u32,
    pub recovery_probe_interval_ms: u64,
    pub max_recovery_probes: u32,
    pub connect_timeout_ms: u64,
    pub send_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub max_consecutive_poll_failures: u32,
    /// How long after a sent message polling stays in the active cadence
    pub active_window_ms: u64,
    /// Quiet time after which polling drops to the idle cadence
    pub idle_threshold_ms: u64,
    /// Tolerance for matching an unechoed server message to a local one
    pub reconcile_window_ms: u64,
    /// Delay before each send retry, in order
    pub send_retry_delays_ms: Vec<u64>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::Auto,
            base_poll_interval_ms: 3_000,
            idle_poll_interval_ms: 10_000,
            active_poll_interval_ms: 2_000,
            max_reconnect_attempts: 3,
            recovery_probe_interval_ms: 60_000,
            max_recovery_probes: 5,
            connect_timeout_ms: 10_000,
            send_timeout_ms: 10_000,
            heartbeat_interval_ms: 15_000,
            max_consecutive_poll_failures: 3,
            active_window_ms: 15_000,
            idle_threshold_ms: 60_000,
            reconcile_window_ms: 5_000,
            send_retry_delays_ms: vec![1_000, 2_000, 4_000, 8_000],
        }
    }
}

impl ChatConfig {
    /// Defaults overridden by any `CHAT_*` variables present in the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ChatConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(mode) = lookup("CHAT_MODE") {
            config.mode = mode.parse().map_err(|e| ConfigError::InvalidValue {
                key: "CHAT_MODE",
                message: format!("{e}"),
            })?;
        }

        read_u64(&lookup, "CHAT_BASE_POLL_INTERVAL_MS", &mut config.base_poll_interval_ms)?;
        read_u64(&lookup, "CHAT_IDLE_POLL_INTERVAL_MS", &mut config.idle_poll_interval_ms)?;
        read_u64(&lookup, "CHAT_ACTIVE_POLL_INTERVAL_MS", &mut config.active_poll_interval_ms)?;
        read_u32(&lookup, "CHAT_MAX_RECONNECT_ATTEMPTS", &mut config.max_reconnect_attempts)?;
        read_u64(
            &lookup,
            "CHAT_RECOVERY_PROBE_INTERVAL_MS",
            &mut config.recovery_probe_interval_ms,
        )?;
        read_u32(&lookup, "CHAT_MAX_RECOVERY_PROBES", &mut config.max_recovery_probes)?;
        read_u64(&lookup, "CHAT_CONNECT_TIMEOUT_MS", &mut config.connect_timeout_ms)?;
        read_u64(&lookup, "CHAT_SEND_TIMEOUT_MS", &mut config.send_timeout_ms)?;
        read_u64(&lookup, "CHAT_HEARTBEAT_INTERVAL_MS", &mut config.heartbeat_interval_ms)?;
        read_u32(
            &lookup,
            "CHAT_MAX_CONSECUTIVE_POLL_FAILURES",
            &mut config.max_consecutive_poll_failures,
        )?;
        read_u64(&lookup, "CHAT_ACTIVE_WINDOW_MS", &mut config.active_window_ms)?;
        read_u64(&lookup, "CHAT_IDLE_THRESHOLD_MS", &mut config.idle_threshold_ms)?;
        read_u64(&lookup, "CHAT_RECONCILE_WINDOW_MS", &mut config.reconcile_window_ms)?;

        if let Some(raw) = lookup("CHAT_SEND_RETRY_DELAYS_MS") {
            config.send_retry_delays_ms = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                        key: "CHAT_SEND_RETRY_DELAYS_MS",
                        message: format!("{s}: {e}"),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("base_poll_interval_ms", self.base_poll_interval_ms),
            ("idle_poll_interval_ms", self.idle_poll_interval_ms),
            ("active_poll_interval_ms", self.active_poll_interval_ms),
            ("recovery_probe_interval_ms", self.recovery_probe_interval_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("send_timeout_ms", self.send_timeout_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
        ];
        for (key, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    message: "must be greater than zero".to_string(),
                });
            }
        }

        if self.max_reconnect_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_reconnect_attempts",
                message: "must be greater than zero".to_string(),
            });
        }

        if self.active_poll_interval_ms > self.base_poll_interval_ms {
            return Err(ConfigError::Inconsistent(format!(
                "active poll interval ({}ms) is longer than the base interval ({}ms)",
                self.active_poll_interval_ms, self.base_poll_interval_ms
            )));
        }

        if self.base_poll_interval_ms > self.idle_poll_interval_ms {
            return Err(ConfigError::Inconsistent(format!(
                "base poll interval ({}ms) is longer than the idle interval ({}ms)",
                self.base_poll_interval_ms, self.idle_poll_interval_ms
            )));
        }

        if self.send_retry_delays_ms.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "send_retry_delays_ms",
                message: "at least one retry delay is required".to_string(),
            });
        }

        Ok(())
    }

    pub fn base_poll_interval(&self) -> Duration {
        Duration::from_millis(self.base_poll_interval_ms)
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }

    pub fn active_poll_interval(&self) -> Duration {
        Duration::from_millis(self.active_poll_interval_ms)
    }

    pub fn recovery_probe_interval(&self) -> Duration {
        Duration::from_millis(self.recovery_probe_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn active_window(&self) -> Duration {
        Duration::from_millis(self.active_window_ms)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }

    pub fn reconcile_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.reconcile_window_ms as i64)
    }

    pub fn send_retry_delays(&self) -> Vec<Duration> {
        self.send_retry_delays_ms
            .iter()
            .copied()
            .map(Duration::from_millis)
            .collect()
    }
}

fn read_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    target: &mut u64,
) -> Result<(), ConfigError> {
    if let Some(raw) = lookup(key) {
        *target = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
            key,
            message: format!("{raw}: {e}"),
        })?;
    }
    Ok(())
}

fn read_u32(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    target: &mut u32,
) -> Result<(), ConfigError> {
    if let Some(raw) = lookup(key) {
        *target = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
            key,
            message: format!("{raw}: {e}"),
        })?;
    }
    Ok(())
}
