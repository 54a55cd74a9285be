//! Transport mode state machine.
//!
//! The controller owns the [`ConnectionState`] and every fallback/recovery
//! decision, but performs no I/O. The session task feeds it [`ModeEvent`]s and
//! executes the [`ModeEffect`]s it returns, in order.
//!
//! ```text
//!            failures >= max / first handshake timed out
//! Persistent ──────────────────────────────────────────────▶ Polling
//!     ▲                                                         │
//!     └──────── recovery probe succeeded / manual retry ◀───────┘
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};

use consultchat_domain::{CloseReason, ConnectionState, TransportMode};

use crate::application::backoff::{BackoffPolicy, BackoffState};
use crate::config::ChatConfig;
use crate::session_types::{FallbackReason, SessionError, SessionNotice};

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeEvent {
    /// The pending connect attempt produced a live channel
    PersistentConnected,
    PersistentConnectFailed { timed_out: bool },
    /// The live channel ended
    PersistentClosed(CloseReason),
    /// Data moved successfully (inbound frame, ack, poll, send)
    ExchangeSucceeded,
    PollDegraded,
    PollRecovered,
    RecoveryProbeDue,
    RecoveryProbeFailed,
    RecoveryProbeSucceeded,
    ModeRequested(TransportMode),
    AuthRejected(String),
    Shutdown,
}

/// Work the session task must carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeEffect {
    /// Replace any pending connect attempt with one after `delay`
    ConnectPersistent { delay: Duration },
    StartPolling,
    StopPolling,
    ScheduleRecoveryProbe { delay: Duration },
    RunRecoveryProbe,
    /// Install the probe's connection as the active channel and flush the
    /// outbound queue over it
    PromoteProbe,
    DiscardProbe,
    /// Drop the active channel and any pending connect attempt, silently
    ClosePersistent,
    Notify(SessionNotice),
    Terminate(SessionError),
}

#[derive(Debug, Clone)]
pub struct ModeController {
    preference: TransportMode,
    state: ConnectionState,
    max_reconnect_attempts: u32,
    recovery_probe_interval: Duration,
    max_recovery_probes: u32,
    reconnect_backoff: BackoffState,
    /// A handshake or data exchange has succeeded at least once
    had_success: bool,
    connected: bool,
    /// The live channel has carried data since it connected
    channel_active: bool,
    connecting: bool,
    probe_in_flight: bool,
    /// Latest explicitly requested target while a probe runs
    requested: Option<TransportMode>,
    recovery_probes_used: u32,
    auto_recovery: bool,
    fallback_notified: bool,
    terminated: bool,
}

impl ModeController {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            preference: config.mode,
            state: ConnectionState::new(config.mode),
            max_reconnect_attempts: config.max_reconnect_attempts.max(1),
            recovery_probe_interval: config.recovery_probe_interval(),
            max_recovery_probes: config.max_recovery_probes,
            reconnect_backoff: BackoffState::new(BackoffPolicy::unbounded()),
            had_success: false,
            connected: false,
            channel_active: false,
            connecting: false,
            probe_in_flight: false,
            requested: None,
            recovery_probes_used: 0,
            auto_recovery: false,
            fallback_notified: false,
            terminated: false,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn mode(&self) -> TransportMode {
        self.state.mode
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn auto_recovery_enabled(&self) -> bool {
        self.auto_recovery
    }

    /// Effects that bring the session up in its initial mode.
    pub fn start(&mut self) -> Vec<ModeEffect> {
        match self.state.mode {
            TransportMode::Polling => {
                tracing::info!(preference = %self.preference, "Starting in polling mode");
                vec![ModeEffect::StartPolling]
            }
            _ => {
                tracing::info!(preference = %self.preference, "Starting in persistent mode");
                self.connecting = true;
                vec![ModeEffect::ConnectPersistent {
                    delay: Duration::ZERO,
                }]
            }
        }
    }

    pub fn handle(&mut self, event: ModeEvent, now: DateTime<Utc>) -> Vec<ModeEffect> {
        if self.terminated {
            return Vec::new();
        }

        match event {
            ModeEvent::PersistentConnected => self.on_connected(),
            ModeEvent::PersistentConnectFailed { timed_out } => {
                self.on_connect_failed(timed_out, now)
            }
            ModeEvent::PersistentClosed(reason) => self.on_closed(reason, now),
            ModeEvent::ExchangeSucceeded => {
                self.on_exchange(now);
                Vec::new()
            }
            ModeEvent::PollDegraded => {
                if self.state.degraded {
                    return Vec::new();
                }
                self.state.degraded = true;
                tracing::warn!("Polling degraded");
                vec![ModeEffect::Notify(SessionNotice::PollingDegraded)]
            }
            ModeEvent::PollRecovered => {
                if !self.state.degraded {
                    return Vec::new();
                }
                self.state.degraded = false;
                tracing::info!("Polling recovered");
                vec![ModeEffect::Notify(SessionNotice::PollingRecovered)]
            }
            ModeEvent::RecoveryProbeDue => self.on_probe_due(),
            ModeEvent::RecoveryProbeFailed => self.on_probe_failed(),
            ModeEvent::RecoveryProbeSucceeded => self.on_probe_succeeded(now),
            ModeEvent::ModeRequested(mode) => self.on_mode_requested(mode),
            ModeEvent::AuthRejected(message) => {
                tracing::error!(error = %message, "Credential rejected, ending session");
                self.terminated = true;
                let mut effects = self.teardown();
                effects.push(ModeEffect::Notify(SessionNotice::AuthRejected {
                    message: message.clone(),
                }));
                effects.push(ModeEffect::Terminate(SessionError::Unauthorized(message)));
                effects
            }
            ModeEvent::Shutdown => {
                self.terminated = true;
                self.teardown()
            }
        }
    }

    fn on_connected(&mut self) -> Vec<ModeEffect> {
        if self.state.mode != TransportMode::Persistent || !self.connecting {
            // Stale attempt; the session must not keep the channel
            return vec![ModeEffect::ClosePersistent];
        }
        self.connecting = false;
        self.connected = true;
        self.channel_active = false;
        self.had_success = true;
        tracing::info!(attempts = self.state.reconnect_attempts, "Persistent channel connected");
        Vec::new()
    }

    fn on_connect_failed(&mut self, timed_out: bool, now: DateTime<Utc>) -> Vec<ModeEffect> {
        if self.state.mode != TransportMode::Persistent || !self.connecting {
            return Vec::new();
        }
        self.connecting = false;
        self.state.reconnect_attempts = self.state.reconnect_attempts.saturating_add(1);
        self.state.record_failure(now);
        tracing::warn!(
            failures = self.state.consecutive_failures,
            timed_out,
            "Persistent connect failed"
        );

        if timed_out && !self.had_success {
            return self.fall_back(FallbackReason::ConnectTimeout, now);
        }
        self.reconnect_or_fall_back(now)
    }

    fn on_closed(&mut self, reason: CloseReason, now: DateTime<Utc>) -> Vec<ModeEffect> {
        if self.state.mode != TransportMode::Persistent || !self.connected {
            return Vec::new();
        }
        self.connected = false;
        if !reason.is_failure() {
            // The far side ended the channel cleanly; reopen it without
            // counting a failure. A channel that closes before carrying any
            // data waits out the reconnect backoff so it cannot spin.
            let delay = if self.channel_active {
                Duration::ZERO
            } else {
                self.reconnect_backoff
                    .next_delay_and_advance()
                    .unwrap_or(BackoffPolicy::unbounded().max)
            };
            self.connecting = true;
            tracing::info!(?delay, "Persistent channel closed by the backend, reconnecting");
            return vec![ModeEffect::ConnectPersistent { delay }];
        }
        self.state.reconnect_attempts = self.state.reconnect_attempts.saturating_add(1);
        self.state.record_failure(now);
        tracing::warn!(
            %reason,
            failures = self.state.consecutive_failures,
            "Persistent channel dropped"
        );
        self.reconnect_or_fall_back(now)
    }

    fn reconnect_or_fall_back(&mut self, now: DateTime<Utc>) -> Vec<ModeEffect> {
        if self.state.consecutive_failures >= self.max_reconnect_attempts {
            let failures = self.state.consecutive_failures;
            return self.fall_back(FallbackReason::ReconnectThreshold { failures }, now);
        }
        let delay = self
            .reconnect_backoff
            .next_delay_and_advance()
            .unwrap_or(BackoffPolicy::unbounded().max);
        self.connecting = true;
        tracing::debug!(?delay, attempt = self.state.reconnect_attempts + 1, "Scheduling reconnect");
        vec![ModeEffect::ConnectPersistent { delay }]
    }

    fn fall_back(&mut self, reason: FallbackReason, now: DateTime<Utc>) -> Vec<ModeEffect> {
        tracing::info!(?reason, "Falling back to polling");
        self.state.mode = TransportMode::Polling;
        self.connected = false;
        self.connecting = false;
        self.recovery_probes_used = 0;
        self.auto_recovery = self.max_recovery_probes > 0;

        let mut effects = vec![ModeEffect::ClosePersistent, ModeEffect::StartPolling];
        if !self.fallback_notified {
            self.fallback_notified = true;
            effects.push(ModeEffect::Notify(SessionNotice::FellBack { reason, at: now }));
        }
        if self.auto_recovery {
            effects.push(ModeEffect::ScheduleRecoveryProbe {
                delay: self.recovery_probe_interval,
            });
        }
        effects
    }

    fn on_exchange(&mut self, now: DateTime<Utc>) {
        self.state.record_success(now);
        self.had_success = true;
        if self.state.mode == TransportMode::Persistent {
            self.channel_active = self.connected;
            self.state.reconnect_attempts = 0;
            self.reconnect_backoff.reset();
        }
    }

    fn on_probe_due(&mut self) -> Vec<ModeEffect> {
        if self.state.mode != TransportMode::Polling || !self.auto_recovery || self.probe_in_flight
        {
            return Vec::new();
        }
        if self.recovery_probes_used >= self.max_recovery_probes {
            tracing::info!(probes = self.recovery_probes_used, "Recovery probes exhausted");
            self.auto_recovery = false;
            return Vec::new();
        }
        self.recovery_probes_used += 1;
        self.probe_in_flight = true;
        tracing::debug!(probe = self.recovery_probes_used, "Running recovery probe");
        vec![ModeEffect::RunRecoveryProbe]
    }

    fn on_probe_failed(&mut self) -> Vec<ModeEffect> {
        if !self.probe_in_flight {
            return Vec::new();
        }
        self.probe_in_flight = false;
        self.requested = None;
        if self.state.mode != TransportMode::Polling || !self.auto_recovery {
            return Vec::new();
        }
        if self.recovery_probes_used >= self.max_recovery_probes {
            tracing::info!(probes = self.recovery_probes_used, "Recovery probes exhausted");
            self.auto_recovery = false;
            return Vec::new();
        }
        vec![ModeEffect::ScheduleRecoveryProbe {
            delay: self.recovery_probe_interval,
        }]
    }

    fn on_probe_succeeded(&mut self, now: DateTime<Utc>) -> Vec<ModeEffect> {
        if !self.probe_in_flight {
            return vec![ModeEffect::DiscardProbe];
        }
        self.probe_in_flight = false;
        let target = self.requested.take().unwrap_or(TransportMode::Persistent);
        if self.state.mode != TransportMode::Polling || target == TransportMode::Polling {
            return vec![ModeEffect::DiscardProbe];
        }

        tracing::info!("Recovery probe succeeded, promoting persistent channel");
        self.state.mode = TransportMode::Persistent;
        self.state.consecutive_failures = 0;
        self.state.reconnect_attempts = 0;
        self.state.degraded = false;
        self.state.last_success_at = Some(now);
        self.reconnect_backoff.reset();
        self.connected = true;
        self.channel_active = false;
        self.connecting = false;
        self.had_success = true;
        self.recovery_probes_used = 0;
        self.auto_recovery = false;
        self.fallback_notified = false;

        vec![
            ModeEffect::PromoteProbe,
            ModeEffect::StopPolling,
            ModeEffect::Notify(SessionNotice::PersistentRestored { at: now }),
        ]
    }

    fn on_mode_requested(&mut self, mode: TransportMode) -> Vec<ModeEffect> {
        match mode {
            TransportMode::Polling => {
                self.auto_recovery = false;
                if self.probe_in_flight {
                    self.requested = Some(TransportMode::Polling);
                }
                if self.state.mode == TransportMode::Polling {
                    return Vec::new();
                }
                tracing::info!("Polling requested");
                self.state.mode = TransportMode::Polling;
                self.connected = false;
                self.connecting = false;
                vec![ModeEffect::ClosePersistent, ModeEffect::StartPolling]
            }
            TransportMode::Persistent | TransportMode::Auto => {
                if self.state.mode == TransportMode::Persistent {
                    if self.connected {
                        return Vec::new();
                    }
                    // Skip whatever backoff is pending
                    self.connecting = true;
                    return vec![ModeEffect::ConnectPersistent {
                        delay: Duration::ZERO,
                    }];
                }
                self.requested = Some(TransportMode::Persistent);
                if self.probe_in_flight {
                    return Vec::new();
                }
                tracing::info!("Persistent mode requested, probing");
                self.probe_in_flight = true;
                vec![ModeEffect::RunRecoveryProbe]
            }
        }
    }

    fn teardown(&mut self) -> Vec<ModeEffect> {
        let mut effects = vec![ModeEffect::ClosePersistent, ModeEffect::StopPolling];
        if self.probe_in_flight {
            self.probe_in_flight = false;
            effects.push(ModeEffect::DiscardProbe);
        }
        self.connected = false;
        self.connecting = false;
        self.auto_recovery = false;
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(mode: TransportMode) -> ModeController {
        ModeController::new(&ChatConfig {
            mode,
            ..ChatConfig::default()
        })
    }

    fn fail_connect(c: &mut ModeController, timed_out: bool) -> Vec<ModeEffect> {
        c.handle(ModeEvent::PersistentConnectFailed { timed_out }, Utc::now())
    }

    fn notices(effects: &[ModeEffect]) -> Vec<&SessionNotice> {
        effects
            .iter()
            .filter_map(|e| match e {
                ModeEffect::Notify(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// Drives a controller into polling through three failed connects.
    fn fallen_back() -> ModeController {
        let mut c = controller(TransportMode::Auto);
        c.start();
        for _ in 0..3 {
            fail_connect(&mut c, false);
        }
        assert_eq!(c.mode(), TransportMode::Polling);
        c
    }

    #[test]
    fn initial_mode_follows_preference() {
        let mut auto = controller(TransportMode::Auto);
        assert_eq!(
            auto.start(),
            vec![ModeEffect::ConnectPersistent {
                delay: Duration::ZERO
            }]
        );

        let mut polling = controller(TransportMode::Polling);
        assert_eq!(polling.start(), vec![ModeEffect::StartPolling]);
        assert_eq!(polling.mode(), TransportMode::Polling);
        assert!(!polling.auto_recovery_enabled());
    }

    #[test]
    fn reconnects_with_backoff_until_the_threshold() {
        let mut c = controller(TransportMode::Auto);
        c.start();

        assert_eq!(
            fail_connect(&mut c, false),
            vec![ModeEffect::ConnectPersistent {
                delay: Duration::from_secs(1)
            }]
        );
        assert_eq!(
            fail_connect(&mut c, false),
            vec![ModeEffect::ConnectPersistent {
                delay: Duration::from_secs(2)
            }]
        );

        let effects = fail_connect(&mut c, false);
        assert_eq!(c.mode(), TransportMode::Polling);
        assert_eq!(effects[0], ModeEffect::ClosePersistent);
        assert_eq!(effects[1], ModeEffect::StartPolling);
        assert!(matches!(
            notices(&effects)[..],
            [SessionNotice::FellBack {
                reason: FallbackReason::ReconnectThreshold { failures: 3 },
                ..
            }]
        ));
        assert!(effects.contains(&ModeEffect::ScheduleRecoveryProbe {
            delay: Duration::from_secs(60)
        }));
        assert_eq!(c.state().reconnect_attempts, 3);
    }

    #[test]
    fn late_failures_after_fallback_do_not_duplicate_the_notice() {
        let mut c = fallen_back();
        assert!(fail_connect(&mut c, false).is_empty());
        assert!(c
            .handle(ModeEvent::PersistentClosed(CloseReason::Error), Utc::now())
            .is_empty());
    }

    #[test]
    fn first_handshake_timeout_falls_back_immediately() {
        let mut c = controller(TransportMode::Persistent);
        c.start();

        let effects = fail_connect(&mut c, true);
        assert_eq!(c.mode(), TransportMode::Polling);
        assert!(matches!(
            notices(&effects)[..],
            [SessionNotice::FellBack {
                reason: FallbackReason::ConnectTimeout,
                ..
            }]
        ));
    }

    #[test]
    fn timeout_after_an_earlier_success_only_counts_as_a_failure() {
        let mut c = controller(TransportMode::Auto);
        c.start();
        c.handle(ModeEvent::PersistentConnected, Utc::now());
        c.handle(ModeEvent::PersistentClosed(CloseReason::Error), Utc::now());

        let effects = fail_connect(&mut c, true);
        assert_eq!(c.mode(), TransportMode::Persistent);
        assert!(matches!(effects[..], [ModeEffect::ConnectPersistent { .. }]));
    }

    #[test]
    fn flapping_channel_reaches_the_threshold_but_traffic_resets_it() {
        let mut c = controller(TransportMode::Auto);
        c.start();

        for _ in 0..2 {
            c.handle(ModeEvent::PersistentConnected, Utc::now());
            c.handle(ModeEvent::PersistentClosed(CloseReason::ServerClosed), Utc::now());
        }
        assert_eq!(c.state().consecutive_failures, 2);

        c.handle(ModeEvent::PersistentConnected, Utc::now());
        c.handle(ModeEvent::ExchangeSucceeded, Utc::now());
        assert_eq!(c.state().consecutive_failures, 0);
        assert_eq!(c.state().reconnect_attempts, 0);

        c.handle(ModeEvent::PersistentClosed(CloseReason::Timeout), Utc::now());
        assert_eq!(c.mode(), TransportMode::Persistent);
        assert_eq!(c.state().consecutive_failures, 1);
    }

    #[test]
    fn normal_close_reconnects_without_counting_a_failure() {
        let mut c = controller(TransportMode::Auto);
        c.start();
        c.handle(ModeEvent::PersistentConnected, Utc::now());
        c.handle(ModeEvent::ExchangeSucceeded, Utc::now());

        assert_eq!(
            c.handle(ModeEvent::PersistentClosed(CloseReason::Normal), Utc::now()),
            vec![ModeEffect::ConnectPersistent {
                delay: Duration::ZERO
            }]
        );
        assert_eq!(c.state().consecutive_failures, 0);
        assert_eq!(c.mode(), TransportMode::Persistent);

        // A channel that closes again before any traffic backs off
        c.handle(ModeEvent::PersistentConnected, Utc::now());
        assert_eq!(
            c.handle(ModeEvent::PersistentClosed(CloseReason::Normal), Utc::now()),
            vec![ModeEffect::ConnectPersistent {
                delay: Duration::from_secs(1)
            }]
        );
        assert_eq!(c.state().consecutive_failures, 0);
    }

    #[test]
    fn failed_recovery_probes_are_silent_and_keep_polling() {
        let mut c = fallen_back();

        for _ in 0..2 {
            assert_eq!(
                c.handle(ModeEvent::RecoveryProbeDue, Utc::now()),
                vec![ModeEffect::RunRecoveryProbe]
            );
            let effects = c.handle(ModeEvent::RecoveryProbeFailed, Utc::now());
            assert_eq!(
                effects,
                vec![ModeEffect::ScheduleRecoveryProbe {
                    delay: Duration::from_secs(60)
                }]
            );
            assert_eq!(c.mode(), TransportMode::Polling);
        }
    }

    #[test]
    fn third_probe_success_promotes_and_flushes_before_reporting() {
        let mut c = fallen_back();
        for _ in 0..2 {
            c.handle(ModeEvent::RecoveryProbeDue, Utc::now());
            c.handle(ModeEvent::RecoveryProbeFailed, Utc::now());
        }
        c.handle(ModeEvent::RecoveryProbeDue, Utc::now());

        let effects = c.handle(ModeEvent::RecoveryProbeSucceeded, Utc::now());
        assert_eq!(c.mode(), TransportMode::Persistent);
        assert_eq!(effects[0], ModeEffect::PromoteProbe);
        assert_eq!(effects[1], ModeEffect::StopPolling);
        assert!(matches!(
            effects[2],
            ModeEffect::Notify(SessionNotice::PersistentRestored { .. })
        ));
        assert_eq!(c.state().consecutive_failures, 0);
        assert!(c.is_connected());
    }

    #[test]
    fn recovery_stops_after_the_probe_budget() {
        let mut c = ModeController::new(&ChatConfig {
            max_recovery_probes: 2,
            ..ChatConfig::default()
        });
        c.start();
        for _ in 0..3 {
            fail_connect(&mut c, false);
        }

        c.handle(ModeEvent::RecoveryProbeDue, Utc::now());
        c.handle(ModeEvent::RecoveryProbeFailed, Utc::now());
        c.handle(ModeEvent::RecoveryProbeDue, Utc::now());
        assert!(c
            .handle(ModeEvent::RecoveryProbeFailed, Utc::now())
            .is_empty());
        assert!(!c.auto_recovery_enabled());
        assert!(c
            .handle(ModeEvent::RecoveryProbeDue, Utc::now())
            .is_empty());

        // Manual retry is still available
        assert_eq!(
            c.handle(ModeEvent::ModeRequested(TransportMode::Persistent), Utc::now()),
            vec![ModeEffect::RunRecoveryProbe]
        );
    }

    #[test]
    fn repeated_manual_requests_coalesce_and_latest_target_wins() {
        let mut c = fallen_back();

        assert_eq!(
            c.handle(ModeEvent::ModeRequested(TransportMode::Persistent), Utc::now()),
            vec![ModeEffect::RunRecoveryProbe]
        );
        assert!(c
            .handle(ModeEvent::ModeRequested(TransportMode::Auto), Utc::now())
            .is_empty());
        assert!(c
            .handle(ModeEvent::ModeRequested(TransportMode::Polling), Utc::now())
            .is_empty());

        assert_eq!(
            c.handle(ModeEvent::RecoveryProbeSucceeded, Utc::now()),
            vec![ModeEffect::DiscardProbe]
        );
        assert_eq!(c.mode(), TransportMode::Polling);
    }

    #[test]
    fn forcing_polling_closes_the_channel_without_a_fallback_notice() {
        let mut c = controller(TransportMode::Auto);
        c.start();
        c.handle(ModeEvent::PersistentConnected, Utc::now());

        let effects = c.handle(ModeEvent::ModeRequested(TransportMode::Polling), Utc::now());
        assert_eq!(
            effects,
            vec![ModeEffect::ClosePersistent, ModeEffect::StartPolling]
        );
        assert_eq!(c.mode(), TransportMode::Polling);
    }

    #[test]
    fn degraded_polling_is_reported_once_per_episode() {
        let mut c = fallen_back();
        assert_eq!(
            c.handle(ModeEvent::PollDegraded, Utc::now()),
            vec![ModeEffect::Notify(SessionNotice::PollingDegraded)]
        );
        assert!(c.handle(ModeEvent::PollDegraded, Utc::now()).is_empty());
        assert!(c.state().degraded);
        assert_eq!(
            c.handle(ModeEvent::PollRecovered, Utc::now()),
            vec![ModeEffect::Notify(SessionNotice::PollingRecovered)]
        );
    }

    #[test]
    fn auth_rejection_terminates_and_silences_the_controller() {
        let mut c = controller(TransportMode::Auto);
        c.start();

        let effects = c.handle(ModeEvent::AuthRejected("expired".into()), Utc::now());
        assert_eq!(
            effects.last(),
            Some(&ModeEffect::Terminate(SessionError::Unauthorized(
                "expired".into()
            )))
        );
        assert!(c.is_terminated());
        assert!(fail_connect(&mut c, false).is_empty());
    }

    #[test]
    fn stale_connection_is_closed() {
        let mut c = fallen_back();
        assert_eq!(
            c.handle(ModeEvent::PersistentConnected, Utc::now()),
            vec![ModeEffect::ClosePersistent]
        );
    }
}
