//! Request/response transport with an adaptive cadence.
//!
//! - [`PollingTransport`]: one fetch or one send per call, with per-call timeouts.
//!   Cheap to clone so calls can run outside the session loop.
//! - [`PollSchedule`]: picks the interval from user activity and visibility.
//! - [`PollingHealth`]: local failure counter, degraded flag and retry backoff.
//!   Polling never gives up while the session is open.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout, Instant};

use consultchat_domain::{ChatMessage, PollingCursor, SessionId};

use crate::application::backoff::{BackoffPolicy, BackoffState};
use crate::config::ChatConfig;
use crate::ports::outbound::{ChatApiPort, FetchPage, SendAck, TransportError};

/// Floor for a single poll's deadline.
pub const MIN_POLL_TIMEOUT: Duration = Duration::from_secs(2);

pub type PollResponse = FetchPage;

#[derive(Clone)]
pub struct PollingTransport {
    api: Arc<dyn ChatApiPort>,
    session_id: SessionId,
    send_timeout: Duration,
}

impl PollingTransport {
    pub fn new(api: Arc<dyn ChatApiPort>, session_id: SessionId, send_timeout: Duration) -> Self {
        Self {
            api,
            session_id,
            send_timeout,
        }
    }

    /// Deadline for one poll made while the cadence is `interval`.
    pub fn poll_timeout(interval: Duration) -> Duration {
        (interval / 2).max(MIN_POLL_TIMEOUT)
    }

    /// Fetch messages newer than `cursor`. An empty page is success.
    pub async fn poll(
        &self,
        cursor: PollingCursor,
        interval: Duration,
    ) -> Result<PollResponse, TransportError> {
        let deadline = Self::poll_timeout(interval);
        match timeout(deadline, self.api.fetch_messages_since(self.session_id, cursor)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(session_id = %self.session_id, ?deadline, "Poll timed out");
                Err(TransportError::Timeout)
            }
        }
    }

    /// Send one message. The ack may carry an inline assistant reply, which the
    /// caller must merge exactly like a polled message.
    pub async fn send(&self, message: &ChatMessage) -> Result<SendAck, TransportError> {
        let client_id = message.client_id.unwrap_or(message.id);
        let call = self
            .api
            .send_message(self.session_id, message.content.clone(), client_id);
        match timeout(self.send_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(session_id = %self.session_id, message_id = %client_id, "Send timed out");
                Err(TransportError::Timeout)
            }
        }
    }
}

/// Adaptive polling cadence.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    base: Duration,
    active: Duration,
    idle: Duration,
    active_window: Duration,
    idle_threshold: Duration,
    typing: bool,
    visible: bool,
    last_interaction: Instant,
    last_sent: Option<Instant>,
}

impl PollSchedule {
    pub fn from_config(config: &ChatConfig, now: Instant) -> Self {
        Self {
            base: config.base_poll_interval(),
            active: config.active_poll_interval(),
            idle: config.idle_poll_interval(),
            active_window: config.active_window(),
            idle_threshold: config.idle_threshold(),
            typing: false,
            visible: true,
            last_interaction: now,
            last_sent: None,
        }
    }

    /// Current interval, or `None` while the UI is hidden (polling paused).
    pub fn interval(&self, now: Instant) -> Option<Duration> {
        if !self.visible {
            return None;
        }
        let recently_sent = self
            .last_sent
            .is_some_and(|at| now.saturating_duration_since(at) < self.active_window);
        if self.typing || recently_sent {
            return Some(self.active);
        }
        if now.saturating_duration_since(self.last_interaction) >= self.idle_threshold {
            return Some(self.idle);
        }
        Some(self.base)
    }

    pub fn set_typing(&mut self, typing: bool, now: Instant) {
        self.typing = typing;
        self.last_interaction = now;
    }

    pub fn record_sent(&mut self, now: Instant) {
        self.last_sent = Some(now);
        self.last_interaction = now;
    }

    /// Returns true when the UI just became visible again.
    pub fn set_visible(&mut self, visible: bool, now: Instant) -> bool {
        let restored = visible && !self.visible;
        self.visible = visible;
        if visible {
            self.last_interaction = now;
        }
        restored
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

/// Health transition reported to the mode controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthChange {
    Degraded,
    Recovered,
}

/// Consecutive poll/send failures and the retry backoff they drive.
#[derive(Debug, Clone)]
pub struct PollingHealth {
    failures: u32,
    max_failures: u32,
    degraded: bool,
    backoff: BackoffState,
    retry_delay: Option<Duration>,
}

impl PollingHealth {
    pub fn new(max_failures: u32) -> Self {
        Self {
            failures: 0,
            max_failures: max_failures.max(1),
            degraded: false,
            backoff: BackoffState::new(BackoffPolicy::unbounded()),
            retry_delay: None,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn record_success(&mut self) -> Option<HealthChange> {
        self.failures = 0;
        self.backoff.reset();
        self.retry_delay = None;
        if self.degraded {
            self.degraded = false;
            return Some(HealthChange::Recovered);
        }
        None
    }

    pub fn record_failure(&mut self) -> Option<HealthChange> {
        self.failures = self.failures.saturating_add(1);
        self.retry_delay = self.backoff.next_delay_and_advance();
        if !self.degraded && self.failures >= self.max_failures {
            self.degraded = true;
            return Some(HealthChange::Degraded);
        }
        None
    }

    /// Delay before the next poll: the schedule's interval, stretched by the
    /// retry backoff while failures persist. `None` while polling is paused.
    pub fn next_delay(&self, schedule: &PollSchedule, now: Instant) -> Option<Duration> {
        let interval = schedule.interval(now)?;
        Some(match self.retry_delay {
            Some(backoff) => backoff.max(interval),
            None => interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::ports::outbound::MockChatApiPort;
    use consultchat_domain::MessageId;

    fn schedule(now: Instant) -> PollSchedule {
        PollSchedule::from_config(&ChatConfig::default(), now)
    }

    #[test]
    fn poll_timeout_is_half_the_interval_with_a_floor() {
        assert_eq!(
            PollingTransport::poll_timeout(Duration::from_secs(10)),
            Duration::from_secs(5)
        );
        assert_eq!(
            PollingTransport::poll_timeout(Duration::from_secs(2)),
            MIN_POLL_TIMEOUT
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_user_widens_interval_and_typing_narrows_it() {
        let start = Instant::now();
        let mut schedule = schedule(start);
        assert_eq!(schedule.interval(start), Some(Duration::from_millis(3_000)));

        let later = start + Duration::from_secs(61);
        assert_eq!(schedule.interval(later), Some(Duration::from_millis(10_000)));

        schedule.set_typing(true, later);
        assert_eq!(schedule.interval(later), Some(Duration::from_millis(2_000)));

        schedule.set_typing(false, later);
        assert_eq!(schedule.interval(later), Some(Duration::from_millis(3_000)));
    }

    #[tokio::test(start_paused = true)]
    async fn recent_send_keeps_the_active_cadence() {
        let start = Instant::now();
        let mut schedule = schedule(start);
        schedule.record_sent(start);

        assert_eq!(
            schedule.interval(start + Duration::from_secs(10)),
            Some(Duration::from_millis(2_000))
        );
        assert_eq!(
            schedule.interval(start + Duration::from_secs(16)),
            Some(Duration::from_millis(3_000))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_ui_pauses_and_restoring_is_reported_once() {
        let now = Instant::now();
        let mut schedule = schedule(now);

        assert!(!schedule.set_visible(false, now));
        assert_eq!(schedule.interval(now), None);
        assert!(schedule.set_visible(true, now));
        assert!(!schedule.set_visible(true, now));
        assert!(schedule.interval(now).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_degrade_once_and_backoff_stretches_the_interval() {
        let now = Instant::now();
        let schedule = schedule(now);
        let mut health = PollingHealth::new(3);

        assert_eq!(health.record_failure(), None);
        assert_eq!(health.record_failure(), None);
        assert_eq!(health.record_failure(), Some(HealthChange::Degraded));
        assert_eq!(health.record_failure(), None);
        assert!(health.is_degraded());

        // 4th failure -> backoff delay of 8s beats the 3s cadence
        assert_eq!(health.next_delay(&schedule, now), Some(Duration::from_secs(8)));

        assert_eq!(health.record_success(), Some(HealthChange::Recovered));
        assert_eq!(health.failures(), 0);
        assert_eq!(health.next_delay(&schedule, now), Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn send_uses_the_provisional_id() {
        let session_id = SessionId::new();
        let message = ChatMessage::outgoing(session_id, "Hello", Utc::now()).expect("valid");
        let provisional = message.id;

        let mut api = MockChatApiPort::new();
        api.expect_send_message()
            .withf(move |sid, content, cid| *sid == session_id && content == "Hello" && *cid == provisional)
            .times(1)
            .returning(move |_, _, cid| {
                Ok(SendAck {
                    server_message_id: MessageId::new(),
                    echoed_client_message_id: Some(cid),
                    created_at: Utc::now(),
                    inline_reply: None,
                })
            });

        let transport = PollingTransport::new(Arc::new(api), session_id, Duration::from_secs(10));
        let ack = transport.send(&message).await.expect("sent");
        assert_eq!(ack.echoed_client_message_id, Some(provisional));
    }

    #[tokio::test]
    async fn empty_poll_is_success() {
        let mut api = MockChatApiPort::new();
        api.expect_fetch_messages_since().returning(|_, cursor| {
            Ok(FetchPage {
                messages: Vec::new(),
                next_cursor: cursor,
            })
        });

        let transport =
            PollingTransport::new(Arc::new(api), SessionId::new(), Duration::from_secs(10));
        let page = transport
            .poll(PollingCursor::empty(), Duration::from_secs(3))
            .await
            .expect("empty page");
        assert!(page.messages.is_empty());
    }
}
