//! The session event loop.
//!
//! One task per chat session owns the mode controller, the message log, the
//! outbound queue and the live persistent connection. Everything that can
//! happen to a session (a UI command, a finished network call, an inbound
//! frame, a timer) is a [`Step`] processed to completion before the next one,
//! so no state is shared and nothing is locked.

use std::future::Future;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use consultchat_domain::{
    ChatMessage, ConnectionState, DeliveryStatus, MessageId, SessionId, TransportMode,
};

use super::observers::NoticeBus;
use super::outbound::{FailureOutcome, OutboundDue, OutboundQueue, Route};
use super::SessionCommand;
use crate::application::message_log::{MergeOutcome, MessageLog};
use crate::application::mode_controller::{ModeController, ModeEffect, ModeEvent};
use crate::application::transport::polling::{
    HealthChange, PollResponse, PollSchedule, PollingHealth, PollingTransport,
};
use crate::application::transport::probe::{
    ConnectFailed, Connected, PersistentConnection, ProbeEvent, TransportProbe,
};
use crate::config::ChatConfig;
use crate::ports::outbound::{InboundFrame, OutboundFrame, SendAck, TransportError};
use crate::session_types::{SessionError, SessionNotice};

/// Result of an operation that ran outside the loop.
enum Completion {
    Connected {
        generation: u64,
        result: Result<Connected, ConnectFailed>,
    },
    Probed {
        generation: u64,
        result: Result<Connected, ConnectFailed>,
    },
    Polled {
        generation: u64,
        result: Result<PollResponse, TransportError>,
    },
    /// History fetched right after a persistent channel came up
    CaughtUp(Result<PollResponse, TransportError>),
    HttpSent {
        id: MessageId,
        attempt: u64,
        result: Result<SendAck, TransportError>,
    },
}

enum Step {
    Command(SessionCommand),
    Completion(Completion),
    Channel(ProbeEvent),
    ConnectDue,
    ProbeDue,
    PollDue,
    OutboundDue,
}

/// Observable outputs of the loop.
pub(super) struct Publishers {
    pub messages: watch::Sender<Vec<ChatMessage>>,
    pub state: watch::Sender<ConnectionState>,
    pub notices: NoticeBus,
}

pub(super) struct SessionTask {
    session_id: SessionId,
    config: ChatConfig,
    controller: ModeController,
    log: MessageLog,
    outbound: OutboundQueue,
    probe: TransportProbe,
    polling: PollingTransport,
    schedule: PollSchedule,
    health: PollingHealth,

    connection: Option<PersistentConnection>,
    /// Successful recovery probe awaiting promotion
    probe_connection: Option<PersistentConnection>,
    connect_generation: u64,
    probe_generation: u64,
    poll_generation: u64,
    polling_active: bool,
    poll_in_flight: bool,

    connect_at: Option<Instant>,
    probe_at: Option<Instant>,
    poll_at: Option<Instant>,

    commands: mpsc::UnboundedReceiver<SessionCommand>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    cancel: CancellationToken,
    publishers: Publishers,
    finished: Option<Result<(), SessionError>>,
}

impl SessionTask {
    pub(super) fn new(
        session_id: SessionId,
        config: ChatConfig,
        probe: TransportProbe,
        polling: PollingTransport,
        commands: mpsc::UnboundedReceiver<SessionCommand>,
        publishers: Publishers,
    ) -> Self {
        let (completions_tx, completions) = mpsc::unbounded_channel();
        Self {
            session_id,
            controller: ModeController::new(&config),
            log: MessageLog::new(config.reconcile_window()),
            outbound: OutboundQueue::new(config.send_retry_delays()),
            schedule: PollSchedule::from_config(&config, Instant::now()),
            health: PollingHealth::new(config.max_consecutive_poll_failures),
            config,
            probe,
            polling,
            connection: None,
            probe_connection: None,
            connect_generation: 0,
            probe_generation: 0,
            poll_generation: 0,
            polling_active: false,
            poll_in_flight: false,
            connect_at: None,
            probe_at: None,
            poll_at: None,
            commands,
            completions_tx,
            completions,
            cancel: CancellationToken::new(),
            publishers,
            finished: None,
        }
    }

    pub(super) async fn run(mut self) -> Result<(), SessionError> {
        tracing::info!(session_id = %self.session_id, mode = %self.config.mode, "Chat session started");
        let effects = self.controller.start();
        self.apply(effects);
        self.publish();

        let outcome = loop {
            if let Some(outcome) = self.finished.take() {
                break outcome;
            }

            let step = tokio::select! {
                biased;
                command = self.commands.recv() => {
                    Step::Command(command.unwrap_or(SessionCommand::Close))
                }
                Some(done) = self.completions.recv() => Step::Completion(done),
                Some(event) = next_channel_event(&mut self.connection) => Step::Channel(event),
                _ = sleep_until_opt(self.connect_at) => Step::ConnectDue,
                _ = sleep_until_opt(self.probe_at) => Step::ProbeDue,
                _ = sleep_until_opt(self.poll_at) => Step::PollDue,
                _ = sleep_until_opt(self.outbound.next_deadline()) => Step::OutboundDue,
            };

            match step {
                Step::Command(command) => self.on_command(command),
                Step::Completion(done) => self.on_completion(done),
                Step::Channel(event) => self.on_channel_event(event),
                Step::ConnectDue => self.on_connect_due(),
                Step::ProbeDue => {
                    self.probe_at = None;
                    self.drive(ModeEvent::RecoveryProbeDue);
                }
                Step::PollDue => self.on_poll_due(),
                Step::OutboundDue => self.on_outbound_due(),
            }
            self.publish();
        };

        self.cancel.cancel();
        self.connection = None;
        self.probe_connection = None;
        match &outcome {
            Ok(()) => tracing::info!(session_id = %self.session_id, "Chat session closed"),
            Err(e) => tracing::error!(session_id = %self.session_id, error = %e, "Chat session ended"),
        }
        outcome
    }

    // =========================================================================
    // Mode controller plumbing
    // =========================================================================

    fn drive(&mut self, event: ModeEvent) {
        let effects = self.controller.handle(event, Utc::now());
        self.apply(effects);
    }

    fn apply(&mut self, effects: Vec<ModeEffect>) {
        for effect in effects {
            match effect {
                ModeEffect::ConnectPersistent { delay } => {
                    self.connect_generation += 1;
                    self.connect_at = Some(Instant::now() + delay);
                }
                ModeEffect::StartPolling => self.start_polling(),
                ModeEffect::StopPolling => self.stop_polling(),
                ModeEffect::ScheduleRecoveryProbe { delay } => {
                    self.probe_at = Some(Instant::now() + delay);
                }
                ModeEffect::RunRecoveryProbe => self.run_probe(),
                ModeEffect::PromoteProbe => self.promote_probe(),
                ModeEffect::DiscardProbe => {
                    self.probe_generation += 1;
                    self.probe_connection = None;
                }
                ModeEffect::ClosePersistent => self.close_persistent(),
                ModeEffect::Notify(notice) => self.publishers.notices.publish(notice),
                ModeEffect::Terminate(error) => self.finished = Some(Err(error)),
            }
        }
    }

    fn fatal(&mut self, error: TransportError) {
        self.drive(ModeEvent::AuthRejected(error.to_string()));
    }

    // =========================================================================
    // Commands
    // =========================================================================

    fn on_command(&mut self, command: SessionCommand) {
        let now = Instant::now();
        match command {
            SessionCommand::Send(message) => {
                let id = message.id;
                tracing::debug!(session_id = %self.session_id, message_id = %id, "Queueing message");
                self.schedule.record_sent(now);
                self.log.push_local(message);
                self.outbound.enqueue(id);
                self.dispatch(id);
                self.pull_poll_forward(now);
            }
            SessionCommand::Retry(id) => self.retry(id),
            SessionCommand::RequestMode(mode) => self.drive(ModeEvent::ModeRequested(mode)),
            SessionCommand::SetTyping(typing) => {
                self.schedule.set_typing(typing, now);
                self.pull_poll_forward(now);
            }
            SessionCommand::SetVisible(visible) => {
                let restored = self.schedule.set_visible(visible, now);
                if !visible {
                    self.poll_at = None;
                } else if restored && self.polling_active && !self.poll_in_flight {
                    self.poll_at = Some(now);
                }
            }
            SessionCommand::Close => {
                self.drive(ModeEvent::Shutdown);
                if self.finished.is_none() {
                    self.finished = Some(Ok(()));
                }
            }
        }
    }

    fn retry(&mut self, id: MessageId) {
        let Some(message) = self.log.get(id) else {
            tracing::debug!(message_id = %id, "Retry for unknown message ignored");
            return;
        };
        if message.delivery_status != DeliveryStatus::Failed {
            tracing::debug!(message_id = %id, status = %message.delivery_status, "Only failed messages can be retried");
            return;
        }
        let id = message.client_id.unwrap_or(message.id);
        self.set_status(id, DeliveryStatus::Sending);
        self.outbound.restart(id);
        self.dispatch(id);
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// Send `id` over whichever transport is usable now; otherwise it stays
    /// queued until one is.
    fn dispatch(&mut self, id: MessageId) {
        let Some(message) = self.log.get(id).cloned() else {
            self.outbound.complete(id);
            return;
        };
        if message.is_confirmed() {
            self.outbound.complete(id);
            return;
        }

        if self.controller.mode() == TransportMode::Persistent {
            let Some(connection) = &self.connection else {
                return;
            };
            let deadline = Instant::now() + self.config.send_timeout();
            let attempt = self.outbound.begin(id, Route::Persistent, Some(deadline));
            let frame = OutboundFrame::SendMessage {
                client_message_id: id,
                content: message.content,
            };
            match connection.send_frame(frame) {
                Ok(()) => self.set_status(id, DeliveryStatus::Sent),
                Err(e) => {
                    tracing::warn!(message_id = %id, error = %e, "Persistent send failed");
                    self.on_send_failed(id, attempt);
                }
            }
        } else if self.polling_active {
            let attempt = self.outbound.begin(id, Route::Polling, None);
            self.set_status(id, DeliveryStatus::Sending);
            let polling = self.polling.clone();
            self.spawn_op(async move {
                let result = polling.send(&message).await;
                Completion::HttpSent {
                    id,
                    attempt,
                    result,
                }
            });
        }
    }

    fn flush_outbound(&mut self) {
        let ready = self.outbound.ready();
        if !ready.is_empty() {
            tracing::debug!(count = ready.len(), mode = %self.controller.mode(), "Flushing outbound queue");
        }
        for id in ready {
            self.dispatch(id);
        }
    }

    fn on_send_failed(&mut self, id: MessageId, attempt: u64) {
        match self.outbound.fail(id, attempt, Instant::now()) {
            FailureOutcome::RetryAt(at) => {
                tracing::debug!(message_id = %id, wait = ?at.saturating_duration_since(Instant::now()), "Send will be retried");
            }
            FailureOutcome::Exhausted => {
                tracing::warn!(message_id = %id, "Send retries exhausted");
                self.set_status(id, DeliveryStatus::Failed);
                self.publishers
                    .notices
                    .publish(SessionNotice::MessageFailed { id });
            }
            FailureOutcome::Stale => {}
        }
    }

    fn on_outbound_due(&mut self) {
        for due in self.outbound.take_due(Instant::now()) {
            match due {
                OutboundDue::Retry(id) => self.dispatch(id),
                OutboundDue::AckTimedOut { id, attempt } => {
                    tracing::debug!(message_id = %id, "No delivery ack in time");
                    self.on_send_failed(id, attempt);
                }
            }
        }
    }

    fn set_status(&mut self, id: MessageId, status: DeliveryStatus) {
        if let Err(e) = self.log.set_status(id, status) {
            tracing::debug!(message_id = %id, error = %e, "Delivery status unchanged");
        }
    }

    // =========================================================================
    // Persistent channel
    // =========================================================================

    fn on_connect_due(&mut self) {
        self.connect_at = None;
        let generation = self.connect_generation;
        let probe = self.probe.clone();
        let session_id = self.session_id;
        tracing::debug!(%session_id, attempt = self.controller.state().reconnect_attempts + 1, "Connecting persistent channel");
        self.spawn_op(async move {
            Completion::Connected {
                generation,
                result: probe.connect(session_id).await,
            }
        });
    }

    fn run_probe(&mut self) {
        self.probe_generation += 1;
        let generation = self.probe_generation;
        let probe = self.probe.clone();
        let session_id = self.session_id;
        self.spawn_op(async move {
            Completion::Probed {
                generation,
                result: probe.connect(session_id).await,
            }
        });
    }

    fn promote_probe(&mut self) {
        let Some(connection) = self.probe_connection.take() else {
            return;
        };
        self.connect_generation += 1;
        self.connect_at = None;
        self.probe_at = None;
        self.connection = Some(connection);
        // Queued messages go out before the new channel's inbound frames are read
        self.flush_outbound();
        self.catch_up();
    }

    fn close_persistent(&mut self) {
        self.connect_generation += 1;
        self.connect_at = None;
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        let requeued = self.outbound.requeue_persistent();
        if requeued > 0 {
            tracing::debug!(requeued, "Unacknowledged persistent sends requeued");
        }
    }

    fn on_channel_event(&mut self, event: ProbeEvent) {
        match event {
            ProbeEvent::Frame(frame) => {
                self.drive(ModeEvent::ExchangeSucceeded);
                self.on_frame(frame);
            }
            ProbeEvent::Closed(reason) => {
                tracing::info!(session_id = %self.session_id, %reason, "Persistent channel closed");
                self.connection = None;
                self.outbound.requeue_persistent();
                self.drive(ModeEvent::PersistentClosed(reason));
            }
        }
    }

    fn on_frame(&mut self, frame: InboundFrame) {
        match frame {
            InboundFrame::Ack {
                client_message_id,
                server_message_id,
                created_at,
            } => {
                if self
                    .log
                    .confirm_local(client_message_id, server_message_id, created_at)
                {
                    self.outbound.complete(client_message_id);
                }
            }
            InboundFrame::Message(message) => self.merge(message),
            InboundFrame::Pong => {}
            InboundFrame::Error { code, message } => {
                tracing::warn!(%code, %message, "Backend reported a channel error");
            }
        }
    }

    /// Fetch what arrived while no channel was delivering.
    fn catch_up(&mut self) {
        let polling = self.polling.clone();
        let cursor = self.log.cursor();
        let interval = self.config.base_poll_interval();
        self.spawn_op(async move { Completion::CaughtUp(polling.poll(cursor, interval).await) });
    }

    // =========================================================================
    // Polling
    // =========================================================================

    fn start_polling(&mut self) {
        if self.polling_active {
            return;
        }
        tracing::info!(session_id = %self.session_id, cursor = ?self.log.cursor(), "Polling started");
        self.polling_active = true;
        self.poll_generation += 1;
        self.poll_in_flight = false;
        self.health = PollingHealth::new(self.config.max_consecutive_poll_failures);
        self.poll_at = self.schedule.is_visible().then(Instant::now);
        self.flush_outbound();
    }

    fn stop_polling(&mut self) {
        if !self.polling_active {
            return;
        }
        tracing::info!(session_id = %self.session_id, "Polling stopped");
        self.polling_active = false;
        self.poll_generation += 1;
        self.poll_in_flight = false;
        self.poll_at = None;
    }

    fn on_poll_due(&mut self) {
        self.poll_at = None;
        if !self.polling_active || self.poll_in_flight {
            return;
        }
        let Some(interval) = self.schedule.interval(Instant::now()) else {
            return;
        };
        self.poll_in_flight = true;
        let generation = self.poll_generation;
        let polling = self.polling.clone();
        let cursor = self.log.cursor();
        self.spawn_op(async move {
            Completion::Polled {
                generation,
                result: polling.poll(cursor, interval).await,
            }
        });
    }

    fn schedule_next_poll(&mut self) {
        let now = Instant::now();
        self.poll_at = self
            .health
            .next_delay(&self.schedule, now)
            .map(|delay| now + delay);
    }

    /// Bring the next poll forward when the cadence just got faster.
    fn pull_poll_forward(&mut self, now: Instant) {
        if !self.polling_active || self.poll_in_flight {
            return;
        }
        let Some(delay) = self.health.next_delay(&self.schedule, now) else {
            return;
        };
        let candidate = now + delay;
        if self.poll_at.map_or(true, |at| candidate < at) {
            self.poll_at = Some(candidate);
        }
    }

    fn record_poll_health(&mut self, change: Option<HealthChange>) {
        match change {
            Some(HealthChange::Degraded) => self.drive(ModeEvent::PollDegraded),
            Some(HealthChange::Recovered) => self.drive(ModeEvent::PollRecovered),
            None => {}
        }
    }

    // =========================================================================
    // Completions
    // =========================================================================

    fn on_completion(&mut self, done: Completion) {
        match done {
            Completion::Connected { generation, result } => {
                if generation != self.connect_generation {
                    return;
                }
                match result {
                    Ok(connected) => {
                        tracing::info!(latency = ?connected.latency, "Persistent channel open");
                        self.connection = Some(connected.connection);
                        self.drive(ModeEvent::PersistentConnected);
                        if self.controller.is_connected() && self.connection.is_some() {
                            self.flush_outbound();
                            self.catch_up();
                        }
                    }
                    Err(e) if e.is_fatal() => self.fatal_connect(e),
                    Err(e) => self.drive(ModeEvent::PersistentConnectFailed {
                        timed_out: e.is_timeout(),
                    }),
                }
            }
            Completion::Probed { generation, result } => {
                if generation != self.probe_generation {
                    return;
                }
                match result {
                    Ok(connected) => {
                        self.probe_connection = Some(connected.connection);
                        self.drive(ModeEvent::RecoveryProbeSucceeded);
                        self.probe_connection = None;
                    }
                    Err(e) if e.is_fatal() => self.fatal_connect(e),
                    Err(e) => {
                        tracing::debug!(error = %e, "Recovery probe failed");
                        self.drive(ModeEvent::RecoveryProbeFailed);
                    }
                }
            }
            Completion::Polled { generation, result } => {
                let current = generation == self.poll_generation;
                if current {
                    self.poll_in_flight = false;
                }
                match result {
                    Ok(page) => {
                        self.merge_page(page);
                        if current {
                            self.drive(ModeEvent::ExchangeSucceeded);
                            let change = self.health.record_success();
                            self.record_poll_health(change);
                        }
                    }
                    Err(e) if e.is_fatal() => self.fatal(e),
                    Err(e) => {
                        if current {
                            tracing::warn!(error = %e, failures = self.health.failures() + 1, "Poll failed");
                            let change = self.health.record_failure();
                            self.record_poll_health(change);
                        }
                    }
                }
                if current && self.polling_active && self.finished.is_none() {
                    self.schedule_next_poll();
                }
            }
            Completion::CaughtUp(result) => match result {
                Ok(page) => self.merge_page(page),
                Err(e) if e.is_fatal() => self.fatal(e),
                Err(e) => tracing::debug!(error = %e, "Catch-up fetch failed"),
            },
            Completion::HttpSent {
                id,
                attempt,
                result,
            } => match result {
                Ok(ack) => {
                    let client_id = ack.echoed_client_message_id.unwrap_or(id);
                    if client_id != id {
                        tracing::warn!(sent = %id, echoed = %client_id, "Backend echoed a different client id");
                    }
                    self.log
                        .confirm_local(id, ack.server_message_id, ack.created_at);
                    self.outbound.complete(id);
                    if let Some(reply) = ack.inline_reply {
                        let outcome = self.log.merge_reply(reply);
                        self.settle(outcome);
                    }
                    self.drive(ModeEvent::ExchangeSucceeded);
                    if self.polling_active {
                        let change = self.health.record_success();
                        self.record_poll_health(change);
                    }
                }
                Err(e) if e.is_fatal() => self.fatal(e),
                Err(e) => {
                    tracing::warn!(message_id = %id, error = %e, "HTTP send failed");
                    if self.polling_active {
                        let change = self.health.record_failure();
                        self.record_poll_health(change);
                    }
                    self.on_send_failed(id, attempt);
                }
            },
        }
    }

    fn fatal_connect(&mut self, error: ConnectFailed) {
        self.drive(ModeEvent::AuthRejected(error.to_string()));
    }

    fn merge_page(&mut self, page: PollResponse) {
        for message in page.messages {
            self.merge(message);
        }
        self.log.adopt_cursor(page.next_cursor);
    }

    fn merge(&mut self, message: ChatMessage) {
        let outcome = self.log.merge_server(message);
        self.settle(outcome);
    }

    fn settle(&mut self, outcome: MergeOutcome) {
        if let MergeOutcome::Confirmed(client_id) = outcome {
            self.outbound.complete(client_id);
        }
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    fn spawn_op<F>(&self, op: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let tx = self.completions_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                done = op => {
                    let _ = tx.send(done);
                }
            }
        });
    }

    fn publish(&self) {
        let messages = self.log.messages();
        self.publishers.messages.send_if_modified(|current| {
            if current.as_slice() == messages {
                return false;
            }
            *current = messages.to_vec();
            true
        });

        let state = self.controller.state();
        self.publishers.state.send_if_modified(|current| {
            if *current == *state {
                return false;
            }
            *current = state.clone();
            true
        });
    }
}

async fn next_channel_event(connection: &mut Option<PersistentConnection>) -> Option<ProbeEvent> {
    match connection {
        Some(connection) => connection.next_event().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
