//! Outbound message queue and per-message retry schedule.
//!
//! Every locally written message owns one entry until it is confirmed. The
//! entry walks `Queued -> InFlight -> (WaitingRetry -> InFlight)* -> Exhausted`.
//! Each dispatch gets a fresh attempt number so late completions of superseded
//! attempts are recognised and ignored.

use std::time::Duration;

use tokio::time::Instant;

use consultchat_domain::MessageId;

/// Transport an attempt went out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Persistent,
    Polling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for a usable transport
    Queued,
    InFlight {
        route: Route,
        /// Ack deadline for persistent sends; HTTP sends carry their own timeout
        ack_deadline: Option<Instant>,
    },
    WaitingRetry {
        at: Instant,
    },
    Exhausted,
}

#[derive(Debug, Clone)]
struct Entry {
    id: MessageId,
    retries_used: usize,
    attempt: u64,
    phase: Phase,
}

/// Result of reporting a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    RetryAt(Instant),
    Exhausted,
    /// The attempt was superseded or the entry is gone
    Stale,
}

/// Work that became due on the outbound timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundDue {
    Retry(MessageId),
    AckTimedOut { id: MessageId, attempt: u64 },
}

#[derive(Debug, Clone)]
pub struct OutboundQueue {
    entries: Vec<Entry>,
    retry_delays: Vec<Duration>,
    next_attempt: u64,
}

impl OutboundQueue {
    pub fn new(retry_delays: Vec<Duration>) -> Self {
        Self {
            entries: Vec::new(),
            retry_delays,
            next_attempt: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn enqueue(&mut self, id: MessageId) {
        if self.contains(id) {
            return;
        }
        self.entries.push(Entry {
            id,
            retries_used: 0,
            attempt: 0,
            phase: Phase::Queued,
        });
    }

    /// Restart an exhausted (or forgotten) message from the first retry delay.
    pub fn restart(&mut self, id: MessageId) {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.retries_used = 0;
                entry.phase = Phase::Queued;
            }
            None => self.enqueue(id),
        }
    }

    /// Entries to send as soon as a transport becomes usable, in submission
    /// order. Only called when the active transport changes: a retry wait
    /// belongs to the transport that failed, so waiting entries go out at once
    /// on the new one. Their spent retries still count against the budget.
    pub fn ready(&self) -> Vec<MessageId> {
        self.entries
            .iter()
            .filter(|e| matches!(e.phase, Phase::Queued | Phase::WaitingRetry { .. }))
            .map(|e| e.id)
            .collect()
    }

    /// Mark `id` in flight and return the attempt number.
    pub fn begin(&mut self, id: MessageId, route: Route, ack_deadline: Option<Instant>) -> u64 {
        self.next_attempt += 1;
        let attempt = self.next_attempt;
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.attempt = attempt;
            entry.phase = Phase::InFlight {
                route,
                ack_deadline,
            };
        }
        attempt
    }

    /// Drop the entry; the message is confirmed.
    pub fn complete(&mut self, id: MessageId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Report that `attempt` of `id` failed.
    pub fn fail(&mut self, id: MessageId, attempt: u64, now: Instant) -> FailureOutcome {
        let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) else {
            return FailureOutcome::Stale;
        };
        if entry.attempt != attempt || !matches!(entry.phase, Phase::InFlight { .. }) {
            return FailureOutcome::Stale;
        }
        match self.retry_delays.get(entry.retries_used) {
            Some(delay) => {
                entry.retries_used += 1;
                let at = now + *delay;
                entry.phase = Phase::WaitingRetry { at };
                FailureOutcome::RetryAt(at)
            }
            None => {
                entry.phase = Phase::Exhausted;
                FailureOutcome::Exhausted
            }
        }
    }

    /// Persistent attempts lose their channel; they go back to the queue
    /// without spending a retry.
    pub fn requeue_persistent(&mut self) -> usize {
        let mut count = 0;
        for entry in &mut self.entries {
            if matches!(
                entry.phase,
                Phase::InFlight {
                    route: Route::Persistent,
                    ..
                }
            ) {
                entry.phase = Phase::Queued;
                count += 1;
            }
        }
        count
    }

    /// Earliest retry or ack deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries
            .iter()
            .filter_map(|e| match e.phase {
                Phase::WaitingRetry { at } => Some(at),
                Phase::InFlight { ack_deadline, .. } => ack_deadline,
                _ => None,
            })
            .min()
    }

    /// Collect everything due at `now`. Due retries move back to `Queued`.
    pub fn take_due(&mut self, now: Instant) -> Vec<OutboundDue> {
        let mut due = Vec::new();
        for entry in &mut self.entries {
            match entry.phase {
                Phase::WaitingRetry { at } if at <= now => {
                    entry.phase = Phase::Queued;
                    due.push(OutboundDue::Retry(entry.id));
                }
                Phase::InFlight {
                    ack_deadline: Some(deadline),
                    ..
                } if deadline <= now => {
                    due.push(OutboundDue::AckTimedOut {
                        id: entry.id,
                        attempt: entry.attempt,
                    });
                }
                _ => {}
            }
        }
        due
    }
}
