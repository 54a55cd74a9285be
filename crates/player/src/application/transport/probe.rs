//! Persistent-channel probe.
//!
//! `TransportProbe::connect` performs a bounded handshake through the
//! [`ChannelConnectorPort`] and hands back a [`PersistentConnection`]. The
//! connection surfaces inbound frames and, exactly once, the reason it closed.
//! Retry policy lives in the mode controller, not here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

use consultchat_domain::{CloseReason, SessionId};
use crate::ports::outbound::{
    ChannelConnectorPort, ChannelEvent, InboundFrame, OutboundFrame, RawChannel, TransportError,
};

/// Events observed on a persistent connection, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeEvent {
    Frame(InboundFrame),
    /// Emitted once; nothing follows it
    Closed(CloseReason),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectFailed {
    #[error("Handshake timed out after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ConnectFailed {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ConnectFailed::TimedOut(_) | ConnectFailed::Transport(TransportError::Timeout)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ConnectFailed::Transport(e) if e.is_fatal())
    }
}

#[derive(Debug)]
pub struct Connected {
    pub connection: PersistentConnection,
    /// Handshake duration
    pub latency: Duration,
}

#[derive(Clone)]
pub struct TransportProbe {
    connector: Arc<dyn ChannelConnectorPort>,
    connect_timeout: Duration,
    heartbeat_interval: Duration,
}

impl TransportProbe {
    pub fn new(
        connector: Arc<dyn ChannelConnectorPort>,
        connect_timeout: Duration,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            connector,
            connect_timeout,
            heartbeat_interval,
        }
    }

    pub async fn connect(&self, session_id: SessionId) -> Result<Connected, ConnectFailed> {
        let started = Instant::now();
        let raw = match timeout(self.connect_timeout, self.connector.open(session_id)).await {
            Err(_) => {
                tracing::warn!(%session_id, timeout = ?self.connect_timeout, "Persistent handshake timed out");
                return Err(ConnectFailed::TimedOut(self.connect_timeout));
            }
            Ok(Err(e)) => {
                tracing::warn!(%session_id, error = %e, "Persistent handshake failed");
                return Err(ConnectFailed::Transport(e));
            }
            Ok(Ok(raw)) => raw,
        };

        let latency = started.elapsed();
        tracing::debug!(%session_id, ?latency, "Persistent channel open");
        Ok(Connected {
            connection: PersistentConnection::spawn(raw, self.heartbeat_interval),
            latency,
        })
    }
}

/// One live persistent connection.
///
/// Dropping it stops the heartbeat and releases the socket without emitting
/// an event; call [`PersistentConnection::close`] for an observable close.
#[derive(Debug)]
pub struct PersistentConnection {
    outbound: Option<mpsc::Sender<OutboundFrame>>,
    events: mpsc::UnboundedReceiver<ProbeEvent>,
    events_tx: mpsc::UnboundedSender<ProbeEvent>,
    closed: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl PersistentConnection {
    fn spawn(raw: RawChannel, heartbeat_interval: Duration) -> Self {
        let RawChannel { outbound, inbound } = raw;
        let (events_tx, events) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        tokio::spawn(pump(
            inbound,
            outbound.clone(),
            events_tx.clone(),
            Arc::clone(&closed),
            cancel.clone(),
            heartbeat_interval,
        ));

        Self {
            outbound: Some(outbound),
            events,
            events_tx,
            closed,
            cancel,
        }
    }

    /// Next frame or the close notification. Pending forever after `Closed`
    /// has been taken.
    pub async fn next_event(&mut self) -> Option<ProbeEvent> {
        self.events.recv().await
    }

    /// Queue a frame without waiting for buffer space.
    pub fn send_frame(&self, frame: OutboundFrame) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let Some(outbound) = &self.outbound else {
            return Err(TransportError::Closed);
        };
        outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                TransportError::Network("outbound buffer full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close locally. Idempotent: only the first close of any kind is reported.
    pub fn close(&mut self) {
        emit_close(&self.closed, &self.events_tx, CloseReason::Normal);
        self.cancel.cancel();
        self.outbound = None;
    }
}

impl Drop for PersistentConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn emit_close(
    closed: &AtomicBool,
    events_tx: &mpsc::UnboundedSender<ProbeEvent>,
    reason: CloseReason,
) -> bool {
    if closed.swap(true, Ordering::SeqCst) {
        return false;
    }
    let _ = events_tx.send(ProbeEvent::Closed(reason));
    true
}

/// Forwards adapter events and keeps the channel honest with pings.
async fn pump(
    mut inbound: mpsc::Receiver<ChannelEvent>,
    outbound: mpsc::Sender<OutboundFrame>,
    events_tx: mpsc::UnboundedSender<ProbeEvent>,
    closed: Arc<AtomicBool>,
    cancel: CancellationToken,
    heartbeat_interval: Duration,
) {
    let liveness = heartbeat_interval * 2;
    let mut heartbeat = tokio::time::interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
    let mut last_inbound = Instant::now();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            event = inbound.recv() => match event {
                Some(ChannelEvent::Frame(frame)) => {
                    last_inbound = Instant::now();
                    if closed.load(Ordering::SeqCst) {
                        return;
                    }
                    let _ = events_tx.send(ProbeEvent::Frame(frame));
                }
                Some(ChannelEvent::Closed(reason)) => {
                    emit_close(&closed, &events_tx, reason);
                    return;
                }
                None => {
                    emit_close(&closed, &events_tx, CloseReason::Error);
                    return;
                }
            },
            _ = heartbeat.tick() => {
                if last_inbound.elapsed() >= liveness {
                    tracing::warn!(?liveness, "No inbound traffic on persistent channel");
                    emit_close(&closed, &events_tx, CloseReason::Timeout);
                    return;
                }
                if let Err(e) = outbound.try_send(OutboundFrame::Ping) {
                    tracing::debug!(error = %e, "Heartbeat ping not queued");
                }
            }
        }
    }
}
