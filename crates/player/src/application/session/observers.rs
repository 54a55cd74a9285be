//! Observation primitives handed to the UI layer.
//!
//! - `watch_stream`: restartable-from-current-state stream over a watch channel
//! - `NoticeBus`: fan-out of [`SessionNotice`]s to any number of subscribers

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::{broadcast, watch};

use crate::session_types::SessionNotice;

/// Stream that yields the current value immediately, then every change.
///
/// Intermediate values may be skipped when the observer is slower than the
/// producer; the latest value is never skipped. Ends when the producer is gone.
pub fn watch_stream<T>(rx: watch::Receiver<T>) -> BoxStream<'static, T>
where
    T: Clone + Send + Sync + 'static,
{
    stream::unfold((rx, true), |(mut rx, first)| async move {
        if !first {
            rx.changed().await.ok()?;
        }
        let value = rx.borrow_and_update().clone();
        Some((value, (rx, false)))
    })
    .boxed()
}

/// Broadcast bus for session notices.
#[derive(Clone)]
pub struct NoticeBus {
    tx: broadcast::Sender<SessionNotice>,
}

impl NoticeBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to current subscribers. Notices with no subscriber are dropped.
    pub fn publish(&self, notice: SessionNotice) {
        tracing::debug!(?notice, "Session notice");
        let _ = self.tx.send(notice);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Notices published from now on. A lagging subscriber skips what it
    /// missed and keeps going.
    pub fn subscribe(&self) -> BoxStream<'static, SessionNotice> {
        stream::unfold(self.tx.subscribe(), |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(notice) => return Some((notice, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Notice subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn late_observer_gets_current_value_first() {
        let (tx, rx) = watch::channel(1);
        tx.send(2).expect("receiver alive");

        let mut values = watch_stream(rx);
        assert_eq!(values.next().await, Some(2));

        tx.send(3).expect("receiver alive");
        assert_eq!(values.next().await, Some(3));

        drop(tx);
        assert_eq!(values.next().await, None);
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_notice() {
        let bus = NoticeBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(SessionNotice::PollingDegraded);

        assert_eq!(first.next().await, Some(SessionNotice::PollingDegraded));
        assert_eq!(second.next().await, Some(SessionNotice::PollingDegraded));
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_ahead() {
        let bus = NoticeBus::new(1);
        let mut slow = bus.subscribe();
        bus.publish(SessionNotice::PollingDegraded);
        bus.publish(SessionNotice::PollingRecovered);

        assert_eq!(slow.next().await, Some(SessionNotice::PollingRecovered));
    }
}
