//! Per-instrument top-of-book publication.
//!
//! Decoupled, non-blocking delivery over `tokio::sync::mpsc`: each
//! subscriber gets its own bounded channel, and publication uses `try_send`
//! so a slow or stalled observer never stalls the `ProductBook` critical
//! section it is published from.

use common::InstrumentId;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::price::Price;

/// A point-in-time snapshot of one instrument's best bid/ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopOfBookSnapshot {
    pub bid: Option<Price>,
    pub bid_volume: u32,
    pub ask: Option<Price>,
    pub ask_volume: u32,
}

impl TopOfBookSnapshot {
    pub fn empty() -> Self {
        Self {
            bid: None,
            bid_volume: 0,
            ask: None,
            ask_volume: 0,
        }
    }
}

/// Delivers top-of-book snapshots for one instrument to every subscribed
/// observer. Publication happens inside the `ProductBook`'s write lock, so
/// delivery itself must never block: a full or closed observer channel is
/// handled without propagating back into the critical section.
pub struct TopOfBookPublisher {
    instrument: InstrumentId,
    subscribers: RwLock<Vec<mpsc::Sender<TopOfBookSnapshot>>>,
    last: RwLock<Option<TopOfBookSnapshot>>,
}

impl TopOfBookPublisher {
    pub fn new(instrument: InstrumentId) -> Self {
        Self {
            instrument,
            subscribers: RwLock::new(Vec::new()),
            last: RwLock::new(None),
        }
    }

    pub fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    /// Register a new observer. The returned receiver sees every snapshot
    /// published from this point on; a bounded buffer absorbs bursts before
    /// `publish` starts dropping updates for this subscriber.
    pub fn subscribe(&self, buffer: usize) -> mpsc::Receiver<TopOfBookSnapshot> {
        let (tx, rx) = mpsc::channel(buffer);
        self.subscribers.write().push(tx);
        rx
    }

    pub fn last(&self) -> Option<TopOfBookSnapshot> {
        *self.last.read()
    }

    /// Publish a snapshot if it differs from the last one delivered
    /// (whenever either top-of-book field changes). Cancelled subscribers
    /// are pruned; a subscriber whose buffer is full simply misses this
    /// update rather than blocking the caller.
    pub fn publish(&self, snapshot: TopOfBookSnapshot) {
        {
            let mut last = self.last.write();
            if *last == Some(snapshot) {
                return;
            }
            *last = Some(snapshot);
        }

        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| match tx.try_send(snapshot) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instrument() -> InstrumentId {
        InstrumentId::new("AAPL").unwrap()
    }

    #[tokio::test]
    async fn subscriber_receives_published_snapshot() {
        let publisher = TopOfBookPublisher::new(instrument());
        let mut rx = publisher.subscribe(4);

        let snapshot = TopOfBookSnapshot {
            bid: Some(Price::from_cents(15000)),
            bid_volume: 10,
            ask: Some(Price::from_cents(15100)),
            ask_volume: 5,
        };
        publisher.publish(snapshot);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, snapshot);
    }

    #[tokio::test]
    async fn unchanged_snapshot_is_not_republished() {
        let publisher = TopOfBookPublisher::new(instrument());
        let mut rx = publisher.subscribe(4);

        let snapshot = TopOfBookSnapshot::empty();
        publisher.publish(snapshot);
        publisher.publish(snapshot);

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_subscriber_is_pruned_without_blocking() {
        let publisher = TopOfBookPublisher::new(instrument());
        let rx = publisher.subscribe(1);
        drop(rx);

        publisher.publish(TopOfBookSnapshot::empty());
        publisher.publish(TopOfBookSnapshot {
            bid: Some(Price::from_cents(100)),
            bid_volume: 1,
            ask: None,
            ask_volume: 0,
        });

        assert_eq!(publisher.subscribers.read().len(), 0);
    }
}
