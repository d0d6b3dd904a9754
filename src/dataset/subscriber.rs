//! Dataset subscribers - bounded, non-blocking flush notifications.
//!
//! Live consumers (plotters, progress displays) get a bounded channel per
//! subscription. The writer pushes with `try_send` and never waits: a slow
//! consumer loses notifications, counted per subscriber, instead of stalling
//! acquisition. Delivery is ordered by flush sequence number.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

/// What to do when a subscriber's queue is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop the notification and count it.
    DropNewest,
}

/// A contiguous newly flushed region of one array.
#[derive(Clone, Debug, PartialEq)]
pub struct FlushedRegion {
    /// Array name.
    pub array: String,
    /// First linear index of the region.
    pub start: usize,
    /// The flushed values, in linear order.
    pub values: Vec<f64>,
}

/// Notification delivered to subscribers after each flush.
#[derive(Clone, Debug)]
pub struct FlushNotice {
    /// Monotonic flush sequence number.
    pub seq: u64,
    /// Regions newly flushed in this cycle; empty flushes send nothing.
    pub regions: Vec<FlushedRegion>,
}

struct Subscriber {
    sender: mpsc::Sender<FlushNotice>,
    policy: OverflowPolicy,
    dropped: AtomicU64,
}

impl Subscriber {
    fn notify(&self, notice: FlushNotice) -> bool {
        match self.sender.try_send(notice) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let OverflowPolicy::DropNewest = self.policy;
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Registry of active dataset subscribers.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<u64, Arc<Subscriber>>>,
    next_id: AtomicU64,
    next_seq: AtomicU64,
}

impl SubscriberRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber with the given queue capacity.
    ///
    /// Returns the subscription id and the receiving end of the channel.
    pub fn register(
        &self,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> (u64, mpsc::Receiver<FlushNotice>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().insert(
            id,
            Arc::new(Subscriber {
                sender: tx,
                policy,
                dropped: AtomicU64::new(0),
            }),
        );
        (id, rx)
    }

    /// Remove a subscriber. Returns true when it existed.
    pub fn unregister(&self, id: u64) -> bool {
        self.subscribers.write().remove(&id).is_some()
    }

    /// Notifications dropped for a subscriber due to backpressure.
    pub fn dropped_count(&self, id: u64) -> u64 {
        self.subscribers
            .read()
            .get(&id)
            .map(|s| s.dropped.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Number of active subscribers.
    pub fn count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Fan out the regions of one flush cycle. Never blocks.
    ///
    /// No-op when there are no regions or no subscribers; the sequence
    /// number only advances for non-empty notifications.
    pub fn notify_all(&self, regions: Vec<FlushedRegion>) {
        if regions.is_empty() {
            return;
        }
        let subscribers = self.subscribers.read();
        if subscribers.is_empty() {
            return;
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let notice = FlushNotice { seq, regions };
        for subscriber in subscribers.values() {
            subscriber.notify(notice.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(values: Vec<f64>) -> FlushedRegion {
        FlushedRegion {
            array: "q".into(),
            start: 0,
            values,
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_in_flush_order() {
        let registry = SubscriberRegistry::new();
        let (_id, mut rx) = registry.register(8, OverflowPolicy::DropNewest);

        registry.notify_all(vec![region(vec![1.0])]);
        registry.notify_all(vec![region(vec![2.0])]);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(first.seq < second.seq);
        assert_eq!(first.regions[0].values, vec![1.0]);
    }

    #[tokio::test]
    async fn test_overflow_drops_without_blocking() {
        let registry = SubscriberRegistry::new();
        let (id, mut rx) = registry.register(1, OverflowPolicy::DropNewest);

        registry.notify_all(vec![region(vec![1.0])]);
        registry.notify_all(vec![region(vec![2.0])]); // queue full, dropped

        assert_eq!(registry.dropped_count(id), 1);
        assert_eq!(rx.recv().await.unwrap().regions[0].values, vec![1.0]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_flush_sends_nothing() {
        let registry = SubscriberRegistry::new();
        let (_id, mut rx) = registry.register(4, OverflowPolicy::DropNewest);

        registry.notify_all(Vec::new());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unregister() {
        let registry = SubscriberRegistry::new();
        let (id, _rx) = registry.register(4, OverflowPolicy::DropNewest);
        assert_eq!(registry.count(), 1);
        assert!(registry.unregister(id));
        assert_eq!(registry.count(), 0);
    }
}
