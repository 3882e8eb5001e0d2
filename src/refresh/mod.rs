//! Process-wide "data changed" signal.
//!
//! Publishers bump a counter; subscribers re-fetch whatever they display when
//! the counter moves. Only the latest value is kept, so a burst of publishes
//! reaches a slow subscriber as a single change.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Clone)]
pub struct RefreshBus {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for RefreshBus {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshBus {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Signal that backend data changed. Returns the new counter value.
    pub fn publish(&self) -> u64 {
        self.tx.send_modify(|value| *value += 1);
        let value = *self.tx.borrow();
        debug!(
            "Refresh published: {} ({} subscribers)",
            value,
            self.tx.receiver_count()
        );
        value
    }

    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn subscribe(&self) -> RefreshSubscription {
        RefreshSubscription {
            rx: self.tx.subscribe(),
            primed: false,
        }
    }

    /// Run `fetch` on a task: once immediately, then on every change, until
    /// `cancel` fires.
    pub fn spawn_consumer<F, Fut>(
        &self,
        name: &'static str,
        cancel: CancellationToken,
        mut fetch: F,
    ) -> JoinHandle<()>
    where
        F: FnMut(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut subscription = self.subscribe();
        tokio::spawn(async move {
            info!("Refresh consumer '{}' subscribed", name);
            loop {
                let value = tokio::select! {
                    _ = cancel.cancelled() => break,
                    value = subscription.next() => value,
                };
                let Some(value) = value else { break };

                debug!("Refresh consumer '{}' fetching for value {}", name, value);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = fetch(value) => {}
                }
            }
            info!("Refresh consumer '{}' unsubscribed", name);
        })
    }
}

/// A live subscription. Dropping it unsubscribes.
pub struct RefreshSubscription {
    rx: watch::Receiver<u64>,
    primed: bool,
}

impl RefreshSubscription {
    /// The first call resolves immediately with the current value; later calls
    /// wait for the next change. Returns `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<u64> {
        if !self.primed {
            self.primed = true;
            return Some(*self.rx.borrow_and_update());
        }

        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    /// Whether a value newer than the last one returned is waiting.
    pub fn is_stale(&self) -> bool {
        !self.primed || self.rx.has_changed().unwrap_or(false)
    }

    pub fn unsubscribe(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_increments() {
        let bus = RefreshBus::new();
        assert_eq!(bus.current(), 0);
        assert_eq!(bus.publish(), 1);
        assert_eq!(bus.publish(), 2);
        assert_eq!(bus.current(), 2);
    }

    #[tokio::test]
    async fn test_first_next_is_immediate() {
        let bus = RefreshBus::new();
        bus.publish();

        let mut sub = bus.subscribe();
        assert!(sub.is_stale());
        assert_eq!(sub.next().await, Some(1));
        assert!(!sub.is_stale());
    }

    #[tokio::test]
    async fn test_rapid_publishes_coalesce() {
        let bus = RefreshBus::new();
        let mut sub = bus.subscribe();
        assert_eq!(sub.next().await, Some(0));

        bus.publish();
        bus.publish();
        bus.publish();

        assert!(sub.is_stale());
        assert_eq!(sub.next().await, Some(3));
        assert!(!sub.is_stale());
    }

    #[tokio::test]
    async fn test_resubscribe_sees_latest() {
        let bus = RefreshBus::new();
        let mut sub = bus.subscribe();
        assert_eq!(sub.next().await, Some(0));
        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(), 0);

        bus.publish();
        bus.publish();

        let mut sub = bus.subscribe();
        assert_eq!(sub.next().await, Some(2));
    }

    #[tokio::test]
    async fn test_next_ends_when_bus_dropped() {
        let bus = RefreshBus::new();
        let mut sub = bus.subscribe();
        assert_eq!(sub.next().await, Some(0));
        drop(bus);
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_fetches_initially_and_on_change() {
        let bus = RefreshBus::new();
        let cancel = CancellationToken::new();
        let fetches = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicU64::new(u64::MAX));

        let handle = {
            let fetches = fetches.clone();
            let last = last.clone();
            bus.spawn_consumer("test", cancel.clone(), move |value| {
                fetches.fetch_add(1, Ordering::SeqCst);
                last.store(value, Ordering::SeqCst);
                async {}
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 0);

        bus.publish();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        assert_eq!(last.load(Ordering::SeqCst), 1);

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(bus.subscriber_count(), 0);

        bus.publish();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }
}
