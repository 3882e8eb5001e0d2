use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::NotificationTracker;
use crate::refresh::RefreshBus;

/// Anything that can list the creation times (epoch ms) of the user's
/// conversations.
#[async_trait]
pub trait ConversationSource: Send + Sync {
    async fn conversation_timestamps(&self) -> Result<Vec<i64>>;
}

/// Refresh consumer that keeps the history unread badge current.
pub struct HistoryNotificationChecker {
    source: Arc<dyn ConversationSource>,
    tracker: NotificationTracker,
    delay: Duration,
}

impl HistoryNotificationChecker {
    pub fn new(
        source: Arc<dyn ConversationSource>,
        tracker: NotificationTracker,
        delay: Duration,
    ) -> Self {
        Self {
            source,
            tracker,
            delay,
        }
    }

    /// Fetch once and recompute. Skips the fetch when no user is active.
    pub async fn check(&self) -> Result<usize> {
        if self.tracker.current_user().await.is_none() {
            return Ok(0);
        }
        let timestamps = self.source.conversation_timestamps().await?;
        self.tracker.recompute_unread(&timestamps).await
    }

    /// Check on start, after every refresh on `bus`, and whenever the
    /// tracker's active user changes. Refresh-driven checks first wait
    /// `delay` so the backend has settled; user switches check right away.
    pub fn spawn(self, bus: &RefreshBus, cancel: CancellationToken) -> JoinHandle<()> {
        let mut refreshes = bus.subscribe();
        let mut users = self.tracker.watch_user();
        tokio::spawn(async move {
            info!("History notification checker started");
            loop {
                let delay = tokio::select! {
                    _ = cancel.cancelled() => break,
                    value = refreshes.next() => match value {
                        Some(value) => {
                            debug!("Checking history for refresh {}", value);
                            self.delay
                        }
                        None => break,
                    },
                    changed = users.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        users.borrow_and_update();
                        debug!("Checking history for new user");
                        Duration::ZERO
                    }
                };

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.settle_and_check(delay) => {}
                }
            }
            info!("History notification checker stopped");
        })
    }

    async fn settle_and_check(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.check().await {
            Ok(unread) => debug!("{} unread conversations", unread),
            Err(e) => warn!("Failed to check conversation history: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnsetLastSeenPolicy;
    use crate::store::{MemoryTimestampStore, TimestampStore, UserId, HISTORY_LAST_VISIT};
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeHistory {
        timestamps: Mutex<Vec<i64>>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeHistory {
        fn new(timestamps: Vec<i64>) -> Arc<Self> {
            Arc::new(Self {
                timestamps: Mutex::new(timestamps),
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }
    }

    #[async_trait]
    impl ConversationSource for FakeHistory {
        async fn conversation_timestamps(&self) -> Result<Vec<i64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("backend down"));
            }
            Ok(self.timestamps.lock().unwrap().clone())
        }
    }

    fn tracker() -> NotificationTracker {
        NotificationTracker::new(
            Arc::new(MemoryTimestampStore::new()),
            UnsetLastSeenPolicy::Epoch,
        )
    }

    #[tokio::test]
    async fn test_check_without_user_skips_fetch() {
        let history = FakeHistory::new(vec![1, 2]);
        let checker =
            HistoryNotificationChecker::new(history.clone(), tracker(), Duration::ZERO);

        assert_eq!(checker.check().await.unwrap(), 0);
        assert_eq!(history.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_check_error_propagates() {
        let history = Arc::new(FakeHistory {
            timestamps: Mutex::new(vec![]),
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let tracker = tracker();
        tracker.switch_user(Some(UserId::from("a"))).await;
        let checker = HistoryNotificationChecker::new(history, tracker, Duration::ZERO);

        assert!(checker.check().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_checker_follows_refreshes() {
        let history = FakeHistory::new(vec![1, 2]);
        let tracker = tracker();
        tracker.switch_user(Some(UserId::from("a"))).await;

        let bus = RefreshBus::new();
        let cancel = CancellationToken::new();
        let handle = HistoryNotificationChecker::new(
            history.clone(),
            tracker.clone(),
            Duration::from_secs(1),
        )
        .spawn(&bus, cancel.clone());

        // Initial check after the settle delay.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(history.calls.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(history.calls.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.unread_count().await, 2);

        history.timestamps.lock().unwrap().push(3);
        bus.publish();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(history.calls.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.unread_count().await, 3);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_switch_triggers_recheck() {
        let history = FakeHistory::new(vec![20, 30, 40]);
        let store = Arc::new(MemoryTimestampStore::new());
        let tracker = NotificationTracker::new(store.clone(), UnsetLastSeenPolicy::Epoch);
        let a = UserId::from("a");
        let b = UserId::from("b");
        store.set(&a, HISTORY_LAST_VISIT, 25).await.unwrap();
        store.set(&b, HISTORY_LAST_VISIT, 10).await.unwrap();
        tracker.switch_user(Some(a)).await;

        let bus = RefreshBus::new();
        let cancel = CancellationToken::new();
        let handle = HistoryNotificationChecker::new(
            history.clone(),
            tracker.clone(),
            Duration::from_secs(1),
        )
        .spawn(&bus, cancel.clone());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(tracker.unread_count().await, 2);

        // No refresh is published; the switch alone must recount.
        tracker.switch_user(Some(b)).await;
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(tracker.unread_count().await, 3);
        assert_eq!(history.calls.load(Ordering::SeqCst), 2);

        tracker.switch_user(None).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(tracker.unread_count().await, 0);
        assert_eq!(history.calls.load(Ordering::SeqCst), 2);

        cancel.cancel();
        handle.await.unwrap();
    }
}
