use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use super::NotificationState;
use crate::config::UnsetLastSeenPolicy;
use crate::store::{TimestampStore, UserId, HISTORY_LAST_VISIT};

/// Counts conversations newer than the user's last visit.
#[derive(Clone)]
pub struct NotificationTracker {
    store: Arc<dyn TimestampStore>,
    policy: UnsetLastSeenPolicy,
    inner: Arc<Mutex<TrackerState>>,
    user_tx: Arc<watch::Sender<Option<UserId>>>,
}

#[derive(Default)]
struct TrackerState {
    user: Option<UserId>,
    unread: usize,
    /// Bumped whenever the stored last visit or the active user changes, so
    /// a recompute that read the store before that point is not kept.
    generation: u64,
}

/// Number of timestamps strictly newer than `last_seen`.
pub fn count_unread(last_seen: i64, timestamps: &[i64]) -> usize {
    timestamps.iter().filter(|&&ts| ts > last_seen).count()
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl NotificationTracker {
    pub fn new(store: Arc<dyn TimestampStore>, policy: UnsetLastSeenPolicy) -> Self {
        Self {
            store,
            policy,
            inner: Arc::new(Mutex::new(TrackerState::default())),
            user_tx: Arc::new(watch::channel(None).0),
        }
    }

    /// Receiver that changes whenever the active user does.
    pub fn watch_user(&self) -> watch::Receiver<Option<UserId>> {
        self.user_tx.subscribe()
    }

    pub async fn current_user(&self) -> Option<UserId> {
        self.inner.lock().await.user.clone()
    }

    /// Switch the active user. The unread count resets until the next
    /// recompute, which watchers of [`Self::watch_user`] are told to run; the
    /// previous user's stored value is untouched.
    pub async fn switch_user(&self, user: Option<UserId>) {
        let mut state = self.inner.lock().await;
        if state.user != user {
            info!(
                "Notification user switched to {}",
                user.as_ref().map(UserId::as_str).unwrap_or("<none>")
            );
            state.user = user.clone();
            state.unread = 0;
            state.generation += 1;
            self.user_tx.send_replace(user);
        }
    }

    /// Stored last-seen value for `user`, epoch zero when unset.
    pub async fn last_seen(&self, user: &UserId) -> Result<i64> {
        Ok(self
            .store
            .get(user, HISTORY_LAST_VISIT)
            .await?
            .unwrap_or(0))
    }

    /// Recount unread entities for the active user. Without a user the count
    /// is zero. When the user or their last visit changed while the store was
    /// being read, the stale count is dropped and the current one returned.
    pub async fn recompute_unread(&self, timestamps: &[i64]) -> Result<usize> {
        let (user, generation) = {
            let state = self.inner.lock().await;
            match &state.user {
                Some(user) => (user.clone(), state.generation),
                None => return Ok(0),
            }
        };

        let last_seen = match self.store.get(&user, HISTORY_LAST_VISIT).await? {
            Some(value) => value,
            None => match self.policy {
                UnsetLastSeenPolicy::Baseline => {
                    let now = now_millis();
                    self.store.set(&user, HISTORY_LAST_VISIT, now).await?;
                    debug!("Stored initial last visit {} for {}", now, user);
                    now
                }
                UnsetLastSeenPolicy::Epoch => 0,
            },
        };

        let unread = count_unread(last_seen, timestamps);

        let mut state = self.inner.lock().await;
        if state.generation != generation {
            debug!("Discarding stale unread count {} for {}", unread, user);
            return Ok(state.unread);
        }
        state.unread = unread;
        debug!("{} unread of {} for {}", unread, timestamps.len(), user);
        Ok(unread)
    }

    /// Record "now" as the last visit for `user`.
    pub async fn mark_as_read(&self, user: &UserId) -> Result<i64> {
        let now = now_millis();
        self.store.set(user, HISTORY_LAST_VISIT, now).await?;

        let mut state = self.inner.lock().await;
        if state.user.as_ref() == Some(user) {
            state.unread = 0;
            state.generation += 1;
        }
        info!("History marked as read for {}", user);
        Ok(now)
    }

    /// Mark the active user's history as read. No-op without a user.
    pub async fn mark_current_as_read(&self) -> Result<Option<i64>> {
        match self.current_user().await {
            Some(user) => Ok(Some(self.mark_as_read(&user).await?)),
            None => Ok(None),
        }
    }

    /// Forget the stored last visit for `user`.
    pub async fn reset(&self, user: &UserId) -> Result<bool> {
        let removed = self.store.remove(user, HISTORY_LAST_VISIT).await?;
        if removed {
            let mut state = self.inner.lock().await;
            if state.user.as_ref() == Some(user) {
                state.generation += 1;
            }
            info!("Last visit forgotten for {}", user);
        }
        Ok(removed)
    }

    pub async fn unread_count(&self) -> usize {
        self.inner.lock().await.unread
    }

    pub async fn state(&self) -> Result<NotificationState> {
        let (user, unread) = {
            let state = self.inner.lock().await;
            (state.user.clone(), state.unread)
        };
        let last_seen_at = match &user {
            Some(user) => self.store.get(user, HISTORY_LAST_VISIT).await?,
            None => None,
        };
        Ok(NotificationState {
            user_id: user,
            last_seen_at,
            unread_count: unread,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTimestampStore;
    use async_trait::async_trait;
    use tokio::sync::{oneshot, Notify};

    /// Store whose next `get` parks until released.
    struct GatedStore {
        inner: MemoryTimestampStore,
        gate: std::sync::Mutex<Option<oneshot::Receiver<()>>>,
        entered: Notify,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                inner: MemoryTimestampStore::new(),
                gate: std::sync::Mutex::new(None),
                entered: Notify::new(),
            }
        }

        fn hold_next_get(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            *self.gate.lock().unwrap() = Some(rx);
            tx
        }
    }

    #[async_trait]
    impl TimestampStore for GatedStore {
        async fn get(&self, user: &UserId, name: &str) -> Result<Option<i64>> {
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                self.entered.notify_one();
                let _ = gate.await;
            }
            self.inner.get(user, name).await
        }

        async fn set(&self, user: &UserId, name: &str, value: i64) -> Result<()> {
            self.inner.set(user, name, value).await
        }

        async fn remove(&self, user: &UserId, name: &str) -> Result<bool> {
            self.inner.remove(user, name).await
        }
    }

    fn tracker(policy: UnsetLastSeenPolicy) -> (NotificationTracker, Arc<MemoryTimestampStore>) {
        let store = Arc::new(MemoryTimestampStore::new());
        (NotificationTracker::new(store.clone(), policy), store)
    }

    #[test]
    fn test_count_unread_is_strict() {
        let t = 1_000;
        assert_eq!(count_unread(t, &[t - 1, t, t + 1, t + 5]), 2);
        assert_eq!(count_unread(t, &[]), 0);
    }

    #[tokio::test]
    async fn test_recompute_against_stored_value() {
        let (tracker, store) = tracker(UnsetLastSeenPolicy::Baseline);
        let user = UserId::from("a");
        let t = 1_700_000_000_000;
        store.set(&user, HISTORY_LAST_VISIT, t).await.unwrap();

        tracker.switch_user(Some(user)).await;
        let unread = tracker.recompute_unread(&[t - 1, t, t + 1, t + 5]).await.unwrap();
        assert_eq!(unread, 2);
        assert_eq!(tracker.unread_count().await, 2);
    }

    #[tokio::test]
    async fn test_mark_as_read_clears_count() {
        let (tracker, _) = tracker(UnsetLastSeenPolicy::Epoch);
        let user = UserId::from("a");
        tracker.switch_user(Some(user.clone())).await;

        let past = now_millis() - 10_000;
        assert_eq!(tracker.recompute_unread(&[past, past + 1]).await.unwrap(), 2);

        let marked = tracker.mark_as_read(&user).await.unwrap();
        assert_eq!(tracker.unread_count().await, 0);
        assert_eq!(tracker.last_seen(&user).await.unwrap(), marked);
        assert_eq!(tracker.recompute_unread(&[past, marked]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let (tracker, _) = tracker(UnsetLastSeenPolicy::Epoch);
        let a = UserId::from("a");
        let b = UserId::from("b");

        tracker.mark_as_read(&a).await.unwrap();
        assert_eq!(tracker.last_seen(&b).await.unwrap(), 0);

        tracker.switch_user(Some(b.clone())).await;
        assert_eq!(tracker.recompute_unread(&[1, 2, 3]).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_epoch_policy_counts_everything() {
        let (tracker, store) = tracker(UnsetLastSeenPolicy::Epoch);
        let user = UserId::from("a");
        tracker.switch_user(Some(user.clone())).await;

        assert_eq!(tracker.recompute_unread(&[1, 2]).await.unwrap(), 2);
        assert_eq!(store.get(&user, HISTORY_LAST_VISIT).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_baseline_policy_stores_now() {
        let (tracker, store) = tracker(UnsetLastSeenPolicy::Baseline);
        let user = UserId::from("a");
        tracker.switch_user(Some(user.clone())).await;

        let past = now_millis() - 1_000;
        assert_eq!(tracker.recompute_unread(&[past]).await.unwrap(), 0);
        assert!(store.get(&user, HISTORY_LAST_VISIT).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_no_user_means_nothing_unread() {
        let (tracker, _) = tracker(UnsetLastSeenPolicy::Epoch);
        assert_eq!(tracker.recompute_unread(&[1, 2, 3]).await.unwrap(), 0);
        assert_eq!(tracker.mark_current_as_read().await.unwrap(), None);

        let state = tracker.state().await.unwrap();
        assert!(state.user_id.is_none());
        assert_eq!(state.unread_count, 0);
    }

    #[tokio::test]
    async fn test_reset_forgets_last_visit() {
        let (tracker, _) = tracker(UnsetLastSeenPolicy::Epoch);
        let user = UserId::from("a");
        tracker.mark_as_read(&user).await.unwrap();

        assert!(tracker.reset(&user).await.unwrap());
        assert_eq!(tracker.last_seen(&user).await.unwrap(), 0);
        assert!(!tracker.reset(&user).await.unwrap());
    }

    #[tokio::test]
    async fn test_switch_user_resets_count() {
        let (tracker, _) = tracker(UnsetLastSeenPolicy::Epoch);
        tracker.switch_user(Some(UserId::from("a"))).await;
        tracker.recompute_unread(&[1, 2]).await.unwrap();
        assert_eq!(tracker.unread_count().await, 2);

        let mut users = tracker.watch_user();
        tracker.switch_user(Some(UserId::from("b"))).await;
        assert_eq!(tracker.unread_count().await, 0);
        assert!(users.has_changed().unwrap());
        assert_eq!(*users.borrow_and_update(), Some(UserId::from("b")));

        // Same user again is not a change.
        tracker.switch_user(Some(UserId::from("b"))).await;
        assert!(!users.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_mark_as_read_during_recompute_wins() {
        let store = Arc::new(GatedStore::new());
        let tracker = NotificationTracker::new(store.clone(), UnsetLastSeenPolicy::Epoch);
        let user = UserId::from("a");
        tracker.switch_user(Some(user.clone())).await;

        let release = store.hold_next_get();
        let past = now_millis() - 10_000;
        let recompute = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.recompute_unread(&[past, past + 1]).await })
        };
        store.entered.notified().await;

        tracker.mark_as_read(&user).await.unwrap();
        release.send(()).unwrap();

        assert_eq!(recompute.await.unwrap().unwrap(), 0);
        assert_eq!(tracker.unread_count().await, 0);
    }

    #[tokio::test]
    async fn test_switch_during_recompute_keeps_new_user_count() {
        let store = Arc::new(GatedStore::new());
        let tracker = NotificationTracker::new(store.clone(), UnsetLastSeenPolicy::Epoch);
        tracker.switch_user(Some(UserId::from("a"))).await;

        let release = store.hold_next_get();
        let recompute = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.recompute_unread(&[1, 2, 3]).await })
        };
        store.entered.notified().await;

        tracker.switch_user(Some(UserId::from("b"))).await;
        release.send(()).unwrap();

        recompute.await.unwrap().unwrap();
        assert_eq!(tracker.unread_count().await, 0);
    }
}
