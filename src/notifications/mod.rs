//! Per-user unread tracking for the conversation history.

pub mod checker;
pub mod tracker;

use serde::Serialize;

use crate::store::UserId;

pub use checker::{ConversationSource, HistoryNotificationChecker};
pub use tracker::NotificationTracker;

/// Snapshot of the unread badge for the active user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationState {
    pub user_id: Option<UserId>,
    /// Epoch milliseconds, `None` when nothing has been stored yet.
    pub last_seen_at: Option<i64>,
    pub unread_count: usize,
}
