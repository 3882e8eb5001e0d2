//! CLI handler for the unread history count.

use anyhow::{anyhow, Result};
use std::sync::Arc;

use crate::app::open_store;
use crate::cli::args::NotificationsCliArgs;
use crate::config::Config;
use crate::notifications::{ConversationSource, NotificationTracker};
use crate::remote::ApiClient;
use crate::store::UserId;

pub async fn handle_notifications_command(args: NotificationsCliArgs) -> Result<()> {
    let config = Config::load()?;
    let user = args
        .user
        .or_else(|| config.api.user_id.clone())
        .map(UserId::new)
        .ok_or_else(|| anyhow!("No user given; pass --user or set api.user_id in the config"))?;

    let client = Arc::new(ApiClient::from_config(&config.api));
    let tracker = NotificationTracker::new(open_store(), config.notifications.unset_last_seen);
    tracker.switch_user(Some(user.clone())).await;

    if args.reset && tracker.reset(&user).await? {
        println!("Forgot last visit for {}", user);
    }

    let timestamps = client.conversation_timestamps().await?;
    let unread = tracker.recompute_unread(&timestamps).await?;
    let last_seen = tracker.last_seen(&user).await?;

    println!("User: {}", user);
    println!("Conversations: {}", timestamps.len());
    println!("Unread: {}", unread);
    if last_seen > 0 {
        if let Some(at) = chrono::DateTime::from_timestamp_millis(last_seen) {
            println!("Last visit: {}", at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"));
        }
    } else {
        println!("Last visit: never");
    }

    if args.mark_read {
        tracker.mark_as_read(&user).await?;
        println!("Marked {} conversation(s) as read", unread);
    }

    Ok(())
}
