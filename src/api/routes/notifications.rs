//! Unread history notifications.

use axum::{
    extract::State,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::api::error::ApiResult;
use crate::notifications::{NotificationState, NotificationTracker};
use crate::store::UserId;

#[derive(Debug, Deserialize)]
pub struct SwitchUserRequest {
    pub user_id: Option<String>,
}

pub fn router(tracker: NotificationTracker) -> Router {
    Router::new()
        .route("/", get(notification_state))
        .route("/read", post(mark_read))
        .route("/user", put(switch_user))
        .with_state(tracker)
}

async fn notification_state(
    State(tracker): State<NotificationTracker>,
) -> ApiResult<Json<NotificationState>> {
    Ok(Json(tracker.state().await?))
}

async fn mark_read(State(tracker): State<NotificationTracker>) -> ApiResult<Json<Value>> {
    let marked_at = tracker.mark_current_as_read().await?;
    Ok(Json(json!({
        "success": marked_at.is_some(),
        "last_seen_at": marked_at,
    })))
}

async fn switch_user(
    State(tracker): State<NotificationTracker>,
    Json(req): Json<SwitchUserRequest>,
) -> ApiResult<Json<NotificationState>> {
    let user = req
        .user_id
        .filter(|id| !id.trim().is_empty())
        .map(UserId::new);
    info!("Switching notification user via API");
    tracker.switch_user(user).await;
    Ok(Json(tracker.state().await?))
}
