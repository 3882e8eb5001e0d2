//! Recording control endpoints.
//!
//! Commands are forwarded to the service loop that owns the controller; each
//! one carries a reply channel so the response reflects the actual outcome.

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use crate::api::error::{ApiError, ApiResult};
use crate::recording::{RecordingError, RecordingPhase, RecordingStatusHandle};

pub type CommandReply = Result<RecordingPhase, RecordingError>;

#[derive(Debug)]
pub enum ApiCommand {
    Toggle(oneshot::Sender<CommandReply>),
    Start {
        force: bool,
        reply: oneshot::Sender<CommandReply>,
    },
    Stop(oneshot::Sender<CommandReply>),
    Acknowledge(oneshot::Sender<CommandReply>),
}

#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    /// Abandon an in-flight upload or transcription first.
    #[serde(default)]
    pub force: bool,
}

#[derive(Clone)]
pub struct RecordingApiState {
    pub tx: mpsc::Sender<ApiCommand>,
    pub status: RecordingStatusHandle,
}

pub fn router(state: RecordingApiState) -> Router {
    Router::new()
        .route("/toggle", post(toggle_recording))
        .route("/recording/start", post(start_recording))
        .route("/recording/stop", post(stop_recording))
        .route("/recording/acknowledge", post(acknowledge_recording))
        .route("/status", get(recording_status))
        .with_state(state)
}

async fn dispatch<F>(state: &RecordingApiState, make: F) -> ApiResult<Json<Value>>
where
    F: FnOnce(oneshot::Sender<CommandReply>) -> ApiCommand,
{
    let (reply_tx, reply_rx) = oneshot::channel();
    let command = make(reply_tx);
    info!("Recording command received via API: {:?}", command);

    if let Err(e) = state.tx.send(command).await {
        error!("Failed to send recording command: {}", e);
        return Err(ApiError::unavailable("Recording service is not running"));
    }

    let phase = reply_rx
        .await
        .map_err(|_| ApiError::unavailable("Recording service dropped the command"))??;

    let status = state.status.get().await;
    Ok(Json(json!({
        "success": true,
        "phase": phase.as_str(),
        "session_id": status.state.session().map(|s| s.id),
        "message": format!("Recording {}", phase.as_str()),
    })))
}

async fn toggle_recording(State(state): State<RecordingApiState>) -> ApiResult<Json<Value>> {
    dispatch(&state, ApiCommand::Toggle).await
}

async fn start_recording(
    State(state): State<RecordingApiState>,
    body: Option<Json<StartRequest>>,
) -> ApiResult<Json<Value>> {
    let force = body.map(|Json(req)| req.force).unwrap_or(false);
    dispatch(&state, |reply| ApiCommand::Start { force, reply }).await
}

async fn stop_recording(State(state): State<RecordingApiState>) -> ApiResult<Json<Value>> {
    dispatch(&state, ApiCommand::Stop).await
}

async fn acknowledge_recording(State(state): State<RecordingApiState>) -> ApiResult<Json<Value>> {
    dispatch(&state, ApiCommand::Acknowledge).await
}

/// Current phase, session, job progress and the last result or error.
async fn recording_status(State(state): State<RecordingApiState>) -> Json<Value> {
    let status = state.status.get().await;
    let phase = status.phase();

    let session = status.state.session().map(|session| {
        json!({
            "id": session.id,
            "started_at": session.started_at,
            "captured_duration_ms": session.captured_duration_ms,
            "mime_type": session.mime_type,
        })
    });

    let job = status.state.job().map(|job| {
        json!({
            "job_id": job.job_id,
            "state": job.state.as_str(),
            "progress": job.progress,
            "failure_reason": job.failure_reason,
            "submitted_at": job.submitted_at,
        })
    });

    let last_completed_job = status.last_completed.as_ref().map(|job| {
        json!({
            "job_id": job.job_id,
            "submitted_at": job.submitted_at,
            "result": job.result,
        })
    });

    Json(json!({
        "recording": phase == RecordingPhase::Recording,
        "phase": phase.as_str(),
        "session": session,
        "job": job,
        "last_completed_job": last_completed_job,
        "last_error": status.last_error.as_ref().map(|e| e.to_string()),
        "last_error_kind": status.last_error.as_ref().map(|e| e.kind()),
    }))
}
