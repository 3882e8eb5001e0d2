use thiserror::Error;
use uuid::Uuid;

use super::state::RecordingPhase;
use crate::audio::CaptureError;
use crate::transcription::JobFailure;

/// Rejected state machine event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTransition {
    #[error("cannot {event} while {from}")]
    Phase {
        from: RecordingPhase,
        event: &'static str,
    },
    #[error("session {0} is no longer current")]
    StaleSession(Uuid),
}

/// Everything that can go wrong with a recording. None of these are fatal;
/// the controller always ends up in `Idle` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordingError {
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),
    #[error("recording too short ({duration_ms} ms, minimum is {min_ms} ms)")]
    CaptureTooShort { duration_ms: u64, min_ms: u64 },
    #[error("no audio was captured")]
    EmptyCapture,
    #[error("audio capture failed: {0}")]
    Capture(String),
    #[error("upload failed: {0}")]
    SubmissionError(String),
    #[error("transcription timed out after {0} seconds")]
    PollTimeout(u64),
    #[error("transcription failed: {0}")]
    JobFailed(String),
    #[error("gave up after {attempts} failed status checks: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
    #[error("recorder is busy ({0})")]
    Busy(RecordingPhase),
    #[error("not recording")]
    NotRecording,
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

impl RecordingError {
    /// Stable machine-readable name, used by the control API.
    pub fn kind(&self) -> &'static str {
        match self {
            RecordingError::PermissionDenied(_) => "permission_denied",
            RecordingError::CaptureTooShort { .. } => "capture_too_short",
            RecordingError::EmptyCapture => "empty_capture",
            RecordingError::Capture(_) => "capture",
            RecordingError::SubmissionError(_) => "submission_error",
            RecordingError::PollTimeout(_) => "poll_timeout",
            RecordingError::JobFailed(_) => "job_failed",
            RecordingError::RetriesExhausted { .. } => "retries_exhausted",
            RecordingError::Busy(_) => "busy",
            RecordingError::NotRecording => "not_recording",
            RecordingError::Transition(_) => "invalid_transition",
        }
    }
}

impl From<CaptureError> for RecordingError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied(reason) => RecordingError::PermissionDenied(reason),
            other => RecordingError::Capture(other.to_string()),
        }
    }
}

impl From<JobFailure> for RecordingError {
    fn from(failure: JobFailure) -> Self {
        match failure {
            JobFailure::Timeout(after) => RecordingError::PollTimeout(after.as_secs()),
            JobFailure::Reported(reason) => RecordingError::JobFailed(reason),
            JobFailure::RetriesExhausted {
                attempts,
                last_error,
            } => RecordingError::RetriesExhausted {
                attempts,
                last_error,
            },
            JobFailure::MissingResult => {
                RecordingError::JobFailed("job completed without a result".to_string())
            }
        }
    }
}
