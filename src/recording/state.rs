//! The recording state machine: states, events and the single transition
//! function.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::error::{InvalidTransition, RecordingError};
use crate::transcription::{JobState, TranscriptPayload, TranscriptionJob};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingPhase {
    Idle,
    Recording,
    Stopping,
    Uploading,
    Processing,
    Succeeded,
    Failed,
}

impl RecordingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingPhase::Idle => "idle",
            RecordingPhase::Recording => "recording",
            RecordingPhase::Stopping => "stopping",
            RecordingPhase::Uploading => "uploading",
            RecordingPhase::Processing => "processing",
            RecordingPhase::Succeeded => "succeeded",
            RecordingPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordingPhase::Succeeded | RecordingPhase::Failed)
    }

    /// A new recording may start from here.
    pub fn can_start(&self) -> bool {
        matches!(self, RecordingPhase::Idle) || self.is_terminal()
    }
}

impl fmt::Display for RecordingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One capture-to-transcript attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub captured_duration_ms: Option<u64>,
    /// Encoded audio, held only while it is being uploaded.
    pub audio: Option<Arc<Vec<u8>>>,
    pub mime_type: Option<String>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            captured_duration_ms: None,
            audio: None,
            mime_type: None,
        }
    }

    fn without_audio(&self) -> Self {
        Self {
            audio: None,
            ..self.clone()
        }
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Recording {
        session: RecordingSession,
    },
    Stopping {
        session: RecordingSession,
    },
    Uploading {
        session: RecordingSession,
    },
    Processing {
        session: RecordingSession,
        job: TranscriptionJob,
    },
    Succeeded {
        session: RecordingSession,
        job: TranscriptionJob,
    },
    Failed {
        session: RecordingSession,
        job: Option<TranscriptionJob>,
        error: RecordingError,
    },
}

#[derive(Debug, Clone)]
pub enum RecordingEvent {
    /// Microphone acquired.
    Start(RecordingSession),
    Stop,
    /// Capture flushed and long enough to upload.
    Finalized {
        duration_ms: u64,
        audio: Arc<Vec<u8>>,
        mime_type: String,
    },
    /// Capture ended without anything worth uploading.
    Discarded,
    Submitted(TranscriptionJob),
    SubmitFailed(RecordingError),
    Progress { state: JobState, progress: u8 },
    Completed(TranscriptPayload),
    JobFailed(RecordingError),
    Acknowledge,
    /// Teardown or forced restart; always lands in `Idle`.
    Abandon,
}

impl RecordingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RecordingEvent::Start(_) => "start",
            RecordingEvent::Stop => "stop",
            RecordingEvent::Finalized { .. } => "finalize",
            RecordingEvent::Discarded => "discard",
            RecordingEvent::Submitted(_) => "submit",
            RecordingEvent::SubmitFailed(_) => "fail submission",
            RecordingEvent::Progress { .. } => "report progress",
            RecordingEvent::Completed(_) => "complete",
            RecordingEvent::JobFailed(_) => "fail job",
            RecordingEvent::Acknowledge => "acknowledge",
            RecordingEvent::Abandon => "abandon",
        }
    }
}

impl RecordingState {
    pub fn phase(&self) -> RecordingPhase {
        match self {
            RecordingState::Idle => RecordingPhase::Idle,
            RecordingState::Recording { .. } => RecordingPhase::Recording,
            RecordingState::Stopping { .. } => RecordingPhase::Stopping,
            RecordingState::Uploading { .. } => RecordingPhase::Uploading,
            RecordingState::Processing { .. } => RecordingPhase::Processing,
            RecordingState::Succeeded { .. } => RecordingPhase::Succeeded,
            RecordingState::Failed { .. } => RecordingPhase::Failed,
        }
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        match self {
            RecordingState::Idle => None,
            RecordingState::Recording { session }
            | RecordingState::Stopping { session }
            | RecordingState::Uploading { session }
            | RecordingState::Processing { session, .. }
            | RecordingState::Succeeded { session, .. }
            | RecordingState::Failed { session, .. } => Some(session),
        }
    }

    pub fn job(&self) -> Option<&TranscriptionJob> {
        match self {
            RecordingState::Processing { job, .. } | RecordingState::Succeeded { job, .. } => {
                Some(job)
            }
            RecordingState::Failed { job, .. } => job.as_ref(),
            _ => None,
        }
    }

    /// Compute the state that follows `event`, or refuse it.
    pub fn apply(&self, event: RecordingEvent) -> Result<RecordingState, InvalidTransition> {
        use RecordingEvent as E;
        use RecordingState as S;

        let rejected = InvalidTransition::Phase {
            from: self.phase(),
            event: event.name(),
        };

        let next = match (self, event) {
            (_, E::Abandon) => S::Idle,

            (S::Idle | S::Succeeded { .. } | S::Failed { .. }, E::Start(session)) => {
                S::Recording { session }
            }

            (S::Recording { session }, E::Stop) => S::Stopping {
                session: session.clone(),
            },

            (
                S::Stopping { session },
                E::Finalized {
                    duration_ms,
                    audio,
                    mime_type,
                },
            ) => {
                let mut session = session.clone();
                session.captured_duration_ms = Some(duration_ms);
                session.audio = Some(audio);
                session.mime_type = Some(mime_type);
                S::Uploading { session }
            }
            (S::Stopping { .. }, E::Discarded) => S::Idle,

            (S::Uploading { session }, E::Submitted(job)) => S::Processing {
                session: session.without_audio(),
                job,
            },
            (S::Uploading { session }, E::SubmitFailed(error)) => S::Failed {
                session: session.without_audio(),
                job: None,
                error,
            },

            (S::Processing { session, job }, E::Progress { state, progress }) => {
                let mut job = job.clone();
                job.observe(state, progress);
                S::Processing {
                    session: session.clone(),
                    job,
                }
            }
            (S::Processing { session, job }, E::Completed(payload)) => {
                let mut job = job.clone();
                job.complete(payload);
                S::Succeeded {
                    session: session.clone(),
                    job,
                }
            }
            (S::Processing { session, job }, E::JobFailed(error)) => {
                let mut job = job.clone();
                job.fail(error.to_string());
                S::Failed {
                    session: session.clone(),
                    job: Some(job),
                    error,
                }
            }

            (S::Succeeded { .. } | S::Failed { .. }, E::Acknowledge) => S::Idle,

            _ => return Err(rejected),
        };

        Ok(next)
    }
}
