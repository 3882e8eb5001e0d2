//! Transcription jobs: domain types, submission and polling.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod job_service;

pub use job_service::{
    JobFailure, JobPoller, JobStatusSource, JobSubmitter, PollOutcome, PollSettings,
};

/// Server-side lifecycle of a transcription job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
    /// Any queue state we do not model (delayed, paused, ...). Never terminal.
    #[serde(other)]
    Unknown,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Unknown => "unknown",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Counts of items the backend extracted from the conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedCounts {
    pub tasks: u32,
    pub reminders: u32,
    pub people: u32,
    pub followups: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub participants: Vec<String>,
}

/// Final result of a completed job. Read-only once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptPayload {
    pub transcript_text: String,
    pub detected_language: String,
    pub was_translated: bool,
    pub speaker_count: u32,
    pub derived_counts: DerivedCounts,
    pub conversation: Option<ConversationSummary>,
}

/// One observation of a job, as returned by a status request.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub job_id: String,
    pub state: JobState,
    pub progress: u8,
    pub result: Option<TranscriptPayload>,
    pub failure_reason: Option<String>,
}

impl JobStatus {
    pub fn new(job_id: impl Into<String>, state: JobState, progress: u8) -> Self {
        Self {
            job_id: job_id.into(),
            state,
            progress: progress.min(100),
            result: None,
            failure_reason: None,
        }
    }
}

/// Client-side record of the job attached to a recording session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionJob {
    pub job_id: String,
    pub state: JobState,
    pub progress: u8,
    pub result: Option<TranscriptPayload>,
    pub failure_reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl TranscriptionJob {
    pub fn new(job_id: impl Into<String>, submitted_at: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.into(),
            state: JobState::Waiting,
            progress: 0,
            result: None,
            failure_reason: None,
            submitted_at,
        }
    }

    /// Fold a non-terminal polling observation into the record.
    pub fn observe(&mut self, state: JobState, progress: u8) {
        self.state = state;
        self.progress = progress.min(100);
    }

    pub fn complete(&mut self, payload: TranscriptPayload) {
        self.state = JobState::Completed;
        self.progress = 100;
        self.result = Some(payload);
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.state = JobState::Failed;
        self.failure_reason = Some(reason.into());
    }
}

/// Finalized audio ready for submission.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    /// Shared with the recording session; never copied for the upload.
    pub bytes: Arc<Vec<u8>>,
    pub mime_type: String,
    pub file_name: String,
}

impl AudioUpload {
    pub fn wav(bytes: impl Into<Arc<Vec<u8>>>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: "audio/wav".to_string(),
            file_name: "recording.wav".to_string(),
        }
    }
}

/// Server acknowledgement of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedJob {
    pub job_id: String,
    pub message: Option<String>,
}

/// MIME type for an audio file extension, as accepted by the backend.
pub fn mime_type_for_extension(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "wav" => Some("audio/wav"),
        "mp3" => Some("audio/mpeg"),
        "m4a" => Some("audio/mp4"),
        "flac" => Some("audio/flac"),
        "ogg" => Some("audio/ogg"),
        "opus" => Some("audio/opus"),
        "webm" => Some("audio/webm"),
        _ => None,
    }
}
