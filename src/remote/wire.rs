//! JSON shapes exchanged with the backend.

use serde::Deserialize;
use serde_json::Value;

use crate::transcription::{
    ConversationSummary, DerivedCounts, JobState, JobStatus, TranscriptPayload,
};

/// Response from submitting audio.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Polling response for a single job.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: String,
    pub state: JobState,
    /// A number in 0..=100, or an arbitrary object for custom progress.
    #[serde(default)]
    pub progress: Value,
    #[serde(default)]
    pub result: Option<TranscriptResponse>,
    #[serde(default)]
    pub failed_reason: Option<String>,
}

impl JobStatusResponse {
    pub fn progress_percent(&self) -> u8 {
        self.progress
            .as_f64()
            .map(|p| p.clamp(0.0, 100.0).round() as u8)
            .unwrap_or(0)
    }
}

impl From<JobStatusResponse> for JobStatus {
    fn from(response: JobStatusResponse) -> Self {
        let progress = response.progress_percent();
        Self {
            job_id: response.job_id,
            state: response.state,
            progress,
            result: response.result.map(TranscriptPayload::from),
            failure_reason: response.failed_reason,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TranscriptResponse {
    pub transcript: String,
    #[serde(default)]
    pub metadata: TranscriptMetadata,
    #[serde(default)]
    pub conversation: Option<ConversationInfo>,
    #[serde(default)]
    pub extracted: ExtractedCounts,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptMetadata {
    pub detected_language: String,
    pub was_translated: bool,
    pub num_speakers: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConversationInfo {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub participants: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExtractedCounts {
    pub tasks: u32,
    pub reminders: u32,
    pub people: u32,
    pub followups: u32,
}

impl From<TranscriptResponse> for TranscriptPayload {
    fn from(response: TranscriptResponse) -> Self {
        Self {
            transcript_text: response.transcript,
            detected_language: response.metadata.detected_language,
            was_translated: response.metadata.was_translated,
            speaker_count: response.metadata.num_speakers,
            derived_counts: DerivedCounts {
                tasks: response.extracted.tasks,
                reminders: response.extracted.reminders,
                people: response.extracted.people,
                followups: response.extracted.followups,
            },
            conversation: response.conversation.map(|c| ConversationSummary {
                id: c.id,
                title: c.title,
                summary: c.summary,
                participants: c.participants,
            }),
        }
    }
}

/// Entry of the conversation history list. Only the fields the unread
/// tracker needs are modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationRecord {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub date: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ConversationsResponse {
    List(Vec<ConversationRecord>),
    Page {
        #[serde(default)]
        conversations: Vec<ConversationRecord>,
    },
}

impl ConversationsResponse {
    pub fn into_records(self) -> Vec<ConversationRecord> {
        match self {
            ConversationsResponse::List(records) => records,
            ConversationsResponse::Page { conversations } => conversations,
        }
    }
}

/// Strip the optional `{ "success": ..., "data": ... }` envelope.
pub fn extract_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("success") && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_data_unwraps_envelope() {
        let wrapped = json!({ "success": true, "data": { "jobId": "abc" } });
        assert_eq!(extract_data(wrapped), json!({ "jobId": "abc" }));

        let bare = json!({ "jobId": "abc" });
        assert_eq!(extract_data(bare.clone()), bare);

        // `success` alone is not an envelope
        let partial = json!({ "success": true, "jobId": "abc" });
        assert_eq!(extract_data(partial.clone()), partial);
    }

    #[test]
    fn test_job_status_with_result() {
        let body = json!({
            "jobId": "42",
            "state": "completed",
            "progress": 100,
            "result": {
                "transcript": "Remind me to call Ana tomorrow",
                "metadata": {
                    "detectedLanguage": "es",
                    "wasTranslated": true,
                    "numSpeakers": 2,
                    "filename": "recording.wav"
                },
                "conversation": {
                    "id": "c1",
                    "title": "Call with Ana",
                    "summary": "Planning",
                    "participants": ["Ana"]
                },
                "extracted": { "tasks": 1, "reminders": 2, "people": 1, "followups": 0 }
            },
            "finishedOn": 1700000000000i64
        });

        let response: JobStatusResponse = serde_json::from_value(body).unwrap();
        let status = JobStatus::from(response);
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.progress, 100);

        let payload = status.result.unwrap();
        assert_eq!(payload.detected_language, "es");
        assert!(payload.was_translated);
        assert_eq!(payload.speaker_count, 2);
        assert_eq!(payload.derived_counts.reminders, 2);
        assert_eq!(payload.conversation.unwrap().title, "Call with Ana");
    }

    #[test]
    fn test_job_status_progress_shapes() {
        let response: JobStatusResponse =
            serde_json::from_value(json!({ "jobId": "1", "state": "active", "progress": 37.6 }))
                .unwrap();
        assert_eq!(response.progress_percent(), 38);

        let response: JobStatusResponse = serde_json::from_value(
            json!({ "jobId": "1", "state": "active", "progress": { "stage": "diarizing" } }),
        )
        .unwrap();
        assert_eq!(response.progress_percent(), 0);

        let response: JobStatusResponse =
            serde_json::from_value(json!({ "jobId": "1", "state": "waiting" })).unwrap();
        assert_eq!(response.progress_percent(), 0);
    }

    #[test]
    fn test_failed_job_reason() {
        let response: JobStatusResponse = serde_json::from_value(json!({
            "jobId": "9",
            "state": "failed",
            "progress": 20,
            "failedReason": "ffmpeg conversion failed",
            "processedOn": 1700000000000i64,
            "attemptsMade": 3,
            "timestamp": 1699999999000i64
        }))
        .unwrap();
        let status = JobStatus::from(response);
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(
            status.failure_reason.as_deref(),
            Some("ffmpeg conversion failed")
        );
    }

    #[test]
    fn test_conversations_shapes() {
        let list: ConversationsResponse = serde_json::from_value(json!([
            { "_id": "a", "date": "2025-03-01T10:00:00Z" },
            { "id": "b", "title": "Standup", "date": "2025-03-02T10:00:00Z" }
        ]))
        .unwrap();
        let records = list.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id.as_deref(), Some("a"));

        let page: ConversationsResponse = serde_json::from_value(json!({
            "conversations": [{ "id": "c", "date": "2025-03-03T10:00:00Z" }],
            "pagination": { "currentPage": 1, "totalPages": 1, "totalItems": 1, "itemsPerPage": 20 }
        }))
        .unwrap();
        assert_eq!(page.into_records().len(), 1);
    }
}
