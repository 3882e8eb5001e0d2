//! HTTP client for the Maki backend.
//!
//! Covers the transcription job endpoints and the conversation history list.
//! Responses may arrive wrapped in a `{ success, data }` envelope; both shapes
//! are accepted.

pub mod wire;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::config::ApiConfig;
use crate::notifications::ConversationSource;
use crate::transcription::{AudioUpload, JobStatus, JobStatusSource, JobSubmitter, SubmittedJob};

pub use wire::{extract_data, ConversationRecord, JobStatusResponse, SubmitJobResponse};

/// Client for the backend REST API.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new client with the given base URL (e.g. `http://host/api/v1`).
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn from_config(config: &ApiConfig) -> Self {
        Self::new(&config.base_url).with_token(config.token.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Upload audio for transcription, returns the queued job.
    pub async fn submit_audio(&self, upload: &AudioUpload) -> Result<SubmitJobResponse> {
        let url = format!("{}/transcribe", self.base_url);

        let form = Form::new().part(
            "file",
            Part::stream_with_length(audio_body(&upload.bytes), upload.bytes.len() as u64)
                .file_name(upload.file_name.clone())
                .mime_str(&upload.mime_type)?,
        );

        info!(
            "Uploading {} bytes ({}) to {}",
            upload.bytes.len(),
            upload.mime_type,
            url
        );

        let response = self
            .authorize(self.client.post(&url).multipart(form))
            .send()
            .await
            .context("Failed to submit job")?;

        let data = read_data(response, "Job submission").await?;

        if data.get("transcript").is_some() && data.get("jobId").is_none() {
            bail!("Backend answered with a synchronous transcript; expected a queued job");
        }

        serde_json::from_value(data).context("Failed to parse job submission response")
    }

    /// Get the status of a job (read-only).
    pub async fn get_job_status(&self, job_id: &str) -> Result<JobStatusResponse> {
        let url = format!("{}/transcribe/job/{}", self.base_url, job_id);

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .context("Failed to get job status")?;

        parse_data(response, "Job status").await
    }

    /// List the user's conversation history.
    pub async fn list_conversations(&self) -> Result<Vec<ConversationRecord>> {
        let url = format!("{}/conversations", self.base_url);

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .context("Failed to list conversations")?;

        let page: wire::ConversationsResponse = parse_data(response, "Conversation list").await?;
        Ok(page.into_records())
    }
}

async fn read_data(response: Response, what: &str) -> Result<Value> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(anyhow!("{} failed ({}): {}", what, status, body));
    }

    let value: Value = serde_json::from_str(&body)
        .with_context(|| format!("Failed to parse {} response", what.to_lowercase()))?;
    Ok(extract_data(value))
}

async fn parse_data<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let data = read_data(response, what).await?;
    serde_json::from_value(data)
        .with_context(|| format!("Failed to parse {} response", what.to_lowercase()))
}

/// Parse a conversation date into epoch milliseconds.
///
/// Accepts RFC 3339 and naive ISO timestamps (taken as UTC).
pub fn parse_timestamp_millis(date: &str) -> Option<i64> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(date) {
        return Some(parsed.with_timezone(&Utc).timestamp_millis());
    }
    NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Byte view over a shared audio buffer.
struct SharedAudio(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedAudio {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

/// Stream the buffer into the request without copying it whole.
fn audio_body(bytes: &Arc<Vec<u8>>) -> Body {
    Body::wrap_stream(ReaderStream::new(Cursor::new(SharedAudio(bytes.clone()))))
}

#[async_trait]
impl JobSubmitter for ApiClient {
    async fn submit(&self, upload: AudioUpload) -> Result<SubmittedJob> {
        let response = self.submit_audio(&upload).await?;
        info!("Transcription job submitted: {}", response.job_id);
        Ok(SubmittedJob {
            job_id: response.job_id,
            message: response.message,
        })
    }
}

#[async_trait]
impl JobStatusSource for ApiClient {
    async fn job_status(&self, job_id: &str) -> Result<JobStatus> {
        Ok(self.get_job_status(job_id).await?.into())
    }
}

#[async_trait]
impl ConversationSource for ApiClient {
    async fn conversation_timestamps(&self) -> Result<Vec<i64>> {
        let records = self.list_conversations().await?;
        let total = records.len();
        let timestamps: Vec<i64> = records
            .iter()
            .filter_map(|record| parse_timestamp_millis(&record.date))
            .collect();

        if timestamps.len() != total {
            debug!(
                "Skipped {} conversations with unparseable dates",
                total - timestamps.len()
            );
        }
        Ok(timestamps)
    }
}
