//! Transcription job submission and polling.
//!
//! Submission is a single request. Polling repeats a status request on a fixed
//! interval until the job is terminal, the wall-clock budget runs out, or the
//! caller cancels. Nothing here retries a submission.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{AudioUpload, JobState, JobStatus, SubmittedJob, TranscriptPayload};
use crate::config::PollingConfig;

/// Hands finalized audio to the remote worker queue.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    async fn submit(&self, upload: AudioUpload) -> Result<SubmittedJob>;
}

/// Reads the current status of a job. Must not mutate server-side state.
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    async fn job_status(&self, job_id: &str) -> Result<JobStatus>;
}

/// Upper bound on the polling budget.
pub const MAX_POLL_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
    pub max_consecutive_errors: u32,
    pub max_backoff: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollSettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms.max(1)),
            timeout: Duration::from_secs(config.timeout_secs).min(MAX_POLL_TIMEOUT),
            max_consecutive_errors: config.max_consecutive_errors.max(1),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Why a job did not produce a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFailure {
    /// No terminal state within the polling budget.
    Timeout(Duration),
    /// The server marked the job failed.
    Reported(String),
    /// Too many consecutive status requests failed.
    RetriesExhausted { attempts: u32, last_error: String },
    /// The server reported completion without a result.
    MissingResult,
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobFailure::Timeout(after) => {
                write!(f, "Timeout: no result after {} seconds", after.as_secs())
            }
            JobFailure::Reported(reason) => write!(f, "{}", reason),
            JobFailure::RetriesExhausted {
                attempts,
                last_error,
            } => write!(
                f,
                "Status checks failed {} times in a row: {}",
                attempts, last_error
            ),
            JobFailure::MissingResult => write!(f, "Job completed but no result available"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(TranscriptPayload),
    Failed(JobFailure),
    Cancelled,
}

pub struct JobPoller {
    source: Arc<dyn JobStatusSource>,
    settings: PollSettings,
}

impl JobPoller {
    pub fn new(source: Arc<dyn JobStatusSource>, settings: PollSettings) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Poll `job_id` until it reaches a terminal state.
    ///
    /// `on_update` sees every non-terminal observation whose state or
    /// progress differs from the previous one. The terminal observation is
    /// returned exactly once. After `cancel` fires no further request is
    /// issued.
    pub async fn poll<F, Fut>(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
        mut on_update: F,
    ) -> PollOutcome
    where
        F: FnMut(JobStatus) -> Fut,
        Fut: Future<Output = ()>,
    {
        let started = Instant::now();
        let deadline = started
            .checked_add(self.settings.timeout)
            .unwrap_or(started + MAX_POLL_TIMEOUT);
        let mut delay = self.settings.interval;
        let mut consecutive_errors = 0u32;
        let mut last_seen: Option<(JobState, u8)> = None;

        loop {
            if cancel.is_cancelled() {
                return PollOutcome::Cancelled;
            }

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                _ = sleep_until(deadline) => return self.timed_out(job_id),
                response = self.source.job_status(job_id) => response,
            };

            match response {
                Ok(status) => {
                    consecutive_errors = 0;
                    delay = self.settings.interval;

                    if last_seen != Some((status.state, status.progress)) {
                        info!(
                            "Transcription job {} status: {} ({}%)",
                            job_id,
                            status.state.as_str(),
                            status.progress
                        );
                    }

                    match status.state {
                        JobState::Completed => {
                            return match status.result {
                                Some(payload) => {
                                    info!(
                                        "Transcription complete: {} chars",
                                        payload.transcript_text.len()
                                    );
                                    PollOutcome::Completed(payload)
                                }
                                None => PollOutcome::Failed(JobFailure::MissingResult),
                            };
                        }
                        JobState::Failed => {
                            let reason = status
                                .failure_reason
                                .unwrap_or_else(|| "Unknown error".to_string());
                            warn!("Transcription job {} failed: {}", job_id, reason);
                            return PollOutcome::Failed(JobFailure::Reported(reason));
                        }
                        _ => {
                            if last_seen != Some((status.state, status.progress)) {
                                last_seen = Some((status.state, status.progress));
                                on_update(status).await;
                            }
                        }
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= self.settings.max_consecutive_errors {
                        warn!(
                            "Giving up on job {} after {} failed status checks: {}",
                            job_id, consecutive_errors, e
                        );
                        return PollOutcome::Failed(JobFailure::RetriesExhausted {
                            attempts: consecutive_errors,
                            last_error: e.to_string(),
                        });
                    }

                    delay = delay
                        .saturating_mul(2)
                        .min(self.settings.max_backoff.max(self.settings.interval));
                    debug!(
                        "Status check for job {} failed ({}), retrying in {:?}",
                        job_id, e, delay
                    );
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                _ = sleep_until(deadline) => return self.timed_out(job_id),
                _ = sleep(delay) => {}
            }
        }
    }

    fn timed_out(&self, job_id: &str) -> PollOutcome {
        warn!(
            "Transcription job {} timed out after {} seconds",
            job_id,
            self.settings.timeout.as_secs()
        );
        PollOutcome::Failed(JobFailure::Timeout(self.settings.timeout))
    }
}
