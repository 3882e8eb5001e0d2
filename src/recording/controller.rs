use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::RecordingError;
use super::state::{RecordingEvent, RecordingPhase, RecordingSession};
use super::status::RecordingStatusHandle;
use crate::audio::{encode_wav, AudioSource, WAV_MIME_TYPE};
use crate::config::RecordingConfig;
use crate::refresh::RefreshBus;
use crate::transcription::{AudioUpload, JobPoller, JobSubmitter, PollOutcome, TranscriptionJob};

#[derive(Debug, Clone, Copy)]
pub struct RecordingOptions {
    pub min_duration: Duration,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self::from(&RecordingConfig::default())
    }
}

impl From<&RecordingConfig> for RecordingOptions {
    fn from(config: &RecordingConfig) -> Self {
        Self {
            min_duration: config.min_duration(),
        }
    }
}

/// Submit/poll task of one session.
struct Pipeline {
    session_id: Uuid,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the microphone and drives the recording state machine.
///
/// Meant to be driven from a single task; the pipeline of each session runs
/// on its own task and reports back through [`RecordingStatusHandle`].
pub struct RecordingController {
    mic: Box<dyn AudioSource>,
    submitter: Arc<dyn JobSubmitter>,
    poller: Arc<JobPoller>,
    bus: RefreshBus,
    status: RecordingStatusHandle,
    options: RecordingOptions,
    capture_started: Option<Instant>,
    pipeline: Option<Pipeline>,
}

impl RecordingController {
    pub fn new(
        mic: Box<dyn AudioSource>,
        submitter: Arc<dyn JobSubmitter>,
        poller: Arc<JobPoller>,
        bus: RefreshBus,
        options: RecordingOptions,
    ) -> Self {
        Self {
            mic,
            submitter,
            poller,
            bus,
            status: RecordingStatusHandle::default(),
            options,
            capture_started: None,
            pipeline: None,
        }
    }

    pub fn status(&self) -> RecordingStatusHandle {
        self.status.clone()
    }

    pub async fn phase(&self) -> RecordingPhase {
        self.status.phase().await
    }

    /// Start, stop, or refuse depending on the current phase.
    pub async fn toggle(&mut self) -> Result<RecordingPhase, RecordingError> {
        enum Transition {
            StartRecording,
            StopRecording,
            Busy(RecordingPhase),
        }

        let phase = self.status.phase().await;
        let transition = match phase {
            RecordingPhase::Idle | RecordingPhase::Succeeded | RecordingPhase::Failed => {
                Transition::StartRecording
            }
            RecordingPhase::Recording => Transition::StopRecording,
            busy => Transition::Busy(busy),
        };

        match transition {
            Transition::StartRecording => self.start().await,
            Transition::StopRecording => self.stop().await,
            Transition::Busy(phase) => {
                warn!("RecordingController: toggle requested while busy in {}", phase);
                Err(RecordingError::Busy(phase))
            }
        }
    }

    /// Acquire the microphone and begin a new session. A terminal session is
    /// acknowledged first.
    pub async fn start(&mut self) -> Result<RecordingPhase, RecordingError> {
        let phase = self.status.phase().await;
        if !phase.can_start() {
            warn!("RecordingController: start rejected while {}", phase);
            return Err(RecordingError::Busy(phase));
        }

        if phase.is_terminal() {
            self.status.apply(RecordingEvent::Acknowledge).await?;
        }
        self.reap_pipeline().await;

        if let Err(e) = self.mic.start().await {
            let err = RecordingError::from(e);
            error!("Failed to start recording: {}", err);
            self.status.set_error(err.clone()).await;
            return Err(err);
        }

        let session = RecordingSession::new();
        info!("RecordingController: recording session {}", session.id);
        self.capture_started = Some(Instant::now());
        match self.status.apply(RecordingEvent::Start(session)).await {
            Ok(phase) => Ok(phase),
            Err(e) => {
                self.mic.release();
                self.capture_started = None;
                Err(e.into())
            }
        }
    }

    /// Abandon whatever is in flight, then start a new recording.
    pub async fn force_start(&mut self) -> Result<RecordingPhase, RecordingError> {
        let phase = self.status.phase().await;
        if !phase.can_start() {
            info!("RecordingController: abandoning {} session", phase);
            self.abandon().await;
        }
        self.start().await
    }

    /// Stop capturing. Captures that are too short or empty are discarded;
    /// anything else is handed to the submit/poll pipeline.
    pub async fn stop(&mut self) -> Result<RecordingPhase, RecordingError> {
        let status = self.status.get().await;
        let session_id = match (status.phase(), status.state.session()) {
            (RecordingPhase::Recording, Some(session)) => session.id,
            _ => return Err(RecordingError::NotRecording),
        };

        self.status.apply(RecordingEvent::Stop).await?;
        let elapsed = self
            .capture_started
            .take()
            .map(|started| started.elapsed())
            .unwrap_or_default();

        let audio = match self.mic.stop().await {
            Ok(audio) => audio,
            Err(e) => return self.discard(RecordingError::Capture(e.to_string())).await,
        };

        let duration_ms = elapsed.as_millis() as u64;
        if elapsed < self.options.min_duration {
            info!("Recording too short ({} ms), discarding", duration_ms);
            return self
                .discard(RecordingError::CaptureTooShort {
                    duration_ms,
                    min_ms: self.options.min_duration.as_millis() as u64,
                })
                .await;
        }
        if !audio.has_audio() {
            warn!("Recording produced no audio, discarding");
            return self.discard(RecordingError::EmptyCapture).await;
        }

        debug!(
            "Captured {:?} of audio at {} Hz",
            audio.duration(),
            self.mic.sample_rate()
        );
        let bytes = match encode_wav(&audio) {
            Ok(bytes) => bytes,
            Err(e) => return self.discard(RecordingError::Capture(e.to_string())).await,
        };
        let audio = Arc::new(bytes);

        let phase = self
            .status
            .apply(RecordingEvent::Finalized {
                duration_ms,
                audio: audio.clone(),
                mime_type: WAV_MIME_TYPE.to_string(),
            })
            .await?;

        info!(
            "Recording finalized: {} ms, {} bytes, uploading",
            duration_ms,
            audio.len()
        );
        self.spawn_pipeline(session_id, AudioUpload::wav(audio));
        Ok(phase)
    }

    /// Leave a terminal state.
    pub async fn acknowledge(&mut self) -> Result<RecordingPhase, RecordingError> {
        let phase = self.status.apply(RecordingEvent::Acknowledge).await?;
        self.reap_pipeline().await;
        Ok(phase)
    }

    /// Release the microphone, cancel any pipeline and return to `Idle`.
    pub async fn teardown(&mut self) {
        info!("RecordingController: teardown");
        self.abandon().await;
    }

    /// Wait for the current pipeline, if any, to finish on its own.
    pub async fn wait_for_pipeline(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.handle.await {
                error!("Recording pipeline task failed: {}", e);
            }
        }
    }

    async fn discard(&mut self, reason: RecordingError) -> Result<RecordingPhase, RecordingError> {
        self.status.apply(RecordingEvent::Discarded).await?;
        self.status.set_error(reason.clone()).await;
        Err(reason)
    }

    async fn abandon(&mut self) {
        if self.mic.is_active() {
            self.mic.release();
        }
        self.capture_started = None;

        if let Some(pipeline) = self.pipeline.take() {
            debug!("Cancelling pipeline of session {}", pipeline.session_id);
            pipeline.cancel.cancel();
            if let Err(e) = pipeline.handle.await {
                error!("Recording pipeline task failed: {}", e);
            }
        }

        // Abandon is accepted from every state.
        let _ = self.status.apply(RecordingEvent::Abandon).await;
    }

    /// Collect a pipeline that has already finished.
    async fn reap_pipeline(&mut self) {
        if self
            .pipeline
            .as_ref()
            .is_some_and(|pipeline| pipeline.handle.is_finished())
        {
            self.wait_for_pipeline().await;
        }
    }

    fn spawn_pipeline(&mut self, session_id: Uuid, upload: AudioUpload) {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_pipeline(
            session_id,
            upload,
            self.submitter.clone(),
            self.poller.clone(),
            self.status.clone(),
            self.bus.clone(),
            cancel.clone(),
        ));
        self.pipeline = Some(Pipeline {
            session_id,
            cancel,
            handle,
        });
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        if self.mic.is_active() {
            debug!("Dropping RecordingController while recording, releasing microphone");
            self.mic.release();
        }
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.cancel.cancel();
        }
    }
}

async fn run_pipeline(
    session_id: Uuid,
    upload: AudioUpload,
    submitter: Arc<dyn JobSubmitter>,
    poller: Arc<JobPoller>,
    status: RecordingStatusHandle,
    bus: RefreshBus,
    cancel: CancellationToken,
) {
    let submitted = tokio::select! {
        _ = cancel.cancelled() => {
            debug!("Session {} cancelled during upload", session_id);
            return;
        }
        result = submitter.submit(upload) => result,
    };

    let submitted = match submitted {
        Ok(submitted) => submitted,
        Err(e) => {
            error!("Failed to submit recording: {:#}", e);
            let event = RecordingEvent::SubmitFailed(RecordingError::SubmissionError(e.to_string()));
            let _ = status.apply_for(session_id, event).await;
            return;
        }
    };

    let job_id = submitted.job_id.clone();
    let job = TranscriptionJob::new(submitted.job_id, Utc::now());
    if status
        .apply_for(session_id, RecordingEvent::Submitted(job))
        .await
        .is_err()
    {
        return;
    }

    let outcome = poller
        .poll(&job_id, &cancel, |update| {
            let status = status.clone();
            async move {
                let event = RecordingEvent::Progress {
                    state: update.state,
                    progress: update.progress,
                };
                let _ = status.apply_for(session_id, event).await;
            }
        })
        .await;

    match outcome {
        PollOutcome::Completed(payload) => {
            match status
                .apply_for(session_id, RecordingEvent::Completed(payload))
                .await
            {
                Ok(_) => {
                    bus.publish();
                }
                Err(e) => debug!("Dropping result of job {}: {}", job_id, e),
            }
        }
        PollOutcome::Failed(failure) => {
            let event = RecordingEvent::JobFailed(RecordingError::from(failure));
            let _ = status.apply_for(session_id, event).await;
        }
        PollOutcome::Cancelled => {
            debug!("Polling of job {} cancelled", job_id);
        }
    }
}
