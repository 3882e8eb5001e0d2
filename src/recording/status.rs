use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::error::{InvalidTransition, RecordingError};
use super::state::{RecordingEvent, RecordingPhase, RecordingState};
use crate::transcription::TranscriptionJob;

#[derive(Debug, Clone, Default)]
pub struct RecordingStatus {
    pub state: RecordingState,
    pub last_error: Option<RecordingError>,
    pub last_completed: Option<TranscriptionJob>,
}

impl RecordingStatus {
    pub fn phase(&self) -> RecordingPhase {
        self.state.phase()
    }
}

/// Shared view of the controller state. Every change goes through
/// [`RecordingState::apply`] under the lock.
#[derive(Clone, Default)]
pub struct RecordingStatusHandle {
    inner: Arc<Mutex<RecordingStatus>>,
}

impl RecordingStatusHandle {
    pub async fn get(&self) -> RecordingStatus {
        self.inner.lock().await.clone()
    }

    pub async fn phase(&self) -> RecordingPhase {
        self.inner.lock().await.phase()
    }

    pub async fn apply(&self, event: RecordingEvent) -> Result<RecordingPhase, InvalidTransition> {
        let mut status = self.inner.lock().await;
        Self::apply_locked(&mut status, event)
    }

    /// Apply `event` only if `session_id` is still the current session.
    pub async fn apply_for(
        &self,
        session_id: Uuid,
        event: RecordingEvent,
    ) -> Result<RecordingPhase, InvalidTransition> {
        let mut status = self.inner.lock().await;
        let current = status.state.session().map(|s| s.id);
        if current != Some(session_id) {
            debug!(
                "Ignoring {} for stale session {}",
                event.name(),
                session_id
            );
            return Err(InvalidTransition::StaleSession(session_id));
        }
        Self::apply_locked(&mut status, event)
    }

    pub async fn set_error(&self, error: RecordingError) {
        self.inner.lock().await.last_error = Some(error);
    }

    fn apply_locked(
        status: &mut RecordingStatus,
        event: RecordingEvent,
    ) -> Result<RecordingPhase, InvalidTransition> {
        let starting = matches!(event, RecordingEvent::Start(_));
        let next = status.state.apply(event)?;

        if starting {
            status.last_error = None;
        }
        match &next {
            RecordingState::Failed { error, .. } => status.last_error = Some(error.clone()),
            RecordingState::Succeeded { job, .. } => status.last_completed = Some(job.clone()),
            _ => {}
        }

        let phase = next.phase();
        if phase != status.state.phase() {
            debug!("Recording phase: {} -> {}", status.state.phase(), phase);
        }
        status.state = next;
        Ok(phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::state::RecordingSession;

    #[tokio::test]
    async fn test_stale_session_events_are_refused() {
        let handle = RecordingStatusHandle::default();
        let old = RecordingSession::new();
        let old_id = old.id;
        handle.apply(RecordingEvent::Start(old)).await.unwrap();
        handle.apply(RecordingEvent::Abandon).await.unwrap();

        let fresh = RecordingSession::new();
        let fresh_id = fresh.id;
        handle.apply(RecordingEvent::Start(fresh)).await.unwrap();

        let err = handle
            .apply_for(old_id, RecordingEvent::Stop)
            .await
            .unwrap_err();
        assert_eq!(err, InvalidTransition::StaleSession(old_id));
        assert_eq!(handle.phase().await, RecordingPhase::Recording);

        assert_eq!(
            handle.apply_for(fresh_id, RecordingEvent::Stop).await.unwrap(),
            RecordingPhase::Stopping
        );
    }

    #[tokio::test]
    async fn test_start_clears_last_error() {
        let handle = RecordingStatusHandle::default();
        handle.set_error(RecordingError::EmptyCapture).await;
        handle
            .apply(RecordingEvent::Start(RecordingSession::new()))
            .await
            .unwrap();
        assert!(handle.get().await.last_error.is_none());
    }
}
