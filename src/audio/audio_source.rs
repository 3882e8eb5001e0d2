//! Audio source abstraction for capturing audio from an input device.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),
    #[error("no input device available")]
    NoDevice,
    #[error("audio source already recording")]
    AlreadyActive,
    #[error("audio source not recording")]
    NotActive,
    #[error("audio device error: {0}")]
    Device(String),
}

/// Trait for audio capture sources.
///
/// Implementations must be `Send` so the recording controller can live on any
/// task; device handles that are not `Send` stay on their own thread.
/// `start` and `stop` may wait on the device (or a permission prompt) and
/// must not block the runtime while doing so.
#[async_trait]
pub trait AudioSource: Send {
    /// Acquire the device and start capturing.
    async fn start(&mut self) -> Result<(), CaptureError>;

    /// Stop capturing, flush pending chunks and return them.
    async fn stop(&mut self) -> Result<CapturedAudio, CaptureError>;

    /// Release the device unconditionally, discarding anything captured.
    /// Never blocks; the device is let go in the background.
    fn release(&mut self);

    /// Whether this source is currently capturing.
    fn is_active(&self) -> bool;

    /// The sample rate of captured audio.
    fn sample_rate(&self) -> u32;
}

/// Mono `f32` samples as delivered by the device, one entry per callback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedAudio {
    pub chunks: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl CapturedAudio {
    pub fn new(chunks: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            chunks,
            sample_rate,
        }
    }

    /// At least one non-empty chunk was captured.
    pub fn has_audio(&self) -> bool {
        self.chunks.iter().any(|chunk| !chunk.is_empty())
    }

    pub fn sample_count(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.sample_count() as f64 / self.sample_rate as f64)
    }

    pub fn samples(&self) -> impl Iterator<Item = f32> + '_ {
        self.chunks.iter().flatten().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_chunks_are_not_audio() {
        let audio = CapturedAudio::new(vec![vec![], vec![]], 16_000);
        assert!(!audio.has_audio());
        assert_eq!(audio.duration(), Duration::ZERO);

        let audio = CapturedAudio::new(vec![vec![], vec![0.1; 8_000]], 16_000);
        assert!(audio.has_audio());
        assert_eq!(audio.duration(), Duration::from_millis(500));
    }
}
