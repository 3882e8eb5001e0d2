//! Microphone audio capture via cpal.
//!
//! `cpal::Stream` is not `Send`, so each capture runs its stream on a
//! dedicated thread that owns the device until told to stop.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::audio_source::{AudioSource, CaptureError, CapturedAudio};

type ChunkBuffer = Arc<Mutex<Vec<Vec<f32>>>>;

struct CaptureThread {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
    chunks: ChunkBuffer,
}

impl CaptureThread {
    /// Signal the thread and wait, off the runtime, until the stream has been
    /// dropped.
    async fn shutdown(self) -> ChunkBuffer {
        let _ = self.stop_tx.send(());
        let handle = self.handle;
        match tokio::task::spawn_blocking(move || handle.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => error!("Microphone capture thread panicked"),
            Err(e) => error!("Failed to join microphone capture thread: {}", e),
        }
        self.chunks
    }

    /// Signal the thread without waiting for it. The stream is dropped as
    /// soon as the thread sees the signal.
    fn detach(self) {
        let _ = self.stop_tx.send(());
    }
}

pub struct MicAudioSource {
    sample_rate: u32,
    capture: Option<CaptureThread>,
}

impl MicAudioSource {
    /// Create a mic source for the default input device.
    ///
    /// The device is only opened on [`AudioSource::start`].
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            capture: None,
        }
    }
}

fn map_build_error(err: cpal::BuildStreamError) -> CaptureError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            CaptureError::PermissionDenied("input device not available".to_string())
        }
        cpal::BuildStreamError::BackendSpecific { err } => {
            let description = err.description.to_lowercase();
            if description.contains("permission") || description.contains("denied") {
                CaptureError::PermissionDenied(err.description)
            } else {
                CaptureError::Device(err.description)
            }
        }
        other => CaptureError::Device(other.to_string()),
    }
}

/// Open the default device and start the stream. Runs on the capture thread.
fn open_stream(sample_rate: u32, chunks: ChunkBuffer) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;

    info!(
        "Mic source using device: {}",
        device.name().unwrap_or_else(|_| "unknown".to_string())
    );

    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let err_fn = |err| error!("Mic stream error: {}", err);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut chunks) = chunks.lock() {
                    chunks.push(data.to_vec());
                }
            },
            err_fn,
            None,
        )
        .map_err(map_build_error)?;

    stream
        .play()
        .map_err(|e| CaptureError::Device(e.to_string()))?;
    Ok(stream)
}

#[async_trait]
impl AudioSource for MicAudioSource {
    async fn start(&mut self) -> Result<(), CaptureError> {
        if self.capture.is_some() {
            return Err(CaptureError::AlreadyActive);
        }

        let chunks: ChunkBuffer = Arc::new(Mutex::new(Vec::new()));
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let sample_rate = self.sample_rate;
        let thread_chunks = chunks.clone();

        let handle = std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || match open_stream(sample_rate, thread_chunks) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Either an explicit stop or the source being dropped.
                    let _ = stop_rx.recv();
                    debug!("Stopping mic stream");
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| CaptureError::Device(format!("failed to spawn capture thread: {e}")))?;

        let capture = CaptureThread {
            stop_tx,
            handle,
            chunks,
        };

        match ready_rx.await {
            Ok(Ok(())) => {
                self.capture = Some(capture);
                info!("Mic recording started");
                Ok(())
            }
            Ok(Err(e)) => {
                capture.shutdown().await;
                Err(e)
            }
            Err(_) => {
                capture.shutdown().await;
                Err(CaptureError::Device(
                    "capture thread exited before starting".to_string(),
                ))
            }
        }
    }

    async fn stop(&mut self) -> Result<CapturedAudio, CaptureError> {
        let capture = self.capture.take().ok_or(CaptureError::NotActive)?;
        let buffer = capture.shutdown().await;

        let chunks = match buffer.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return Err(CaptureError::Device("sample buffer poisoned".to_string())),
        };

        let audio = CapturedAudio::new(chunks, self.sample_rate);
        info!(
            "Mic stopped, {} samples captured in {} chunks",
            audio.sample_count(),
            audio.chunks.len()
        );
        Ok(audio)
    }

    fn release(&mut self) {
        if let Some(capture) = self.capture.take() {
            warn!("Releasing microphone with capture in progress");
            capture.detach();
        }
    }

    fn is_active(&self) -> bool {
        self.capture.is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for MicAudioSource {
    fn drop(&mut self) {
        if self.capture.is_some() {
            debug!("Dropping active MicAudioSource, cleaning up");
            self.release();
        }
    }
}
