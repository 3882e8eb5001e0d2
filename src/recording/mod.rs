//! Microphone recording sessions and their transcription pipeline.

pub mod controller;
pub mod error;
pub mod state;
pub mod status;

pub use controller::{RecordingController, RecordingOptions};
pub use error::{InvalidTransition, RecordingError};
pub use state::{RecordingEvent, RecordingPhase, RecordingSession, RecordingState};
pub use status::{RecordingStatus, RecordingStatusHandle};
