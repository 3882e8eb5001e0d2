pub mod audio_source;
pub mod encoding;
pub mod mic_source;

pub use audio_source::{AudioSource, CaptureError, CapturedAudio};
pub use encoding::{encode_wav, WAV_MIME_TYPE};
pub use mic_source::MicAudioSource;
