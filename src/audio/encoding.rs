//! WAV encoding of captured audio.

use std::io::Cursor;

use anyhow::{Context, Result};
use hound::{WavSpec, WavWriter};

use super::CapturedAudio;

pub const WAV_MIME_TYPE: &str = "audio/wav";

/// Encode captured samples as 16-bit mono PCM WAV bytes.
pub fn encode_wav(audio: &CapturedAudio) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).context("Failed to create WAV writer")?;
        for sample in audio.samples() {
            let clamped = sample.clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32) as i16)?;
        }
        writer.finalize().context("Failed to finalize WAV data")?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_wav_readable() {
        let audio = CapturedAudio::new(vec![vec![0.0, 0.5], vec![-1.0, 2.0]], 16_000);
        let bytes = encode_wav(&audio).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");

        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);

        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 16383, -32767, 32767]);
    }
}
