//! CLI handler for transcribing audio files.
//!
//! Submits the file as a transcription job, polls for progress, and outputs
//! the result.

use anyhow::{anyhow, bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cli::args::{OutputFormat, TranscribeCliArgs};
use crate::config::Config;
use crate::remote::ApiClient;
use crate::transcription::{
    mime_type_for_extension, AudioUpload, JobPoller, JobState, JobSubmitter, PollOutcome,
    PollSettings, TranscriptPayload,
};

/// Handle the transcribe CLI command.
pub async fn handle_transcribe_command(args: TranscribeCliArgs) -> Result<()> {
    let upload = read_upload(&args.file)?;

    let config = Config::load()?;
    let client = Arc::new(ApiClient::from_config(&config.api));

    let pb = if args.no_progress {
        None
    } else {
        let pb = create_progress_bar()?;
        pb.set_message("Uploading...");
        Some(pb)
    };

    let job = client
        .submit(upload)
        .await
        .context("Failed to submit transcription job")?;

    let poller = JobPoller::new(client.clone(), PollSettings::from(&config.polling));
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    let outcome = poller
        .poll(&job.job_id, &cancel, |status| {
            if let Some(pb) = &pb {
                pb.set_position(status.progress as u64);
                pb.set_message(stage_message(status.state));
            }
            async {}
        })
        .await;

    let payload = match outcome {
        PollOutcome::Completed(payload) => {
            if let Some(pb) = &pb {
                pb.finish_with_message("Complete");
            }
            payload
        }
        PollOutcome::Failed(failure) => {
            if let Some(pb) = &pb {
                pb.abandon_with_message("Failed");
            }
            bail!("Transcription failed: {}", failure);
        }
        PollOutcome::Cancelled => {
            if let Some(pb) = &pb {
                pb.abandon_with_message("Cancelled");
            }
            bail!("Transcription cancelled");
        }
    };

    let output_text = format_output(&payload, args.format)?;
    if let Some(output_path) = &args.output {
        std::fs::write(output_path, &output_text).context("Failed to write output file")?;
        eprintln!("Transcription saved to: {}", output_path.display());
    } else {
        println!("{}", output_text);
    }

    Ok(())
}

/// Validate the file and load it for upload.
fn read_upload(path: &Path) -> Result<AudioUpload> {
    if !path.exists() {
        bail!("File not found: {}", path.display());
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let mime_type = mime_type_for_extension(&ext).ok_or_else(|| {
        anyhow!(
            "Unsupported format: .{}\nSupported formats: wav, mp3, m4a, flac, ogg, opus, webm",
            ext
        )
    })?;

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("recording")
        .to_string();

    Ok(AudioUpload {
        bytes: bytes.into(),
        mime_type: mime_type.to_string(),
        file_name,
    })
}

fn create_progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("━╸━"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn stage_message(state: JobState) -> &'static str {
    match state {
        JobState::Waiting => "Waiting...",
        JobState::Active => "Transcribing...",
        _ => "",
    }
}

fn format_output(payload: &TranscriptPayload, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(payload)?),
        OutputFormat::Text => {
            let counts = &payload.derived_counts;
            let mut out = payload.transcript_text.clone();
            out.push_str("\n\n");
            out.push_str(&format!(
                "Language: {}{} | Speakers: {}\n",
                payload.detected_language,
                if payload.was_translated { " (translated)" } else { "" },
                payload.speaker_count
            ));
            out.push_str(&format!(
                "Extracted: {} tasks, {} reminders, {} people, {} follow-ups",
                counts.tasks, counts.reminders, counts.people, counts.followups
            ));
            if let Some(conversation) = &payload.conversation {
                out.push_str(&format!("\nConversation: {}", conversation.title));
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::DerivedCounts;
    use std::io::Write;

    #[test]
    fn test_read_upload_rejects_unknown_extension() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(file, "not audio").unwrap();
        let err = read_upload(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported format"));
    }

    #[test]
    fn test_read_upload_uses_extension_mime() {
        let mut file = tempfile::Builder::new().suffix(".mp3").tempfile().unwrap();
        file.write_all(b"ID3").unwrap();
        let upload = read_upload(file.path()).unwrap();
        assert_eq!(upload.mime_type, "audio/mpeg");
        assert_eq!(upload.bytes.as_slice(), b"ID3");
    }

    #[test]
    fn test_text_output_lists_counts() {
        let payload = TranscriptPayload {
            transcript_text: "Buy milk".to_string(),
            detected_language: "en".to_string(),
            was_translated: false,
            speaker_count: 1,
            derived_counts: DerivedCounts {
                tasks: 1,
                reminders: 0,
                people: 0,
                followups: 2,
            },
            conversation: None,
        };
        let text = format_output(&payload, OutputFormat::Text).unwrap();
        assert!(text.starts_with("Buy milk\n\n"));
        assert!(text.contains("1 tasks, 0 reminders, 0 people, 2 follow-ups"));
    }
}
