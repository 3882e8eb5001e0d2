use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "maki")]
#[command(about = "Voice capture and transcription service for Maki", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Print version information
    Version,
    /// Transcribe an existing audio file through the backend job queue
    Transcribe(TranscribeCliArgs),
    /// Show unread conversations for a user
    Notifications(NotificationsCliArgs),
}

#[derive(ClapArgs, Debug)]
pub struct TranscribeCliArgs {
    /// Audio file to upload
    pub file: PathBuf,
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Write the result to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(ClapArgs, Debug)]
pub struct NotificationsCliArgs {
    /// User id (defaults to `api.user_id` from the config)
    #[arg(short, long)]
    pub user: Option<String>,
    /// Mark the history as read after counting
    #[arg(long, conflicts_with = "reset")]
    pub mark_read: bool,
    /// Forget the stored last visit before counting
    #[arg(long)]
    pub reset: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transcribe() {
        let cli = Cli::parse_from(["maki", "-v", "transcribe", "memo.m4a", "--no-progress"]);
        assert!(cli.verbose);
        match cli.command {
            Some(CliCommand::Transcribe(args)) => {
                assert_eq!(args.file, PathBuf::from("memo.m4a"));
                assert!(args.no_progress);
                assert_eq!(args.format, OutputFormat::Text);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_notifications() {
        let cli = Cli::parse_from(["maki", "notifications", "--user", "u1", "--mark-read"]);
        match cli.command {
            Some(CliCommand::Notifications(args)) => {
                assert_eq!(args.user.as_deref(), Some("u1"));
                assert!(args.mark_read);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_no_subcommand_runs_service() {
        let cli = Cli::parse_from(["maki"]);
        assert!(cli.command.is_none());
    }
}
