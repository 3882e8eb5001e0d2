pub mod args;
pub mod notifications;
pub mod transcribe;

pub use args::{Cli, CliCommand, NotificationsCliArgs, OutputFormat, TranscribeCliArgs};
pub use notifications::handle_notifications_command;
pub use transcribe::handle_transcribe_command;
