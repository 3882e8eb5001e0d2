use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::{ApiCommand, ApiServer, CommandReply, RecordingApiState};
use crate::audio::MicAudioSource;
use crate::config::Config;
use crate::notifications::{HistoryNotificationChecker, NotificationTracker};
use crate::recording::{RecordingController, RecordingOptions, RecordingPhase};
use crate::refresh::RefreshBus;
use crate::remote::ApiClient;
use crate::store::{MemoryTimestampStore, SqliteTimestampStore, TimestampStore, UserId};
use crate::transcription::{JobPoller, PollSettings};

/// Open the persistent store, or fall back to memory so the service can run
/// without a writable data directory.
pub fn open_store() -> Arc<dyn TimestampStore> {
    match SqliteTimestampStore::open_default() {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("Failed to open preference database, last-seen state will not persist: {:#}", e);
            Arc::new(MemoryTimestampStore::new())
        }
    }
}

pub async fn run_service() -> Result<()> {
    info!("Starting Maki service");

    let config = Config::load()?;
    let shutdown = CancellationToken::new();

    let client = Arc::new(ApiClient::from_config(&config.api));
    let bus = RefreshBus::new();

    let tracker = NotificationTracker::new(open_store(), config.notifications.unset_last_seen);
    tracker
        .switch_user(config.api.user_id.clone().map(UserId::new))
        .await;

    let checker = HistoryNotificationChecker::new(
        client.clone(),
        tracker.clone(),
        config.notifications.check_delay(),
    );
    let checker_handle = checker.spawn(&bus, shutdown.child_token());

    let poller = Arc::new(JobPoller::new(
        client.clone(),
        PollSettings::from(&config.polling),
    ));
    let mut controller = RecordingController::new(
        Box::new(MicAudioSource::new(config.recording.sample_rate)),
        client.clone(),
        poller,
        bus.clone(),
        RecordingOptions::from(&config.recording),
    );

    let (tx, mut rx) = mpsc::channel::<ApiCommand>(10);
    let api_server = ApiServer::new(
        config.server.port,
        RecordingApiState {
            tx,
            status: controller.status(),
        },
        tracker.clone(),
        bus.clone(),
    );
    let server_shutdown = shutdown.child_token();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = api_server.start(server_shutdown).await {
            error!("API server failed: {}", e);
        }
    });

    info!("Maki is ready!");
    info!(
        "Toggle recording with: curl -X POST http://127.0.0.1:{}/toggle",
        config.server.port
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            command = rx.recv() => {
                let Some(command) = command else { break };
                handle_command(&mut controller, command).await;
            }
        }
    }

    controller.teardown().await;
    shutdown.cancel();
    if let Err(e) = server_handle.await {
        error!("API server task failed: {}", e);
    }
    if let Err(e) = checker_handle.await {
        error!("Notification checker task failed: {}", e);
    }

    info!("Maki stopped");
    Ok(())
}

/// Run one API command against the controller and send back the outcome.
pub async fn handle_command(controller: &mut RecordingController, command: ApiCommand) {
    let (result, reply) = match command {
        ApiCommand::Toggle(reply) => (controller.toggle().await, reply),
        ApiCommand::Start { force: true, reply } => (controller.force_start().await, reply),
        ApiCommand::Start { force: false, reply } => (controller.start().await, reply),
        ApiCommand::Stop(reply) => (controller.stop().await, reply),
        ApiCommand::Acknowledge(reply) => (controller.acknowledge().await, reply),
    };

    log_outcome(&result);
    if reply.send(result).is_err() {
        warn!("API caller went away before the recording command finished");
    }
}

fn log_outcome(result: &CommandReply) {
    match result {
        Ok(RecordingPhase::Recording) => info!("Recording started"),
        Ok(RecordingPhase::Uploading) => info!("Recording stopped, uploading audio"),
        Ok(phase) => info!("RecordingController is currently {}", phase),
        Err(e) => error!("Recording command failed: {}", e),
    }
}
