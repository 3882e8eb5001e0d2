//! Local REST API for the Maki service.
//!
//! Provides HTTP endpoints for:
//! - Recording control (toggle, start, stop, acknowledge, status)
//! - The refresh counter
//! - Unread history notifications

pub mod error;
pub mod routes;

use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::info;

use crate::notifications::NotificationTracker;
use crate::refresh::RefreshBus;

pub use routes::recording::{ApiCommand, CommandReply, RecordingApiState};

pub struct ApiServer {
    port: u16,
    recording: RecordingApiState,
    tracker: NotificationTracker,
    bus: RefreshBus,
}

impl ApiServer {
    pub fn new(
        port: u16,
        recording: RecordingApiState,
        tracker: NotificationTracker,
        bus: RefreshBus,
    ) -> Self {
        Self {
            port,
            recording,
            tracker,
            bus,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            // Root and version endpoints
            .route("/", get(status))
            .route("/version", get(version))
            .merge(routes::recording::router(self.recording.clone()))
            .merge(routes::refresh::router(self.bus.clone()))
            .nest(
                "/notifications",
                routes::notifications::router(self.tracker.clone()),
            )
            .layer(ServiceBuilder::new())
    }

    /// Serve until `shutdown` fires.
    pub async fn start(self, shutdown: CancellationToken) -> Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(&format!("127.0.0.1:{}", self.port)).await?;

        info!("API server listening on http://127.0.0.1:{}", self.port);
        info!("Endpoints:");
        info!("  GET  /                       - Service info");
        info!("  POST /toggle                 - Toggle recording");
        info!("  POST /recording/start        - Start recording");
        info!("  POST /recording/stop         - Stop recording");
        info!("  POST /recording/acknowledge  - Clear a finished recording");
        info!("  GET  /status                 - Get recording status");
        info!("  GET  /refresh                - Current refresh counter");
        info!("  GET  /notifications          - Unread history count");
        info!("  POST /notifications/read     - Mark history as read");
        info!("  PUT  /notifications/user     - Switch user");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("API server stopped");
        Ok(())
    }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "maki",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "maki"
    }))
}
