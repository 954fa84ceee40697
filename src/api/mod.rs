//! REST API server.
//!
//! Provides HTTP endpoints for:
//! - Call placement and lookup
//! - Provider webhook ingress (status, recording, transcription)
//! - Manual transcript correction
//! - Admin maintenance (sweep, duration backfill)
//! - Connection status events (SSE)

pub mod error;
pub mod routes;

use crate::db::Db;
use crate::lifecycle::Reconciler;
use crate::sweeper::Sweeper;
use crate::telephony::{CallLookup, CallPlacer, CallingMode};
use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub reconciler: Reconciler,
    /// Present only when provider credentials are configured.
    pub phone_placer: Option<Arc<dyn CallPlacer>>,
    pub lookup: Option<Arc<dyn CallLookup>>,
    pub sweeper: Arc<Sweeper>,
    pub default_mode: CallingMode,
    pub started_at: Instant,
}

impl AppState {
    /// Calling modes this deployment can serve.
    pub fn enabled_modes(&self) -> Vec<&'static str> {
        let mut modes = Vec::new();
        if self.phone_placer.is_some() {
            modes.push(CallingMode::Phone.as_str());
        }
        modes.push(CallingMode::Browser.as_str());
        modes.push(CallingMode::Demo.as_str());
        modes
    }
}

/// Build the full application router. Split out from the server so tests can
/// drive it directly.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status))
        .merge(routes::calls::router())
        .merge(routes::webhooks::router())
        .merge(routes::system::router())
        .layer(ServiceBuilder::new())
        .with_state(state)
}

pub struct ApiServer {
    port: u16,
    state: AppState,
}

impl ApiServer {
    pub fn new(port: u16, state: AppState) -> Self {
        Self { port, state }
    }

    pub async fn start(self) -> Result<()> {
        let app = router(self.state);

        let listener = tokio::net::TcpListener::bind(&format!("0.0.0.0:{}", self.port)).await?;

        info!("API server listening on http://0.0.0.0:{}", self.port);
        info!("Endpoints:");
        info!("  GET  /                                  - Service info");
        info!("  GET  /health                            - Health check");
        info!("  GET  /api/config                        - Client capability flags");
        info!("  POST /api/call                          - Place a call");
        info!("  GET  /api/calls                         - List recent calls");
        info!("  GET  /api/calls/:sid                    - Get a single call");
        info!("  POST /api/manual-transcript             - Correct a transcript");
        info!("  POST /api/webhooks/status               - Call status webhook");
        info!("  POST /api/webhooks/recording            - Recording webhook");
        info!("  POST /api/webhooks/realtime-transcription - Streaming transcription webhook");
        info!("  POST /api/webhooks/transcription        - Batch transcription webhook");
        info!("  GET  /api/events                        - SSE connection status");
        info!("  POST /api/sweep                         - Run a sweep now");
        info!("  POST /api/backfill-durations            - Backfill call durations");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "calltrace",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}
