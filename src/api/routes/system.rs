//! Health, config, SSE, and admin maintenance routes.

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::db::CallRepository;
use crate::lifecycle::{CallEvent, CallStatus, StatusEvent};
use axum::{
    extract::State,
    response::sse::{Event, Sse},
    response::Json,
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, warn};

const BACKFILL_BATCH: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/config", get(config))
        .route("/api/events", get(event_stream))
        .route("/api/sweep", post(run_sweep))
        .route("/api/backfill-durations", post(backfill_durations))
}

/// GET /health - Liveness plus a storage reachability check.
async fn health(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let db = state.db.clone();
    let calls = tokio::task::spawn_blocking(move || {
        let conn = db.open()?;
        CallRepository::count(&conn)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))?
    .map_err(ApiError::from)?;

    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "calls": calls,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

/// GET /api/config - Client-facing capability flags.
async fn config(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "default_mode": state.default_mode.as_str(),
        "modes": state.enabled_modes(),
        "phone_enabled": state.phone_placer.is_some(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/events - SSE stream for connection status monitoring.
async fn event_stream(
    State(_state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected");

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data("connected"));

        loop {
            tokio::time::sleep(Duration::from_secs(30)).await;
            debug!("SSE: sending heartbeat");
            yield Ok(Event::default().comment("heartbeat"));
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("heartbeat"),
    )
}

/// POST /api/sweep - Run one reconciliation sweep immediately.
async fn run_sweep(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let report = state.sweeper.sweep().await.map_err(ApiError::from)?;
    Ok(Json(json!({
        "examined": report.examined,
        "repaired": report.repaired,
    })))
}

/// POST /api/backfill-durations - Pull authoritative durations from the
/// provider for completed calls that never reported one, and feed them back
/// through the normal status path.
async fn backfill_durations(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let lookup = state.lookup.as_ref().ok_or_else(|| {
        ApiError::bad_request("Duration backfill requires the provider client")
    })?;

    let db = state.db.clone();
    let candidates = tokio::task::spawn_blocking(move || {
        let conn = db.open()?;
        CallRepository::missing_duration(&conn, BACKFILL_BATCH)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))?
    .map_err(ApiError::from)?;

    let examined = candidates.len();
    let mut updated = 0;
    for call in candidates {
        let fetched = match lookup.fetch_call(&call.provider_call_id).await {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!(
                    "Duration lookup failed for call {}: {err:?}",
                    call.provider_call_id
                );
                continue;
            }
        };

        let Some(duration) = fetched.duration_seconds else {
            continue;
        };
        let status = fetched
            .status
            .as_deref()
            .and_then(CallStatus::parse)
            .unwrap_or(call.call_status);
        if status != CallStatus::Completed {
            continue;
        }

        let event = CallEvent::Status(StatusEvent {
            provider_call_id: call.provider_call_id.clone(),
            status,
            duration_seconds: Some(duration),
        });
        match state.reconciler.apply_event(event).await {
            Ok(outcome) if outcome.applied => updated += 1,
            Ok(_) => {}
            Err(err) => warn!(
                "Duration backfill failed for call {}: {err:?}",
                call.provider_call_id
            ),
        }
    }

    Ok(Json(json!({
        "examined": examined,
        "updated": updated,
    })))
}
