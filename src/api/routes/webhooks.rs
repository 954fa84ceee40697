//! Provider webhook ingress.
//!
//! Every handler acknowledges with 200 once the payload is well formed, even
//! when the event lands on an unknown call or changes nothing. The provider
//! retries on non-2xx, and a retry cannot make a no-op event apply. Only
//! malformed payloads get a 400.

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::lifecycle::CallEvent;
use crate::normalizer::{
    self, LegacyTranscriptionWebhook, RealtimeTranscriptionWebhook, RecordingWebhook,
    StatusWebhook,
};
use axum::{extract::State, response::Json, routing::post, Form, Router};
use serde_json::{json, Value};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/webhooks/status", post(call_status))
        .route("/api/webhooks/recording", post(recording))
        .route("/api/webhooks/realtime-transcription", post(realtime_transcription))
        .route("/api/webhooks/transcription", post(legacy_transcription))
}

/// POST /api/webhooks/status - Call progress events.
async fn call_status(
    State(state): State<AppState>,
    Form(payload): Form<StatusWebhook>,
) -> ApiResult<Json<Value>> {
    let event = normalizer::normalize_status(payload)?;
    apply(&state, CallEvent::Status(event)).await
}

/// POST /api/webhooks/recording - Recording availability.
async fn recording(
    State(state): State<AppState>,
    Form(payload): Form<RecordingWebhook>,
) -> ApiResult<Json<Value>> {
    let event = normalizer::normalize_recording(payload)?;
    apply(&state, CallEvent::Recording(event)).await
}

/// POST /api/webhooks/realtime-transcription - Streaming transcription events.
async fn realtime_transcription(
    State(state): State<AppState>,
    Form(payload): Form<RealtimeTranscriptionWebhook>,
) -> ApiResult<Json<Value>> {
    let event = normalizer::normalize_realtime(payload)?;
    apply(&state, CallEvent::Transcription(event)).await
}

/// POST /api/webhooks/transcription - Batch transcription results.
async fn legacy_transcription(
    State(state): State<AppState>,
    Form(payload): Form<LegacyTranscriptionWebhook>,
) -> ApiResult<Json<Value>> {
    let event = normalizer::normalize_legacy(payload)?;
    apply(&state, CallEvent::LegacyTranscription(event)).await
}

async fn apply(state: &AppState, event: CallEvent) -> ApiResult<Json<Value>> {
    let outcome = state
        .reconciler
        .apply_event(event)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(json!({
        "received": true,
        "applied": outcome.applied,
        "note": outcome.note.as_str(),
    })))
}
