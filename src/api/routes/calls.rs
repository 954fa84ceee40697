//! Call creation and query routes.

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::db::{CallRecord, CallRepository, StoreError};
use crate::lifecycle::Note;
use crate::telephony::{CallPlacer, CallingMode, SimulatedCallPlacer};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::OnceLock;

/// E.164 with an optional leading plus.
fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?[1-9]\d{1,14}$").unwrap())
}

#[derive(Debug, Deserialize)]
pub struct PlaceCallRequest {
    pub phone_number: String,
    /// Defaults to the configured mode when omitted.
    pub mode: Option<CallingMode>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListQueryParams {
    /// Maximum results (default 50)
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ManualTranscriptRequest {
    pub provider_call_id: String,
    pub transcript_text: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/call", post(place_call))
        .route("/api/calls", get(list_calls))
        .route("/api/calls/:sid", get(get_call))
        .route("/api/manual-transcript", post(manual_transcript))
}

/// POST /api/call - Place a call and create its record.
async fn place_call(
    State(state): State<AppState>,
    Json(req): Json<PlaceCallRequest>,
) -> ApiResult<Json<Value>> {
    let phone_number = req.phone_number.trim().to_string();
    if !phone_pattern().is_match(&phone_number) {
        return Err(ApiError::bad_request(format!(
            "Invalid phone number '{}'",
            phone_number
        )));
    }

    let mode = req.mode.unwrap_or(state.default_mode);
    let provider_call_id = match mode {
        CallingMode::Phone => {
            let placer = state.phone_placer.as_ref().ok_or_else(|| {
                ApiError::bad_request("Phone mode is not configured on this server")
            })?;
            placer.place_call(&phone_number).await?
        }
        CallingMode::Browser | CallingMode::Demo => {
            SimulatedCallPlacer::new(mode)?.place_call(&phone_number).await?
        }
    };

    let db = state.db.clone();
    let sid = provider_call_id.clone();
    let number = phone_number.clone();
    let id = tokio::task::spawn_blocking(move || -> anyhow::Result<Result<i64, StoreError>> {
        let conn = db.open()?;
        Ok(CallRepository::insert(&conn, &number, &sid))
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))?
    .map_err(ApiError::from)?
    .map_err(ApiError::from)?;

    Ok(Json(json!({
        "id": id,
        "provider_call_id": provider_call_id,
        "phone_number": phone_number,
        "mode": mode.as_str(),
        "call_status": "initiated",
    })))
}

/// GET /api/calls - List recent calls, newest first.
async fn list_calls(
    State(state): State<AppState>,
    Query(params): Query<ListQueryParams>,
) -> ApiResult<Json<Vec<CallRecord>>> {
    let limit = params.limit.unwrap_or(50).min(500);
    let db = state.db.clone();
    let calls = tokio::task::spawn_blocking(move || {
        let conn = db.open()?;
        CallRepository::list(&conn, limit)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))?
    .map_err(ApiError::from)?;

    Ok(Json(calls))
}

/// GET /api/calls/:sid - Get a single call by provider call id.
async fn get_call(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> ApiResult<Json<CallRecord>> {
    let db = state.db.clone();
    let lookup_sid = sid.clone();
    let call = tokio::task::spawn_blocking(move || {
        let conn = db.open()?;
        CallRepository::get(&conn, &lookup_sid)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))?
    .map_err(ApiError::from)?
    .ok_or_else(|| ApiError::not_found(format!("Call {} not found", sid)))?;

    Ok(Json(call))
}

/// POST /api/manual-transcript - Replace a call's transcript by hand.
async fn manual_transcript(
    State(state): State<AppState>,
    Json(req): Json<ManualTranscriptRequest>,
) -> ApiResult<Json<Value>> {
    if req.transcript_text.trim().is_empty() {
        return Err(ApiError::bad_request("Transcript text must not be empty"));
    }

    let outcome = state
        .reconciler
        .apply_manual_transcript(req.provider_call_id.clone(), req.transcript_text)
        .await?;

    if outcome.note == Note::RecordNotFound {
        return Err(ApiError::not_found(format!(
            "Call {} not found",
            req.provider_call_id
        )));
    }

    Ok(Json(json!({
        "provider_call_id": req.provider_call_id,
        "transcript_status": "completed",
    })))
}
