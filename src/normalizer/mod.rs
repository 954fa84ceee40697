//! Event normalizer: raw provider webhook payloads in, typed events out.
//!
//! The provider posts form-encoded payloads with PascalCase field names.
//! Everything the reconciler consumes goes through here first: correlation
//! keys are required, status strings are case-normalized, and durations
//! parse to `Option<u32>` so "not reported" stays distinguishable from a
//! zero-length call.

use serde::Deserialize;
use thiserror::Error;

use crate::lifecycle::events::{
    Correlation, LegacyTranscriptionEvent, RecordingEvent, StatusEvent, TranscriptOutcome,
    TranscriptionEvent, TranscriptionKind,
};
use crate::lifecycle::status::CallStatus;

/// Rejection reasons. All of these surface as a malformed-event error at the
/// webhook ingress so the provider may retry with a corrected payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("event is missing its correlation key")]
    MissingCorrelation,
    #[error("event is missing required field {0}")]
    MissingField(&'static str),
    #[error("unknown call status '{0}'")]
    UnknownCallStatus(String),
    #[error("unknown transcription event '{0}'")]
    UnknownTranscriptionEvent(String),
    #[error("unknown transcription status '{0}'")]
    UnknownTranscriptStatus(String),
}

/// Raw call progress webhook.
#[derive(Debug, Default, Deserialize)]
pub struct StatusWebhook {
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
    #[serde(rename = "CallStatus")]
    pub call_status: Option<String>,
    #[serde(rename = "CallDuration")]
    pub call_duration: Option<String>,
}

/// Raw recording availability webhook. Call duration travels on the status
/// webhook only; extra form fields are ignored on deserialization.
#[derive(Debug, Default, Deserialize)]
pub struct RecordingWebhook {
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
    #[serde(rename = "RecordingUrl")]
    pub recording_url: Option<String>,
    #[serde(rename = "RecordingSid")]
    pub recording_sid: Option<String>,
}

/// Raw streaming transcription webhook. `TranscriptionData` arrives as a JSON
/// string inside the form payload.
#[derive(Debug, Default, Deserialize)]
pub struct RealtimeTranscriptionWebhook {
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
    #[serde(rename = "TranscriptionEvent")]
    pub transcription_event: Option<String>,
    #[serde(rename = "TranscriptionData")]
    pub transcription_data: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TranscriptionData {
    transcript: Option<String>,
    #[serde(rename = "final")]
    is_final: Option<bool>,
    error: Option<String>,
}

/// Raw legacy (batch) transcription webhook.
#[derive(Debug, Default, Deserialize)]
pub struct LegacyTranscriptionWebhook {
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
    #[serde(rename = "RecordingSid")]
    pub recording_sid: Option<String>,
    #[serde(rename = "TranscriptionText")]
    pub transcription_text: Option<String>,
    #[serde(rename = "TranscriptionStatus")]
    pub transcription_status: Option<String>,
}

pub fn normalize_status(payload: StatusWebhook) -> Result<StatusEvent, NormalizeError> {
    let provider_call_id = require(payload.call_sid)?;
    let raw_status = payload
        .call_status
        .filter(|s| !s.trim().is_empty())
        .ok_or(NormalizeError::MissingField("CallStatus"))?;
    let status =
        CallStatus::parse(&raw_status).ok_or(NormalizeError::UnknownCallStatus(raw_status))?;

    Ok(StatusEvent {
        provider_call_id,
        status,
        duration_seconds: parse_duration(payload.call_duration.as_deref()),
    })
}

pub fn normalize_recording(payload: RecordingWebhook) -> Result<RecordingEvent, NormalizeError> {
    let provider_call_id = require(payload.call_sid)?;
    let recording_url = payload
        .recording_url
        .filter(|s| !s.trim().is_empty())
        .ok_or(NormalizeError::MissingField("RecordingUrl"))?;
    let recording_id = payload
        .recording_sid
        .filter(|s| !s.trim().is_empty())
        .ok_or(NormalizeError::MissingField("RecordingSid"))?;

    Ok(RecordingEvent {
        provider_call_id,
        recording_url,
        recording_id,
    })
}

pub fn normalize_realtime(
    payload: RealtimeTranscriptionWebhook,
) -> Result<TranscriptionEvent, NormalizeError> {
    let provider_call_id = require(payload.call_sid)?;
    let raw_kind = payload
        .transcription_event
        .filter(|s| !s.trim().is_empty())
        .ok_or(NormalizeError::MissingField("TranscriptionEvent"))?;

    let data: TranscriptionData = payload
        .transcription_data
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default();

    let kind = match raw_kind.trim().to_ascii_lowercase().as_str() {
        "transcription-started" => TranscriptionKind::Started,
        "transcription-content" => TranscriptionKind::Content {
            text: data.transcript.unwrap_or_default(),
            is_final: data.is_final.unwrap_or(false),
        },
        "transcription-stopped" => TranscriptionKind::Stopped,
        "transcription-error" => TranscriptionKind::Error {
            message: data.error,
        },
        _ => return Err(NormalizeError::UnknownTranscriptionEvent(raw_kind)),
    };

    Ok(TranscriptionEvent {
        provider_call_id,
        kind,
    })
}

pub fn normalize_legacy(
    payload: LegacyTranscriptionWebhook,
) -> Result<LegacyTranscriptionEvent, NormalizeError> {
    let correlation = match (
        payload.call_sid.filter(|s| !s.trim().is_empty()),
        payload.recording_sid.filter(|s| !s.trim().is_empty()),
    ) {
        (Some(sid), _) => Correlation::ProviderCallId(sid),
        (None, Some(rid)) => Correlation::RecordingId(rid),
        (None, None) => return Err(NormalizeError::MissingCorrelation),
    };

    let raw_status = payload
        .transcription_status
        .filter(|s| !s.trim().is_empty())
        .ok_or(NormalizeError::MissingField("TranscriptionStatus"))?;
    let status = match raw_status.trim().to_ascii_lowercase().as_str() {
        "completed" => TranscriptOutcome::Completed,
        "failed" => TranscriptOutcome::Failed,
        _ => return Err(NormalizeError::UnknownTranscriptStatus(raw_status)),
    };

    Ok(LegacyTranscriptionEvent {
        correlation,
        text: payload.transcription_text.filter(|s| !s.trim().is_empty()),
        status,
    })
}

fn require(value: Option<String>) -> Result<String, NormalizeError> {
    value
        .filter(|s| !s.trim().is_empty())
        .ok_or(NormalizeError::MissingCorrelation)
}

/// Durations arrive as strings. Unparsable or absent values normalize to
/// `None` (unknown), never to zero.
fn parse_duration(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
}
