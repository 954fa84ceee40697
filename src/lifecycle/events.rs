//! Typed internal events, the reconciler's only input.
//!
//! The normalizer produces these from raw webhook payloads; the sweeper
//! synthesizes them when it repairs state a webhook failed to deliver. Both
//! paths flow through the same reconciler rules.

use super::status::CallStatus;

/// One normalized inbound event.
#[derive(Debug, Clone)]
pub enum CallEvent {
    Status(StatusEvent),
    Recording(RecordingEvent),
    Transcription(TranscriptionEvent),
    LegacyTranscription(LegacyTranscriptionEvent),
}

impl CallEvent {
    /// Correlation key for logging. Legacy events may only carry a recording id.
    pub fn correlation(&self) -> &str {
        match self {
            Self::Status(e) => &e.provider_call_id,
            Self::Recording(e) => &e.provider_call_id,
            Self::Transcription(e) => &e.provider_call_id,
            Self::LegacyTranscription(e) => match &e.correlation {
                Correlation::ProviderCallId(id) | Correlation::RecordingId(id) => id,
            },
        }
    }
}

/// Call progress update. `duration_seconds` is `None` when the provider did
/// not report a duration, which is distinct from a zero-length call.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub provider_call_id: String,
    pub status: CallStatus,
    pub duration_seconds: Option<u32>,
}

/// Recording became available. Durations are carried by status events only.
#[derive(Debug, Clone)]
pub struct RecordingEvent {
    pub provider_call_id: String,
    pub recording_url: String,
    pub recording_id: String,
}

/// Streaming transcription lifecycle event.
#[derive(Debug, Clone)]
pub struct TranscriptionEvent {
    pub provider_call_id: String,
    pub kind: TranscriptionKind,
}

#[derive(Debug, Clone)]
pub enum TranscriptionKind {
    Started,
    Content { text: String, is_final: bool },
    Stopped,
    Error { message: Option<String> },
}

/// How a legacy (batch) transcription event identifies its call.
#[derive(Debug, Clone)]
pub enum Correlation {
    ProviderCallId(String),
    RecordingId(String),
}

/// Terminal outcome carried by a legacy transcription event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptOutcome {
    Completed,
    Failed,
}

/// Batch transcription result (non-streaming fallback path). Replaces the
/// transcript wholesale instead of accumulating segments.
#[derive(Debug, Clone)]
pub struct LegacyTranscriptionEvent {
    pub correlation: Correlation,
    pub text: Option<String>,
    pub status: TranscriptOutcome,
}
