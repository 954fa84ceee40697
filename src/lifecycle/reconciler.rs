//! Lifecycle reconciler: the state machine that converges out-of-order,
//! duplicated, or missing webhook deliveries into one consistent record.
//!
//! The planning step is a pure function of (current record, event). The
//! driver resolves the record, plans, and persists inside a single immediate
//! transaction, so two concurrent events for the same call never interleave
//! their read-modify-write. Unknown calls, duplicates and stale deliveries
//! are outcomes, not errors.

use anyhow::{Context, Result};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::{CallChanges, CallRecord, CallRepository, Db};

use super::events::{
    CallEvent, Correlation, LegacyTranscriptionEvent, RecordingEvent, StatusEvent,
    TranscriptOutcome, TranscriptionEvent, TranscriptionKind,
};
use super::status::{CallStatus, TranscriptStatus};

/// Placeholder written when a stream ends without any final content.
pub const NO_SPEECH_SENTINEL: &str = "no speech detected";

/// Written when a transcription error event carries no message.
pub const GENERIC_TRANSCRIPTION_ERROR: &str = "transcription failed";

/// What happened when an event was applied. Exactly one note per event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Note {
    /// The event changed the record.
    Applied,
    /// Redelivery with no net effect.
    Duplicate,
    /// Non-terminal call status arrived after a terminal one.
    StaleStatus,
    /// Transcription event arrived after the transcript reached a terminal
    /// state.
    StaleTranscript,
    /// Partial (non-final) transcription content, not persisted.
    PartialIgnored,
    /// Recording fields redelivered with diverging values. Last write wins,
    /// but the divergence is observable.
    RecordingConflict,
    /// The event's provider call id matches no stored record.
    RecordNotFound,
    /// A legacy event's recording id matches no stored record.
    UnresolvedCorrelation,
}

impl Note {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Duplicate => "duplicate",
            Self::StaleStatus => "stale_status",
            Self::StaleTranscript => "stale_transcript",
            Self::PartialIgnored => "partial_ignored",
            Self::RecordingConflict => "recording_conflict",
            Self::RecordNotFound => "record_not_found",
            Self::UnresolvedCorrelation => "unresolved_correlation",
        }
    }
}

/// Result of pushing one event through the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub applied: bool,
    pub note: Note,
}

impl Outcome {
    fn noop(note: Note) -> Self {
        Self {
            applied: false,
            note,
        }
    }
}

/// Planned transition: the partial update to persist plus the note.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub changes: CallChanges,
    pub note: Note,
}

impl Transition {
    fn noop(note: Note) -> Self {
        Self {
            changes: CallChanges::default(),
            note,
        }
    }

    fn apply(changes: CallChanges) -> Self {
        Self {
            changes,
            note: Note::Applied,
        }
    }
}

/// Pure planning step. Decides what (if anything) the event changes.
pub fn plan(record: &CallRecord, event: &CallEvent) -> Transition {
    match event {
        CallEvent::Status(ev) => plan_status(record, ev),
        CallEvent::Recording(ev) => plan_recording(record, ev),
        CallEvent::Transcription(ev) => plan_transcription(record, ev),
        CallEvent::LegacyTranscription(ev) => plan_legacy(record, ev),
    }
}

fn plan_status(record: &CallRecord, ev: &StatusEvent) -> Transition {
    if record.call_status.is_terminal() {
        if ev.status != record.call_status {
            // Terminal statuses are sticky; a late non-terminal (or
            // different terminal) delivery is a no-op.
            return Transition::noop(Note::StaleStatus);
        }
        // Redelivered terminal status. Providers resend authoritative
        // durations, so a completed redelivery with a new value overwrites.
        if ev.status == CallStatus::Completed {
            if let Some(duration) = ev.duration_seconds {
                if duration != record.duration_seconds {
                    return Transition::apply(CallChanges {
                        duration_seconds: Some(duration),
                        ..Default::default()
                    });
                }
            }
        }
        return Transition::noop(Note::Duplicate);
    }

    if ev.status == record.call_status {
        return Transition::noop(Note::Duplicate);
    }

    let mut changes = CallChanges {
        call_status: Some(ev.status),
        ..Default::default()
    };
    // Duration is only written on the transition to completed.
    if ev.status == CallStatus::Completed {
        changes.duration_seconds = ev.duration_seconds;
    }

    Transition::apply(changes)
}

fn plan_recording(record: &CallRecord, ev: &RecordingEvent) -> Transition {
    match (&record.recording_url, &record.recording_id) {
        (Some(url), Some(rid)) if url == &ev.recording_url && rid == &ev.recording_id => {
            Transition::noop(Note::Duplicate)
        }
        (None, None) => Transition::apply(CallChanges {
            recording_url: Some(ev.recording_url.clone()),
            recording_id: Some(ev.recording_id.clone()),
            ..Default::default()
        }),
        _ => Transition {
            // Diverging redelivery. Keep the data available (last write
            // wins) but make the conflict observable.
            changes: CallChanges {
                recording_url: Some(ev.recording_url.clone()),
                recording_id: Some(ev.recording_id.clone()),
                ..Default::default()
            },
            note: Note::RecordingConflict,
        },
    }
}

fn plan_transcription(record: &CallRecord, ev: &TranscriptionEvent) -> Transition {
    match &ev.kind {
        TranscriptionKind::Started => {
            if record.transcript_status.is_terminal() {
                return Transition::noop(Note::StaleTranscript);
            }
            if record.transcript_status == TranscriptStatus::Pending {
                Transition::apply(CallChanges {
                    transcript_status: Some(TranscriptStatus::Streaming),
                    ..Default::default()
                })
            } else {
                Transition::noop(Note::Duplicate)
            }
        }
        TranscriptionKind::Content { text, is_final } => {
            if record.transcript_status.is_terminal() {
                return Transition::noop(Note::StaleTranscript);
            }
            let segment = text.trim();
            if !is_final || segment.is_empty() {
                return Transition::noop(Note::PartialIgnored);
            }
            // Final segments accumulate in arrival order.
            let joined = match record.transcript_text.as_deref() {
                Some(existing) if !existing.trim().is_empty() => {
                    format!("{} {}", existing, segment)
                }
                _ => segment.to_string(),
            };
            Transition::apply(CallChanges {
                transcript_text: Some(joined),
                ..Default::default()
            })
        }
        TranscriptionKind::Stopped => {
            if record.transcript_status.is_terminal() {
                return Transition::noop(Note::Duplicate);
            }
            if record.transcript_has_text() {
                Transition::apply(CallChanges {
                    transcript_status: Some(TranscriptStatus::Completed),
                    ..Default::default()
                })
            } else {
                // An empty stream is a valid terminal state, not a failure.
                Transition::apply(CallChanges {
                    transcript_status: Some(TranscriptStatus::Completed),
                    transcript_text: Some(NO_SPEECH_SENTINEL.to_string()),
                    ..Default::default()
                })
            }
        }
        TranscriptionKind::Error { message } => {
            if record.transcript_status.is_terminal() {
                return Transition::noop(Note::Duplicate);
            }
            Transition::apply(CallChanges {
                transcript_status: Some(TranscriptStatus::Failed),
                transcript_text: Some(
                    message
                        .clone()
                        .unwrap_or_else(|| GENERIC_TRANSCRIPTION_ERROR.to_string()),
                ),
                ..Default::default()
            })
        }
    }
}

fn plan_legacy(record: &CallRecord, ev: &LegacyTranscriptionEvent) -> Transition {
    // Whichever terminal transcription event lands first wins; later
    // terminal events for the same call are no-ops.
    if record.transcript_status.is_terminal() {
        return Transition::noop(Note::Duplicate);
    }

    let (status, text) = match ev.status {
        TranscriptOutcome::Completed => (
            TranscriptStatus::Completed,
            ev.text
                .clone()
                .unwrap_or_else(|| NO_SPEECH_SENTINEL.to_string()),
        ),
        TranscriptOutcome::Failed => (
            TranscriptStatus::Failed,
            ev.text
                .clone()
                .unwrap_or_else(|| GENERIC_TRANSCRIPTION_ERROR.to_string()),
        ),
    };

    Transition::apply(CallChanges {
        transcript_status: Some(status),
        transcript_text: Some(text),
        ..Default::default()
    })
}

/// Applies normalized events to the call record store.
#[derive(Clone)]
pub struct Reconciler {
    db: Db,
}

impl Reconciler {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Apply one event on a blocking thread. This is the entry point for
    /// async callers (webhook handlers, sweeper).
    pub async fn apply_event(&self, event: CallEvent) -> Result<Outcome> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = db.open()?;
            Self::apply_with(&mut conn, &event)
        })
        .await
        .context("Reconciler task panicked")?
    }

    /// Apply one event using the given connection. The read-modify-write
    /// runs inside a single immediate transaction.
    pub fn apply_with(conn: &mut Connection, event: &CallEvent) -> Result<Outcome> {
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin reconcile transaction")?;

        let outcome = match resolve(&tx, event)? {
            Resolved::Record(record) => {
                let Transition { changes, note } = plan(&record, event);
                let applied = if changes.is_empty() {
                    false
                } else {
                    CallRepository::update(&tx, &record.provider_call_id, &changes)? > 0
                };
                log_note(note, &record.provider_call_id);
                Outcome { applied, note }
            }
            Resolved::NotFound => {
                info!(
                    "Dropping event for unknown call {}",
                    event.correlation()
                );
                Outcome::noop(Note::RecordNotFound)
            }
            Resolved::Unresolved => {
                info!(
                    "Dropping legacy event: no call matches recording id {}",
                    event.correlation()
                );
                Outcome::noop(Note::UnresolvedCorrelation)
            }
        };

        tx.commit().context("Failed to commit reconcile transaction")?;
        Ok(outcome)
    }

    /// Administrative correction: replaces the transcript wholesale and marks
    /// it completed, even out of a terminal state. The only path allowed to
    /// move a terminal transcript.
    pub async fn apply_manual_transcript(
        &self,
        provider_call_id: String,
        text: String,
    ) -> Result<Outcome> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.open()?;
            let changes = CallChanges {
                transcript_text: Some(text),
                transcript_status: Some(TranscriptStatus::Completed),
                ..Default::default()
            };
            let applied = CallRepository::update(&conn, &provider_call_id, &changes)?;
            if applied == 0 {
                info!("Manual transcript for unknown call {}", provider_call_id);
                return Ok(Outcome::noop(Note::RecordNotFound));
            }
            info!("Manual transcript applied to call {}", provider_call_id);
            Ok(Outcome {
                applied: true,
                note: Note::Applied,
            })
        })
        .await
        .context("Manual transcript task panicked")?
    }
}

enum Resolved {
    Record(CallRecord),
    NotFound,
    Unresolved,
}

fn resolve(conn: &Connection, event: &CallEvent) -> Result<Resolved> {
    match event {
        CallEvent::LegacyTranscription(LegacyTranscriptionEvent {
            correlation: Correlation::RecordingId(rid),
            ..
        }) => match CallRepository::get_by_recording_id(conn, rid)? {
            Some(record) => Ok(Resolved::Record(record)),
            None => Ok(Resolved::Unresolved),
        },
        _ => match CallRepository::get(conn, event.correlation())? {
            Some(record) => Ok(Resolved::Record(record)),
            None => Ok(Resolved::NotFound),
        },
    }
}

fn log_note(note: Note, provider_call_id: &str) {
    match note {
        Note::RecordingConflict => {
            warn!(
                "Recording redelivered with diverging values for call {} (last write wins)",
                provider_call_id
            );
        }
        Note::StaleStatus => {
            info!(
                "Ignoring stale status for call {} (already terminal)",
                provider_call_id
            );
        }
        Note::Applied => debug!("Event applied to call {}", provider_call_id),
        _ => debug!("Event no-op ({}) for call {}", note.as_str(), provider_call_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate;
    use crate::lifecycle::events::{RecordingEvent, StatusEvent};

    fn setup_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn
    }

    fn create_call(conn: &Connection, sid: &str) {
        CallRepository::insert(conn, "+15551234567", sid).unwrap();
    }

    fn get(conn: &Connection, sid: &str) -> CallRecord {
        CallRepository::get(conn, sid).unwrap().unwrap()
    }

    fn status_event(sid: &str, status: CallStatus, duration: Option<u32>) -> CallEvent {
        CallEvent::Status(StatusEvent {
            provider_call_id: sid.into(),
            status,
            duration_seconds: duration,
        })
    }

    fn recording_event(sid: &str, url: &str, rid: &str) -> CallEvent {
        CallEvent::Recording(RecordingEvent {
            provider_call_id: sid.into(),
            recording_url: url.into(),
            recording_id: rid.into(),
        })
    }

    fn transcription_event(sid: &str, kind: TranscriptionKind) -> CallEvent {
        CallEvent::Transcription(TranscriptionEvent {
            provider_call_id: sid.into(),
            kind,
        })
    }

    fn final_content(sid: &str, text: &str) -> CallEvent {
        transcription_event(
            sid,
            TranscriptionKind::Content {
                text: text.into(),
                is_final: true,
            },
        )
    }

    #[test]
    fn test_status_event_idempotent() {
        let mut conn = setup_conn();
        create_call(&conn, "CA1");

        let event = status_event("CA1", CallStatus::Completed, Some(42));
        let first = Reconciler::apply_with(&mut conn, &event).unwrap();
        assert!(first.applied);
        assert_eq!(first.note, Note::Applied);

        let record_after_first = get(&conn, "CA1");

        let second = Reconciler::apply_with(&mut conn, &event).unwrap();
        assert!(!second.applied);
        assert_eq!(second.note, Note::Duplicate);

        let record_after_second = get(&conn, "CA1");
        assert_eq!(record_after_second.call_status, CallStatus::Completed);
        assert_eq!(record_after_second.duration_seconds, 42);
        assert_eq!(
            record_after_first.call_status,
            record_after_second.call_status
        );
        assert_eq!(
            record_after_first.duration_seconds,
            record_after_second.duration_seconds
        );
    }

    #[test]
    fn test_terminal_status_sticky() {
        let mut conn = setup_conn();
        create_call(&conn, "CA1");

        Reconciler::apply_with(&mut conn, &status_event("CA1", CallStatus::Completed, Some(10)))
            .unwrap();
        let late = Reconciler::apply_with(&mut conn, &status_event("CA1", CallStatus::Ringing, None))
            .unwrap();

        assert!(!late.applied);
        assert_eq!(late.note, Note::StaleStatus);
        assert_eq!(get(&conn, "CA1").call_status, CallStatus::Completed);
    }

    #[test]
    fn test_completed_redelivery_overwrites_duration() {
        let mut conn = setup_conn();
        create_call(&conn, "CA1");

        Reconciler::apply_with(&mut conn, &status_event("CA1", CallStatus::Completed, Some(30)))
            .unwrap();
        let redelivery =
            Reconciler::apply_with(&mut conn, &status_event("CA1", CallStatus::Completed, Some(31)))
                .unwrap();

        assert!(redelivery.applied);
        assert_eq!(get(&conn, "CA1").duration_seconds, 31);
    }

    #[test]
    fn test_duration_not_written_on_non_completed() {
        let mut conn = setup_conn();
        create_call(&conn, "CA1");

        Reconciler::apply_with(&mut conn, &status_event("CA1", CallStatus::InProgress, Some(15)))
            .unwrap();
        assert_eq!(get(&conn, "CA1").duration_seconds, 0);
    }

    #[test]
    fn test_recording_set_then_identical_redelivery() {
        let mut conn = setup_conn();
        create_call(&conn, "CA1");

        let event = recording_event("CA1", "https://x/rec.wav", "RE1");
        let first = Reconciler::apply_with(&mut conn, &event).unwrap();
        assert!(first.applied);

        let second = Reconciler::apply_with(&mut conn, &event).unwrap();
        assert!(!second.applied);
        assert_eq!(second.note, Note::Duplicate);
    }

    #[test]
    fn test_recording_conflict_is_observable_and_last_write_wins() {
        let mut conn = setup_conn();
        create_call(&conn, "CA1");

        Reconciler::apply_with(&mut conn, &recording_event("CA1", "https://x/a.wav", "RE1"))
            .unwrap();
        let conflict =
            Reconciler::apply_with(&mut conn, &recording_event("CA1", "https://x/b.wav", "RE2"))
                .unwrap();

        assert!(conflict.applied);
        assert_eq!(conflict.note, Note::RecordingConflict);
        let record = get(&conn, "CA1");
        assert_eq!(record.recording_url.as_deref(), Some("https://x/b.wav"));
        assert_eq!(record.recording_id.as_deref(), Some("RE2"));
    }

    #[test]
    fn test_transcription_started_then_duplicate() {
        let mut conn = setup_conn();
        create_call(&conn, "CA1");

        let started = transcription_event("CA1", TranscriptionKind::Started);
        let first = Reconciler::apply_with(&mut conn, &started).unwrap();
        assert!(first.applied);
        assert_eq!(get(&conn, "CA1").transcript_status, TranscriptStatus::Streaming);

        let second = Reconciler::apply_with(&mut conn, &started).unwrap();
        assert!(!second.applied);
        assert_eq!(second.note, Note::Duplicate);
    }

    #[test]
    fn test_content_accumulates_in_arrival_order() {
        let mut conn = setup_conn();
        create_call(&conn, "CA1");

        Reconciler::apply_with(&mut conn, &transcription_event("CA1", TranscriptionKind::Started))
            .unwrap();
        for segment in ["Hello", "world", "!"] {
            Reconciler::apply_with(&mut conn, &final_content("CA1", segment)).unwrap();
        }

        assert_eq!(
            get(&conn, "CA1").transcript_text.as_deref(),
            Some("Hello world !")
        );
    }

    #[test]
    fn test_partial_content_not_persisted() {
        let mut conn = setup_conn();
        create_call(&conn, "CA1");

        let partial = transcription_event(
            "CA1",
            TranscriptionKind::Content {
                text: "half a thou".into(),
                is_final: false,
            },
        );
        let outcome = Reconciler::apply_with(&mut conn, &partial).unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.note, Note::PartialIgnored);
        assert!(get(&conn, "CA1").transcript_text.is_none());
    }

    #[test]
    fn test_empty_stream_completes_with_sentinel() {
        let mut conn = setup_conn();
        create_call(&conn, "CA1");

        Reconciler::apply_with(&mut conn, &transcription_event("CA1", TranscriptionKind::Started))
            .unwrap();
        Reconciler::apply_with(&mut conn, &transcription_event("CA1", TranscriptionKind::Stopped))
            .unwrap();

        let record = get(&conn, "CA1");
        assert_eq!(record.transcript_status, TranscriptStatus::Completed);
        assert_eq!(record.transcript_text.as_deref(), Some(NO_SPEECH_SENTINEL));
    }

    #[test]
    fn test_stopped_with_text_completes() {
        let mut conn = setup_conn();
        create_call(&conn, "CA1");

        Reconciler::apply_with(&mut conn, &final_content("CA1", "Hello")).unwrap();
        Reconciler::apply_with(&mut conn, &transcription_event("CA1", TranscriptionKind::Stopped))
            .unwrap();

        let record = get(&conn, "CA1");
        assert_eq!(record.transcript_status, TranscriptStatus::Completed);
        assert_eq!(record.transcript_text.as_deref(), Some("Hello"));
    }

    #[test]
    fn test_error_event_fails_transcript() {
        let mut conn = setup_conn();
        create_call(&conn, "CA1");

        Reconciler::apply_with(
            &mut conn,
            &transcription_event(
                "CA1",
                TranscriptionKind::Error {
                    message: Some("engine crashed".into()),
                },
            ),
        )
        .unwrap();

        let record = get(&conn, "CA1");
        assert_eq!(record.transcript_status, TranscriptStatus::Failed);
        assert_eq!(record.transcript_text.as_deref(), Some("engine crashed"));
    }

    #[test]
    fn test_error_event_generic_message() {
        let mut conn = setup_conn();
        create_call(&conn, "CA1");

        Reconciler::apply_with(
            &mut conn,
            &transcription_event("CA1", TranscriptionKind::Error { message: None }),
        )
        .unwrap();

        assert_eq!(
            get(&conn, "CA1").transcript_text.as_deref(),
            Some(GENERIC_TRANSCRIPTION_ERROR)
        );
    }

    #[test]
    fn test_terminal_transcript_sticky_against_late_events() {
        let mut conn = setup_conn();
        create_call(&conn, "CA1");

        Reconciler::apply_with(&mut conn, &final_content("CA1", "Hello")).unwrap();
        Reconciler::apply_with(&mut conn, &transcription_event("CA1", TranscriptionKind::Stopped))
            .unwrap();

        // Late legacy terminal event no-ops; first terminal event won.
        let legacy = CallEvent::LegacyTranscription(LegacyTranscriptionEvent {
            correlation: Correlation::ProviderCallId("CA1".into()),
            text: Some("a different transcript".into()),
            status: TranscriptOutcome::Completed,
        });
        let outcome = Reconciler::apply_with(&mut conn, &legacy).unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.note, Note::Duplicate);
        assert_eq!(get(&conn, "CA1").transcript_text.as_deref(), Some("Hello"));
    }

    #[test]
    fn test_unknown_call_leaves_store_unmodified() {
        let mut conn = setup_conn();
        create_call(&conn, "CA1");
        let before = CallRepository::count(&conn).unwrap();

        let outcome =
            Reconciler::apply_with(&mut conn, &status_event("CA404", CallStatus::Completed, None))
                .unwrap();

        assert!(!outcome.applied);
        assert_eq!(outcome.note, Note::RecordNotFound);
        assert_eq!(CallRepository::count(&conn).unwrap(), before);
        assert_eq!(get(&conn, "CA1").call_status, CallStatus::Initiated);
    }

    #[test]
    fn test_legacy_correlation_by_recording_id() {
        let mut conn = setup_conn();
        create_call(&conn, "CA1");
        create_call(&conn, "CA2");
        Reconciler::apply_with(&mut conn, &recording_event("CA2", "https://x/rec.wav", "RE1"))
            .unwrap();

        let legacy = CallEvent::LegacyTranscription(LegacyTranscriptionEvent {
            correlation: Correlation::RecordingId("RE1".into()),
            text: Some("hi".into()),
            status: TranscriptOutcome::Completed,
        });
        let outcome = Reconciler::apply_with(&mut conn, &legacy).unwrap();
        assert!(outcome.applied);

        // Only the matching call was updated.
        assert_eq!(get(&conn, "CA2").transcript_text.as_deref(), Some("hi"));
        assert_eq!(get(&conn, "CA2").transcript_status, TranscriptStatus::Completed);
        assert!(get(&conn, "CA1").transcript_text.is_none());
        assert_eq!(get(&conn, "CA1").transcript_status, TranscriptStatus::Pending);
    }

    #[test]
    fn test_legacy_unresolved_correlation_dropped() {
        let mut conn = setup_conn();
        create_call(&conn, "CA1");

        let legacy = CallEvent::LegacyTranscription(LegacyTranscriptionEvent {
            correlation: Correlation::RecordingId("RE404".into()),
            text: Some("hi".into()),
            status: TranscriptOutcome::Completed,
        });
        let outcome = Reconciler::apply_with(&mut conn, &legacy).unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.note, Note::UnresolvedCorrelation);
    }

    #[test]
    fn test_legacy_completed_without_text_uses_sentinel() {
        let mut conn = setup_conn();
        create_call(&conn, "CA1");

        let legacy = CallEvent::LegacyTranscription(LegacyTranscriptionEvent {
            correlation: Correlation::ProviderCallId("CA1".into()),
            text: None,
            status: TranscriptOutcome::Completed,
        });
        Reconciler::apply_with(&mut conn, &legacy).unwrap();

        // completed always implies non-empty transcript text
        let record = get(&conn, "CA1");
        assert_eq!(record.transcript_status, TranscriptStatus::Completed);
        assert_eq!(record.transcript_text.as_deref(), Some(NO_SPEECH_SENTINEL));
    }

    #[test]
    fn test_full_call_scenario() {
        let mut conn = setup_conn();
        create_call(&conn, "CA1");

        Reconciler::apply_with(&mut conn, &status_event("CA1", CallStatus::InProgress, None))
            .unwrap();
        Reconciler::apply_with(&mut conn, &recording_event("CA1", "https://x/rec.wav", "RE1"))
            .unwrap();
        Reconciler::apply_with(&mut conn, &status_event("CA1", CallStatus::Completed, Some(30)))
            .unwrap();

        let record = get(&conn, "CA1");
        assert_eq!(record.call_status, CallStatus::Completed);
        assert_eq!(record.duration_seconds, 30);
        assert_eq!(record.recording_url.as_deref(), Some("https://x/rec.wav"));
        // transcript still pending until a transcription event arrives
        assert_eq!(record.transcript_status, TranscriptStatus::Pending);
    }

    #[test]
    fn test_out_of_order_recording_after_completed() {
        let mut conn = setup_conn();
        create_call(&conn, "CA1");

        // Completion arrives before the recording webhook; the recording
        // still lands (recording fields are independent of call status).
        Reconciler::apply_with(&mut conn, &status_event("CA1", CallStatus::Completed, Some(12)))
            .unwrap();
        let outcome =
            Reconciler::apply_with(&mut conn, &recording_event("CA1", "https://x/rec.wav", "RE1"))
                .unwrap();

        assert!(outcome.applied);
        let record = get(&conn, "CA1");
        assert_eq!(record.call_status, CallStatus::Completed);
        assert_eq!(record.recording_id.as_deref(), Some("RE1"));
    }
}
