//! Call lifecycle core: status vocabularies, typed events, and the
//! reconciler that applies events to stored records.

pub mod events;
pub mod reconciler;
pub mod status;

pub use events::{
    CallEvent, Correlation, LegacyTranscriptionEvent, RecordingEvent, StatusEvent,
    TranscriptOutcome, TranscriptionEvent, TranscriptionKind,
};
pub use reconciler::{Note, Outcome, Reconciler, GENERIC_TRANSCRIPTION_ERROR, NO_SPEECH_SENTINEL};
pub use status::{CallStatus, TranscriptStatus};
