//! External telephony and transcription collaborators.
//!
//! Everything the provider does for us sits behind traits so the sweeper and
//! API handlers can be exercised against stubs. The real implementation is
//! the Twilio-shaped HTTP client in `twilio.rs`; `simulated.rs` covers the
//! browser/demo call-placement modes where no provider-side call exists.

pub mod simulated;
pub mod twilio;

pub use simulated::SimulatedCallPlacer;
pub use twilio::TwilioClient;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How an outbound call is placed. Chosen once at call creation; the
/// lifecycle core never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallingMode {
    Phone,
    Browser,
    Demo,
}

impl CallingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::Browser => "browser",
            Self::Demo => "demo",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "phone" => Some(Self::Phone),
            "browser" => Some(Self::Browser),
            "demo" => Some(Self::Demo),
            _ => None,
        }
    }
}

/// Places an outbound call and returns the provider's call id.
#[async_trait]
pub trait CallPlacer: Send + Sync {
    fn mode(&self) -> CallingMode;
    async fn place_call(&self, phone_number: &str) -> Result<String>;
}

/// Authoritative call state fetched directly from the provider.
#[derive(Debug, Clone)]
pub struct CallFetch {
    pub status: Option<String>,
    pub duration_seconds: Option<u32>,
}

/// Fetches call state from the provider, used by the duration backfill.
#[async_trait]
pub trait CallLookup: Send + Sync {
    async fn fetch_call(&self, provider_call_id: &str) -> Result<CallFetch>;
}

/// A transcript as reported by the transcription provider.
#[derive(Debug, Clone)]
pub struct TranscriptFetch {
    pub status: String,
    pub text: Option<String>,
}

/// A transcript listing entry.
#[derive(Debug, Clone)]
pub struct TranscriptListing {
    pub transcript_id: String,
    pub source_recording_id: Option<String>,
    pub status: String,
}

/// Read-only view of the provider's transcript store, used by the sweeper to
/// repair calls whose transcription webhook never arrived.
#[async_trait]
pub trait TranscriptProvider: Send + Sync {
    async fn fetch_transcript_status(&self, transcript_id: &str) -> Result<TranscriptFetch>;
    async fn list_recent_transcripts(&self, limit: usize) -> Result<Vec<TranscriptListing>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calling_mode_round_trip() {
        for mode in [CallingMode::Phone, CallingMode::Browser, CallingMode::Demo] {
            assert_eq!(CallingMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(CallingMode::parse("carrier-pigeon"), None);
    }
}
