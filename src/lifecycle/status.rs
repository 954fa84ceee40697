//! Call and transcript status vocabularies.
//!
//! Both enums round-trip through the strings the provider sends (and the
//! strings stored in SQLite). Terminal values are sticky: the reconciler
//! refuses to move a record backward out of them.

use serde::{Deserialize, Serialize};

/// Lifecycle status of the call itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Failed,
    Busy,
    NoAnswer,
    Canceled,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Ringing => "ringing",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Busy => "busy",
            Self::NoAnswer => "no-answer",
            Self::Canceled => "canceled",
        }
    }

    /// Parse a provider status string. Input is case-normalized first.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "initiated" | "queued" => Some(Self::Initiated),
            "ringing" => Some(Self::Ringing),
            "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "busy" => Some(Self::Busy),
            "no-answer" => Some(Self::NoAnswer),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Terminal statuses accept no further call-status transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Busy | Self::NoAnswer | Self::Canceled
        )
    }
}

/// Status of the call's transcription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptStatus {
    Pending,
    Streaming,
    Processing,
    Completed,
    Failed,
}

impl TranscriptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Streaming => "streaming",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "streaming" => Some(Self::Streaming),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_status_round_trip() {
        for status in [
            CallStatus::Initiated,
            CallStatus::Ringing,
            CallStatus::InProgress,
            CallStatus::Completed,
            CallStatus::Failed,
            CallStatus::Busy,
            CallStatus::NoAnswer,
            CallStatus::Canceled,
        ] {
            assert_eq!(CallStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_call_status_case_normalized() {
        assert_eq!(CallStatus::parse("COMPLETED"), Some(CallStatus::Completed));
        assert_eq!(CallStatus::parse(" In-Progress "), Some(CallStatus::InProgress));
        assert_eq!(CallStatus::parse("nonsense"), None);
    }

    #[test]
    fn test_call_status_terminal_set() {
        assert!(!CallStatus::Initiated.is_terminal());
        assert!(!CallStatus::Ringing.is_terminal());
        assert!(!CallStatus::InProgress.is_terminal());
        assert!(CallStatus::Completed.is_terminal());
        assert!(CallStatus::Failed.is_terminal());
        assert!(CallStatus::Busy.is_terminal());
        assert!(CallStatus::NoAnswer.is_terminal());
        assert!(CallStatus::Canceled.is_terminal());
    }

    #[test]
    fn test_call_status_serialization() {
        let json = serde_json::to_string(&CallStatus::NoAnswer).unwrap();
        assert_eq!(json, "\"no-answer\"");

        let parsed: CallStatus = serde_json::from_str("\"in-progress\"").unwrap();
        assert_eq!(parsed, CallStatus::InProgress);
    }

    #[test]
    fn test_transcript_status_round_trip() {
        for status in [
            TranscriptStatus::Pending,
            TranscriptStatus::Streaming,
            TranscriptStatus::Processing,
            TranscriptStatus::Completed,
            TranscriptStatus::Failed,
        ] {
            assert_eq!(TranscriptStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_transcript_status_terminal_set() {
        assert!(!TranscriptStatus::Pending.is_terminal());
        assert!(!TranscriptStatus::Streaming.is_terminal());
        assert!(!TranscriptStatus::Processing.is_terminal());
        assert!(TranscriptStatus::Completed.is_terminal());
        assert!(TranscriptStatus::Failed.is_terminal());
    }
}
