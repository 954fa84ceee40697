//! Call record repository.
//!
//! Append-only creation, in-place field updates, no deletion. Every write
//! refreshes `updated_at`; the sweeper uses that column to find records the
//! webhooks stopped feeding.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use thiserror::Error;

use crate::lifecycle::status::{CallStatus, TranscriptStatus};

/// One record per call, keyed by the provider's call id.
#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    pub id: i64,
    pub phone_number: String,
    pub provider_call_id: String,
    pub call_status: CallStatus,
    pub duration_seconds: u32,
    pub recording_url: Option<String>,
    pub recording_id: Option<String>,
    pub transcript_text: Option<String>,
    pub transcript_status: TranscriptStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl CallRecord {
    pub fn transcript_has_text(&self) -> bool {
        self.transcript_text
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Partial update applied to a single record. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallChanges {
    pub call_status: Option<CallStatus>,
    pub duration_seconds: Option<u32>,
    pub recording_url: Option<String>,
    pub recording_id: Option<String>,
    pub transcript_text: Option<String>,
    pub transcript_status: Option<TranscriptStatus>,
}

impl CallChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("provider call id '{0}' already exists")]
    DuplicateKey(String),
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
}

/// Repository for call records.
pub struct CallRepository;

impl CallRepository {
    /// Insert a new call record. Fails with `DuplicateKey` when the provider
    /// call id already exists (creation race, second create loses).
    pub fn insert(
        conn: &Connection,
        phone_number: &str,
        provider_call_id: &str,
    ) -> Result<i64, StoreError> {
        match conn.execute(
            "INSERT INTO calls (phone_number, provider_call_id) VALUES (?1, ?2)",
            params![phone_number, provider_call_id],
        ) {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => {
                Err(StoreError::DuplicateKey(provider_call_id.to_string()))
            }
            Err(e) => Err(StoreError::Sql(e)),
        }
    }

    /// Get a call by provider call id.
    pub fn get(conn: &Connection, provider_call_id: &str) -> Result<Option<CallRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM calls WHERE provider_call_id = ?1"
            ))
            .context("Failed to prepare call query")?;

        let mut rows = stmt
            .query_map(params![provider_call_id], map_row)
            .context("Failed to query call")?;

        match rows.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Secondary lookup for the legacy correlation path.
    pub fn get_by_recording_id(conn: &Connection, recording_id: &str) -> Result<Option<CallRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM calls WHERE recording_id = ?1"
            ))
            .context("Failed to prepare recording lookup")?;

        let mut rows = stmt
            .query_map(params![recording_id], map_row)
            .context("Failed to query call by recording id")?;

        match rows.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Apply a partial update. Returns the applied-row count; zero means the
    /// target record does not exist, which callers treat as a delivery
    /// against an unknown call, not a fatal error.
    pub fn update(
        conn: &Connection,
        provider_call_id: &str,
        changes: &CallChanges,
    ) -> Result<usize> {
        let mut sql = String::from("UPDATE calls SET updated_at = CURRENT_TIMESTAMP");
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = changes.call_status {
            sql.push_str(", call_status = ?");
            values.push(Box::new(status.as_str().to_string()));
        }
        if let Some(duration) = changes.duration_seconds {
            sql.push_str(", duration_seconds = ?");
            values.push(Box::new(duration));
        }
        if let Some(url) = &changes.recording_url {
            sql.push_str(", recording_url = ?");
            values.push(Box::new(url.clone()));
        }
        if let Some(rid) = &changes.recording_id {
            sql.push_str(", recording_id = ?");
            values.push(Box::new(rid.clone()));
        }
        if let Some(text) = &changes.transcript_text {
            sql.push_str(", transcript_text = ?");
            values.push(Box::new(text.clone()));
        }
        if let Some(status) = changes.transcript_status {
            sql.push_str(", transcript_status = ?");
            values.push(Box::new(status.as_str().to_string()));
        }

        sql.push_str(" WHERE provider_call_id = ?");
        values.push(Box::new(provider_call_id.to_string()));

        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|p| p.as_ref()).collect();

        conn.execute(&sql, param_refs.as_slice())
            .context("Failed to update call record")
    }

    /// List calls, newest first.
    pub fn list(conn: &Connection, limit: usize) -> Result<Vec<CallRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM calls ORDER BY created_at DESC, id DESC LIMIT ?1"
            ))
            .context("Failed to prepare calls list query")?;

        let rows = stmt
            .query_map(params![limit as i64], map_row)
            .context("Failed to list calls")?;

        let mut calls = Vec::new();
        for row in rows {
            calls.push(row?);
        }

        Ok(calls)
    }

    /// Calls whose transcription never reached a terminal state. Sweeper
    /// candidate set.
    pub fn stuck_transcripts(conn: &Connection, limit: usize) -> Result<Vec<CallRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM calls \
                 WHERE transcript_status IN ('pending', 'processing', 'streaming') \
                 ORDER BY updated_at ASC LIMIT ?1"
            ))
            .context("Failed to prepare stuck transcripts query")?;

        let rows = stmt
            .query_map(params![limit as i64], map_row)
            .context("Failed to query stuck transcripts")?;

        let mut calls = Vec::new();
        for row in rows {
            calls.push(row?);
        }

        Ok(calls)
    }

    /// Calls that never got an authoritative duration. Duration backfill
    /// candidate set.
    pub fn missing_duration(conn: &Connection, limit: usize) -> Result<Vec<CallRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM calls WHERE duration_seconds = 0 \
                 ORDER BY created_at DESC LIMIT ?1"
            ))
            .context("Failed to prepare missing duration query")?;

        let rows = stmt
            .query_map(params![limit as i64], map_row)
            .context("Failed to query calls missing duration")?;

        let mut calls = Vec::new();
        for row in rows {
            calls.push(row?);
        }

        Ok(calls)
    }

    /// Row count, used by the health probe and tests.
    pub fn count(conn: &Connection) -> Result<i64> {
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM calls", [], |row| row.get(0))
            .context("Failed to count calls")?;

        Ok(count)
    }
}

const COLUMNS: &str = "id, phone_number, provider_call_id, call_status, duration_seconds, \
                       recording_url, recording_id, transcript_text, transcript_status, \
                       created_at, updated_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<CallRecord> {
    let call_status: String = row.get(3)?;
    let transcript_status: String = row.get(8)?;
    let duration: i64 = row.get(4)?;

    Ok(CallRecord {
        id: row.get(0)?,
        phone_number: row.get(1)?,
        provider_call_id: row.get(2)?,
        call_status: CallStatus::parse(&call_status).ok_or(rusqlite::Error::InvalidQuery)?,
        duration_seconds: duration.max(0) as u32,
        recording_url: row.get(5)?,
        recording_id: row.get(6)?,
        transcript_text: row.get(7)?,
        transcript_status: TranscriptStatus::parse(&transcript_status)
            .ok_or(rusqlite::Error::InvalidQuery)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn test_insert_call() {
        let conn = setup_db();
        let id = CallRepository::insert(&conn, "+15551234567", "CA1").unwrap();
        assert!(id > 0);

        let record = CallRepository::get(&conn, "CA1").unwrap().unwrap();
        assert_eq!(record.phone_number, "+15551234567");
        assert_eq!(record.call_status, CallStatus::Initiated);
        assert_eq!(record.transcript_status, TranscriptStatus::Pending);
        assert_eq!(record.duration_seconds, 0);
    }

    #[test]
    fn test_insert_duplicate_provider_call_id() {
        let conn = setup_db();
        CallRepository::insert(&conn, "+15551234567", "CA1").unwrap();

        let err = CallRepository::insert(&conn, "+15559999999", "CA1").unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(id) if id == "CA1"));
        assert_eq!(CallRepository::count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_get_nonexistent_call() {
        let conn = setup_db();
        assert!(CallRepository::get(&conn, "CA404").unwrap().is_none());
    }

    #[test]
    fn test_update_applied_count() {
        let conn = setup_db();
        CallRepository::insert(&conn, "+15551234567", "CA1").unwrap();

        let changes = CallChanges {
            call_status: Some(CallStatus::InProgress),
            ..Default::default()
        };
        assert_eq!(CallRepository::update(&conn, "CA1", &changes).unwrap(), 1);
        assert_eq!(CallRepository::update(&conn, "CA404", &changes).unwrap(), 0);

        let record = CallRepository::get(&conn, "CA1").unwrap().unwrap();
        assert_eq!(record.call_status, CallStatus::InProgress);
    }

    #[test]
    fn test_update_partial_fields() {
        let conn = setup_db();
        CallRepository::insert(&conn, "+15551234567", "CA1").unwrap();

        CallRepository::update(
            &conn,
            "CA1",
            &CallChanges {
                recording_url: Some("https://x/rec.wav".into()),
                recording_id: Some("RE1".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let record = CallRepository::get(&conn, "CA1").unwrap().unwrap();
        assert_eq!(record.recording_url.as_deref(), Some("https://x/rec.wav"));
        assert_eq!(record.recording_id.as_deref(), Some("RE1"));
        // untouched fields keep their values
        assert_eq!(record.call_status, CallStatus::Initiated);
    }

    #[test]
    fn test_lookup_by_recording_id() {
        let conn = setup_db();
        CallRepository::insert(&conn, "+15551111111", "CA1").unwrap();
        CallRepository::insert(&conn, "+15552222222", "CA2").unwrap();
        CallRepository::update(
            &conn,
            "CA2",
            &CallChanges {
                recording_id: Some("RE1".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let record = CallRepository::get_by_recording_id(&conn, "RE1")
            .unwrap()
            .unwrap();
        assert_eq!(record.provider_call_id, "CA2");
        assert!(CallRepository::get_by_recording_id(&conn, "RE404")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_list_newest_first() {
        let conn = setup_db();
        CallRepository::insert(&conn, "+15551111111", "CA1").unwrap();
        CallRepository::insert(&conn, "+15552222222", "CA2").unwrap();
        CallRepository::insert(&conn, "+15553333333", "CA3").unwrap();

        let calls = CallRepository::list(&conn, 2).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].provider_call_id, "CA3");
        assert_eq!(calls[1].provider_call_id, "CA2");
    }

    #[test]
    fn test_stuck_transcripts_excludes_terminal() {
        let conn = setup_db();
        CallRepository::insert(&conn, "+15551111111", "CA1").unwrap();
        CallRepository::insert(&conn, "+15552222222", "CA2").unwrap();
        CallRepository::update(
            &conn,
            "CA2",
            &CallChanges {
                transcript_status: Some(TranscriptStatus::Completed),
                transcript_text: Some("done".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let stuck = CallRepository::stuck_transcripts(&conn, 10).unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].provider_call_id, "CA1");
    }

    #[test]
    fn test_missing_duration() {
        let conn = setup_db();
        CallRepository::insert(&conn, "+15551111111", "CA1").unwrap();
        CallRepository::insert(&conn, "+15552222222", "CA2").unwrap();
        CallRepository::update(
            &conn,
            "CA2",
            &CallChanges {
                duration_seconds: Some(42),
                ..Default::default()
            },
        )
        .unwrap();

        let missing = CallRepository::missing_duration(&conn, 10).unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].provider_call_id, "CA1");
    }
}
