use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

pub fn open_at(path: &Path) -> Result<Connection> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let conn = Connection::open(path).context("Failed to open database connection")?;

    migrate(&conn)?;

    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS calls (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            phone_number TEXT NOT NULL,
            provider_call_id TEXT UNIQUE NOT NULL,
            call_status TEXT NOT NULL DEFAULT 'initiated',
            duration_seconds INTEGER NOT NULL DEFAULT 0,
            recording_url TEXT,
            recording_id TEXT,
            transcript_text TEXT,
            transcript_status TEXT NOT NULL DEFAULT 'pending',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create calls table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_calls_created_at ON calls(created_at DESC)",
        [],
    )
    .context("Failed to create created_at index")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_calls_provider_call_id ON calls(provider_call_id)",
        [],
    )
    .context("Failed to create provider_call_id index")?;

    // Secondary lookup path for legacy transcription events that only carry
    // a recording id.
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_calls_recording_id ON calls(recording_id)",
        [],
    )
    .context("Failed to create recording_id index")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_calls_transcript_status ON calls(transcript_status)",
        [],
    )
    .context("Failed to create transcript_status index")?;

    Ok(())
}
