use crate::config::Config;
use crate::db::{CallRepository, Db};
use anyhow::Result;

use super::args::CallsCliArgs;

pub fn handle_calls_command(args: CallsCliArgs) -> Result<()> {
    let config = Config::load()?;
    let db = Db::new(config.db_path()?);
    let conn = db.open()?;

    let calls = CallRepository::list(&conn, args.limit)?;

    if calls.is_empty() {
        println!("No calls recorded yet.");
        return Ok(());
    }

    println!("Found {} call(s):\n", calls.len());

    for call in calls {
        let transcript = match &call.transcript_text {
            Some(text) => preview(text, 60),
            None => "-".to_string(),
        };

        println!(
            "#{} {} {} [{} / transcript: {}] {}s  {}",
            call.id,
            call.created_at,
            call.phone_number,
            call.call_status.as_str(),
            call.transcript_status.as_str(),
            call.duration_seconds,
            transcript,
        );
    }

    Ok(())
}

/// Truncate display text to at most `max` characters. Counts chars, not
/// bytes; transcripts are arbitrary UTF-8.
fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
