//! Reconciliation sweeper.
//!
//! Periodic background task that repairs call records the webhooks failed to
//! deliver for. Every repair is expressed as a synthesized event pushed
//! through the reconciler, so a race between a genuine late webhook and the
//! sweeper resolves under the same idempotency rules as live delivery.

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::db::{CallRecord, CallRepository, Db};
use crate::lifecycle::{
    CallEvent, Correlation, LegacyTranscriptionEvent, Reconciler, TranscriptOutcome,
    TranscriptStatus, TranscriptionEvent, TranscriptionKind,
};
use crate::telephony::TranscriptProvider;

/// Text written when the sweeper declares a stale transcription dead.
pub const TIMEOUT_MARKER: &str = "Transcription timed out";

const CANDIDATE_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// How old `updated_at` must be before a non-terminal transcript is
    /// declared stale.
    pub staleness: Duration,
    /// Per-call budget for provider queries.
    pub provider_budget: Duration,
    /// How many provider transcripts to pull per sweep.
    pub provider_list_limit: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(120),
            staleness: Duration::from_secs(300),
            provider_budget: Duration::from_secs(10),
            provider_list_limit: 50,
        }
    }
}

/// What one sweep did.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct SweepReport {
    /// Non-terminal transcription candidates examined.
    pub examined: usize,
    /// Records repaired (stale resolution or provider backfill).
    pub repaired: usize,
}

pub struct Sweeper {
    db: Db,
    reconciler: Reconciler,
    provider: Option<Arc<dyn TranscriptProvider>>,
    config: SweeperConfig,
    // Serializes timer-driven and manually-triggered sweeps.
    running: Mutex<()>,
}

impl Sweeper {
    pub fn new(
        db: Db,
        reconciler: Reconciler,
        provider: Option<Arc<dyn TranscriptProvider>>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            db,
            reconciler,
            provider,
            config,
            running: Mutex::new(()),
        }
    }

    /// Spawn the periodic loop. Ticks that fire while a sweep is still
    /// running are skipped, not queued. Stops when `shutdown` flips.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Sweeper running (interval={}s, staleness={}s)",
                self.config.interval.as_secs(),
                self.config.staleness.as_secs()
            );
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so startup is quiet.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.sweep().await {
                            Ok(report) if report.repaired > 0 => {
                                info!(
                                    "Sweep repaired {} of {} stuck calls",
                                    report.repaired, report.examined
                                );
                            }
                            Ok(report) => {
                                debug!("Sweep examined {} calls, nothing to repair", report.examined);
                            }
                            Err(err) => warn!("Sweep failed: {err:?}"),
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("Sweeper stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Run one sweep. Also reachable through the admin API.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let _guard = self.running.lock().await;

        let db = self.db.clone();
        let stuck = tokio::task::spawn_blocking(move || {
            let conn = db.open()?;
            CallRepository::stuck_transcripts(&conn, CANDIDATE_LIMIT)
        })
        .await
        .context("Sweep query task panicked")??;

        let mut report = SweepReport {
            examined: stuck.len(),
            ..Default::default()
        };

        let mut still_pending = Vec::new();
        for call in stuck {
            if self.is_stale(&call) {
                if self.resolve_stale(&call).await? {
                    report.repaired += 1;
                }
            } else {
                still_pending.push(call);
            }
        }

        report.repaired += self.provider_pass(&still_pending).await;

        Ok(report)
    }

    fn is_stale(&self, call: &CallRecord) -> bool {
        match NaiveDateTime::parse_from_str(&call.updated_at, "%Y-%m-%d %H:%M:%S") {
            Ok(updated) => {
                let age = Utc::now().naive_utc() - updated;
                age.num_seconds() >= self.config.staleness.as_secs() as i64
            }
            Err(_) => {
                warn!(
                    "Unparsable updated_at '{}' on call {}; treating as fresh",
                    call.updated_at, call.provider_call_id
                );
                false
            }
        }
    }

    /// A stale transcript either lost its final event (text already present,
    /// declare it completed) or never produced anything (declare it failed
    /// with a timeout marker). Either way the call stops being stuck.
    async fn resolve_stale(&self, call: &CallRecord) -> Result<bool> {
        let kind = if call.transcript_has_text() {
            TranscriptionKind::Stopped
        } else {
            TranscriptionKind::Error {
                message: Some(TIMEOUT_MARKER.to_string()),
            }
        };
        info!(
            "Resolving stale transcription for call {} ({})",
            call.provider_call_id,
            call.transcript_status.as_str()
        );

        let outcome = self
            .reconciler
            .apply_event(CallEvent::Transcription(TranscriptionEvent {
                provider_call_id: call.provider_call_id.clone(),
                kind,
            }))
            .await?;

        Ok(outcome.applied)
    }

    /// Ask the provider for completed transcripts matching pending calls
    /// with a known recording id. Provider trouble degrades to a warning;
    /// one slow call cannot stall the rest beyond its budget.
    async fn provider_pass(&self, pending: &[CallRecord]) -> usize {
        let Some(provider) = &self.provider else {
            return 0;
        };

        let candidates: Vec<&CallRecord> = pending
            .iter()
            .filter(|c| c.transcript_status == TranscriptStatus::Pending && c.recording_id.is_some())
            .collect();
        if candidates.is_empty() {
            return 0;
        }

        let listings = match tokio::time::timeout(
            self.config.provider_budget,
            provider.list_recent_transcripts(self.config.provider_list_limit),
        )
        .await
        {
            Ok(Ok(listings)) => listings,
            Ok(Err(err)) => {
                warn!("Transcript listing failed: {err:?}");
                return 0;
            }
            Err(_) => {
                warn!("Transcript listing timed out");
                return 0;
            }
        };

        let mut repaired = 0;
        for call in candidates {
            let recording_id = call.recording_id.as_deref().unwrap_or_default();
            let Some(listing) = listings.iter().find(|l| {
                l.status.eq_ignore_ascii_case("completed")
                    && l.source_recording_id.as_deref() == Some(recording_id)
            }) else {
                continue;
            };

            let fetched = match tokio::time::timeout(
                self.config.provider_budget,
                provider.fetch_transcript_status(&listing.transcript_id),
            )
            .await
            {
                Ok(Ok(fetched)) => fetched,
                Ok(Err(err)) => {
                    warn!(
                        "Transcript fetch failed for call {}: {err:?}",
                        call.provider_call_id
                    );
                    continue;
                }
                Err(_) => {
                    warn!(
                        "Transcript fetch timed out for call {}",
                        call.provider_call_id
                    );
                    continue;
                }
            };

            if !fetched.status.eq_ignore_ascii_case("completed") {
                continue;
            }

            let event = CallEvent::LegacyTranscription(LegacyTranscriptionEvent {
                correlation: Correlation::RecordingId(recording_id.to_string()),
                text: fetched.text,
                status: TranscriptOutcome::Completed,
            });
            match self.reconciler.apply_event(event).await {
                Ok(outcome) if outcome.applied => {
                    info!(
                        "Backfilled transcript for call {} from provider",
                        call.provider_call_id
                    );
                    repaired += 1;
                }
                Ok(_) => {}
                Err(err) => warn!(
                    "Failed to apply backfilled transcript for call {}: {err:?}",
                    call.provider_call_id
                ),
            }
        }

        repaired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telephony::TranscriptFetch;
    use anyhow::Result;
    use async_trait::async_trait;
    use rusqlite::params;
    use tempfile::TempDir;

    struct StubProvider {
        listings: Vec<crate::telephony::TranscriptListing>,
        fetch: Option<TranscriptFetch>,
    }

    #[async_trait]
    impl TranscriptProvider for StubProvider {
        async fn fetch_transcript_status(&self, _transcript_id: &str) -> Result<TranscriptFetch> {
            self.fetch
                .clone()
                .ok_or_else(|| anyhow::anyhow!("no transcript"))
        }

        async fn list_recent_transcripts(
            &self,
            _limit: usize,
        ) -> Result<Vec<crate::telephony::TranscriptListing>> {
            Ok(self.listings.clone())
        }
    }

    fn test_db(dir: &TempDir) -> Db {
        Db::new(dir.path().join("calls.db"))
    }

    fn sweeper(db: &Db, provider: Option<Arc<dyn TranscriptProvider>>) -> Sweeper {
        Sweeper::new(
            db.clone(),
            Reconciler::new(db.clone()),
            provider,
            SweeperConfig::default(),
        )
    }

    fn insert_call(db: &Db, sid: &str) {
        let conn = db.open().unwrap();
        CallRepository::insert(&conn, "+15551234567", sid).unwrap();
    }

    fn age_call(db: &Db, sid: &str, minutes: i64) {
        let conn = db.open().unwrap();
        conn.execute(
            "UPDATE calls SET updated_at = datetime('now', ?1 || ' minutes') \
             WHERE provider_call_id = ?2",
            params![format!("-{}", minutes), sid],
        )
        .unwrap();
    }

    fn set_fields(db: &Db, sid: &str, changes: &crate::db::CallChanges) {
        let conn = db.open().unwrap();
        CallRepository::update(&conn, sid, changes).unwrap();
    }

    fn get(db: &Db, sid: &str) -> CallRecord {
        let conn = db.open().unwrap();
        CallRepository::get(&conn, sid).unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_stale_pending_call_fails_with_timeout_marker() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        insert_call(&db, "CA1");
        age_call(&db, "CA1", 10);

        let sweeper = sweeper(&db, None);
        let report = sweeper.sweep().await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.repaired, 1);

        let record = get(&db, "CA1");
        assert_eq!(record.transcript_status, TranscriptStatus::Failed);
        assert_eq!(record.transcript_text.as_deref(), Some(TIMEOUT_MARKER));

        // Resolved calls leave the candidate set; the next sweep sees none.
        let next = sweeper.sweep().await.unwrap();
        assert_eq!(next.examined, 0);
        assert_eq!(next.repaired, 0);
    }

    #[tokio::test]
    async fn test_stale_call_with_text_completes() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        insert_call(&db, "CA1");
        set_fields(
            &db,
            "CA1",
            &crate::db::CallChanges {
                transcript_status: Some(TranscriptStatus::Streaming),
                transcript_text: Some("partial but real".into()),
                ..Default::default()
            },
        );
        age_call(&db, "CA1", 10);

        let report = sweeper(&db, None).sweep().await.unwrap();
        assert_eq!(report.repaired, 1);

        let record = get(&db, "CA1");
        assert_eq!(record.transcript_status, TranscriptStatus::Completed);
        assert_eq!(record.transcript_text.as_deref(), Some("partial but real"));
    }

    #[tokio::test]
    async fn test_fresh_call_left_alone() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        insert_call(&db, "CA1");

        let report = sweeper(&db, None).sweep().await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.repaired, 0);
        assert_eq!(get(&db, "CA1").transcript_status, TranscriptStatus::Pending);
    }

    #[tokio::test]
    async fn test_provider_backfill_for_pending_recording() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        insert_call(&db, "CA1");
        set_fields(
            &db,
            "CA1",
            &crate::db::CallChanges {
                recording_id: Some("RE1".into()),
                recording_url: Some("https://x/rec.wav".into()),
                ..Default::default()
            },
        );

        let provider = StubProvider {
            listings: vec![crate::telephony::TranscriptListing {
                transcript_id: "GT1".into(),
                source_recording_id: Some("RE1".into()),
                status: "completed".into(),
            }],
            fetch: Some(TranscriptFetch {
                status: "completed".into(),
                text: Some("hello from the batch path".into()),
            }),
        };

        let report = sweeper(&db, Some(Arc::new(provider))).sweep().await.unwrap();
        assert_eq!(report.repaired, 1);

        let record = get(&db, "CA1");
        assert_eq!(record.transcript_status, TranscriptStatus::Completed);
        assert_eq!(
            record.transcript_text.as_deref(),
            Some("hello from the batch path")
        );
    }

    #[tokio::test]
    async fn test_provider_pass_skips_unmatched_recordings() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        insert_call(&db, "CA1");
        set_fields(
            &db,
            "CA1",
            &crate::db::CallChanges {
                recording_id: Some("RE1".into()),
                ..Default::default()
            },
        );

        let provider = StubProvider {
            listings: vec![crate::telephony::TranscriptListing {
                transcript_id: "GT9".into(),
                source_recording_id: Some("RE9".into()),
                status: "completed".into(),
            }],
            fetch: None,
        };

        let report = sweeper(&db, Some(Arc::new(provider))).sweep().await.unwrap();
        assert_eq!(report.repaired, 0);
        assert_eq!(get(&db, "CA1").transcript_status, TranscriptStatus::Pending);
    }
}
