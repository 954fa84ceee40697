use crate::api::{ApiServer, AppState};
use crate::config::Config;
use crate::db::Db;
use crate::lifecycle::Reconciler;
use crate::sweeper::{Sweeper, SweeperConfig};
use crate::telephony::{CallLookup, CallPlacer, TranscriptProvider, TwilioClient};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

pub async fn run_service() -> Result<()> {
    info!("Starting calltrace service");

    let config = Config::load()?;

    let db_path = config.db_path()?;
    let db = Db::new(db_path.clone());
    // Open once up front so a missing or corrupt store fails startup instead
    // of surfacing on the first webhook.
    db.open()
        .with_context(|| format!("Failed to open call store at {:?}", db_path))?;
    info!("Call store ready at {:?}", db_path);

    let provider = build_provider(&config)?;
    if provider.is_none() {
        warn!(
            "Phone settings incomplete (credentials, caller id, voice document URL); \
             running in demo/browser mode only"
        );
    }

    let reconciler = Reconciler::new(db.clone());

    let transcript_provider: Option<Arc<dyn TranscriptProvider>> = provider
        .clone()
        .map(|client| client as Arc<dyn TranscriptProvider>);
    let sweeper = Arc::new(Sweeper::new(
        db.clone(),
        reconciler.clone(),
        transcript_provider,
        SweeperConfig {
            interval: Duration::from_secs(config.sweeper.interval_seconds),
            staleness: Duration::from_secs(config.sweeper.staleness_seconds),
            ..Default::default()
        },
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper_handle = sweeper.clone().spawn(shutdown_rx);

    let state = AppState {
        db,
        reconciler,
        phone_placer: provider
            .clone()
            .map(|client| client as Arc<dyn CallPlacer>),
        lookup: provider.map(|client| client as Arc<dyn CallLookup>),
        sweeper,
        default_mode: config.telephony.default_mode,
        started_at: std::time::Instant::now(),
    };

    let api_server = ApiServer::new(config.server.port, state);
    tokio::select! {
        result = api_server.start() => {
            if let Err(e) = result {
                error!("API server failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = sweeper_handle.await;
    info!("Calltrace stopped");

    Ok(())
}

fn build_provider(config: &Config) -> Result<Option<Arc<TwilioClient>>> {
    let Some(settings) = config.telephony.phone_settings() else {
        return Ok(None);
    };

    let mut client = TwilioClient::new(
        settings.account_sid,
        settings.auth_token,
        settings.phone_number,
        config.server.webhook_base_url.clone(),
        settings.voice_url,
    )?;
    if let (Some(api), Some(intelligence)) = (
        &config.telephony.api_base,
        &config.telephony.intelligence_base,
    ) {
        client = client.with_bases(api.clone(), intelligence.clone());
    }

    Ok(Some(Arc::new(client)))
}
