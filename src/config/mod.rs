use crate::global;
use crate::telephony::CallingMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub telephony: TelephonyConfig,
    pub sweeper: SweeperSettings,
    pub storage: StorageConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Public base URL the provider posts webhooks to, e.g. an ngrok tunnel.
    pub webhook_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            webhook_base_url: "http://localhost:3000".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TelephonyConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    /// Outbound caller id in E.164 format.
    pub phone_number: Option<String>,
    /// URL of the externally hosted voice (TwiML) document the provider
    /// fetches when an outbound call connects. This service does not serve
    /// one itself, so phone mode cannot run without it.
    pub voice_url: Option<String>,
    pub default_mode: CallingMode,
    pub api_base: Option<String>,
    pub intelligence_base: Option<String>,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            phone_number: None,
            voice_url: None,
            default_mode: CallingMode::Demo,
            api_base: None,
            intelligence_base: None,
        }
    }
}

impl TelephonyConfig {
    /// Phone mode needs credentials, a caller id, and the voice document
    /// URL; any missing piece means we run without a provider client.
    pub fn phone_settings(&self) -> Option<PhoneSettings> {
        match (
            &self.account_sid,
            &self.auth_token,
            &self.phone_number,
            &self.voice_url,
        ) {
            (Some(account_sid), Some(auth_token), Some(phone_number), Some(voice_url)) => {
                Some(PhoneSettings {
                    account_sid: account_sid.clone(),
                    auth_token: auth_token.clone(),
                    phone_number: phone_number.clone(),
                    voice_url: voice_url.clone(),
                })
            }
            _ => None,
        }
    }
}

/// The complete set required to place real phone calls.
#[derive(Debug, Clone)]
pub struct PhoneSettings {
    pub account_sid: String,
    pub auth_token: String,
    pub phone_number: String,
    pub voice_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperSettings {
    pub interval_seconds: u64,
    pub staleness_seconds: u64,
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            interval_seconds: 120,
            staleness_seconds: 300,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Overrides the default database location under the data dir.
    pub db_path: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(path.clone()),
            None => global::db_file(),
        }
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
