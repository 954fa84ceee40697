//! Twilio-shaped HTTP client: outbound call placement, call lookup, and the
//! Intelligence transcripts API used by the sweeper's repair pass.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use super::{
    CallFetch, CallPlacer, CallingMode, CallLookup, TranscriptFetch, TranscriptListing,
    TranscriptProvider,
};

const DEFAULT_API_BASE: &str = "https://api.twilio.com";
const DEFAULT_INTELLIGENCE_BASE: &str = "https://intelligence.twilio.com/v2";

pub struct TwilioClient {
    http: Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    webhook_base_url: String,
    voice_url: String,
    api_base: String,
    intelligence_base: String,
}

impl TwilioClient {
    pub fn new(
        account_sid: String,
        auth_token: String,
        from_number: String,
        webhook_base_url: String,
        voice_url: String,
    ) -> Result<Self> {
        let http = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            account_sid,
            auth_token,
            from_number,
            webhook_base_url,
            voice_url,
            api_base: DEFAULT_API_BASE.to_string(),
            intelligence_base: DEFAULT_INTELLIGENCE_BASE.to_string(),
        })
    }

    /// Override API hosts, for tests against a local stub server.
    pub fn with_bases(mut self, api_base: String, intelligence_base: String) -> Self {
        self.api_base = api_base;
        self.intelligence_base = intelligence_base;
        self
    }

    fn calls_url(&self, suffix: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls{}",
            self.api_base, self.account_sid, suffix
        )
    }

    /// The voice document URL for one call, with the dial target appended as
    /// a query parameter. The document itself is hosted externally.
    fn voice_url_for(&self, phone_number: &str) -> Result<String> {
        let mut url = reqwest::Url::parse(&self.voice_url)
            .context("Invalid voice document URL")?;
        url.query_pairs_mut().append_pair("target", phone_number);
        Ok(url.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
    status: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptsPage {
    transcripts: Vec<TranscriptResource>,
}

#[derive(Debug, Deserialize)]
struct TranscriptResource {
    sid: String,
    status: String,
    channel: Option<TranscriptChannel>,
}

#[derive(Debug, Deserialize)]
struct TranscriptChannel {
    media_properties: Option<MediaProperties>,
}

#[derive(Debug, Deserialize)]
struct MediaProperties {
    source_sid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentencesPage {
    sentences: Vec<Sentence>,
}

#[derive(Debug, Deserialize)]
struct Sentence {
    transcript: String,
}

#[async_trait]
impl CallPlacer for TwilioClient {
    fn mode(&self) -> CallingMode {
        CallingMode::Phone
    }

    async fn place_call(&self, phone_number: &str) -> Result<String> {
        let voice_url = self.voice_url_for(phone_number)?;
        let recording_callback = format!("{}/api/webhooks/recording", self.webhook_base_url);
        let status_callback = format!("{}/api/webhooks/status", self.webhook_base_url);
        let params = [
            ("To", phone_number),
            ("From", self.from_number.as_str()),
            ("Url", voice_url.as_str()),
            ("Record", "true"),
            ("RecordingStatusCallback", recording_callback.as_str()),
            ("RecordingStatusCallbackEvent", "completed"),
            ("StatusCallback", status_callback.as_str()),
            ("StatusCallbackEvent", "completed"),
        ];

        let response = self
            .http
            .post(self.calls_url(".json"))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .context("Call placement request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Provider rejected call placement ({}): {}", status, body);
        }

        let call: CallResource = response
            .json()
            .await
            .context("Failed to parse call placement response")?;

        info!("Phone mode: call to {} placed with sid {}", phone_number, call.sid);
        Ok(call.sid)
    }
}

#[async_trait]
impl CallLookup for TwilioClient {
    async fn fetch_call(&self, provider_call_id: &str) -> Result<CallFetch> {
        let response = self
            .http
            .get(self.calls_url(&format!("/{}.json", provider_call_id)))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .context("Call lookup request failed")?;

        if !response.status().is_success() {
            bail!("Call lookup failed with status {}", response.status());
        }

        let call: CallResource = response
            .json()
            .await
            .context("Failed to parse call lookup response")?;

        Ok(CallFetch {
            status: call.status,
            duration_seconds: call.duration.and_then(|d| d.trim().parse().ok()),
        })
    }
}

#[async_trait]
impl TranscriptProvider for TwilioClient {
    async fn fetch_transcript_status(&self, transcript_id: &str) -> Result<TranscriptFetch> {
        let url = format!("{}/Transcripts/{}", self.intelligence_base, transcript_id);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .context("Transcript fetch request failed")?;

        if !response.status().is_success() {
            bail!("Transcript fetch failed with status {}", response.status());
        }

        let transcript: TranscriptResource = response
            .json()
            .await
            .context("Failed to parse transcript response")?;

        let text = if transcript.status.eq_ignore_ascii_case("completed") {
            let sentences: SentencesPage = self
                .http
                .get(format!("{}/Sentences", url))
                .basic_auth(&self.account_sid, Some(&self.auth_token))
                .send()
                .await
                .context("Sentences request failed")?
                .json()
                .await
                .context("Failed to parse sentences response")?;

            let joined = sentences
                .sentences
                .iter()
                .map(|s| s.transcript.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            (!joined.is_empty()).then_some(joined)
        } else {
            None
        };

        Ok(TranscriptFetch {
            status: transcript.status,
            text,
        })
    }

    async fn list_recent_transcripts(&self, limit: usize) -> Result<Vec<TranscriptListing>> {
        let response = self
            .http
            .get(format!("{}/Transcripts", self.intelligence_base))
            .query(&[("PageSize", limit)])
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .context("Transcript list request failed")?;

        if !response.status().is_success() {
            bail!("Transcript list failed with status {}", response.status());
        }

        let page: TranscriptsPage = response
            .json()
            .await
            .context("Failed to parse transcript list response")?;

        Ok(page
            .transcripts
            .into_iter()
            .map(|t| TranscriptListing {
                transcript_id: t.sid,
                status: t.status,
                source_recording_id: t
                    .channel
                    .and_then(|c| c.media_properties)
                    .and_then(|m| m.source_sid),
            })
            .collect())
    }
}
