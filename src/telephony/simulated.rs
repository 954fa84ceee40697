//! Simulated call placement for browser and demo modes.
//!
//! Browser calls are dialed client-side and demo calls never leave the
//! process, so neither has a provider-assigned call id. We synthesize one in
//! the provider's format so the lifecycle core treats every call the same.

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use super::{CallPlacer, CallingMode};

pub struct SimulatedCallPlacer {
    mode: CallingMode,
}

impl SimulatedCallPlacer {
    pub fn new(mode: CallingMode) -> Result<Self> {
        if mode == CallingMode::Phone {
            bail!("Phone mode requires the real telephony client");
        }
        Ok(Self { mode })
    }
}

#[async_trait]
impl CallPlacer for SimulatedCallPlacer {
    fn mode(&self) -> CallingMode {
        self.mode
    }

    async fn place_call(&self, phone_number: &str) -> Result<String> {
        let sid = format!("CA{}", Uuid::new_v4().simple());
        info!(
            "{} mode: call to {} logged with synthesized sid {}",
            self.mode.as_str(),
            phone_number,
            sid
        );
        Ok(sid)
    }
}
