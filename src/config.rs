//! Manager configuration.
//!
//! Defaults suit interactive use. `ASSETPORT_WORKERS` and
//! `ASSETPORT_PROGRESS_MS` override the corresponding fields when set.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::crypto::CipherOptions;
use crate::error::Result;
use crate::progress::DEFAULT_EMIT_INTERVAL;

pub const WORKERS_ENV: &str = "ASSETPORT_WORKERS";
pub const PROGRESS_ENV: &str = "ASSETPORT_PROGRESS_MS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Conversion pool size. `0` = one worker per logical CPU.
    pub workers: usize,
    /// Minimum gap between throttled progress events, in milliseconds.
    pub progress_interval_ms: u64,
    /// Key schedule used for encrypted bundles.
    pub cipher: CipherOptions,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            progress_interval_ms: DEFAULT_EMIT_INTERVAL.as_millis() as u64,
            cipher: CipherOptions::default(),
        }
    }
}

impl ManagerConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Applies environment overrides on top of `self`. Unparsable values are ignored.
    pub fn with_env(mut self) -> Self {
        if let Some(workers) = env_number(WORKERS_ENV) {
            self.workers = workers as usize;
        }
        if let Some(ms) = env_number(PROGRESS_ENV) {
            self.progress_interval_ms = ms;
        }
        self
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

fn env_number(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(variable = name, value = %raw, "ignoring non-numeric override");
            None
        }
    }
}
