use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::backoff::BackoffStrategy;
use crate::retry::{
    RetryOnStatus, RetryOptions, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY, DEFAULT_RETRIES,
};

pub const DEFAULT_CONFIG_PATH: &str = "retry.toml";

/// One retry profile as written in TOML. Every key is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub retries: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
    pub strategy: BackoffStrategy,
    pub retry_on_status_codes: Option<Vec<u16>>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            min_delay_ms: DEFAULT_MIN_DELAY.as_millis() as u64,
            max_delay_ms: DEFAULT_MAX_DELAY.as_millis() as u64,
            jitter: true,
            strategy: BackoffStrategy::Exponential,
            retry_on_status_codes: None,
        }
    }
}

impl RetrySettings {
    /// Validated options. Failures are filtered by `retry_on_status_codes`
    /// when it is set and always retried otherwise.
    pub fn to_options(&self) -> Result<RetryOptions<Option<RetryOnStatus>>> {
        let options = RetryOptions::new()
            .retries(self.retries)
            .jitter(self.jitter)
            .strategy(self.strategy)
            .delays(
                Duration::from_millis(self.min_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            )?;
        Ok(options.predicate(self.predicate()))
    }

    /// Status-code predicate, when `retry_on_status_codes` is set.
    pub fn predicate(&self) -> Option<RetryOnStatus> {
        self.retry_on_status_codes
            .as_ref()
            .map(|codes| RetryOnStatus::new(codes.clone()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub retry: RetrySettings,
    pub profiles: HashMap<String, RetrySettings>,
}

impl Config {
    /// Load `retry.toml` from the working directory.
    pub fn new() -> Result<Self> {
        Self::from_path(DEFAULT_CONFIG_PATH)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&config_str)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        info!("Config: {:?}", config);
        Ok(config)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str)?;
        config.retry.to_options().context("[retry]")?;
        for (name, profile) in &config.profiles {
            profile
                .to_options()
                .with_context(|| format!("[profiles.{}]", name))?;
        }
        Ok(config)
    }

    pub fn profile(&self, name: &str) -> Option<&RetrySettings> {
        self.profiles.get(name)
    }

    /// Named profile, or the `[retry]` table when `name` is `None`.
    pub fn settings(&self, name: Option<&str>) -> Result<&RetrySettings> {
        match name {
            None => Ok(&self.retry),
            Some(name) => self
                .profile(name)
                .ok_or_else(|| anyhow::anyhow!("unknown retry profile '{}'", name)),
        }
    }
}
