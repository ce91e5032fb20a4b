//! YAML configuration: the handler chain, the watched resources and
//! controller tuning.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use vigil_controller::ControllerConfig;
use vigil_core::{Error, HandlerConfig, ResourceConfig};
use vigil_store::Backoff;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
    #[serde(default)]
    pub controller: ControllerSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerSettings {
    pub concurrent_workers: usize,
    pub resync_seconds: u64,
    pub max_retries: u32,
    pub cache_sync_timeout_seconds: u64,
    pub shutdown_timeout_seconds: u64,
    pub backoff_base_millis: u64,
    pub backoff_max_seconds: u64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            concurrent_workers: 1,
            resync_seconds: 30,
            max_retries: 3,
            cache_sync_timeout_seconds: 120,
            shutdown_timeout_seconds: 10,
            backoff_base_millis: 5,
            backoff_max_seconds: 1000,
        }
    }
}

impl ControllerSettings {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    pub fn controller_config(&self, name: &str) -> ControllerConfig {
        ControllerConfig {
            name: name.to_string(),
            concurrent_workers: self.concurrent_workers,
            resync_interval: Duration::from_secs(self.resync_seconds),
            max_retries: self.max_retries,
            cache_sync_timeout: Duration::from_secs(self.cache_sync_timeout_seconds),
            shutdown_timeout: self.shutdown_timeout(),
            backoff: Backoff {
                base: Duration::from_millis(self.backoff_base_millis),
                max: Duration::from_secs(self.backoff_max_seconds),
            },
        }
    }
}

impl Config {
    pub fn parse(text: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(text).context("parsing config YAML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn validate(&self) -> vigil_core::Result<()> {
        if self.handlers.is_empty() {
            return Err(Error::Config("at least one handler is required".into()));
        }
        if let Some(h) = self.handlers.iter().find(|h| h.name.trim().is_empty()) {
            return Err(Error::Config(format!("handler without a name: {:?}", h)));
        }
        if self.resources.is_empty() {
            return Err(Error::Config("at least one resource is required".into()));
        }
        if self.resources.iter().any(|r| r.kind.trim().is_empty()) {
            return Err(Error::Config("resource without a kind".into()));
        }
        if self.controller.concurrent_workers == 0 {
            return Err(Error::Config("concurrentWorkers must be at least 1".into()));
        }
        if self.controller.resync_seconds == 0 {
            return Err(Error::Config("resyncSeconds must be positive".into()));
        }
        Ok(())
    }
}
