// src/config/models.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Operational configuration for the balancer process.
///
/// Every field defaults to the literal constant the design calls for, so a
/// deployment that supplies no config file and sets no `LB_*` environment
/// variables gets exactly the behavior described in the design: port 8100,
/// a 5s probe interval, a 2s probe timeout, three dispatch attempts a second
/// apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    pub listen_addr: SocketAddr,
    pub persistence_path: PathBuf,
    pub probe_interval_secs: u64,
    pub probe_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8100)),
            persistence_path: PathBuf::from("backends.json"),
            probe_interval_secs: 5,
            probe_timeout_secs: 2,
            max_attempts: 3,
            retry_delay_secs: 1,
        }
    }
}

impl BalancerConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Overlay `LB_*` environment variables on top of whatever the defaults
    /// or config file already produced. Missing variables leave the current
    /// value untouched; malformed ones are a hard error so a typo in an
    /// operator's environment doesn't silently fall back to a default.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("LB_LISTEN_ADDR") {
            self.listen_addr = v
                .parse()
                .with_context(|| format!("LB_LISTEN_ADDR={v:?} is not a valid socket address"))?;
        }
        if let Ok(v) = std::env::var("LB_BACKENDS_FILE") {
            self.persistence_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("LB_PROBE_INTERVAL_SECS") {
            self.probe_interval_secs = v
                .parse()
                .with_context(|| format!("LB_PROBE_INTERVAL_SECS={v:?} is not a valid integer"))?;
        }
        if let Ok(v) = std::env::var("LB_PROBE_TIMEOUT_SECS") {
            self.probe_timeout_secs = v
                .parse()
                .with_context(|| format!("LB_PROBE_TIMEOUT_SECS={v:?} is not a valid integer"))?;
        }
        if let Ok(v) = std::env::var("LB_MAX_ATTEMPTS") {
            self.max_attempts = v
                .parse()
                .with_context(|| format!("LB_MAX_ATTEMPTS={v:?} is not a valid integer"))?;
        }
        if let Ok(v) = std::env::var("LB_RETRY_DELAY_SECS") {
            self.retry_delay_secs = v
                .parse()
                .with_context(|| format!("LB_RETRY_DELAY_SECS={v:?} is not a valid integer"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be at least 1"));
        }
        if self.probe_timeout_secs == 0 {
            return Err(anyhow!("probe_timeout_secs must be at least 1"));
        }
        if self.probe_timeout_secs > self.probe_interval_secs {
            return Err(anyhow!(
                "probe_timeout_secs ({}) must not exceed probe_interval_secs ({})",
                self.probe_timeout_secs,
                self.probe_interval_secs
            ));
        }
        if self.persistence_path.as_os_str().is_empty() {
            return Err(anyhow!("persistence_path must not be empty"));
        }
        Ok(())
    }
}
