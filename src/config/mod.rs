// src/config/mod.rs
mod models;

pub use models::BalancerConfig;

use anyhow::{Context, Result};
use std::path::Path;

/// Load the balancer's operational configuration.
///
/// Layering mirrors the rest of the ambient stack: built-in defaults, then an
/// optional config file (YAML or JSON, either extension accepted, tolerant of
/// being entirely absent), then `LB_*` environment variable overrides. The
/// file layer never fails startup on its own -- a missing or unparseable file
/// just falls back to defaults, the same tolerance `persistence::load` gives
/// the backend roster.
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<BalancerConfig> {
    let path = path.as_ref();
    let mut config = match tokio::fs::read_to_string(path).await {
        Ok(contents) => parse(path, &contents).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "could not parse config file, using defaults");
            BalancerConfig::default()
        }),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "no config file found, using defaults");
            BalancerConfig::default()
        }
    };

    config.apply_env_overrides()?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn parse(path: &Path, contents: &str) -> Result<BalancerConfig> {
    if path.extension().and_then(|s| s.to_str()) == Some("yaml")
        || path.extension().and_then(|s| s.to_str()) == Some("yml")
    {
        serde_yaml::from_str(contents).context("failed to parse YAML config")
    } else {
        serde_json::from_str(contents).context("failed to parse JSON config")
    }
}
