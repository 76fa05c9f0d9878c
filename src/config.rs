//! CLI configuration: built-in defaults, an optional JSON config file, and
//! environment overrides, applied in that order.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use query_relay::{RelayConfig, RemoteConfig};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const ENV_REMOTE_URL: &str = "TAPFORGE_REMOTE_URL";
pub const ENV_USER: &str = "TAPFORGE_USER";
pub const ENV_POLL_INTERVAL_MS: &str = "TAPFORGE_POLL_INTERVAL_MS";
pub const ENV_POLL_ATTEMPTS: &str = "TAPFORGE_POLL_ATTEMPTS";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the remote reasoning service.
    pub remote_url: String,

    /// User identity carried on every remote call.
    pub user_id: String,

    /// Delay between tool-request polls.
    pub poll_interval_ms: u64,

    /// Poll budget before a query gives up and degrades.
    pub poll_attempts: u32,

    /// Timeout for a single local tool execution.
    pub tool_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let remote = RemoteConfig::default();
        let relay = RelayConfig::default();
        Self {
            remote_url: remote.base_url,
            user_id: remote.user_id,
            poll_interval_ms: relay.poll_interval_ms,
            poll_attempts: relay.max_poll_attempts,
            tool_timeout_ms: relay.tool_timeout_ms,
        }
    }
}

impl AppConfig {
    /// Load configuration. An explicit path must exist and parse; the
    /// platform default location is used only if present.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path).await?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path).await?,
                _ => Self::default(),
            },
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Environment variables override file values. Unparseable numbers are
    /// ignored with a warning rather than failing startup.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(ENV_REMOTE_URL) {
            self.remote_url = value;
        }
        if let Some(value) = lookup(ENV_USER) {
            self.user_id = value;
        }
        if let Some(value) = lookup(ENV_POLL_INTERVAL_MS) {
            match value.parse() {
                Ok(parsed) => self.poll_interval_ms = parsed,
                Err(_) => warn!("ignoring unparseable {ENV_POLL_INTERVAL_MS}={value}"),
            }
        }
        if let Some(value) = lookup(ENV_POLL_ATTEMPTS) {
            match value.parse() {
                Ok(parsed) => self.poll_attempts = parsed,
                Err(_) => warn!("ignoring unparseable {ENV_POLL_ATTEMPTS}={value}"),
            }
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            poll_interval_ms: self.poll_interval_ms,
            max_poll_attempts: self.poll_attempts,
            tool_timeout_ms: self.tool_timeout_ms,
        }
    }

    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig {
            base_url: self.remote_url.clone(),
            user_id: self.user_id.clone(),
            ..RemoteConfig::default()
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    let mut path = dirs::config_dir()?;
    path.push("tapforge");
    path.push("config.json");
    Some(path)
}
