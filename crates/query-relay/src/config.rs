//! Configuration for the relay.

use serde::{Deserialize, Serialize};

/// Orchestrator timing knobs. The poll loop's total wall-clock wait is
/// bounded by `poll_interval_ms * max_poll_attempts`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub tool_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_500,
            max_poll_attempts: 40,
            tool_timeout_ms: 30_000,
        }
    }
}

/// Remote reasoning service endpoint and identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    pub user_id: String,
    /// The solve call stays open until a final answer is ready, so its
    /// timeout dwarfs the per-poll one.
    pub solve_timeout_ms: u64,
    pub poll_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://relay.tapforge.dev".to_string(),
            user_id: "local".to_string(),
            solve_timeout_ms: 120_000,
            poll_timeout_ms: 10_000,
        }
    }
}
