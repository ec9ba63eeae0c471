//! Session lifecycle and tool-call configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session ends after this long without inbound activity
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_secs: u64,

    /// How often the manager reaps finished sessions
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Maximum concurrent sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Capacity of each per-session event channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_inactivity_timeout() -> u64 {
    300
}
fn default_cleanup_interval() -> u64 {
    30
}
fn default_max_sessions() -> usize {
    100
}
fn default_channel_capacity() -> usize {
    256
}

impl SessionConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: default_inactivity_timeout(),
            cleanup_interval_secs: default_cleanup_interval(),
            max_sessions: default_max_sessions(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Flight-search tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Deadline for a single tool call as seen by the orchestrator
    #[serde(default = "default_tool_timeout")]
    pub timeout_ms: u64,

    /// Retries inside the resilient search wrapper
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retries
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Consecutive failures that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long the circuit stays open before a half-open trial call
    #[serde(default = "default_open_cooldown")]
    pub open_cooldown_ms: u64,

    /// Cached results expire after this long
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_tool_timeout() -> u64 {
    5000
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_backoff() -> u64 {
    250
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_open_cooldown() -> u64 {
    30_000
}
fn default_cache_ttl() -> u64 {
    300
}

impl ToolConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn open_cooldown(&self) -> Duration {
        Duration::from_millis(self.open_cooldown_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_tool_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
            failure_threshold: default_failure_threshold(),
            open_cooldown_ms: default_open_cooldown(),
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}
