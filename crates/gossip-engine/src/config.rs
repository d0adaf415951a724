//! Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Tunables for retry timing, dedup, fetch batching, and the refresh
/// driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delay before a failed send (message or announcement) is retried.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Window for the legacy content-based dedup fallback.
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,
    /// Page size for announcement-board fetches.
    #[serde(default = "default_announcement_fetch_limit")]
    pub announcement_fetch_limit: usize,
    /// Seekers per message-board fetch.
    #[serde(default = "default_message_fetch_batch")]
    pub message_fetch_batch: usize,
    /// Timeout applied to every transport call.
    #[serde(default = "default_transport_timeout_ms")]
    pub transport_timeout_ms: u64,
    /// Retention for inbound items the primitive cannot decrypt yet.
    #[serde(default = "default_pending_ttl_ms")]
    pub pending_ttl_ms: u64,
    /// Interval of the background refresh loop.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

// Default value functions

fn default_retry_delay_ms() -> u64 {
    5_000
}

fn default_dedup_window_ms() -> u64 {
    gossip_types::DEFAULT_DEDUP_WINDOW_MS
}

fn default_announcement_fetch_limit() -> usize {
    64
}

fn default_message_fetch_batch() -> usize {
    32
}

fn default_transport_timeout_ms() -> u64 {
    10_000
}

fn default_pending_ttl_ms() -> u64 {
    86_400_000
}

fn default_refresh_interval_ms() -> u64 {
    30_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay_ms(),
            dedup_window_ms: default_dedup_window_ms(),
            announcement_fetch_limit: default_announcement_fetch_limit(),
            message_fetch_batch: default_message_fetch_batch(),
            transport_timeout_ms: default_transport_timeout_ms(),
            pending_ttl_ms: default_pending_ttl_ms(),
            refresh_interval_ms: default_refresh_interval_ms(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file, falling back to defaults if it does not
    /// exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: EngineConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.retry_delay_ms, 5_000);
        assert_eq!(config.dedup_window_ms, 30_000);
        assert_eq!(config.announcement_fetch_limit, 64);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: EngineConfig = toml::from_str("retry_delay_ms = 100").expect("parse");
        assert_eq!(config.retry_delay_ms, 100);
        assert_eq!(config.dedup_window_ms, 30_000);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = EngineConfig::default();
        let text = toml::to_string(&config).expect("serialize");
        let _parsed: EngineConfig = toml::from_str(&text).expect("parse");
    }
}
