// Runtime configuration.
// Cache sizing, TTLs, key namespace, and upstream request policy, loadable from JSON.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GtrendError, Result};

/// Cache engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries held in memory.
    pub max_items: usize,
    /// TTL used when a caller does not supply one.
    pub default_ttl_secs: u64,
    /// Prefix for every persisted key owned by the cache.
    pub key_prefix: String,
    /// How often the background sweep purges expired entries.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_items: 100,
            default_ttl_secs: 30 * 60,
            key_prefix: "GITHUBER_CACHE_".to_string(),
            sweep_interval_secs: 10 * 60,
        }
    }
}

impl CacheConfig {
    /// Lifetime used by `set_with_default_ttl`.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Period of the background expiry sweep.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Upstream trending feed settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Extra attempts after the first for transient failures.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Maximum per-language requests in flight at once.
    pub concurrency: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://gtrend.infly.io".to_string(),
            timeout_secs: 10,
            max_retries: 3,
            retry_delay_ms: 1000,
            concurrency: 3,
        }
    }
}

impl UpstreamConfig {
    /// Whole-request timeout, body included.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Pause between retry attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub upstream: UpstreamConfig,
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults if it is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the cache and orchestrator cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_items == 0 {
            return Err(GtrendError::Config("cache.max_items must be at least 1".into()));
        }
        if self.cache.key_prefix.is_empty() {
            return Err(GtrendError::Config("cache.key_prefix must not be empty".into()));
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(GtrendError::Config(
                "cache.sweep_interval_secs must be at least 1".into(),
            ));
        }
        if self.upstream.concurrency == 0 {
            return Err(GtrendError::Config(
                "upstream.concurrency must be at least 1".into(),
            ));
        }
        if self.upstream.timeout_secs == 0 {
            return Err(GtrendError::Config(
                "upstream.timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
