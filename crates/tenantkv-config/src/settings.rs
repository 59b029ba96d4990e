use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KvConfig {
    /// Redis connection settings
    #[serde(default)]
    pub redis: RedisConfig,
    /// Cache TTL tiers
    #[serde(default)]
    pub cache: CacheConfig,
    /// Fixed-window rate limit counters
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl KvConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.redis.validate()?;
        self.cache.validate()?;
        self.rate_limit.validate()?;

        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::validation(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        Ok(())
    }
}

/// Redis connection configuration.
///
/// The connection is attempted once at startup. When the attempt fails or
/// `disabled` is set, the process runs against a no-op backend until restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Force the degraded (no-op) backend even if Redis is reachable.
    /// Useful for tests and offline development.
    #[serde(default)]
    pub disabled: bool,

    /// Handshake timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-command response timeout in milliseconds
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Reconnect attempts after an established connection drops
    #[serde(default = "default_reconnect_retries")]
    pub reconnect_retries: usize,

    /// Upper bound on the delay between reconnect attempts, in milliseconds
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    /// `COUNT` hint for `SCAN` during pattern invalidation
    #[serde(default = "default_scan_count")]
    pub scan_count: usize,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_response_timeout_ms() -> u64 {
    1000
}

fn default_reconnect_retries() -> usize {
    3
}

fn default_reconnect_max_delay_ms() -> u64 {
    2000
}

fn default_scan_count() -> usize {
    200
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            disabled: false,
            connect_timeout_ms: default_connect_timeout_ms(),
            response_timeout_ms: default_response_timeout_ms(),
            reconnect_retries: default_reconnect_retries(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            scan_count: default_scan_count(),
        }
    }
}

impl RedisConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // A disabled backend never dials, so the URL is irrelevant.
        if !self.disabled {
            let parsed = url::Url::parse(&self.url)
                .map_err(|e| ConfigError::validation(format!("redis.url is not a URL: {e}")))?;
            let schemes = ["redis", "rediss", "redis+unix", "unix"];
            if !schemes.contains(&parsed.scheme()) {
                return Err(ConfigError::validation(format!(
                    "redis.url scheme must be one of {schemes:?}"
                )));
            }
        }
        if self.connect_timeout_ms == 0 || self.response_timeout_ms == 0 {
            return Err(ConfigError::validation("redis timeouts must be > 0"));
        }
        if self.scan_count == 0 {
            return Err(ConfigError::validation("redis.scan_count must be > 0"));
        }
        Ok(())
    }
}

/// Cache TTL tiers, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Frequently changing aggregates
    #[serde(default = "default_ttl_short_secs")]
    pub ttl_short_secs: u64,

    /// Moderately stable reads (the default tier)
    #[serde(default = "default_ttl_medium_secs")]
    pub ttl_medium_secs: u64,

    /// Stable reference data
    #[serde(default = "default_ttl_long_secs")]
    pub ttl_long_secs: u64,

    /// Rarely changing data
    #[serde(default = "default_ttl_very_long_secs")]
    pub ttl_very_long_secs: u64,
}

fn default_ttl_short_secs() -> u64 {
    60
}

fn default_ttl_medium_secs() -> u64 {
    300
}

fn default_ttl_long_secs() -> u64 {
    900
}

fn default_ttl_very_long_secs() -> u64 {
    3600 // 1 hour
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_short_secs: default_ttl_short_secs(),
            ttl_medium_secs: default_ttl_medium_secs(),
            ttl_long_secs: default_ttl_long_secs(),
            ttl_very_long_secs: default_ttl_very_long_secs(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_short_secs == 0 {
            return Err(ConfigError::validation("cache.ttl_short_secs must be > 0"));
        }
        let ordered = self.ttl_short_secs < self.ttl_medium_secs
            && self.ttl_medium_secs < self.ttl_long_secs
            && self.ttl_long_secs < self.ttl_very_long_secs;
        if !ordered {
            return Err(ConfigError::validation(
                "cache TTL tiers must satisfy short < medium < long < very_long",
            ));
        }
        Ok(())
    }
}

/// Fixed-window rate limit counter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Prefix prepended to every counter key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_window_ms() -> u64 {
    60_000
}

/// Longest accepted window: 365 days.
pub const MAX_WINDOW_MS: u64 = 365 * 24 * 60 * 60 * 1000;

fn default_key_prefix() -> String {
    "rl:".to_string()
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Redis expiries have second granularity.
        if self.window_ms < 1000 {
            return Err(ConfigError::validation("rate_limit.window_ms must be >= 1000"));
        }
        if self.window_ms > MAX_WINDOW_MS {
            return Err(ConfigError::validation(format!(
                "rate_limit.window_ms must be <= {MAX_WINDOW_MS}"
            )));
        }
        if self.key_prefix.is_empty() {
            return Err(ConfigError::validation("rate_limit.key_prefix must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
