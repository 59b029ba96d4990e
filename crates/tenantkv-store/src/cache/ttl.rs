use std::time::Duration;
use tenantkv_config::CacheConfig;

/// Expiration tier, picked by how often the cached data changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CacheTtl {
    /// Frequently changing aggregates (60s by default)
    Short,
    /// Moderately stable reads (300s by default)
    #[default]
    Medium,
    /// Stable reference data (900s by default)
    Long,
    /// Rarely changing data (3600s by default)
    VeryLong,
}

/// Resolves [`CacheTtl`] tiers to durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    short: Duration,
    medium: Duration,
    long: Duration,
    very_long: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl TtlPolicy {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            short: Duration::from_secs(config.ttl_short_secs),
            medium: Duration::from_secs(config.ttl_medium_secs),
            long: Duration::from_secs(config.ttl_long_secs),
            very_long: Duration::from_secs(config.ttl_very_long_secs),
        }
    }

    pub fn duration(&self, tier: CacheTtl) -> Duration {
        match tier {
            CacheTtl::Short => self.short,
            CacheTtl::Medium => self.medium,
            CacheTtl::Long => self.long,
            CacheTtl::VeryLong => self.very_long,
        }
    }
}
