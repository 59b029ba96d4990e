//! Configuration for the tenantkv backend access layer.
//!
//! Settings are read from an optional TOML file and then overridden by
//! environment variables prefixed with `TENANTKV`, using `__` as the section
//! separator:
//!
//! ```text
//! TENANTKV__REDIS__URL=redis://cache:6379
//! TENANTKV__REDIS__DISABLED=true
//! TENANTKV__RATE_LIMIT__WINDOW_MS=900000
//! ```
//!
//! A `.env` file in the working directory is honored through [`load_dotenv`].

pub mod loader;
pub mod settings;

pub use loader::{DEFAULT_CONFIG_FILE, ENV_PREFIX, load_config, load_dotenv, load_dotenv_from};
pub use settings::{
    CacheConfig, KvConfig, LoggingConfig, MAX_WINDOW_MS, RateLimitConfig, RedisConfig,
};

/// Error types for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Build(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
