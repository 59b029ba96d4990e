//! Backend connection manager.
//!
//! ## Modes
//!
//! - **Live**: bound to a Redis connection ([`RedisBackend`]) or the
//!   in-process store ([`MemoryBackend`])
//! - **Degraded**: [`DegradedBackend`], a stand-in that accepts every write
//!   and answers every read with "not found"
//!
//! The mode is chosen once by [`BackendHandle::connect`] and never upgraded
//! afterwards:
//!
//! ```text
//! Pending ──connect ok──────────▶ Live ─────┐
//!    │                                      ├──shutdown──▶ Closed
//!    └──timeout / error / disabled──▶ Degraded ┘
//! ```

pub mod degraded;
pub mod handle;
pub mod memory;
pub mod redis;

pub use degraded::DegradedBackend;
pub use handle::{BackendHandle, Connector, RedisConnector};
pub use memory::{MemoryBackend, MemoryConnector};
pub use self::redis::RedisBackend;

use crate::error::BackendError;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Whether the handle is talking to a real store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    Live,
    Degraded,
}

impl BackendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendMode::Live => "live",
            BackendMode::Degraded => "degraded",
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability surface over the key-value store.
///
/// Implementations report per-operation failures as [`BackendError`]; the
/// degraded implementation never fails.
#[async_trait]
pub trait KvBackend: Send + Sync {
    fn mode(&self) -> BackendMode;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// Store `value` under `key`, expiring after `ttl` (at least one second).
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration)
    -> Result<(), BackendError>;

    /// Returns whether a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, BackendError>;

    /// Remove all `keys` in one round trip, returning how many existed.
    async fn delete_many(&self, keys: &[String]) -> Result<u64, BackendError>;

    /// Atomically increment the integer at `key`, creating it at 0 first.
    async fn incr(&self, key: &str) -> Result<i64, BackendError>;

    async fn decr(&self, key: &str) -> Result<i64, BackendError>;

    /// Set the expiry of an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError>;

    /// Remaining lifetime of `key`; `None` if it is absent or never expires.
    async fn time_to_live(&self, key: &str) -> Result<Option<Duration>, BackendError>;

    /// Enumerate keys matching a Redis glob pattern.
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, BackendError>;

    /// Delete every key matching `pattern`.
    ///
    /// The provided implementation enumerates and then issues a single batched
    /// delete. Stores that can do this natively should override it.
    async fn delete_matching(&self, pattern: &str) -> Result<u64, BackendError> {
        let keys = self.keys_matching(pattern).await?;
        self.delete_many(&keys).await
    }

    async fn ping(&self) -> Result<(), BackendError>;
}

/// Whole seconds for a backend expiry, rounding up and never below one.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}
