//! Shared key-value backend access layer.
//!
//! ## Components
//!
//! - [`backend`]: the process-wide [`BackendHandle`], live over Redis or
//!   degraded to a no-op stand-in when the store is unreachable
//! - [`cache`]: cache-aside [`CacheOrchestrator`] with TTL tiers, key
//!   builders and cascading invalidation
//! - [`rate_limit`]: fail-open fixed-window [`RateLimitStore`]
//!
//! ```text
//! CRUD services ──▶ CacheOrchestrator ──┐
//!                                       ├──▶ BackendHandle ──▶ Redis
//! throttling    ──▶ RateLimitStore ─────┘
//! ```
//!
//! ## Graceful Degradation
//!
//! The handle connects once at startup. If Redis is disabled, unreachable or
//! slower than the handshake timeout, the process keeps running without it:
//! cache reads always compute and rate limits always allow.

pub mod backend;
pub mod cache;
pub mod error;
pub mod metrics;
pub mod observability;
pub mod rate_limit;

pub use backend::{BackendHandle, BackendMode, KvBackend};
pub use cache::{CacheKey, CacheOrchestrator, CacheTtl, Cascade, KeyPattern, TtlPolicy, keys};
pub use error::{BackendError, KeyError};
pub use rate_limit::{RateLimitHit, RateLimitStore};

use std::sync::Arc;
use tenantkv_config::KvConfig;

/// The access layer wired from one configuration.
///
/// Both components share a single handle, and therefore a single connection.
#[derive(Debug, Clone)]
pub struct KvServices {
    pub handle: Arc<BackendHandle>,
    pub cache: CacheOrchestrator,
    pub rate_limits: RateLimitStore,
}

impl KvServices {
    /// Connect the backend and build the cache and rate-limit stores.
    pub async fn init(config: &KvConfig) -> Self {
        let handle = Arc::new(BackendHandle::init(config.redis.clone()).await);
        Self::with_handle(handle, config)
    }

    /// Build on an existing (possibly unconnected) handle.
    pub fn with_handle(handle: Arc<BackendHandle>, config: &KvConfig) -> Self {
        Self {
            cache: CacheOrchestrator::from_config(Arc::clone(&handle), &config.cache),
            rate_limits: RateLimitStore::new(Arc::clone(&handle), &config.rate_limit),
            handle,
        }
    }

    /// Release the backend connection.
    pub async fn shutdown(&self) {
        self.handle.shutdown().await;
    }
}
