//! Cache-aside orchestration over the shared backend.
//!
//! ## Read path
//!
//! ```text
//! get_or_compute(key) → backend GET ── hit ──▶ decode → return
//!                            │
//!                       miss / error
//!                            ▼
//!                        compute() ── Err ──▶ propagate unchanged
//!                            │
//!                            ▼
//!               SET key value EX ttl (best effort) → return
//! ```
//!
//! Caching is only a latency optimization: for any backend state the result
//! equals what `compute()` alone would return. Backend failures are logged
//! and treated as misses or no-op invalidations.
//!
//! Concurrent misses on one key are not coalesced; each caller computes and
//! writes back, and the last write wins.

pub mod keys;
pub mod ttl;

pub use keys::{Cascade, CacheKey, KeyPattern};
pub use ttl::{CacheTtl, TtlPolicy};

use crate::backend::{BackendHandle, BackendMode, KvBackend};
use crate::metrics;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tenantkv_config::CacheConfig;

/// Get-or-compute cache over a shared [`BackendHandle`].
///
/// Values are stored as JSON so other services sharing the store can read
/// them.
#[derive(Debug, Clone)]
pub struct CacheOrchestrator {
    handle: Arc<BackendHandle>,
    ttl: TtlPolicy,
}

impl CacheOrchestrator {
    pub fn new(handle: Arc<BackendHandle>, ttl: TtlPolicy) -> Self {
        Self { handle, ttl }
    }

    pub fn from_config(handle: Arc<BackendHandle>, config: &CacheConfig) -> Self {
        Self::new(handle, TtlPolicy::from_config(config))
    }

    pub fn backend_mode(&self) -> BackendMode {
        self.handle.mode()
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl
    }

    /// Return the cached value for `key`, or compute, cache and return it.
    ///
    /// Errors from `compute` are returned unchanged and nothing is cached.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        tier: CacheTtl,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.get_or_compute_with_ttl(key, self.ttl.duration(tier), compute)
            .await
    }

    /// [`get_or_compute`](Self::get_or_compute) with an explicit expiry.
    pub async fn get_or_compute_with_ttl<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get::<T>(key).await {
            return Ok(cached);
        }

        let value = compute().await?;
        self.write_back(key, &value, ttl).await;
        Ok(value)
    }

    /// Read and decode a cached value. Any failure is reported as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let backend = self.handle.backend();

        match backend.get(key.as_str()).await {
            Ok(Some(data)) => match serde_json::from_slice::<T>(&data) {
                Ok(value) => {
                    tracing::debug!(key = %key, "cache hit");
                    metrics::record_cache_hit();
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to deserialize cached value");
                    metrics::record_cache_miss();
                    if let Err(e) = backend.delete(key.as_str()).await {
                        tracing::debug!(key = %key, error = %e, "failed to drop undecodable entry");
                    }
                    None
                }
            },
            Ok(None) => {
                tracing::debug!(key = %key, "cache miss");
                metrics::record_cache_miss();
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache GET error, treating as miss");
                metrics::record_cache_miss();
                None
            }
        }
    }

    /// Store a value under `key` for the tier's duration. Best effort.
    pub async fn set<T: Serialize>(&self, key: &CacheKey, value: &T, tier: CacheTtl) {
        self.write_back(key, value, self.ttl.duration(tier)).await;
    }

    async fn write_back<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let data = match serde_json::to_vec(value) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to serialize value for cache");
                metrics::record_writeback_failure();
                return;
            }
        };

        // Absent results are not cached; the next read recomputes them.
        if data == b"null" {
            tracing::debug!(key = %key, "computed value is null, not caching");
            return;
        }

        match self
            .handle
            .backend()
            .set_with_ttl(key.as_str(), &data, ttl)
            .await
        {
            Ok(()) => tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set"),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache SET error");
                metrics::record_writeback_failure();
            }
        }
    }

    /// Delete one key. Returns whether something was deleted.
    pub async fn invalidate_exact(&self, key: &CacheKey) -> bool {
        match self.handle.backend().delete(key.as_str()).await {
            Ok(deleted) => {
                tracing::debug!(key = %key, deleted, "cache invalidated");
                metrics::record_invalidated(u64::from(deleted));
                deleted
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache DEL error");
                false
            }
        }
    }

    /// Delete every key matching `pattern`. Returns how many were deleted.
    pub async fn invalidate_by_pattern(&self, pattern: &KeyPattern) -> u64 {
        let deleted = delete_pattern(&*self.handle.backend(), pattern).await;
        metrics::record_invalidated(deleted);
        deleted
    }

    /// Invalidate everything cached for a user, including the user's entries
    /// in other organizations.
    pub async fn invalidate_user(&self, user_id: impl Display, org_id: impl Display) -> u64 {
        self.invalidate_cascade(&Cascade::user(user_id, org_id))
            .await
    }

    pub async fn invalidate_project(&self, project_id: impl Display) -> u64 {
        self.invalidate_cascade(&Cascade::project(project_id)).await
    }

    pub async fn invalidate_organization(&self, org_id: impl Display) -> u64 {
        self.invalidate_cascade(&Cascade::organization(org_id)).await
    }

    /// Delete a cascade's exact keys in one batch, then each of its patterns.
    pub async fn invalidate_cascade(&self, cascade: &Cascade) -> u64 {
        let backend = self.handle.backend();

        let mut deleted = match backend.delete_many(&cascade.key_strings()).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, keys = cascade.keys.len(), "cache batch DEL error");
                0
            }
        };
        for pattern in &cascade.patterns {
            deleted += delete_pattern(&*backend, pattern).await;
        }

        tracing::debug!(
            deleted,
            keys = cascade.keys.len(),
            patterns = cascade.patterns.len(),
            "cache cascade invalidated"
        );
        metrics::record_invalidated(deleted);
        deleted
    }
}

async fn delete_pattern(backend: &dyn KvBackend, pattern: &KeyPattern) -> u64 {
    match backend.delete_matching(pattern.as_str()).await {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "cache pattern invalidation error");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MemoryConnector};
    use tenantkv_config::RedisConfig;

    async fn live_cache() -> (CacheOrchestrator, MemoryBackend) {
        let store = MemoryBackend::new();
        let handle = BackendHandle::with_connector(
            RedisConfig::default(),
            Arc::new(MemoryConnector::new(store.clone())),
        );
        handle.connect().await;
        (
            CacheOrchestrator::new(Arc::new(handle), TtlPolicy::default()),
            store,
        )
    }

    #[tokio::test]
    async fn test_null_results_are_not_cached() {
        let (cache, store) = live_cache().await;
        let key = keys::user("missing");

        let found: Option<String> = cache
            .get_or_compute(&key, CacheTtl::Medium, || async { Ok::<_, ()>(None) })
            .await
            .unwrap();

        assert_eq!(found, None);
        assert!(!store.contains_key(key.as_str()));
    }

    #[tokio::test]
    async fn test_compute_error_propagates_and_caches_nothing() {
        let (cache, store) = live_cache().await;
        let key = keys::organization_billing(7);

        let result: Result<u32, &str> = cache
            .get_or_compute(&key, CacheTtl::Short, || async { Err("billing service down") })
            .await;

        assert_eq!(result, Err("billing service down"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_recomputed() {
        let (cache, store) = live_cache().await;
        let key = keys::project("p1");
        store
            .set_with_ttl(key.as_str(), b"not json", Duration::from_secs(60))
            .await
            .unwrap();

        let value: u32 = cache
            .get_or_compute(&key, CacheTtl::Medium, || async { Ok::<_, ()>(5) })
            .await
            .unwrap();

        assert_eq!(value, 5);
        assert_eq!(store.get(key.as_str()).await.unwrap(), Some(b"5".to_vec()));
    }

    #[tokio::test]
    async fn test_tier_sets_expiry() {
        let (cache, store) = live_cache().await;
        let key = keys::organization_stats(7);
        cache.set(&key, &vec![1, 2, 3], CacheTtl::Short).await;

        let ttl = store.time_to_live(key.as_str()).await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(60) && ttl > Duration::from_secs(55));

        store.advance(Duration::from_secs(61));
        assert_eq!(cache.get::<Vec<i32>>(&key).await, None);
    }

    #[tokio::test]
    async fn test_invalidate_exact_reports_deletion() {
        let (cache, _store) = live_cache().await;
        let key = keys::organization(7);
        cache.set(&key, &"Acme", CacheTtl::Long).await;

        assert!(cache.invalidate_exact(&key).await);
        assert!(!cache.invalidate_exact(&key).await);
    }

    #[tokio::test]
    async fn test_invalidate_by_pattern_counts() {
        let (cache, store) = live_cache().await;
        for p in ["p1", "p2", "p3"] {
            cache.set(&keys::project_stats(p), &1, CacheTtl::Short).await;
        }
        cache.set(&keys::organization_stats(1), &1, CacheTtl::Short).await;

        let pattern = KeyPattern::parse("stats:project:*").unwrap();
        assert_eq!(cache.invalidate_by_pattern(&pattern).await, 3);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_degraded_invalidation_is_noop() {
        let handle = Arc::new(BackendHandle::with_connector(
            RedisConfig {
                disabled: true,
                ..RedisConfig::default()
            },
            Arc::new(MemoryConnector::default()),
        ));
        handle.connect().await;
        let cache = CacheOrchestrator::new(handle, TtlPolicy::default());

        assert!(!cache.invalidate_exact(&keys::user(1)).await);
        assert_eq!(
            cache
                .invalidate_by_pattern(&KeyPattern::parse("user:*").unwrap())
                .await,
            0
        );
        assert_eq!(cache.invalidate_organization(7).await, 0);
    }
}
