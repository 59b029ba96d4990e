//! Integration tests against a real Redis server.
//!
//! Tests use testcontainers to spin up a real Redis instance; keys are
//! namespaced per test so the shared container needs no cleanup.

use std::sync::Arc;
use std::time::Duration;
use tenantkv_config::{KvConfig, RateLimitConfig, RedisConfig};
use tenantkv_store::backend::RedisBackend;
use tenantkv_store::{
    BackendHandle, BackendMode, CacheOrchestrator, CacheTtl, KvBackend, KvServices,
    RateLimitStore, TtlPolicy, keys,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

/// Get or create the shared Redis container
async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");

            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            let url = format!("redis://127.0.0.1:{}", host_port);

            (container, url)
        })
        .await;

    url.clone()
}

async fn redis_config() -> RedisConfig {
    RedisConfig {
        url: get_redis_url().await,
        scan_count: 10,
        ..RedisConfig::default()
    }
}

/// Unique namespace so tests sharing the container do not collide.
fn ns() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[tokio::test]
async fn test_handle_connects_live() {
    let handle = BackendHandle::init(redis_config().await).await;

    assert!(handle.is_live());
    assert!(handle.backend().ping().await.is_ok());

    handle.shutdown().await;
    assert_eq!(handle.mode(), BackendMode::Degraded);
}

#[tokio::test]
async fn test_backend_capabilities() {
    let backend = RedisBackend::connect(&redis_config().await).await.unwrap();
    let ns = ns();
    let key = format!("{ns}:k");

    backend
        .set_with_ttl(&key, b"value", Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(backend.get(&key).await.unwrap(), Some(b"value".to_vec()));

    let ttl = backend.time_to_live(&key).await.unwrap().unwrap();
    assert!(ttl <= Duration::from_secs(30));

    assert!(backend.delete(&key).await.unwrap());
    assert!(!backend.delete(&key).await.unwrap());
    assert_eq!(backend.get(&key).await.unwrap(), None);
    assert_eq!(backend.time_to_live(&key).await.unwrap(), None);

    let counter = format!("{ns}:counter");
    assert_eq!(backend.incr(&counter).await.unwrap(), 1);
    assert_eq!(backend.incr(&counter).await.unwrap(), 2);
    assert_eq!(backend.decr(&counter).await.unwrap(), 1);
    assert!(backend.expire(&counter, Duration::from_secs(10)).await.unwrap());
    assert!(!backend.expire(&format!("{ns}:absent"), Duration::from_secs(10)).await.unwrap());

    assert_eq!(backend.delete_many(&[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_pattern_delete_scans_all_pages() {
    let backend = RedisBackend::connect(&redis_config().await).await.unwrap();
    let ns = ns();

    // more keys than one SCAN page (COUNT 10)
    for i in 0..55 {
        backend
            .set_with_ttl(&format!("{ns}:user:{i}"), b"1", Duration::from_secs(60))
            .await
            .unwrap();
    }
    backend
        .set_with_ttl(&format!("{ns}:org:1"), b"1", Duration::from_secs(60))
        .await
        .unwrap();

    let found = backend.keys_matching(&format!("{ns}:user:*")).await.unwrap();
    assert_eq!(found.len(), 55);

    assert_eq!(backend.delete_matching(&format!("{ns}:user:*")).await.unwrap(), 55);
    assert!(backend.get(&format!("{ns}:org:1")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_cache_round_trip_and_cascade() {
    let handle = Arc::new(BackendHandle::init(redis_config().await).await);
    let cache = CacheOrchestrator::new(handle, TtlPolicy::default());
    let user_id = format!("u-{}", ns());

    let calls = std::sync::atomic::AtomicUsize::new(0);
    let compute = || async {
        calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok::<_, ()>(vec!["task-1".to_string(), "task-2".to_string()])
    };

    let key = keys::user_tasks(&user_id, 7);
    let first = cache.get_or_compute(&key, CacheTtl::Short, compute).await.unwrap();
    let second = cache.get_or_compute(&key, CacheTtl::Short, compute).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    cache.set(&keys::user_tasks(&user_id, 8), &first, CacheTtl::Short).await;
    cache.set(&keys::user(&user_id), &"profile", CacheTtl::Long).await;

    assert_eq!(cache.invalidate_user(&user_id, 7).await, 3);
    assert_eq!(cache.get::<Vec<String>>(&key).await, None);
}

#[tokio::test]
async fn test_rate_limit_on_redis() {
    let handle = Arc::new(BackendHandle::init(redis_config().await).await);
    let store = RateLimitStore::new(
        handle,
        &RateLimitConfig {
            window_ms: 60_000,
            key_prefix: format!("rl:{}:", ns()),
        },
    );

    for expected in 1..=10 {
        assert_eq!(store.increment("203.0.113.9").await.hits, expected);
    }
    store.reset_key("203.0.113.9").await;
    assert_eq!(store.increment("203.0.113.9").await.hits, 1);
}

#[tokio::test]
async fn test_graceful_degradation_invalid_url() {
    let config = KvConfig {
        redis: RedisConfig {
            url: "redis://nonexistent:9999".to_string(),
            connect_timeout_ms: 1000,
            ..RedisConfig::default()
        },
        ..KvConfig::default()
    };

    // Should fall back to the degraded backend
    let services = KvServices::init(&config).await;
    assert!(!services.handle.is_live());

    // But cache and rate limits keep working
    let value = services
        .cache
        .get_or_compute(&keys::organization(1), CacheTtl::Medium, || async {
            Ok::<_, ()>("Acme".to_string())
        })
        .await
        .unwrap();
    assert_eq!(value, "Acme");
    assert_eq!(services.rate_limits.increment("k").await.hits, 1);

    services.shutdown().await;
}
