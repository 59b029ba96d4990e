//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tenantkv_config::RedisConfig;
use tenantkv_store::backend::{BackendMode, Connector, KvBackend, MemoryBackend};
use tenantkv_store::{BackendError, BackendHandle};

/// Wraps a [`MemoryBackend`], counting calls and optionally failing them.
#[derive(Default)]
pub struct InstrumentedBackend {
    pub inner: MemoryBackend,
    pub failing: AtomicBool,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
    pub incrs: AtomicUsize,
    pub expires: AtomicUsize,
}

impl InstrumentedBackend {
    pub fn fail(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "broken pipe",
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl KvBackend for InstrumentedBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Live
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.get(key).await
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), BackendError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, BackendError> {
        self.check()?;
        self.inner.delete_many(keys).await
    }

    async fn incr(&self, key: &str) -> Result<i64, BackendError> {
        self.incrs.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.incr(key).await
    }

    async fn decr(&self, key: &str) -> Result<i64, BackendError> {
        self.check()?;
        self.inner.decr(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError> {
        self.expires.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.expire(key, ttl).await
    }

    async fn time_to_live(&self, key: &str) -> Result<Option<Duration>, BackendError> {
        self.check()?;
        self.inner.time_to_live(key).await
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, BackendError> {
        self.check()?;
        self.inner.keys_matching(pattern).await
    }

    async fn ping(&self) -> Result<(), BackendError> {
        self.check()
    }
}

/// Hands out the same instrumented backend on every connect.
pub struct InstrumentedConnector(pub Arc<InstrumentedBackend>);

#[async_trait]
impl Connector for InstrumentedConnector {
    async fn connect(&self, _: &RedisConfig) -> Result<Arc<dyn KvBackend>, BackendError> {
        let backend: Arc<dyn KvBackend> = self.0.clone();
        Ok(backend)
    }
}

/// A connected handle over a fresh instrumented backend.
pub async fn instrumented_handle() -> (Arc<BackendHandle>, Arc<InstrumentedBackend>) {
    let backend = Arc::new(InstrumentedBackend::default());
    let handle = BackendHandle::with_connector(
        RedisConfig::default(),
        Arc::new(InstrumentedConnector(backend.clone())),
    );
    assert_eq!(handle.connect().await, BackendMode::Live);
    (Arc::new(handle), backend)
}

/// A handle forced into degraded mode by configuration.
pub async fn degraded_handle() -> Arc<BackendHandle> {
    let handle = BackendHandle::new(RedisConfig {
        disabled: true,
        ..RedisConfig::default()
    });
    assert_eq!(handle.connect().await, BackendMode::Degraded);
    Arc::new(handle)
}
