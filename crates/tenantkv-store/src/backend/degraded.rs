//! No-op backend used when the store is unreachable or disabled.

use super::{BackendMode, KvBackend};
use crate::error::BackendError;
use async_trait::async_trait;
use std::time::Duration;

/// Stand-in that never fails: reads miss, writes are accepted, increments
/// report a first hit and pattern listing is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct DegradedBackend;

#[async_trait]
impl KvBackend for DegradedBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Degraded
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(None)
    }

    async fn set_with_ttl(
        &self,
        _key: &str,
        _value: &[u8],
        _ttl: Duration,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<bool, BackendError> {
        Ok(false)
    }

    async fn delete_many(&self, _keys: &[String]) -> Result<u64, BackendError> {
        Ok(0)
    }

    async fn incr(&self, _key: &str) -> Result<i64, BackendError> {
        Ok(1)
    }

    async fn decr(&self, _key: &str) -> Result<i64, BackendError> {
        Ok(0)
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool, BackendError> {
        Ok(true)
    }

    async fn time_to_live(&self, _key: &str) -> Result<Option<Duration>, BackendError> {
        Ok(None)
    }

    async fn keys_matching(&self, _pattern: &str) -> Result<Vec<String>, BackendError> {
        Ok(Vec::new())
    }

    async fn delete_matching(&self, _pattern: &str) -> Result<u64, BackendError> {
        Ok(0)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
