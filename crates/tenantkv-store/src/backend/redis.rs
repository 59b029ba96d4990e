//! Redis-backed implementation of [`KvBackend`].

use super::{BackendMode, KvBackend, ttl_secs};
use crate::error::BackendError;
use crate::metrics;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use std::collections::BTreeSet;
use std::time::Duration;
use tenantkv_config::RedisConfig;

/// Live backend over a single multiplexed Redis connection.
///
/// `ConnectionManager` is cheap to clone; every clone shares the same socket,
/// so each operation clones it instead of checking a connection out of a pool.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    scan_count: usize,
}

impl RedisBackend {
    /// Open the connection and verify it with `PING`.
    ///
    /// This is not bounded by a timeout of its own; [`BackendHandle`](super::BackendHandle)
    /// races it against the configured handshake timeout.
    pub async fn connect(config: &RedisConfig) -> Result<Self, BackendError> {
        let client = redis::Client::open(config.url.as_str())?;

        let manager_config = ConnectionManagerConfig::new()
            .set_number_of_retries(config.reconnect_retries)
            .set_max_delay(config.reconnect_max_delay_ms)
            .set_connection_timeout(config.connect_timeout())
            .set_response_timeout(config.response_timeout());

        let mut conn = ConnectionManager::new_with_config(client, manager_config).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        Ok(Self {
            conn,
            scan_count: config.scan_count,
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

/// Count the failure against `op` and convert it.
fn tracked<T>(op: &'static str, result: redis::RedisResult<T>) -> Result<T, BackendError> {
    result.map_err(|e| {
        metrics::record_backend_error(op);
        BackendError::from(e)
    })
}

#[async_trait]
impl KvBackend for RedisBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Live
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        tracked("get", self.conn().get(key).await)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), BackendError> {
        tracked(
            "set",
            self.conn().set_ex::<_, _, ()>(key, value, ttl_secs(ttl)).await,
        )
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        let deleted: u64 = tracked("del", self.conn().del(key).await)?;
        Ok(deleted > 0)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, BackendError> {
        if keys.is_empty() {
            return Ok(0);
        }
        tracked("del", self.conn().del(keys).await)
    }

    async fn incr(&self, key: &str) -> Result<i64, BackendError> {
        tracked("incr", self.conn().incr(key, 1).await)
    }

    async fn decr(&self, key: &str) -> Result<i64, BackendError> {
        tracked("decr", self.conn().decr(key, 1).await)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError> {
        let secs = i64::try_from(ttl_secs(ttl)).unwrap_or(i64::MAX);
        tracked("expire", self.conn().expire(key, secs).await)
    }

    async fn time_to_live(&self, key: &str) -> Result<Option<Duration>, BackendError> {
        // -2: no such key, -1: key without expiry
        let millis: i64 = tracked("pttl", self.conn().pttl(key).await)?;
        Ok(u64::try_from(millis).ok().map(Duration::from_millis))
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, BackendError> {
        let mut conn = self.conn();
        let mut cursor: u64 = 0;
        // SCAN may return a key more than once across iterations.
        let mut found = BTreeSet::new();

        loop {
            let (next, batch): (u64, Vec<String>) = tracked(
                "scan",
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(self.scan_count)
                    .query_async(&mut conn)
                    .await,
            )?;
            found.extend(batch);

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(found.into_iter().collect())
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let mut conn = self.conn();
        let _: String = tracked("ping", redis::cmd("PING").query_async(&mut conn).await)?;
        Ok(())
    }
}
