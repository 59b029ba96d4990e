use std::time::Duration;
use thiserror::Error;

/// Per-operation failures reported by a [`KvBackend`](crate::backend::KvBackend).
///
/// Callers inside this crate never surface these to their own callers: the
/// cache treats them as misses and the rate limiter fails open.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("connection handshake timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("backend disabled by configuration")]
    Disabled,

    #[error("backend handle has been shut down")]
    Closed,
}

/// Malformed cache keys or invalidation patterns.
///
/// These are programmer errors and are reported when the key is built, never
/// while talking to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("cache key must not be empty")]
    Empty,

    #[error("cache key is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("invalid character {ch:?} in {input:?}")]
    InvalidCharacter { input: String, ch: char },

    #[error("pattern {0:?} would match every key")]
    MatchesEverything(String),
}
