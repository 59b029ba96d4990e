//! Fixed-window request counters for an external throttling middleware.
//!
//! Unlike the cache, the counter store **fails open**: when the backend is
//! degraded or an operation errors, `increment` reports a count that lets the
//! request through. Rejecting requests based on the count is the caller's job.
//!
//! ## Counter lifecycle
//!
//! ```text
//! Unset ──INCR (=1), EXPIRE window──▶ Active(1, t+window)
//! Active(n, t) ──INCR──▶ Active(n+1, t)
//! Active ──expiry / reset_key──▶ Unset
//! ```

use crate::backend::{BackendHandle, BackendMode, KvBackend};
use crate::error::BackendError;
use crate::metrics;
use std::sync::Arc;
use std::time::Duration;
use tenantkv_config::{MAX_WINDOW_MS, RateLimitConfig};
use time::OffsetDateTime;

/// Result of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHit {
    /// Requests counted in the current window, including this one.
    /// `0` means the count could not be taken and the request must not be
    /// limited.
    pub hits: u64,
    /// When the current window ends.
    pub reset_time: OffsetDateTime,
}

impl RateLimitHit {
    /// Whether this result comes from a failed count rather than a real one.
    pub fn is_fail_open(&self) -> bool {
        self.hits == 0
    }
}

/// Fixed-window counter store sharing the process-wide [`BackendHandle`].
#[derive(Debug, Clone)]
pub struct RateLimitStore {
    handle: Arc<BackendHandle>,
    window: Duration,
    prefix: String,
}

impl RateLimitStore {
    /// Windows longer than [`MAX_WINDOW_MS`] are clamped to it.
    pub fn new(handle: Arc<BackendHandle>, config: &RateLimitConfig) -> Self {
        Self {
            handle,
            window: config.window().min(Duration::from_millis(MAX_WINDOW_MS)),
            prefix: config.key_prefix.clone(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn counter_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// `now + remaining`, saturating instead of overflowing the date range.
    fn window_end(now: OffsetDateTime, remaining: Duration) -> OffsetDateTime {
        let remaining = time::Duration::try_from(remaining).unwrap_or(time::Duration::MAX);
        now.saturating_add(remaining)
    }

    /// Count one request against `key`.
    pub async fn increment(&self, key: &str) -> RateLimitHit {
        let now = OffsetDateTime::now_utc();
        let backend = self.handle.backend();

        if backend.mode() != BackendMode::Live {
            metrics::record_fail_open("degraded");
            return RateLimitHit {
                hits: 1,
                reset_time: Self::window_end(now, self.window),
            };
        }

        let counter = self.counter_key(key);
        match self.count(&*backend, &counter, now).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(key = %counter, error = %e, "rate limit increment failed, allowing request");
                metrics::record_fail_open("error");
                RateLimitHit {
                    hits: 0,
                    reset_time: now,
                }
            }
        }
    }

    async fn count(
        &self,
        backend: &dyn KvBackend,
        counter: &str,
        now: OffsetDateTime,
    ) -> Result<RateLimitHit, BackendError> {
        let mut hits = backend.incr(counter).await?;

        if hits < 1 {
            // Left below zero by give-backs; start a fresh window.
            backend.delete(counter).await?;
            hits = backend.incr(counter).await?;
        }

        if hits == 1 {
            backend.expire(counter, self.window).await?;
            return Ok(RateLimitHit {
                hits: 1,
                reset_time: Self::window_end(now, self.window),
            });
        }

        let remaining = match backend.time_to_live(counter).await {
            Ok(Some(ttl)) => ttl,
            Ok(None) => {
                // The first hit's EXPIRE was lost; without this the counter
                // would never reset.
                tracing::debug!(key = %counter, "rate limit counter had no expiry, restoring");
                backend.expire(counter, self.window).await?;
                self.window
            }
            Err(e) => {
                tracing::debug!(key = %counter, error = %e, "rate limit PTTL failed");
                self.window
            }
        };

        Ok(RateLimitHit {
            hits: u64::try_from(hits).unwrap_or(1).max(1),
            reset_time: Self::window_end(now, remaining),
        })
    }

    /// Give one request back. Best effort.
    ///
    /// A counter that reaches zero is removed, so a give-back on an absent
    /// or expired counter never leaves a key without an expiry.
    pub async fn decrement(&self, key: &str) {
        let counter = self.counter_key(key);
        let backend = self.handle.backend();

        let result = match backend.decr(&counter).await {
            Ok(remaining) if remaining <= 0 => backend.delete(&counter).await.map(|_| ()),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::debug!(key = %counter, error = %e, "rate limit decrement failed");
        }
    }

    /// Clear the counter for `key`. Best effort.
    pub async fn reset_key(&self, key: &str) {
        let counter = self.counter_key(key);
        if let Err(e) = self.handle.backend().delete(&counter).await {
            tracing::debug!(key = %counter, error = %e, "rate limit reset failed");
        }
    }
}
