//! In-process backend with Redis-compatible semantics.
//!
//! Keeps values in a `DashMap`, honours expiries against a clock that can be
//! advanced manually, and matches patterns with the same glob rules as Redis.
//! It reports itself as [`BackendMode::Live`]: it is a real store, just not a
//! shared one.

use super::{BackendMode, Connector, KvBackend, ttl_secs};
use crate::error::BackendError;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tenantkv_config::RedisConfig;

#[derive(Clone, Debug)]
struct StoredValue {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug)]
struct Inner {
    entries: DashMap<String, StoredValue>,
    /// Milliseconds added to the wall clock by [`MemoryBackend::advance`].
    skew_ms: AtomicU64,
}

/// DashMap-backed store. Clones share the same data.
#[derive(Clone, Debug)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                skew_ms: AtomicU64::new(0),
            }),
        }
    }

    /// Move this store's clock forward, expiring entries as Redis would.
    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.inner.skew_ms.fetch_add(millis, Ordering::Relaxed);
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = self.now();
        self.inner
            .entries
            .iter()
            .filter(|e| !e.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` holds an unexpired value.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.now();
        self.inner
            .entries
            .get(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    fn now(&self) -> Instant {
        Instant::now() + Duration::from_millis(self.inner.skew_ms.load(Ordering::Relaxed))
    }

    /// Apply `delta` atomically under the shard lock, as `INCRBY` does.
    fn add(&self, key: &str, delta: i64) -> Result<i64, BackendError> {
        let now = self.now();
        match self.inner.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(StoredValue {
                        data: delta.to_string().into_bytes(),
                        expires_at: None,
                    });
                    return Ok(delta);
                }
                let current = parse_integer(&occupied.get().data)?;
                let next = current.checked_add(delta).ok_or_else(not_an_integer)?;
                // INCR keeps the existing expiry.
                occupied.get_mut().data = next.to_string().into_bytes();
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue {
                    data: delta.to_string().into_bytes(),
                    expires_at: None,
                });
                Ok(delta)
            }
        }
    }
}

fn not_an_integer() -> BackendError {
    BackendError::Redis(redis::RedisError::from((
        redis::ErrorKind::TypeError,
        "value is not an integer or out of range",
    )))
}

fn parse_integer(data: &[u8]) -> Result<i64, BackendError> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(not_an_integer)
}

#[async_trait]
impl KvBackend for MemoryBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Live
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let now = self.now();
        let found = self
            .inner
            .entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.data.clone());
        if found.is_none() {
            // Lazy expiry, like Redis on access.
            self.inner.entries.remove_if(key, |_, v| v.is_expired(now));
        }
        Ok(found)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), BackendError> {
        let expires_at = self.now() + Duration::from_secs(ttl_secs(ttl));
        self.inner.entries.insert(
            key.to_string(),
            StoredValue {
                data: value.to_vec(),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        let now = self.now();
        Ok(self
            .inner
            .entries
            .remove(key)
            .is_some_and(|(_, v)| !v.is_expired(now)))
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, BackendError> {
        let mut deleted = 0;
        for key in keys {
            if self.delete(key).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn incr(&self, key: &str) -> Result<i64, BackendError> {
        self.add(key, 1)
    }

    async fn decr(&self, key: &str) -> Result<i64, BackendError> {
        self.add(key, -1)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError> {
        let now = self.now();
        match self.inner.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + Duration::from_secs(ttl_secs(ttl)));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn time_to_live(&self, key: &str) -> Result<Option<Duration>, BackendError> {
        let now = self.now();
        Ok(self
            .inner
            .entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, BackendError> {
        let now = self.now();
        let mut keys: Vec<String> = self
            .inner
            .entries
            .iter()
            .filter(|e| !e.value().is_expired(now))
            .filter(|e| glob_match(pattern.as_bytes(), e.key().as_bytes()))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Hands out a shared [`MemoryBackend`] and counts connection attempts.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    backend: MemoryBackend,
    attempts: AtomicUsize,
}

impl MemoryConnector {
    pub fn new(backend: MemoryBackend) -> Self {
        Self {
            backend,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn backend(&self) -> &MemoryBackend {
        &self.backend
    }

    /// How many times [`Connector::connect`] has been called.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _config: &RedisConfig) -> Result<Arc<dyn KvBackend>, BackendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.backend.clone()))
    }
}

/// Redis glob matching: `*`, `?`, `[abc]`, `[^abc]`, `[a-z]` and `\` escapes.
pub(crate) fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Last `*` seen and the text position it is currently absorbing up to.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        let advanced = match pattern.get(p) {
            Some(b'*') => {
                backtrack = Some((p, t));
                p += 1;
                continue;
            }
            Some(b'?') => Some(p + 1),
            Some(b'[') => match_class(pattern, p, text[t]),
            Some(b'\\') if p + 1 < pattern.len() => (pattern[p + 1] == text[t]).then_some(p + 2),
            Some(&c) => (c == text[t]).then_some(p + 1),
            None => None,
        };

        match (advanced, backtrack) {
            (Some(next), _) => {
                p = next;
                t += 1;
            }
            (None, Some((star, absorbed))) => {
                p = star + 1;
                t = absorbed + 1;
                backtrack = Some((star, absorbed + 1));
            }
            (None, None) => return false,
        }
    }

    pattern[p.min(pattern.len())..].iter().all(|&c| c == b'*')
}

/// Match `ch` against the class opening at `start`; returns the index after
/// the closing `]` on success.
fn match_class(pattern: &[u8], start: usize, ch: u8) -> Option<usize> {
    let mut i = start + 1;
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    while i < pattern.len() && pattern[i] != b']' {
        if pattern[i] == b'\\' && i + 1 < pattern.len() {
            matched |= pattern[i + 1] == ch;
            i += 2;
        } else if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            let (lo, hi) = if pattern[i] <= pattern[i + 2] {
                (pattern[i], pattern[i + 2])
            } else {
                (pattern[i + 2], pattern[i])
            };
            matched |= (lo..=hi).contains(&ch);
            i += 3;
        } else {
            matched |= pattern[i] == ch;
            i += 1;
        }
    }

    // An unterminated class runs to the end of the pattern.
    let next = (i + 1).min(pattern.len());
    (matched != negate).then_some(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, text: &str) -> bool {
        glob_match(pattern.as_bytes(), text.as_bytes())
    }

    #[test]
    fn test_glob_star_and_question() {
        assert!(matches("user:*", "user:42"));
        assert!(matches("user:*", "user:"));
        assert!(matches("user:4?", "user:42"));
        assert!(!matches("user:4?", "user:4"));
        assert!(matches("tasks:user:*:org:7", "tasks:user:1:org:7"));
        assert!(!matches("tasks:user:*:org:7", "tasks:user:1:org:77"));
        assert!(matches("*:stats", "tasks:user:1:org:7:stats"));
        assert!(!matches("user:42", "user:420"));
    }

    #[test]
    fn test_glob_classes_and_escapes() {
        assert!(matches("user:[0-9]", "user:5"));
        assert!(!matches("user:[0-9]", "user:x"));
        assert!(matches("user:[^0-9]", "user:x"));
        assert!(matches("h[ae]llo", "hallo"));
        assert!(!matches("h[ae]llo", "hillo"));
        assert!(matches(r"a\*b", "a*b"));
        assert!(!matches(r"a\*b", "axb"));
        assert!(matches(r"user:\[1\]:*", "user:[1]:orgs"));
    }

    #[tokio::test]
    async fn test_ttl_honours_manual_clock() {
        let backend = MemoryBackend::new();
        backend
            .set_with_ttl("k", b"v", Duration::from_secs(300))
            .await
            .unwrap();

        backend.advance(Duration::from_secs(299));
        assert_eq!(backend.get("k").await.unwrap(), Some(b"v".to_vec()));

        backend.advance(Duration::from_secs(2));
        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_incr_keeps_expiry_and_restarts_after_it() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.incr("c").await.unwrap(), 1);
        assert!(backend.expire("c", Duration::from_secs(60)).await.unwrap());
        assert_eq!(backend.incr("c").await.unwrap(), 2);
        assert!(backend.time_to_live("c").await.unwrap().is_some());

        backend.advance(Duration::from_secs(61));
        assert_eq!(backend.incr("c").await.unwrap(), 1);
        assert_eq!(backend.time_to_live("c").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_rejects_non_integer() {
        let backend = MemoryBackend::new();
        backend
            .set_with_ttl("k", b"{\"a\":1}", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(backend.incr("k").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_matching_uses_glob() {
        let backend = MemoryBackend::new();
        for key in ["user:1", "user:1:orgs", "user:12:orgs", "org:1"] {
            backend
                .set_with_ttl(key, b"x", Duration::from_secs(60))
                .await
                .unwrap();
        }

        assert_eq!(backend.delete_matching("user:1:*").await.unwrap(), 1);
        assert!(backend.contains_key("user:1"));
        assert!(backend.contains_key("user:12:orgs"));
        assert!(!backend.contains_key("user:1:orgs"));
    }
}
