//! Metrics emitted by the access layer.
//!
//! Only the `metrics` facade is used here; installing an exporter is up to the
//! owning process.

use metrics::{counter, gauge};

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "kv_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "kv_cache_misses_total";
    pub const CACHE_WRITEBACK_FAILURES_TOTAL: &str = "kv_cache_writeback_failures_total";
    pub const CACHE_INVALIDATED_KEYS_TOTAL: &str = "kv_cache_invalidated_keys_total";

    pub const BACKEND_ERRORS_TOTAL: &str = "kv_backend_errors_total";
    pub const BACKEND_LIVE: &str = "kv_backend_live";

    pub const RATE_LIMIT_FAIL_OPEN_TOTAL: &str = "kv_rate_limit_fail_open_total";
}

pub fn record_cache_hit() {
    counter!(names::CACHE_HITS_TOTAL).increment(1);
}

pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

pub fn record_writeback_failure() {
    counter!(names::CACHE_WRITEBACK_FAILURES_TOTAL).increment(1);
}

pub fn record_invalidated(count: u64) {
    if count > 0 {
        counter!(names::CACHE_INVALIDATED_KEYS_TOTAL).increment(count);
    }
}

/// Record a failed backend operation, labelled by command.
pub fn record_backend_error(op: &'static str) {
    counter!(names::BACKEND_ERRORS_TOTAL, "op" => op).increment(1);
}

/// 1 when the handle is bound to a live connection, 0 otherwise.
pub fn set_backend_live(live: bool) {
    gauge!(names::BACKEND_LIVE).set(if live { 1.0 } else { 0.0 });
}

/// Record a rate-limit increment that was allowed without counting.
pub fn record_fail_open(reason: &'static str) {
    counter!(names::RATE_LIMIT_FAIL_OPEN_TOTAL, "reason" => reason).increment(1);
}
