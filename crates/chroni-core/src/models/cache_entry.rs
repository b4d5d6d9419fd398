//! Time-boxed cache entry model

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Lifetime of a cached derived result
pub const CACHE_TTL_HOURS: i64 = 8;

/// A cached result for one operation on one calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cache_key: String,
    pub payload: serde_json::Value,
    /// Unix ms
    pub cached_at: i64,
}

impl CacheEntry {
    /// Key for `operation` on `day`, e.g. `predictions:2024-01-01`
    #[must_use]
    pub fn key_for(operation: &str, day: NaiveDate) -> String {
        format!("{operation}:{}", day.format("%Y-%m-%d"))
    }

    /// Age of the entry at `now_ms`
    #[must_use]
    pub fn age(&self, now_ms: i64) -> Duration {
        Duration::milliseconds(now_ms.saturating_sub(self.cached_at))
    }

    /// Valid iff `now - cached_at < ttl`
    #[must_use]
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        self.age(now_ms) < Duration::hours(CACHE_TTL_HOURS)
    }
}
