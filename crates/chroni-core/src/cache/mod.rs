//! Time-boxed cache for AI-derived results.
//!
//! Entries are keyed by operation and calendar day and stay valid for
//! [`CACHE_TTL_HOURS`] hours. Payloads live in the [`TieredStorage`], so the
//! cache degrades with it instead of failing.

use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::kv::TieredStorage;
use crate::models::{CacheEntry, CACHE_TTL_HOURS};

const KEY_PREFIX: &str = "cache:";
const INDEX_KEY: &str = "cache:index";

/// Source of the current instant and calendar day
pub trait Clock: Send + Sync {
    /// Unix ms
    fn now_ms(&self) -> i64;

    fn today(&self) -> NaiveDate {
        DateTime::<Utc>::from_timestamp_millis(self.now_ms())
            .unwrap_or_default()
            .date_naive()
    }
}

/// Wall clock; days follow the local time zone
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Clock that only moves when told to; days follow UTC
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub const fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.now_ms.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Per-day cache with an eight hour lifetime.
#[derive(Clone)]
pub struct TimeBoxedCache {
    storage: Arc<TieredStorage>,
    clock: Arc<dyn Clock>,
}

impl TimeBoxedCache {
    pub fn new(storage: Arc<TieredStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    fn storage_key(&self, operation: &str) -> String {
        format!(
            "{KEY_PREFIX}{}",
            CacheEntry::key_for(operation, self.clock.today())
        )
    }

    async fn load_entry(&self, key: &str) -> Option<CacheEntry> {
        let raw = self.storage.get_item(key).await?;
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::warn!("Dropping unreadable cache entry {key}: {error}");
                self.storage.remove_item(key).await;
                None
            }
        }
    }

    /// Storage keys of every entry written and not yet pruned.
    async fn indexed_keys(&self) -> Vec<String> {
        let Some(raw) = self.storage.get_item(INDEX_KEY).await else {
            return Vec::new();
        };
        serde_json::from_str(&raw).unwrap_or_default()
    }

    async fn write_index(&self, keys: &[String]) {
        if let Ok(raw) = serde_json::to_string(keys) {
            self.storage.set_item(INDEX_KEY, &raw).await;
        }
    }

    async fn remember_key(&self, key: &str) {
        let mut keys = self.indexed_keys().await;
        if keys.iter().any(|known| known == key) {
            return;
        }
        keys.push(key.to_string());
        self.write_index(&keys).await;
    }

    /// Today's payload for `operation` if it is younger than the TTL.
    pub async fn get<T: DeserializeOwned>(&self, operation: &str) -> Option<T> {
        let key = self.storage_key(operation);
        let entry = self.load_entry(&key).await?;
        if !entry.is_fresh(self.clock.now_ms()) {
            tracing::debug!("Cache entry {key} expired");
            return None;
        }
        match serde_json::from_value(entry.payload) {
            Ok(payload) => Some(payload),
            Err(error) => {
                tracing::warn!("Cache entry {key} has an unexpected shape: {error}");
                None
            }
        }
    }

    /// Store `payload` as today's result for `operation`.
    pub async fn set<T: Serialize>(&self, operation: &str, payload: &T) {
        let key = self.storage_key(operation);
        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!("Not caching {key}: {error}");
                return;
            }
        };
        let entry = CacheEntry {
            cache_key: key.clone(),
            payload,
            cached_at: self.clock.now_ms(),
        };

        match serde_json::to_string(&entry) {
            Ok(raw) => {
                self.storage.set_item(&key, &raw).await;
                self.remember_key(&key).await;
            }
            Err(error) => tracing::warn!("Not caching {key}: {error}"),
        }
    }

    /// Remove entries from other days and today's entries that reached the
    /// TTL, then shrink the index to what is left. Younger entries stay.
    /// Returns the number of entries removed.
    pub async fn invalidate_stale(&self) -> usize {
        let now = self.clock.now_ms();
        let today_suffix = format!(":{}", self.clock.today().format("%Y-%m-%d"));
        let indexed = self.indexed_keys().await;
        let mut kept = Vec::with_capacity(indexed.len());
        let mut removed = 0;

        for key in &indexed {
            if !key.starts_with(KEY_PREFIX) || key == INDEX_KEY {
                continue;
            }
            if !key.ends_with(&today_suffix) {
                self.storage.remove_item(key).await;
                removed += 1;
                continue;
            }
            let Some(entry) = self.load_entry(key).await else {
                continue;
            };
            if entry.is_fresh(now) {
                kept.push(key.clone());
            } else {
                self.storage.remove_item(key).await;
                removed += 1;
            }
        }

        if kept.len() != indexed.len() {
            self.write_index(&kept).await;
        }
        if removed > 0 {
            tracing::debug!(
                "Invalidated {removed} cache entries from earlier days or older than {CACHE_TTL_HOURS}h"
            );
        }
        removed
    }

    /// Cached value for `operation`, or compute, store and return it.
    /// Failed computations are not cached.
    pub async fn get_or_compute<T, E, F, Fut>(&self, operation: &str, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get(operation).await {
            tracing::debug!("Cache hit for {operation}");
            return Ok(cached);
        }

        let value = compute().await?;
        self.set(operation, &value).await;
        Ok(value)
    }
}
