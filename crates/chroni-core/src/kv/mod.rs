//! Capability-probing key/value storage with permanent fallback.
//!
//! Holds small values such as cache entries, usage counters and one-time
//! flags. Callers never see a storage error: a failing tier is demoted for
//! the rest of the process and the operation is retried on the next one.
//! The last tier is process memory, which cannot fail.

mod tiers;

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::error::{Error, Result};
use crate::services::LocalStore;

pub use tiers::{FileKvTier, LibSqlKvTier, MemoryKvTier};

const PROBE_KEY: &str = "__chroni_probe__";

/// One storage backend in the fallback chain
#[async_trait]
pub trait KvTier: Send + Sync {
    /// Short name used in logs and diagnostics
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Write, read back and delete a probe key.
    async fn probe(&self) -> Result<()> {
        let marker = crate::util::unix_millis_now().to_string();
        self.set(PROBE_KEY, &marker).await?;
        let read_back = self.get(PROBE_KEY).await?;
        self.remove(PROBE_KEY).await?;

        if read_back.as_deref() == Some(marker.as_str()) {
            Ok(())
        } else {
            Err(Error::StorageUnavailable(format!(
                "{} tier did not return the probe value",
                self.name()
            )))
        }
    }
}

/// Ordered chain of [`KvTier`]s with a cached active index.
pub struct TieredStorage {
    tiers: Vec<Arc<dyn KvTier>>,
    active: AtomicUsize,
    probed: OnceCell<()>,
}

impl TieredStorage {
    /// Build a chain from `tiers`, always terminated by a memory tier.
    pub fn new(mut tiers: Vec<Arc<dyn KvTier>>) -> Self {
        tiers.push(Arc::new(MemoryKvTier::new()));
        Self {
            tiers,
            active: AtomicUsize::new(0),
            probed: OnceCell::new(),
        }
    }

    /// Structured store first, then an optional JSON file, then memory.
    pub fn standard(store: &LocalStore, fallback_file: Option<PathBuf>) -> Self {
        let mut tiers: Vec<Arc<dyn KvTier>> = vec![Arc::new(LibSqlKvTier::new(store))];
        if let Some(path) = fallback_file {
            tiers.push(Arc::new(FileKvTier::new(path)));
        }
        Self::new(tiers)
    }

    /// Memory only; used when no durable location exists.
    pub fn in_memory() -> Self {
        Self::new(Vec::new())
    }

    /// Name of the tier currently serving requests.
    pub async fn active_tier(&self) -> &'static str {
        self.select().await;
        self.tiers
            .get(self.active.load(Ordering::SeqCst))
            .map_or("none", |tier| tier.name())
    }

    pub async fn get_item(&self, key: &str) -> Option<String> {
        self.select().await;
        loop {
            let index = self.active.load(Ordering::SeqCst);
            let tier = self.tiers.get(index)?;
            match tier.get(key).await {
                Ok(value) => return value,
                Err(error) => {
                    if !self.demote(index, "get", &error) {
                        return None;
                    }
                }
            }
        }
    }

    pub async fn set_item(&self, key: &str, value: &str) {
        self.select().await;
        loop {
            let index = self.active.load(Ordering::SeqCst);
            let Some(tier) = self.tiers.get(index) else {
                return;
            };
            match tier.set(key, value).await {
                Ok(()) => return,
                Err(error) => {
                    if !self.demote(index, "set", &error) {
                        return;
                    }
                }
            }
        }
    }

    pub async fn remove_item(&self, key: &str) {
        self.select().await;
        loop {
            let index = self.active.load(Ordering::SeqCst);
            let Some(tier) = self.tiers.get(index) else {
                return;
            };
            match tier.remove(key).await {
                Ok(()) => return,
                Err(error) => {
                    if !self.demote(index, "remove", &error) {
                        return;
                    }
                }
            }
        }
    }

    /// Probe tiers in order once per process and keep the first healthy one.
    async fn select(&self) {
        self.probed
            .get_or_init(|| async {
                let last = self.tiers.len().saturating_sub(1);
                for (index, tier) in self.tiers.iter().enumerate() {
                    match tier.probe().await {
                        Ok(()) => {
                            self.active.store(index, Ordering::SeqCst);
                            tracing::debug!("Selected {} storage tier", tier.name());
                            return;
                        }
                        Err(error) => {
                            tracing::warn!("Storage tier {} failed probe: {error}", tier.name());
                        }
                    }
                }
                self.active.store(last, Ordering::SeqCst);
            })
            .await;
    }

    /// Move past a failed tier. Returns false when there is nowhere to go.
    fn demote(&self, failed: usize, operation: &str, error: &Error) -> bool {
        let name = self.tiers.get(failed).map_or("unknown", |tier| tier.name());
        let next = failed + 1;
        let Some(next_tier) = self.tiers.get(next) else {
            tracing::warn!("Storage tier {name} failed to {operation}: {error}");
            return false;
        };

        // Another task may already have demoted this tier.
        let _ = self
            .active
            .compare_exchange(failed, next, Ordering::SeqCst, Ordering::SeqCst);
        tracing::warn!(
            "Storage tier {name} failed to {operation}: {error}. Falling back to {}",
            next_tier.name()
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    /// Tier that fails every call.
    struct FailingTier;

    #[async_trait]
    impl KvTier for FailingTier {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::StorageUnavailable("quota exceeded".into()))
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(Error::StorageUnavailable("quota exceeded".into()))
        }

        async fn remove(&self, _key: &str) -> Result<()> {
            Err(Error::StorageUnavailable("quota exceeded".into()))
        }
    }

    /// Tier that passes its probe and breaks once `broken` is set.
    struct BreakableTier {
        inner: MemoryKvTier,
        broken: Arc<AtomicBool>,
    }

    impl BreakableTier {
        fn check(&self) -> Result<()> {
            if self.broken.load(Ordering::SeqCst) {
                Err(Error::StorageUnavailable("disk full".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl KvTier for BreakableTier {
        fn name(&self) -> &'static str {
            "breakable"
        }

        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.check()?;
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            self.check()?;
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.check()?;
            self.inner.remove(key).await
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_tiers_fall_through_to_memory() {
        let storage = TieredStorage::new(vec![Arc::new(FailingTier), Arc::new(FailingTier)]);

        storage.set_item("k", "v").await;
        assert_eq!(storage.get_item("k").await.as_deref(), Some("v"));
        assert_eq!(storage.active_tier().await, "memory");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runtime_failure_demotes_permanently() {
        let broken = Arc::new(AtomicBool::new(false));
        let storage = TieredStorage::new(vec![Arc::new(BreakableTier {
            inner: MemoryKvTier::new(),
            broken: Arc::clone(&broken),
        })]);

        storage.set_item("k", "first").await;
        assert_eq!(storage.active_tier().await, "breakable");

        broken.store(true, Ordering::SeqCst);
        assert_eq!(storage.get_item("k").await, None);
        assert_eq!(storage.active_tier().await, "memory");

        broken.store(false, Ordering::SeqCst);
        storage.set_item("k", "second").await;
        assert_eq!(storage.get_item("k").await.as_deref(), Some("second"));
        assert_eq!(storage.active_tier().await, "memory");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn standard_chain_prefers_structured_store() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let storage = TieredStorage::standard(&store, None);

        storage.set_item("flag", "done").await;
        storage.remove_item("missing").await;
        assert_eq!(storage.active_tier().await, "libsql");
        assert_eq!(storage.get_item("flag").await.as_deref(), Some("done"));
    }
}
