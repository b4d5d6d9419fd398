//! Concrete storage tiers.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::KvTier;
use crate::db::{Database, KvRepository, LibSqlKvRepository};
use crate::error::Result;
use crate::services::LocalStore;
use crate::util::unix_millis_now;

/// Tier 1: the `kv_store` table of the durable local store
pub struct LibSqlKvTier {
    db: Arc<tokio::sync::Mutex<Database>>,
}

impl LibSqlKvTier {
    pub fn new(store: &LocalStore) -> Self {
        Self {
            db: store.database(),
        }
    }
}

#[async_trait]
impl KvTier for LibSqlKvTier {
    fn name(&self) -> &'static str {
        "libsql"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock().await;
        LibSqlKvRepository::new(db.connection()).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlKvRepository::new(db.connection())
            .set(key, value, unix_millis_now())
            .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlKvRepository::new(db.connection()).remove(key).await
    }
}

/// Tier 2: a single JSON object file, rewritten atomically on every change
pub struct FileKvTier {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileKvTier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(error) => Err(error.into()),
        }
    }

    async fn save(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, serde_json::to_vec_pretty(values)?).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KvTier for FileKvTier {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.load().await?;
        values.insert(key.to_string(), value.to_string());
        self.save(&values).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.load().await?;
        if values.remove(key).is_some() {
            self.save(&values).await?;
        }
        Ok(())
    }
}

/// Tier 3: process memory. Lost on exit, never fails.
#[derive(Default)]
pub struct MemoryKvTier {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKvTier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvTier for MemoryKvTier {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn file_tier_persists_between_instances() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("kv").join("fallback.json");

        let tier = FileKvTier::new(&path);
        tier.probe().await.unwrap();
        tier.set("import:u1", "done").await.unwrap();

        let reopened = FileKvTier::new(&path);
        assert_eq!(
            reopened.get("import:u1").await.unwrap().as_deref(),
            Some("done")
        );

        reopened.remove("import:u1").await.unwrap();
        assert_eq!(tier.get("import:u1").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn file_tier_fails_probe_when_path_is_a_directory() {
        let tmp = tempdir().unwrap();
        let tier = FileKvTier::new(tmp.path());
        assert!(tier.probe().await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn libsql_tier_probes_clean() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let tier = LibSqlKvTier::new(&store);
        tier.probe().await.unwrap();
        assert_eq!(tier.get(super::super::PROBE_KEY).await.unwrap(), None);
    }
}
