//! Durable local record store shared by the queue, storage tiers and engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{Database, LibSqlRecordRepository, RecordFilter, RecordRepository};
use crate::models::{Record, RecordId};
use crate::{Error, Result};

/// Thread-safe handle to the durable record store.
///
/// Every failure to open, read or write is returned immediately; records have
/// no fallback tier.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open the store at the given filesystem path, creating parent directories.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| Error::StorageUnavailable(error.to_string()))?;
        }

        let db = Self::open_with_recovery(&db_path).await?;
        tracing::debug!("Opened local store at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()
            .await
            .map_err(|error| Error::StorageUnavailable(error.to_string()))?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    async fn open_with_recovery(db_path: &Path) -> Result<Database> {
        match Database::open(db_path).await {
            Ok(db) => Ok(db),
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local store at {} is not a valid database: {}. Moving it aside and starting fresh.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(db_path)
                    .map_err(|error| Error::StorageUnavailable(error.to_string()))?;
                Database::open(db_path)
                    .await
                    .map_err(|error| Error::StorageUnavailable(error.to_string()))
            }
            Err(error) => Err(Error::StorageUnavailable(error.to_string())),
        }
    }

    fn is_corrupted_db_error(error: &Error) -> bool {
        error
            .to_string()
            .to_ascii_lowercase()
            .contains("file is not a database")
    }

    /// Move a corrupted file aside (never deleted) and drop stale sidecars.
    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let base_name = db_path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("chroni.db");
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local store from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };
        let sidecar_prefix = format!("{base_name}-");

        for entry in std::fs::read_dir(parent)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with(&sidecar_prefix) {
                let path = entry.path();
                std::fs::remove_file(&path)?;
                tracing::warn!("Removed stale sidecar file {}", path.display());
            }
        }

        Ok(())
    }

    /// Shared database handle for components layered on this store.
    pub(crate) fn database(&self) -> Arc<Mutex<Database>> {
        Arc::clone(&self.db)
    }

    /// Path of the backing file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Insert or update a record by id.
    pub async fn put(&self, record: &Record) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::new(db.connection());
        repo.put(record).await
    }

    /// Write a record as unconfirmed unless the stored copy is already synced.
    /// Returns false when the write was refused.
    pub async fn put_unconfirmed(&self, record: &Record) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::new(db.connection());
        repo.put_unconfirmed(record).await
    }

    /// Fetch a record by id.
    pub async fn get(&self, id: &RecordId) -> Result<Option<Record>> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::new(db.connection());
        repo.get(id).await
    }

    /// List records newest-first.
    pub async fn list(&self, filter: &RecordFilter) -> Result<Vec<Record>> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::new(db.connection());
        repo.list(filter).await
    }

    /// All records newest-first.
    pub async fn list_all(&self) -> Result<Vec<Record>> {
        self.list(&RecordFilter::default()).await
    }

    /// Delete a record.
    pub async fn delete(&self, id: &RecordId) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::new(db.connection());
        repo.delete(id).await
    }

    /// Mark a record as confirmed by the remote.
    pub async fn mark_synced(&self, id: &RecordId) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::new(db.connection());
        repo.mark_synced(id).await
    }

    /// Mark `snapshot` confirmed if the stored row still holds its content.
    pub async fn mark_synced_if_current(&self, snapshot: &Record) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::new(db.connection());
        repo.mark_synced_if_current(snapshot).await
    }

    /// Records not yet bound to an account, oldest first.
    pub async fn list_unowned(&self) -> Result<Vec<Record>> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::new(db.connection());
        repo.list_unowned().await
    }

    /// Bind unowned records to an account.
    pub async fn bind_owner(&self, owner_id: &str) -> Result<u64> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::new(db.connection());
        repo.bind_owner(owner_id).await
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::new(db.connection());
        repo.count().await
    }
}
