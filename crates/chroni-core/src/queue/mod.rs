//! Durable FIFO of writes the remote has not confirmed yet.

use std::time::Duration;

use crate::db::{
    LibSqlPendingRepository, LibSqlRecordRepository, PendingRepository, RecordRepository,
};
use crate::error::Result;
use crate::models::{PendingOperation, Record, RecordId};
use crate::remote::{with_timeout, RemoteError, RemoteStore};
use crate::services::LocalStore;
use crate::util::unix_millis_now;

/// Rejections tolerated before an entry is parked
pub const DEFAULT_MAX_REJECTIONS: u32 = 5;

/// Outcome of one replay pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries accepted by the remote during this pass
    pub replayed: Vec<RecordId>,
    /// Entries dropped because their record was already confirmed
    pub already_synced: usize,
    /// Entries rewritten locally while their replay was in flight; they stay
    /// queued with the newer content
    pub superseded: usize,
    /// Entries parked during this pass
    pub parked: usize,
    /// Failure that stopped the pass early, if any
    pub halted_by: Option<RemoteError>,
}

impl DrainReport {
    /// True when the pass ran to the end of the queue.
    pub const fn completed(&self) -> bool {
        self.halted_by.is_none()
    }
}

/// Pending operations queue stored next to the records it refers to.
#[derive(Clone)]
pub struct PendingQueue {
    store: LocalStore,
}

impl PendingQueue {
    pub const fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Queue a snapshot of `record` for replay.
    pub async fn enqueue(&self, record: &Record) -> Result<i64> {
        let db = self.store.database();
        let db = db.lock().await;
        let operation_id = LibSqlPendingRepository::new(db.connection())
            .enqueue(record, unix_millis_now())
            .await?;
        tracing::debug!("Queued record {} as operation {operation_id}", record.id);
        Ok(operation_id)
    }

    /// Queue `record` only while the store still holds its content, so a
    /// stale snapshot never replaces a newer queued one.
    pub async fn enqueue_if_current(&self, record: &Record) -> Result<bool> {
        let db = self.store.database();
        let db = db.lock().await;
        let current = LibSqlRecordRepository::new(db.connection())
            .get(&record.id)
            .await?;
        if !current.is_some_and(|current| current.same_entry(record)) {
            return Ok(false);
        }
        let operation_id = LibSqlPendingRepository::new(db.connection())
            .enqueue(record, unix_millis_now())
            .await?;
        tracing::debug!("Queued record {} as operation {operation_id}", record.id);
        Ok(true)
    }

    /// Replayable entries in FIFO order.
    pub async fn entries(&self) -> Result<Vec<PendingOperation>> {
        let db = self.store.database();
        let db = db.lock().await;
        LibSqlPendingRepository::new(db.connection())
            .list_ready()
            .await
    }

    /// Entries parked after repeated rejections.
    pub async fn parked(&self) -> Result<Vec<PendingOperation>> {
        let db = self.store.database();
        let db = db.lock().await;
        LibSqlPendingRepository::new(db.connection())
            .list_parked()
            .await
    }

    pub async fn len(&self) -> Result<usize> {
        let db = self.store.database();
        let db = db.lock().await;
        LibSqlPendingRepository::new(db.connection())
            .count_ready()
            .await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    pub async fn contains(&self, record_id: &RecordId) -> Result<bool> {
        let db = self.store.database();
        let db = db.lock().await;
        LibSqlPendingRepository::new(db.connection())
            .contains(record_id)
            .await
    }

    pub async fn remove(&self, operation_id: i64) -> Result<()> {
        let db = self.store.database();
        let db = db.lock().await;
        LibSqlPendingRepository::new(db.connection())
            .remove(operation_id)
            .await
    }

    /// Drop an entry after its replay unless it was refreshed meanwhile.
    pub async fn remove_if_unchanged(&self, operation: &PendingOperation) -> Result<bool> {
        let db = self.store.database();
        let db = db.lock().await;
        LibSqlPendingRepository::new(db.connection())
            .remove_if_unchanged(operation.operation_id, &operation.payload)
            .await
    }

    /// Count a failed replay, optionally parking the entry.
    pub async fn record_failure(&self, operation_id: i64, error: &str, park: bool) -> Result<()> {
        let db = self.store.database();
        let db = db.lock().await;
        LibSqlPendingRepository::new(db.connection())
            .record_failure(operation_id, error, park)
            .await
    }

    /// Return parked entries to the replay queue.
    pub async fn release_parked(&self) -> Result<u64> {
        let db = self.store.database();
        let db = db.lock().await;
        let released = LibSqlPendingRepository::new(db.connection())
            .release_parked()
            .await?;
        if released > 0 {
            tracing::info!("Released {released} parked operations");
        }
        Ok(released)
    }

    /// Replay queued writes in FIFO order.
    ///
    /// An unreachable remote or a timeout stops the pass and leaves every
    /// remaining entry queued. A rejection is counted against the entry
    /// (parking it after `max_rejections`) and also stops the pass, so later
    /// writes are never confirmed ahead of earlier ones.
    pub async fn drain(
        &self,
        remote: &dyn RemoteStore,
        timeout: Duration,
        max_rejections: u32,
    ) -> Result<DrainReport> {
        let mut report = DrainReport::default();

        for operation in self.entries().await? {
            let record_id = operation.payload.id.clone();

            let local = self.store.get(&record_id).await?;
            if local.as_ref().is_some_and(|record| record.synced) {
                self.remove(operation.operation_id).await?;
                report.already_synced += 1;
                continue;
            }

            match with_timeout(timeout, remote.create_record(&operation.payload)).await {
                Ok(_) => {
                    if !self.remove_if_unchanged(&operation).await? {
                        tracing::debug!("Record {record_id} changed during replay; keeping it queued");
                        report.superseded += 1;
                        continue;
                    }
                    self.store.mark_synced_if_current(&operation.payload).await?;
                    tracing::debug!("Replayed record {record_id} to {}", remote.name());
                    report.replayed.push(record_id);
                }
                Err(error) if error.is_retryable() => {
                    tracing::debug!("Replay paused at record {record_id}: {error}");
                    report.halted_by = Some(error);
                    break;
                }
                Err(error) => {
                    let park = operation.attempts.saturating_add(1) >= max_rejections;
                    self.record_failure(operation.operation_id, &error.to_string(), park)
                        .await?;
                    if park {
                        tracing::warn!(
                            "Parked record {record_id} after {} rejections: {error}",
                            operation.attempts.saturating_add(1)
                        );
                        report.parked += 1;
                    } else {
                        tracing::warn!("Remote rejected record {record_id}: {error}");
                    }
                    report.halted_by = Some(error);
                    break;
                }
            }
        }

        Ok(report)
    }
}
