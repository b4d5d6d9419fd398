//! The synchronization engine.
//!
//! Writes are committed locally before anything touches the network. The
//! remote copy is reconciled afterwards by a background push, by replaying
//! the pending queue, or by merging a remote listing. Remote failures never
//! reach the caller; they turn into queue entries and `synced = false`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{
    EngineSettings, ImportDecision, ImportOutcome, MergeOutcome, MergeReport, PushOutcome,
    ResyncReport, Submission, SyncMode, SyncPass, SyncStatus,
};
use crate::connectivity::ConnectivityMonitor;
use crate::db::RecordFilter;
use crate::error::{Error, Result};
use crate::kv::TieredStorage;
use crate::models::{Record, RecordId};
use crate::queue::{DrainReport, PendingQueue};
use crate::remote::{with_timeout, RemoteError, RemoteStore};
use crate::services::LocalStore;

const IMPORT_FLAG_PREFIX: &str = "import:";
const OWNER_KEY: &str = "account:owner_id";

/// Reconciles the local record set with the active remote.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: LocalStore,
    queue: PendingQueue,
    storage: Arc<TieredStorage>,
    connectivity: Arc<ConnectivityMonitor>,
    mode: RwLock<SyncMode>,
    owner_id: RwLock<Option<String>>,
    remote_timeout: Duration,
    max_rejections: u32,
    in_flight: AtomicBool,
    ready: watch::Sender<bool>,
}

/// Releases the in-flight flag when dropped.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn store_failed(record_id: &RecordId, error: &Error) -> PushOutcome {
    tracing::error!("Could not record push outcome for {record_id}: {error}");
    PushOutcome::StoreFailed(error.to_string())
}

impl SyncEngine {
    /// Create an engine in local-only mode. Background work waits until
    /// [`initialize`](Self::initialize) is called.
    pub fn new(
        store: LocalStore,
        storage: Arc<TieredStorage>,
        connectivity: Arc<ConnectivityMonitor>,
        settings: EngineSettings,
    ) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            inner: Arc::new(EngineInner {
                queue: PendingQueue::new(store.clone()),
                store,
                storage,
                connectivity,
                mode: RwLock::new(SyncMode::LocalOnly),
                owner_id: RwLock::new(settings.owner_id),
                remote_timeout: settings.remote_timeout,
                max_rejections: settings.max_rejections,
                in_flight: AtomicBool::new(false),
                ready,
            }),
        }
    }

    /// Select the sync mode and release everything waiting on initialization.
    pub fn initialize(&self, mode: SyncMode) {
        tracing::info!("Sync engine initialized in {} mode", mode.name());
        self.set_mode(mode);
        self.inner.ready.send_replace(true);
    }

    pub fn is_initialized(&self) -> bool {
        *self.inner.ready.borrow()
    }

    /// Resolves once [`initialize`](Self::initialize) has run.
    pub async fn wait_until_initialized(&self) {
        let mut ready = self.inner.ready.subscribe();
        // The sender lives in `inner`, so the channel cannot close while we wait.
        let _ = ready.wait_for(|ready| *ready).await;
    }

    /// Swap the active remote collaborator.
    pub fn attach_remote(&self, remote: Arc<dyn RemoteStore>) {
        tracing::info!("Attached remote {}", remote.name());
        self.set_mode(SyncMode::Remote(remote));
    }

    fn set_mode(&self, mode: SyncMode) {
        *self
            .inner
            .mode
            .write()
            .unwrap_or_else(PoisonError::into_inner) = mode;
    }

    pub fn mode(&self) -> SyncMode {
        self.inner
            .mode
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn remote(&self) -> Option<Arc<dyn RemoteStore>> {
        match self.mode() {
            SyncMode::Remote(remote) => Some(remote),
            SyncMode::LocalOnly => None,
        }
    }

    pub fn owner_id(&self) -> Option<String> {
        self.inner
            .owner_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_owner_id(&self, owner_id: Option<String>) {
        *self
            .inner
            .owner_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = owner_id;
    }

    /// Load the account bound by an earlier import when none is configured.
    pub async fn restore_owner(&self) -> Option<String> {
        if let Some(owner_id) = self.owner_id() {
            return Some(owner_id);
        }
        let stored = self.inner.storage.get_item(OWNER_KEY).await?;
        tracing::debug!("Restored account {stored} from a previous import");
        self.set_owner_id(Some(stored.clone()));
        Some(stored)
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.inner.queue
    }

    pub fn store(&self) -> &LocalStore {
        &self.inner.store
    }

    /// Remote to talk to right now, if any.
    fn reachable_remote(&self) -> Option<Arc<dyn RemoteStore>> {
        if !self.inner.connectivity.is_online() {
            return None;
        }
        self.remote()
    }

    fn try_begin_pass(&self) -> Option<PassGuard<'_>> {
        self.inner
            .in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| PassGuard(&self.inner.in_flight))
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Commit `record` locally, then reconcile it with the remote in the
    /// background.
    ///
    /// Returns as soon as the local write is durable. Only local storage
    /// failures are reported. Records the remote already confirmed are
    /// append-only and cannot be submitted again.
    pub async fn submit(&self, mut record: Record) -> Result<Submission> {
        record.validate()?;
        if record.owner_id.is_none() {
            record.owner_id = self.owner_id();
        }
        record.synced = false;

        if !self.inner.store.put_unconfirmed(&record).await? {
            return Err(Error::RecordAlreadySynced(record.id.to_string()));
        }
        tracing::debug!("Committed record {} locally", record.id);

        if self.is_initialized() {
            match self.mode() {
                SyncMode::LocalOnly => {
                    return Ok(Submission { record, push: None });
                }
                SyncMode::Remote(_) if !self.inner.connectivity.is_online() => {
                    self.inner.queue.enqueue_if_current(&record).await?;
                    return Ok(Submission { record, push: None });
                }
                SyncMode::Remote(_) => {}
            }
        }

        let engine = self.clone();
        let snapshot = record.clone();
        let push = tokio::spawn(async move { engine.push(snapshot).await });
        Ok(Submission {
            record,
            push: Some(push),
        })
    }

    async fn push(&self, record: Record) -> PushOutcome {
        self.wait_until_initialized().await;

        let Some(remote) = self.remote() else {
            return PushOutcome::LocalOnly;
        };
        match self.inner.store.get(&record.id).await {
            Ok(Some(current)) if current.same_entry(&record) => {}
            Ok(_) => return PushOutcome::Superseded,
            Err(error) => return store_failed(&record.id, &error),
        }
        if !self.inner.connectivity.is_online() {
            return match self.inner.queue.enqueue_if_current(&record).await {
                Ok(true) => PushOutcome::QueuedOffline,
                Ok(false) => PushOutcome::Superseded,
                Err(error) => store_failed(&record.id, &error),
            };
        }

        match with_timeout(self.inner.remote_timeout, remote.create_record(&record)).await {
            Ok(_) => match self.inner.store.mark_synced_if_current(&record).await {
                Ok(true) => {
                    tracing::debug!("Remote {} confirmed record {}", remote.name(), record.id);
                    PushOutcome::Confirmed
                }
                Ok(false) => {
                    tracing::debug!(
                        "Record {} changed while its push was in flight",
                        record.id
                    );
                    PushOutcome::Superseded
                }
                Err(error) => store_failed(&record.id, &error),
            },
            Err(remote_error) => {
                tracing::warn!(
                    "Push of record {} failed, queueing for replay: {remote_error}",
                    record.id
                );
                match self.inner.queue.enqueue_if_current(&record).await {
                    Ok(true) => PushOutcome::Queued(remote_error),
                    Ok(false) => PushOutcome::Superseded,
                    Err(error) => store_failed(&record.id, &error),
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Records from the local store only; never touches the network.
    pub async fn local_records(&self, filter: &RecordFilter) -> Result<Vec<Record>> {
        self.inner.store.list(filter).await
    }

    /// Merge the remote listing into the local store.
    pub async fn refresh(&self) -> Result<SyncPass<MergeReport>> {
        let Some(_guard) = self.try_begin_pass() else {
            return Ok(SyncPass::Skipped);
        };
        let Some(remote) = self.reachable_remote() else {
            return Ok(SyncPass::Unavailable);
        };
        self.merge_from(remote.as_ref()).await
    }

    async fn merge_from(&self, remote: &dyn RemoteStore) -> Result<SyncPass<MergeReport>> {
        let owner_id = self.owner_id();
        let payloads = match with_timeout(
            self.inner.remote_timeout,
            remote.list_records(owner_id.as_deref()),
        )
        .await
        {
            Ok(payloads) => payloads,
            Err(error) => {
                tracing::warn!("Listing records from {} failed: {error}", remote.name());
                return Ok(SyncPass::Failed(error));
            }
        };

        let local_ids: HashSet<RecordId> = self
            .inner
            .store
            .list_all()
            .await?
            .into_iter()
            .map(|record| record.id)
            .collect();

        let mut report = MergeReport::default();
        let mut seen = HashSet::new();
        for payload in payloads {
            let (outcome, id) = self.apply_payload(payload).await?;
            match outcome {
                MergeOutcome::Imported => report.imported += 1,
                MergeOutcome::Reconciled => report.reconciled += 1,
                MergeOutcome::Unchanged => report.unchanged += 1,
                MergeOutcome::Malformed => {
                    report.malformed += 1;
                    continue;
                }
            }
            if let Some(id) = id {
                seen.insert(id);
            }
        }
        report.untouched_local = local_ids.difference(&seen).count();

        tracing::info!(
            "Merged from {}: {} imported, {} reconciled, {} malformed",
            remote.name(),
            report.imported,
            report.reconciled,
            report.malformed
        );
        Ok(SyncPass::Ran(report))
    }

    /// Apply one remote payload. The remote copy wins for shared ids.
    pub async fn apply_remote_payload(&self, payload: Value) -> Result<MergeOutcome> {
        Ok(self.apply_payload(payload).await?.0)
    }

    async fn apply_payload(&self, payload: Value) -> Result<(MergeOutcome, Option<RecordId>)> {
        let mut remote_record: Record = match serde_json::from_value(payload) {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!("Skipping malformed remote record: {error}");
                return Ok((MergeOutcome::Malformed, None));
            }
        };
        if remote_record.id.is_blank() {
            tracing::warn!("Skipping remote record without an id");
            return Ok((MergeOutcome::Malformed, None));
        }
        remote_record.synced = true;
        let id = remote_record.id.clone();

        let outcome = match self.inner.store.get(&id).await? {
            None => MergeOutcome::Imported,
            Some(local) if local.synced && local.same_content(&remote_record) => {
                return Ok((MergeOutcome::Unchanged, Some(id)));
            }
            Some(_) => MergeOutcome::Reconciled,
        };

        self.inner.store.put(&remote_record).await?;
        Ok((outcome, Some(id)))
    }

    /// Merge records pushed by the remote as they arrive.
    ///
    /// Returns `None` when there is no remote or it offers no change stream.
    pub fn spawn_change_listener(&self) -> Option<JoinHandle<()>> {
        let remote = self.remote()?;
        let mut changes = remote.subscribe()?;
        let engine = self.clone();

        Some(tokio::spawn(async move {
            engine.wait_until_initialized().await;
            while let Some(payload) = changes.recv().await {
                match engine.apply_remote_payload(payload).await {
                    Ok(outcome) => tracing::debug!("Applied remote change: {outcome:?}"),
                    Err(error) => tracing::warn!("Could not apply remote change: {error}"),
                }
            }
            tracing::debug!("Remote change stream from {} closed", remote.name());
        }))
    }

    // ------------------------------------------------------------------
    // Replay
    // ------------------------------------------------------------------

    /// Replay the pending queue against the active remote.
    pub async fn drain_queue(&self) -> Result<SyncPass<DrainReport>> {
        let Some(_guard) = self.try_begin_pass() else {
            return Ok(SyncPass::Skipped);
        };
        let Some(remote) = self.reachable_remote() else {
            return Ok(SyncPass::Unavailable);
        };
        self.drain_into(remote.as_ref()).await.map(SyncPass::Ran)
    }

    async fn drain_into(&self, remote: &dyn RemoteStore) -> Result<DrainReport> {
        let report = self
            .inner
            .queue
            .drain(remote, self.inner.remote_timeout, self.inner.max_rejections)
            .await?;
        if !report.replayed.is_empty() {
            tracing::info!(
                "Replayed {} queued records to {}",
                report.replayed.len(),
                remote.name()
            );
        }
        Ok(report)
    }

    /// Drain the queue, then merge the remote listing.
    ///
    /// The merge is skipped when the drain found the remote unreachable.
    pub async fn resync(&self) -> Result<SyncPass<ResyncReport>> {
        let Some(_guard) = self.try_begin_pass() else {
            return Ok(SyncPass::Skipped);
        };
        let Some(remote) = self.reachable_remote() else {
            return Ok(SyncPass::Unavailable);
        };

        let drain = self.drain_into(remote.as_ref()).await?;
        let merge = if drain
            .halted_by
            .as_ref()
            .is_some_and(RemoteError::is_retryable)
        {
            None
        } else {
            match self.merge_from(remote.as_ref()).await? {
                SyncPass::Ran(report) => Some(report),
                _ => None,
            }
        };

        Ok(SyncPass::Ran(ResyncReport { drain, merge }))
    }

    /// Run [`resync`](Self::resync) every `interval` while online.
    pub fn spawn_periodic_resync(&self, interval: Duration) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            engine.wait_until_initialized().await;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !engine.inner.connectivity.is_online() {
                    continue;
                }
                match engine.resync().await {
                    Ok(SyncPass::Ran(report)) => {
                        tracing::debug!("Periodic resync finished: {report:?}");
                    }
                    Ok(_) => {}
                    Err(error) => tracing::warn!("Periodic resync failed: {error}"),
                }
            }
        })
    }

    // ------------------------------------------------------------------
    // Account import
    // ------------------------------------------------------------------

    fn import_flag_key(owner_id: &str) -> String {
        format!("{IMPORT_FLAG_PREFIX}{owner_id}")
    }

    /// Whether the import prompt was already answered for `owner_id`.
    pub async fn import_decided(&self, owner_id: &str) -> bool {
        self.inner
            .storage
            .get_item(&Self::import_flag_key(owner_id))
            .await
            .is_some()
    }

    /// One-time import of device records into an account.
    ///
    /// Accepting binds every unowned record to `owner_id` and pushes it;
    /// pushes that fail (or happen offline) go to the pending queue. Either
    /// answer is final for this owner.
    pub async fn import_local_records(
        &self,
        owner_id: &str,
        decision: ImportDecision,
    ) -> Result<ImportOutcome> {
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            return Err(Error::InvalidInput("owner id cannot be empty".into()));
        }
        if self.import_decided(owner_id).await {
            return Err(Error::ImportAlreadyCompleted(owner_id.to_string()));
        }

        self.set_owner_id(Some(owner_id.to_string()));
        self.inner.storage.set_item(OWNER_KEY, owner_id).await;
        let flag_key = Self::import_flag_key(owner_id);

        if decision == ImportDecision::Decline {
            self.inner.storage.set_item(&flag_key, "declined").await;
            tracing::info!("Local record import declined for account {owner_id}");
            return Ok(ImportOutcome {
                declined: true,
                ..ImportOutcome::default()
            });
        }

        let unowned = self.inner.store.list_unowned().await?;
        self.inner.store.bind_owner(owner_id).await?;

        let mut outcome = ImportOutcome {
            bound: unowned.len(),
            ..ImportOutcome::default()
        };
        let remote = self.reachable_remote();

        for mut record in unowned {
            record.owner_id = Some(owner_id.to_string());
            let pushed = match &remote {
                Some(remote) => {
                    match with_timeout(self.inner.remote_timeout, remote.create_record(&record))
                        .await
                    {
                        Ok(_) => true,
                        Err(error) => {
                            tracing::warn!("Import push of {} failed: {error}", record.id);
                            false
                        }
                    }
                }
                None => false,
            };

            if pushed {
                self.inner.store.mark_synced_if_current(&record).await?;
                outcome.pushed += 1;
            } else {
                self.inner.queue.enqueue(&record).await?;
                outcome.queued += 1;
            }
        }

        self.inner.storage.set_item(&flag_key, "completed").await;
        tracing::info!(
            "Imported {} local records into account {owner_id} ({} pushed, {} queued)",
            outcome.bound,
            outcome.pushed,
            outcome.queued
        );
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    pub async fn status(&self) -> Result<SyncStatus> {
        let records = self.inner.store.list_all().await?;
        Ok(SyncStatus {
            mode: self.mode().name(),
            online: self.inner.connectivity.is_online(),
            initialized: self.is_initialized(),
            unsynced: records.iter().filter(|record| !record.synced).count(),
            records: records.len(),
            pending: self.inner.queue.len().await?,
            parked: self.inner.queue.parked().await?.len(),
            storage_tier: self.inner.storage.active_tier().await,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::StaticProbe;
    use crate::models::EntryType;
    use crate::remote::{MemoryRemoteStore, RemoteCall};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    struct Harness {
        engine: SyncEngine,
        remote: Arc<MemoryRemoteStore>,
        connectivity: Arc<ConnectivityMonitor>,
        store: LocalStore,
    }

    async fn harness(online: bool) -> Harness {
        let store = LocalStore::open_in_memory().await.unwrap();
        let storage = Arc::new(TieredStorage::standard(&store, None));
        let connectivity = Arc::new(ConnectivityMonitor::new(Arc::new(StaticProbe::new(online))));
        connectivity.initialize().await;
        let engine = SyncEngine::new(
            store.clone(),
            storage,
            Arc::clone(&connectivity),
            EngineSettings {
                remote_timeout: Duration::from_millis(500),
                ..EngineSettings::default()
            },
        );
        Harness {
            engine,
            remote: Arc::new(MemoryRemoteStore::new()),
            connectivity,
            store,
        }
    }

    impl Harness {
        fn start_remote(&self) {
            self.engine.initialize(SyncMode::Remote(self.remote.clone()));
        }
    }

    fn record(id: &str) -> Record {
        Record {
            mood: Some(6),
            ..Record::new(EntryType::Morning, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
                .with_id(id)
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_submit_is_confirmed_in_background() {
        let h = harness(true).await;
        h.start_remote();

        let submission = h.engine.submit(record("e1")).await.unwrap();
        assert!(!submission.record.synced);
        assert_eq!(submission.settled().await, Some(PushOutcome::Confirmed));

        assert!(h.store.get(&"e1".into()).await.unwrap().unwrap().synced);
        assert!(h.engine.queue().is_empty().await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_submit_goes_straight_to_the_queue() {
        let h = harness(false).await;
        h.start_remote();

        let submission = h.engine.submit(record("e1")).await.unwrap();
        assert!(submission.push.is_none());

        let stored = h.store.get(&"e1".into()).await.unwrap().unwrap();
        assert!(!stored.synced);
        assert!(h.engine.queue().contains(&"e1".into()).await.unwrap());
        assert!(h.remote.calls().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_push_is_queued() {
        let h = harness(true).await;
        h.start_remote();
        h.remote.fail_next(RemoteError::Unreachable("connection reset".into()));

        let outcome = h.engine.submit(record("e1")).await.unwrap().settled().await;
        assert!(matches!(outcome, Some(PushOutcome::Queued(_))));
        assert!(h.engine.queue().contains(&"e1".into()).await.unwrap());
        assert!(!h.store.get(&"e1".into()).await.unwrap().unwrap().synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rewrite_during_push_keeps_newer_content_queued() {
        let h = harness(true).await;
        h.start_remote();
        h.remote.set_latency(Some(Duration::from_millis(300)));

        let first = Record {
            mood: Some(1),
            ..record("e1")
        };
        let in_flight = h.engine.submit(first).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.connectivity.report(false);
        let rewrite = Record {
            mood: Some(9),
            ..record("e1")
        };
        h.engine.submit(rewrite).await.unwrap();

        assert_eq!(in_flight.settled().await, Some(PushOutcome::Superseded));
        let stored = h.store.get(&"e1".into()).await.unwrap().unwrap();
        assert_eq!(stored.mood, Some(9));
        assert!(!stored.synced);
        assert!(h.engine.queue().contains(&"e1".into()).await.unwrap());

        h.remote.set_latency(None);
        h.connectivity.report(true);
        let pass = h.engine.drain_queue().await.unwrap();
        assert_eq!(pass.ran().unwrap().replayed, vec![RecordId::from("e1")]);
        assert_eq!(h.remote.get("e1").unwrap()["mood_overall"], 9);
        assert!(h.store.get(&"e1".into()).await.unwrap().unwrap().synced);
        assert!(h.engine.queue().is_empty().await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn going_offline_mid_push_fails_closed_into_queue() {
        let h = harness(true).await;
        h.start_remote();
        h.remote.set_latency(Some(Duration::from_millis(200)));

        let submission = h.engine.submit(record("e1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.connectivity.report(false);
        h.remote.set_offline(true);

        let outcome = submission.settled().await;
        assert!(matches!(
            outcome,
            Some(PushOutcome::Queued(RemoteError::Unreachable(_)))
        ));
        assert!(h.engine.queue().contains(&"e1".into()).await.unwrap());
        assert!(!h.store.get(&"e1".into()).await.unwrap().unwrap().synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn confirmed_record_cannot_be_resubmitted() {
        let h = harness(true).await;
        h.start_remote();
        let outcome = h.engine.submit(record("e1")).await.unwrap().settled().await;
        assert_eq!(outcome, Some(PushOutcome::Confirmed));

        let rewrite = Record {
            mood: Some(2),
            ..record("e1")
        };
        let result = h.engine.submit(rewrite).await;
        assert!(matches!(result, Err(Error::RecordAlreadySynced(_))));

        let stored = h.store.get(&"e1".into()).await.unwrap().unwrap();
        assert_eq!(stored.mood, Some(6));
        assert!(stored.synced);
        assert!(h.engine.queue().is_empty().await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn local_only_submit_is_never_queued() {
        let h = harness(true).await;
        h.engine.initialize(SyncMode::LocalOnly);

        let submission = h.engine.submit(record("e1")).await.unwrap();
        assert!(submission.push.is_none());
        assert!(h.engine.queue().is_empty().await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_record_is_not_stored() {
        let h = harness(true).await;
        h.start_remote();

        let bad = Record {
            mood: Some(42),
            ..record("e1")
        };
        assert!(h.engine.submit(bad).await.is_err());
        assert_eq!(h.store.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn push_waits_for_initialization() {
        let h = harness(true).await;

        let submission = h.engine.submit(record("e1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.remote.calls().is_empty());

        h.start_remote();
        assert_eq!(submission.settled().await, Some(PushOutcome::Confirmed));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refresh_merges_remote_listing() {
        let h = harness(true).await;
        h.start_remote();

        let mut shared = record("shared");
        h.store.put(&shared).await.unwrap();
        h.store.put(&record("local-only")).await.unwrap();

        shared.mood = Some(2);
        h.remote.insert_raw(serde_json::to_value(&shared).unwrap());
        h.remote.insert_raw(serde_json::to_value(record("remote-only")).unwrap());
        h.remote.insert_raw(serde_json::json!({"id": "broken", "entry_type": "noon"}));

        let pass = h.engine.refresh().await.unwrap();
        assert_eq!(
            pass,
            SyncPass::Ran(MergeReport {
                imported: 1,
                reconciled: 1,
                unchanged: 0,
                untouched_local: 1,
                malformed: 1,
            })
        );

        let merged = h.store.get(&"shared".into()).await.unwrap().unwrap();
        assert_eq!(merged.mood, Some(2));
        assert!(merged.synced);
        assert!(h.store.get(&"remote-only".into()).await.unwrap().unwrap().synced);
        assert!(!h.store.get(&"local-only".into()).await.unwrap().unwrap().synced);
        assert!(h.store.get(&"broken".into()).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_trigger_is_skipped() {
        let h = harness(true).await;
        h.start_remote();

        let _guard = h.engine.try_begin_pass().unwrap();
        assert_eq!(h.engine.refresh().await.unwrap(), SyncPass::Skipped);
        assert_eq!(h.engine.drain_queue().await.unwrap(), SyncPass::Skipped);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn guard_is_released_after_a_pass() {
        let h = harness(true).await;
        h.start_remote();

        assert!(matches!(h.engine.resync().await.unwrap(), SyncPass::Ran(_)));
        assert!(matches!(h.engine.resync().await.unwrap(), SyncPass::Ran(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_passes_are_unavailable() {
        let h = harness(false).await;
        h.start_remote();
        assert_eq!(h.engine.refresh().await.unwrap(), SyncPass::Unavailable);

        h.connectivity.report(true);
        assert!(matches!(h.engine.refresh().await.unwrap(), SyncPass::Ran(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resync_drains_before_merging() {
        let h = harness(false).await;
        h.start_remote();
        h.engine.submit(record("e1")).await.unwrap();

        h.connectivity.report(true);
        let pass = h.engine.resync().await.unwrap();
        let report = pass.ran().unwrap();
        assert_eq!(report.drain.replayed, vec![RecordId::from("e1")]);
        assert_eq!(report.merge.unwrap().unchanged, 1);
        assert_eq!(
            h.remote.calls(),
            vec![RemoteCall::Create("e1".into()), RemoteCall::List]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn change_listener_applies_pushed_records() {
        let h = harness(true).await;
        h.start_remote();
        let listener = h.engine.spawn_change_listener().unwrap();

        h.remote.push_remote_change(serde_json::to_value(record("pushed")).unwrap());

        let mut applied = false;
        for _ in 0..50 {
            if h.store.get(&"pushed".into()).await.unwrap().is_some() {
                applied = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        listener.abort();
        assert!(applied);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn import_runs_once_per_account() {
        let h = harness(true).await;
        h.engine.initialize(SyncMode::LocalOnly);
        h.engine.submit(record("e1")).await.unwrap();
        h.engine.submit(record("e2")).await.unwrap();

        h.engine.attach_remote(h.remote.clone());
        let outcome = h
            .engine
            .import_local_records("u1", ImportDecision::Accept)
            .await
            .unwrap();
        assert_eq!(outcome.bound, 2);
        assert_eq!(outcome.pushed, 2);
        assert_eq!(h.remote.len(), 2);
        assert_eq!(
            h.store.get(&"e1".into()).await.unwrap().unwrap().owner_id.as_deref(),
            Some("u1")
        );

        let again = h
            .engine
            .import_local_records("u1", ImportDecision::Accept)
            .await;
        assert!(matches!(again, Err(Error::ImportAlreadyCompleted(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn numeric_ids_and_iso_timestamps_from_the_backend_merge() {
        let h = harness(true).await;
        h.start_remote();
        h.remote.insert_raw(serde_json::json!({
            "id": 5,
            "entry_type": "morning",
            "date": "2024-01-01",
            "timestamp": "2024-01-01T10:00:00",
            "mood_overall": 7,
            "pain_level": 0,
            "ai_summary": null,
            "created_at": "2024-01-01T10:00:00",
            "updated_at": "2024-01-01T10:00:00"
        }));

        let report = h.engine.refresh().await.unwrap();
        assert_eq!(report.ran().unwrap().imported, 1);
        assert_eq!(report.ran().unwrap().malformed, 0);

        let merged = h.store.get(&"5".into()).await.unwrap().unwrap();
        assert_eq!(merged.mood, Some(7));
        assert_eq!(merged.timestamp, 1_704_103_200_000);
        assert!(merged.synced);

        let again = h.engine.refresh().await.unwrap();
        assert_eq!(again.ran().unwrap().unchanged, 1);
        assert_eq!(again.ran().unwrap().untouched_local, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn restore_owner_reads_the_imported_account() {
        let h = harness(false).await;
        h.engine.initialize(SyncMode::LocalOnly);
        h.engine
            .import_local_records("u1", ImportDecision::Accept)
            .await
            .unwrap();

        h.engine.set_owner_id(None);
        assert_eq!(h.engine.restore_owner().await.as_deref(), Some("u1"));
        assert_eq!(h.engine.owner_id().as_deref(), Some("u1"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn declined_import_is_final_and_binds_nothing() {
        let h = harness(true).await;
        h.engine.initialize(SyncMode::LocalOnly);
        h.engine.submit(record("e1")).await.unwrap();

        let outcome = h
            .engine
            .import_local_records("u1", ImportDecision::Decline)
            .await
            .unwrap();
        assert!(outcome.declined);
        assert!(h.store.get(&"e1".into()).await.unwrap().unwrap().owner_id.is_none());
        assert!(h.engine.import_decided("u1").await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_import_queues_records() {
        let h = harness(false).await;
        h.start_remote();
        h.engine.submit(record("e1")).await.unwrap();

        let outcome = h
            .engine
            .import_local_records("u1", ImportDecision::Accept)
            .await
            .unwrap();
        assert_eq!(outcome.queued, 1);
        assert_eq!(h.engine.queue().len().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn status_reports_queue_and_mode() {
        let h = harness(false).await;
        h.start_remote();
        h.engine.submit(record("e1")).await.unwrap();

        let status = h.engine.status().await.unwrap();
        assert_eq!(status.mode, "memory");
        assert!(!status.online);
        assert_eq!(status.records, 1);
        assert_eq!(status.unsynced, 1);
        assert_eq!(status.pending, 1);
        assert_eq!(status.storage_tier, "libsql");
    }
}
