//! Application-facing coordinator.
//!
//! `JournalClient` only wires components together and routes events between
//! them; every behavior lives in the component that owns it.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::LocalStore;
use crate::cache::{Clock, SystemClock, TimeBoxedCache};
use crate::config::ClientConfig;
use crate::connectivity::{
    ConnectivityMonitor, HttpProbe, ReachabilityProbe, StaticProbe, Transition,
};
use crate::db::RecordFilter;
use crate::error::Result;
use crate::insights::{AiCollaborator, InsightService, OpenAiCollaborator};
use crate::kv::TieredStorage;
use crate::models::{EntrySummary, Record, RecordId};
use crate::queue::DrainReport;
use crate::remote::{HttpRemoteStore, RemoteStore};
use crate::sync::{
    EngineSettings, ImportDecision, ImportOutcome, MergeReport, ResyncReport, Submission,
    SyncEngine, SyncMode, SyncPass, SyncStatus,
};

pub const DATABASE_FILE: &str = "chroni.db";
pub const FALLBACK_STORAGE_FILE: &str = "storage-fallback.json";

/// Everything a [`JournalClient`] is built from.
pub struct ClientComponents {
    pub store: LocalStore,
    pub storage: Arc<TieredStorage>,
    pub probe: Arc<dyn ReachabilityProbe>,
    pub remote: Option<Arc<dyn RemoteStore>>,
    pub ai: Option<Arc<dyn AiCollaborator>>,
    pub clock: Arc<dyn Clock>,
    pub settings: EngineSettings,
}

impl ClientComponents {
    /// In-memory local-only components (primarily for tests).
    pub async fn in_memory() -> Result<Self> {
        let store = LocalStore::open_in_memory().await?;
        let storage = Arc::new(TieredStorage::standard(&store, None));
        Ok(Self {
            store,
            storage,
            probe: Arc::new(StaticProbe::new(false)),
            remote: None,
            ai: None,
            clock: Arc::new(SystemClock),
            settings: EngineSettings::default(),
        })
    }

    /// Production wiring from a config file and a data directory.
    pub async fn from_config(config: &ClientConfig, data_dir: &Path) -> Result<Self> {
        let store = LocalStore::open_path(data_dir.join(DATABASE_FILE)).await?;
        let storage = Arc::new(TieredStorage::standard(
            &store,
            Some(data_dir.join(FALLBACK_STORAGE_FILE)),
        ));

        let probe: Arc<dyn ReachabilityProbe> = match config.probe_base_url() {
            Some(url) => Arc::new(HttpProbe::new(url)?),
            None => Arc::new(StaticProbe::new(false)),
        };
        let remote = match config.api_base_url.as_deref() {
            Some(url) => {
                let mut remote = HttpRemoteStore::new(url)?;
                if let Some(token) = config.api_token.as_deref() {
                    remote = remote.with_bearer_token(token);
                }
                Some(Arc::new(remote) as Arc<dyn RemoteStore>)
            }
            None => None,
        };
        let ai = match config.ai_api_key.as_deref() {
            Some(key) => match OpenAiCollaborator::new(
                config.ai_base_url.as_deref(),
                key,
                config.ai_model.as_deref(),
            ) {
                Ok(ai) => Some(Arc::new(ai) as Arc<dyn AiCollaborator>),
                Err(error) => {
                    tracing::warn!("AI features disabled: {error}");
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            store,
            storage,
            probe,
            remote,
            ai,
            clock: Arc::new(SystemClock),
            settings: config.engine_settings(),
        })
    }
}

/// Single entry point for applications.
pub struct JournalClient {
    store: LocalStore,
    storage: Arc<TieredStorage>,
    connectivity: Arc<ConnectivityMonitor>,
    engine: SyncEngine,
    cache: TimeBoxedCache,
    insights: InsightService,
    remote: Option<Arc<dyn RemoteStore>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl JournalClient {
    pub fn new(components: ClientComponents) -> Self {
        let ClientComponents {
            store,
            storage,
            probe,
            remote,
            ai,
            clock,
            settings,
        } = components;

        let connectivity = Arc::new(ConnectivityMonitor::new(probe));
        let engine = SyncEngine::new(
            store.clone(),
            Arc::clone(&storage),
            Arc::clone(&connectivity),
            settings,
        );
        let cache = TimeBoxedCache::new(Arc::clone(&storage), Arc::clone(&clock));
        let insights = InsightService::new(
            store.clone(),
            cache.clone(),
            Arc::clone(&storage),
            clock,
            ai,
        );

        Self {
            store,
            storage,
            connectivity,
            engine,
            cache,
            insights,
            remote,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Restore the signed-in account, probe connectivity, pick the sync mode
    /// and release background work. When a remote is reachable, pending
    /// writes are replayed and the remote listing merged before returning.
    pub async fn start(&self) -> Result<SyncPass<ResyncReport>> {
        if let Some(owner_id) = self.engine.restore_owner().await {
            tracing::debug!("Signed in as {owner_id}");
        }
        self.connectivity.initialize().await;

        let mode = self
            .remote
            .as_ref()
            .map_or(SyncMode::LocalOnly, |remote| SyncMode::Remote(Arc::clone(remote)));
        self.engine.initialize(mode);

        if let Some(listener) = self.engine.spawn_change_listener() {
            self.track(listener);
        }

        self.engine.resync().await
    }

    /// Resync every `interval` while online, until the client is dropped.
    pub fn start_periodic_resync(&self, interval: Duration) {
        let task = self.engine.spawn_periodic_resync(interval);
        self.track(task);
    }

    fn track(&self, task: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }

    /// Commit a record locally and reconcile it in the background.
    /// Also expires same-day cached insights older than the TTL.
    pub async fn submit(&self, record: Record) -> Result<Submission> {
        let submission = self.engine.submit(record).await?;
        self.cache.invalidate_stale().await;
        Ok(submission)
    }

    /// Local records, newest first. Never touches the network.
    pub async fn entries(&self, filter: &RecordFilter) -> Result<Vec<Record>> {
        self.engine.local_records(filter).await
    }

    pub async fn entry(&self, id: &RecordId) -> Result<Option<Record>> {
        self.store.get(id).await
    }

    /// Delete a record from this device only.
    pub async fn delete_entry(&self, id: &RecordId) -> Result<()> {
        self.store.delete(id).await
    }

    pub async fn summary(&self) -> Result<EntrySummary> {
        Ok(EntrySummary::from_records(&self.store.list_all().await?))
    }

    /// Apply a platform online/offline signal. Pending writes are replayed
    /// once for every offline to online transition.
    pub async fn handle_connectivity(
        &self,
        online: bool,
    ) -> Result<(Option<Transition>, Option<SyncPass<DrainReport>>)> {
        let transition = self.connectivity.report(online);
        let drained = match transition {
            Some(Transition::CameOnline) => Some(self.engine.drain_queue().await?),
            Some(Transition::WentOffline) | None => None,
        };
        Ok((transition, drained))
    }

    /// Manual sync: re-probe, then drain and merge.
    pub async fn sync_now(&self) -> Result<SyncPass<ResyncReport>> {
        self.connectivity.recheck().await;
        self.engine.resync().await
    }

    /// Merge the remote listing into the local store.
    pub async fn refresh(&self) -> Result<SyncPass<MergeReport>> {
        self.engine.refresh().await
    }

    pub async fn import_local_records(
        &self,
        owner_id: &str,
        decision: ImportDecision,
    ) -> Result<ImportOutcome> {
        self.engine.import_local_records(owner_id, decision).await
    }

    pub async fn status(&self) -> Result<SyncStatus> {
        self.engine.status().await
    }

    pub const fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn storage(&self) -> &TieredStorage {
        &self.storage
    }

    pub const fn cache(&self) -> &TimeBoxedCache {
        &self.cache
    }

    pub const fn insights(&self) -> &InsightService {
        &self.insights
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }
}

impl Drop for JournalClient {
    fn drop(&mut self) {
        for task in self
            .tasks
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
    }
}
