//! End-to-end scenarios through [`JournalClient`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use pretty_assertions::assert_eq;

use crate::cache::{Clock, ManualClock};
use crate::connectivity::{ReachabilityProbe, StaticProbe, Transition};
use crate::db::RecordFilter;
use crate::kv::{KvTier, TieredStorage};
use crate::models::EntryType;
use crate::remote::{MemoryRemoteStore, RemoteCall, RemoteStore};
use crate::sync::{PushOutcome, SyncPass};
use crate::{ClientComponents, Error, JournalClient, Record, RecordId, Result};

/// 2024-01-01T06:00:00Z
const T0: i64 = 1_704_088_800_000;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn checkin(id: &str) -> Record {
    let mut record = Record::new(EntryType::Evening, day()).with_id(id);
    record.mood = Some(7);
    record.energy = Some(5);
    record.pain = Some(2);
    record
}

struct World {
    client: JournalClient,
    remote: Arc<MemoryRemoteStore>,
    probe: Arc<StaticProbe>,
    clock: Arc<ManualClock>,
}

async fn world(online: bool) -> World {
    world_with_storage(online, None).await
}

async fn world_with_storage(online: bool, storage: Option<Arc<TieredStorage>>) -> World {
    let remote = Arc::new(MemoryRemoteStore::new());
    let probe = Arc::new(StaticProbe::new(online));
    let clock = Arc::new(ManualClock::new(T0));

    let mut components = ClientComponents::in_memory().await.unwrap();
    components.remote = Some(remote.clone() as Arc<dyn RemoteStore>);
    components.probe = probe.clone() as Arc<dyn ReachabilityProbe>;
    components.clock = clock.clone() as Arc<dyn Clock>;
    if let Some(storage) = storage {
        components.storage = storage;
    }

    let client = JournalClient::new(components);
    client.start().await.unwrap();
    World {
        client,
        remote,
        probe,
        clock,
    }
}

struct BrokenTier(&'static str);

#[async_trait]
impl KvTier for BrokenTier {
    fn name(&self) -> &'static str {
        self.0
    }

    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(Error::StorageUnavailable(format!("{} is disabled", self.0)))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(Error::StorageUnavailable(format!("{} is disabled", self.0)))
    }

    async fn remove(&self, _key: &str) -> Result<()> {
        Err(Error::StorageUnavailable(format!("{} is disabled", self.0)))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_checkin_is_kept_locally_and_replayed_on_reconnect() {
    let world = world(false).await;

    let submission = world.client.submit(checkin("e1")).await.unwrap();
    assert!(submission.push.is_none());

    let entries = world.client.entries(&RecordFilter::default()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].synced);
    assert_eq!(world.client.engine().queue().len().await.unwrap(), 1);
    assert!(world.remote.is_empty());

    world.probe.set_reachable(true);
    let (transition, drained) = world.client.handle_connectivity(true).await.unwrap();
    assert_eq!(transition, Some(Transition::CameOnline));
    let Some(SyncPass::Ran(report)) = drained else {
        panic!("expected a drain pass, got {drained:?}");
    };
    assert_eq!(report.replayed, vec![RecordId::from("e1")]);

    let stored = world.client.entry(&"e1".into()).await.unwrap().unwrap();
    assert!(stored.synced);
    assert!(world.client.engine().queue().is_empty().await.unwrap());

    let remote = world.remote.get("e1").unwrap();
    assert_eq!(remote["mood_overall"], 7);
    assert_eq!(remote["energy_level"], 5);
    assert_eq!(remote["pain_level"], 2);
    assert_eq!(remote["date"], "2024-01-01");
}

#[tokio::test(flavor = "multi_thread")]
async fn draining_twice_never_duplicates_remote_records() {
    let world = world(false).await;
    world.client.submit(checkin("e1")).await.unwrap();
    world.client.submit(checkin("e2")).await.unwrap();

    world.client.handle_connectivity(true).await.unwrap();
    let second = world.client.engine().drain_queue().await.unwrap();

    assert_eq!(second.ran().map(|report| report.replayed.len()), Some(0));
    assert!(world.client.engine().queue().is_empty().await.unwrap());
    assert_eq!(world.remote.len(), 2);
    assert_eq!(world.remote.accepted().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn reconnect_replays_queue_in_enqueue_order() {
    let world = world(false).await;
    for id in ["e1", "e2", "e3"] {
        world.client.submit(checkin(id)).await.unwrap();
    }

    world.client.handle_connectivity(true).await.unwrap();

    let creates: Vec<RemoteCall> = world
        .remote
        .calls()
        .into_iter()
        .filter(|call| matches!(call, RemoteCall::Create(_)))
        .collect();
    assert_eq!(
        creates,
        vec![
            RemoteCall::Create("e1".into()),
            RemoteCall::Create("e2".into()),
            RemoteCall::Create("e3".into()),
        ]
    );
    assert!(world.client.engine().queue().is_empty().await.unwrap());

    // Staying online must not trigger another replay.
    let (transition, drained) = world.client.handle_connectivity(true).await.unwrap();
    assert_eq!(transition, None);
    assert!(drained.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn online_write_round_trips_through_remote() {
    let world = world(true).await;

    let submission = world.client.submit(checkin("e1")).await.unwrap();
    assert_eq!(submission.settled().await, Some(PushOutcome::Confirmed));

    let refreshed = world.client.refresh().await.unwrap();
    let report = refreshed.ran().cloned().unwrap();
    assert_eq!(report.imported, 0);
    assert_eq!(report.malformed, 0);

    let stored = world.client.entry(&"e1".into()).await.unwrap().unwrap();
    assert!(stored.synced);
    assert_eq!(stored.mood, Some(7));
    assert_eq!(stored.energy, Some(5));
    assert_eq!(stored.pain, Some(2));
    assert_eq!(stored.date, day());
}

#[tokio::test(flavor = "multi_thread")]
async fn rewrite_while_a_push_is_in_flight_is_not_lost() {
    let world = world(true).await;
    world
        .remote
        .set_latency(Some(std::time::Duration::from_millis(300)));

    let mut first = checkin("e1");
    first.mood = Some(1);
    let in_flight = world.client.submit(first).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    world.client.handle_connectivity(false).await.unwrap();
    let mut rewrite = checkin("e1");
    rewrite.mood = Some(9);
    world.client.submit(rewrite).await.unwrap();

    assert_eq!(in_flight.settled().await, Some(PushOutcome::Superseded));
    let stored = world.client.entry(&"e1".into()).await.unwrap().unwrap();
    assert_eq!(stored.mood, Some(9));
    assert!(!stored.synced);

    world.remote.set_latency(None);
    let (_, drained) = world.client.handle_connectivity(true).await.unwrap();
    let Some(SyncPass::Ran(report)) = drained else {
        panic!("expected a drain pass, got {drained:?}");
    };
    assert_eq!(report.replayed, vec![RecordId::from("e1")]);
    assert_eq!(world.remote.get("e1").unwrap()["mood_overall"], 9);
    assert!(world.client.entry(&"e1".into()).await.unwrap().unwrap().synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_storage_tiers_fall_back_without_errors() {
    let storage = Arc::new(TieredStorage::new(vec![
        Arc::new(BrokenTier("primary")) as Arc<dyn KvTier>,
        Arc::new(BrokenTier("secondary")) as Arc<dyn KvTier>,
    ]));
    let world = world_with_storage(false, Some(Arc::clone(&storage))).await;

    world.client.storage().set_item("flag", "on").await;
    assert_eq!(
        world.client.storage().get_item("flag").await.as_deref(),
        Some("on")
    );
    assert_eq!(world.client.storage().active_tier().await, "memory");

    world.client.cache().set("predictions", &"rest more").await;
    assert_eq!(
        world.client.cache().get::<String>("predictions").await.as_deref(),
        Some("rest more")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn cached_insight_expires_when_a_late_checkin_arrives() {
    let world = world(false).await;
    let key = "cache:predictions:2024-01-01";

    world.client.cache().set("predictions", &"rest more").await;

    world.clock.advance(Duration::hours(7));
    assert_eq!(
        world.client.cache().get::<String>("predictions").await.as_deref(),
        Some("rest more")
    );

    world.clock.advance(Duration::hours(2));
    world.client.submit(checkin("e1")).await.unwrap();
    assert_eq!(world.client.storage().get_item(key).await, None);
    assert_eq!(world.client.cache().get::<String>("predictions").await, None::<String>);
}

#[tokio::test(flavor = "multi_thread")]
async fn fresh_cache_entries_survive_new_checkins() {
    let world = world(false).await;
    world.client.cache().set("predictions", &"rest more").await;

    world.clock.advance(Duration::hours(3));
    world.client.submit(checkin("e1")).await.unwrap();

    assert_eq!(
        world.client.cache().get::<String>("predictions").await.as_deref(),
        Some("rest more")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_rejection_leaves_record_queued_and_unsynced() {
    let world = world(true).await;
    world.remote.fail_next(crate::remote::RemoteError::Rejected {
        status: 422,
        message: "bad entry".into(),
    });

    let submission = world.client.submit(checkin("e1")).await.unwrap();
    assert!(matches!(
        submission.settled().await,
        Some(PushOutcome::Queued(_))
    ));

    let stored = world.client.entry(&"e1".into()).await.unwrap().unwrap();
    assert!(!stored.synced);
    assert!(world.client.engine().queue().contains(&"e1".into()).await.unwrap());

    let resync = world.client.sync_now().await.unwrap();
    assert!(resync.ran().is_some_and(|report| report.drain.completed()));
    assert!(world.client.entry(&"e1".into()).await.unwrap().unwrap().synced);
}
