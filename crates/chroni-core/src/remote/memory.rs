//! In-process remote used for local development and tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{ChangeStream, RemoteError, RemoteResult, RemoteStore};
use crate::models::{Record, RecordId};

/// One invocation seen by [`MemoryRemoteStore`], successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Create(RecordId),
    List,
}

/// `RemoteStore` that keeps payloads in memory.
///
/// Failures can be injected per call or by flipping the store offline, and
/// every call is recorded so replay order can be asserted.
#[derive(Default)]
pub struct MemoryRemoteStore {
    records: Mutex<BTreeMap<String, Value>>,
    calls: Mutex<Vec<RemoteCall>>,
    accepted: Mutex<Vec<RecordId>>,
    failures: Mutex<VecDeque<RemoteError>>,
    latency: Mutex<Option<Duration>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Value>>>,
    offline: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with `RemoteError::Unreachable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fail the next call with `error`. Queued failures are consumed in order.
    pub fn fail_next(&self, error: RemoteError) {
        lock(&self.failures).push_back(error);
    }

    /// Delay every response, e.g. to exercise timeouts.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.latency) = latency;
    }

    /// Store a raw payload as if another client had written it.
    /// Payloads without a string or integer `id` are kept under a synthetic key.
    pub fn insert_raw(&self, payload: Value) {
        let mut records = lock(&self.records);
        let key = match payload.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) if id.is_i64() => id.to_string(),
            _ => format!("~raw-{}", records.len()),
        };
        records.insert(key, payload);
    }

    /// Store a payload and announce it on every open change stream.
    pub fn push_remote_change(&self, payload: Value) {
        self.insert_raw(payload.clone());
        lock(&self.subscribers).retain(|sender| sender.send(payload.clone()).is_ok());
    }

    pub fn get(&self, id: &str) -> Option<Value> {
        lock(&self.records).get(id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.records).is_empty()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.calls).clone()
    }

    /// Ids of successful creates, in the order they were accepted.
    pub fn accepted(&self) -> Vec<RecordId> {
        lock(&self.accepted).clone()
    }

    async fn before_call(&self, call: RemoteCall) -> RemoteResult<()> {
        lock(&self.calls).push(call);

        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable("remote is offline".to_string()));
        }
        match lock(&self.failures).pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create_record(&self, record: &Record) -> RemoteResult<Value> {
        self.before_call(RemoteCall::Create(record.id.clone()))
            .await?;

        let payload = serde_json::to_value(record)
            .map_err(|error| RemoteError::Malformed(error.to_string()))?;
        lock(&self.records).insert(record.id.to_string(), payload.clone());
        lock(&self.accepted).push(record.id.clone());
        Ok(payload)
    }

    async fn list_records(&self, owner_id: Option<&str>) -> RemoteResult<Vec<Value>> {
        self.before_call(RemoteCall::List).await?;

        let records = lock(&self.records);
        Ok(records
            .values()
            .filter(|payload| match owner_id {
                Some(owner_id) => {
                    payload.get("owner_id").and_then(Value::as_str) == Some(owner_id)
                }
                None => true,
            })
            .cloned()
            .collect())
    }

    fn subscribe(&self) -> Option<ChangeStream> {
        let (sender, receiver) = mpsc::unbounded_channel();
        lock(&self.subscribers).push(sender);
        Some(receiver)
    }
}
