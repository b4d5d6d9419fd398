//! Synchronization between the local store and the active remote.

mod engine;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::models::Record;
use crate::queue::{DrainReport, DEFAULT_MAX_REJECTIONS};
use crate::remote::{RemoteError, RemoteStore};

pub use engine::SyncEngine;

/// Default deadline for a single remote call
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Where confirmed copies of records live
#[derive(Clone)]
pub enum SyncMode {
    /// No account: records stay on this device
    LocalOnly,
    Remote(Arc<dyn RemoteStore>),
}

impl SyncMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LocalOnly => "local-only",
            Self::Remote(remote) => remote.name(),
        }
    }
}

impl fmt::Debug for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub remote_timeout: Duration,
    pub max_rejections: u32,
    /// Account that new records are stamped with
    pub owner_id: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            max_rejections: DEFAULT_MAX_REJECTIONS,
            owner_id: None,
        }
    }
}

/// Result of a sync trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPass<T> {
    Ran(T),
    /// Another pass was already in flight
    Skipped,
    /// Local-only mode or offline
    Unavailable,
    /// The remote failed before any work was done
    Failed(RemoteError),
}

impl<T> SyncPass<T> {
    pub const fn ran(&self) -> Option<&T> {
        match self {
            Self::Ran(value) => Some(value),
            _ => None,
        }
    }
}

/// Counts from applying a remote listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Remote-only records added locally
    pub imported: usize,
    /// Shared records overwritten with the remote version
    pub reconciled: usize,
    /// Shared records that already matched
    pub unchanged: usize,
    /// Local records the remote does not have
    pub untouched_local: usize,
    /// Remote payloads that could not be parsed
    pub malformed: usize,
}

/// Drain followed by merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResyncReport {
    pub drain: DrainReport,
    /// `None` when the drain found the remote unreachable or the listing failed
    pub merge: Option<MergeReport>,
}

/// How a single remote payload was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Imported,
    Reconciled,
    Unchanged,
    Malformed,
}

/// Final state of a submitted record's background push
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The remote accepted the record and it is marked synced
    Confirmed,
    /// The push failed; the record waits in the pending queue
    Queued(RemoteError),
    /// Offline at push time; the record waits in the pending queue
    QueuedOffline,
    /// The record was rewritten before this push settled; the newer content
    /// is reconciled by its own push or by the queue
    Superseded,
    /// No remote is configured
    LocalOnly,
    /// The local store failed while recording the outcome
    StoreFailed(String),
}

/// A committed record and its optional background push
#[derive(Debug)]
pub struct Submission {
    pub record: Record,
    pub push: Option<tokio::task::JoinHandle<PushOutcome>>,
}

impl Submission {
    /// Wait for the background push, if one was started.
    pub async fn settled(self) -> Option<PushOutcome> {
        let handle = self.push?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(error) => {
                tracing::warn!("Background push for {} did not finish: {error}", self.record.id);
                None
            }
        }
    }
}

/// User's answer to the one-time import prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportDecision {
    Accept,
    Decline,
}

/// What the one-time import did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    /// Local records bound to the account
    pub bound: usize,
    /// Records confirmed by the remote during the import
    pub pushed: usize,
    /// Records left in the pending queue
    pub queued: usize,
    pub declined: bool,
}

/// Snapshot for status displays
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub mode: &'static str,
    pub online: bool,
    pub initialized: bool,
    pub records: usize,
    pub unsynced: usize,
    pub pending: usize,
    pub parked: usize,
    pub storage_tier: &'static str,
}
