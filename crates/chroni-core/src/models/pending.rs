//! Pending operation model

use serde::{Deserialize, Serialize};

use super::Record;

/// A write that has not been confirmed by the remote collaborator yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Monotonic queue position; replay order is ascending
    pub operation_id: i64,
    /// Record snapshot taken when the write was enqueued
    pub payload: Record,
    /// Enqueue instant (Unix ms)
    pub enqueued_at: i64,
    /// Replays that reached the remote and were rejected
    pub attempts: u32,
    /// Last remote failure message, if any
    pub last_error: Option<String>,
    /// Parked entries are skipped by replay until released
    pub parked: bool,
}
