//! Remote collaborators that hold the authoritative copy of records.
//!
//! Exactly one [`RemoteStore`] is active at a time. Every call made by the
//! engine goes through [`with_timeout`], so a hung collaborator surfaces as
//! [`RemoteError::Timeout`] instead of stalling the caller.

mod http;
mod memory;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::Record;

pub use http::HttpRemoteStore;
pub use memory::{MemoryRemoteStore, RemoteCall};

/// Result type for remote calls
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Receiver half of a remote change stream; each item is a raw record payload.
pub type ChangeStream = mpsc::UnboundedReceiver<Value>;

/// Failures reported by a remote collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Network failure or a server-side outage
    #[error("remote unreachable: {0}")]
    Unreachable(String),

    /// The call did not finish within the configured timeout
    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),

    /// The remote answered and refused the payload
    #[error("remote rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The remote answered with something that is not a usable payload
    #[error("malformed remote response: {0}")]
    Malformed(String),
}

impl RemoteError {
    /// Whether retrying the same payload later can succeed.
    ///
    /// Rejections and malformed answers come from a reachable remote and
    /// will repeat for the same payload.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout(_))
    }
}

/// Authoritative record store on the other side of the network.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Create or replace a record by id. Returns the stored payload.
    async fn create_record(&self, record: &Record) -> RemoteResult<Value>;

    /// All records visible to `owner_id` (or every record when `None`).
    /// Payloads are returned raw so one bad entry cannot fail the listing.
    async fn list_records(&self, owner_id: Option<&str>) -> RemoteResult<Vec<Value>>;

    /// Change stream of records written by other clients, when supported.
    fn subscribe(&self) -> Option<ChangeStream> {
        None
    }
}

/// Run a remote call with a deadline.
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> RemoteResult<T>
where
    F: Future<Output = RemoteResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout(timeout)),
    }
}
