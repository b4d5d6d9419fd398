//! Online/offline tracking.
//!
//! The monitor combines a one-off reachability probe with platform signals
//! reported by the host. Only real state changes produce a [`Transition`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::util::{normalize_base_url, unix_millis_now};

const PROBE_TIMEOUT_SECS: u64 = 3;

/// Checks whether the remote side can be reached right now
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Probe that issues `GET {base}/health` and expects a 2xx answer
#[derive(Clone)]
pub struct HttpProbe {
    health_url: String,
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = normalize_base_url(base_url).ok_or_else(|| {
            Error::Config(format!(
                "probe URL '{base_url}' must include http:// or https://"
            ))
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .build()
            .map_err(|error| Error::Config(format!("failed to build probe client: {error}")))?;

        Ok(Self {
            health_url: format!("{base_url}/health"),
            client,
        })
    }

    pub fn health_url(&self) -> &str {
        &self.health_url
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn is_reachable(&self) -> bool {
        match self.client.get(&self.health_url).send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                tracing::debug!("Health probe to {} failed: {error}", self.health_url);
                false
            }
        }
    }
}

/// Probe with a fixed answer that tests and local-only setups can flip
#[derive(Debug, Default)]
pub struct StaticProbe {
    reachable: AtomicBool,
}

impl StaticProbe {
    pub const fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReachabilityProbe for StaticProbe {
    async fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

/// Direction of a connectivity change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CameOnline,
    WentOffline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectivityState {
    pub is_online: bool,
    /// Unix ms of the last real change; `None` before the first one
    pub last_transition_at: Option<i64>,
}

/// Tracks the current connectivity state and publishes changes.
pub struct ConnectivityMonitor {
    probe: Arc<dyn ReachabilityProbe>,
    state: watch::Sender<ConnectivityState>,
}

impl ConnectivityMonitor {
    /// Starts offline until [`initialize`](Self::initialize) or a report says otherwise.
    pub fn new(probe: Arc<dyn ReachabilityProbe>) -> Self {
        let (state, _) = watch::channel(ConnectivityState::default());
        Self { probe, state }
    }

    /// Run the probe once and apply its answer.
    pub async fn initialize(&self) -> Option<Transition> {
        let online = self.probe.is_reachable().await;
        tracing::debug!("Initial reachability probe: online={online}");
        self.report(online)
    }

    /// Re-run the probe, e.g. before a manual sync.
    pub async fn recheck(&self) -> Option<Transition> {
        self.initialize().await
    }

    /// Apply a platform online/offline signal. Duplicate signals are ignored.
    pub fn report(&self, online: bool) -> Option<Transition> {
        let changed = self.state.send_if_modified(|state| {
            if state.is_online == online {
                return false;
            }
            state.is_online = online;
            state.last_transition_at = Some(unix_millis_now());
            true
        });

        if !changed {
            return None;
        }

        let transition = if online {
            Transition::CameOnline
        } else {
            Transition::WentOffline
        };
        tracing::info!("Connectivity changed: {transition:?}");
        Some(transition)
    }

    pub fn is_online(&self) -> bool {
        self.state.borrow().is_online
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }
}
