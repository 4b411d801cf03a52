//! Federation membership and push propagation.
//!
//! Every leaf admitted locally is pushed to each federation member by its
//! own task. Tasks never wait on each other; a failing peer only burns its
//! own retry budget. Delivery is best effort: any later pull sync restores
//! convergence regardless of what happened to pushes.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use universe_core::{CommitmentRoot, LeafWithProof, UniverseId};

use crate::config::FederationConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteConnector;

/// Push bookkeeping for one peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerStats {
    pub push_successes: u64,
    pub push_failures: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationServer {
    pub host: String,
    pub stats: PeerStats,
}

/// How a push to one peer ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered { attempts: u32, peer_root: CommitmentRoot },
    Failed { attempts: u32, error: SyncError },
    /// The peer left the federation before delivery
    Dropped,
}

pub struct FederationManager {
    connector: Arc<dyn RemoteConnector>,
    config: FederationConfig,
    peers: RwLock<BTreeMap<String, PeerStats>>,
}

impl FederationManager {
    pub fn new(connector: Arc<dyn RemoteConnector>, config: FederationConfig) -> Self {
        Self {
            connector,
            config,
            peers: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    /// Returns `false` when the host was already a member.
    pub fn add_server(&self, host: &str) -> bool {
        let host = host.trim();
        let mut peers = self.peers.write();
        if peers.contains_key(host) {
            debug!(host = %host, "federation server already present");
            return false;
        }
        peers.insert(host.to_string(), PeerStats::default());
        info!(host = %host, "added federation server");
        true
    }

    /// Returns `false` when the host was not a member.
    pub fn delete_server(&self, host: &str) -> bool {
        let removed = self.peers.write().remove(host.trim()).is_some();
        if removed {
            info!(host = %host, "removed federation server");
        }
        removed
    }

    pub fn list_servers(&self) -> Vec<FederationServer> {
        self.peers
            .read()
            .iter()
            .map(|(host, stats)| FederationServer {
                host: host.clone(),
                stats: stats.clone(),
            })
            .collect()
    }

    pub fn hosts(&self) -> Vec<String> {
        self.peers.read().keys().cloned().collect()
    }

    pub fn is_member(&self, host: &str) -> bool {
        self.peers.read().contains_key(host)
    }

    /// Schedule a push of `leaves` to every current member.
    ///
    /// Returns immediately. Without a tokio runtime nothing is scheduled.
    pub fn push_update(
        self: &Arc<Self>,
        universe: UniverseId,
        source_root: CommitmentRoot,
        leaves: Vec<LeafWithProof>,
    ) -> Vec<JoinHandle<PushOutcome>> {
        let hosts = self.hosts();
        if hosts.is_empty() || leaves.is_empty() {
            return Vec::new();
        }
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(universe = %universe, "no async runtime, skipping federation push");
                return Vec::new();
            }
        };

        debug!(universe = %universe, peers = hosts.len(), leaves = leaves.len(), "scheduling federation push");
        let leaves = Arc::new(leaves);
        hosts
            .into_iter()
            .map(|host| {
                let manager = self.clone();
                let leaves = leaves.clone();
                handle.spawn(async move {
                    manager
                        .push_to_peer(&host, universe, source_root, &leaves)
                        .await
                })
            })
            .collect()
    }

    async fn push_to_peer(
        &self,
        host: &str,
        universe: UniverseId,
        source_root: CommitmentRoot,
        leaves: &[LeafWithProof],
    ) -> PushOutcome {
        let policy = &self.config.retry;
        let mut attempt = 1;
        loop {
            if !self.is_member(host) {
                debug!(host = %host, universe = %universe, "peer left federation, dropping push");
                return PushOutcome::Dropped;
            }

            let result = timeout(
                policy.push_timeout,
                self.push_once(host, &universe, source_root, leaves),
            )
            .await
            .unwrap_or(Err(SyncError::Timeout(policy.push_timeout)));

            match result {
                Ok(peer_root) => {
                    self.record_success(host);
                    debug!(host = %host, universe = %universe, attempt, "pushed leaves");
                    return PushOutcome::Delivered {
                        attempts: attempt,
                        peer_root,
                    };
                }
                Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                    let delay = policy.backoff_for(attempt);
                    warn!(host = %host, universe = %universe, attempt, ?delay, "push failed, retrying: {}", e);
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.record_failure(host, &e);
                    if e.is_retryable() {
                        error!(host = %host, universe = %universe, attempts = attempt, "push retries exhausted: {}", e);
                    } else {
                        warn!(host = %host, universe = %universe, class = %e.class(), "peer rejected push: {}", e);
                    }
                    return PushOutcome::Failed {
                        attempts: attempt,
                        error: e,
                    };
                }
            }
        }
    }

    async fn push_once(
        &self,
        host: &str,
        universe: &UniverseId,
        source_root: CommitmentRoot,
        leaves: &[LeafWithProof],
    ) -> SyncResult<CommitmentRoot> {
        let remote = self.connector.connect(host).await?;
        remote.push_leaves(universe, source_root, leaves).await
    }

    fn record_success(&self, host: &str) {
        if let Some(stats) = self.peers.write().get_mut(host) {
            stats.push_successes += 1;
            stats.consecutive_failures = 0;
        }
    }

    fn record_failure(&self, host: &str, error: &SyncError) {
        if let Some(stats) = self.peers.write().get_mut(host) {
            stats.push_failures += 1;
            stats.consecutive_failures += 1;
            stats.last_error = Some(error.to_string());
        }
    }
}
