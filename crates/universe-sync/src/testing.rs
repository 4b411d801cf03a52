//! In-process network of universe nodes.
//!
//! Connects [`UniverseNode`]s by host name without sockets. Hosts can be
//! taken offline, slowed down, made to fail their next calls, or made to
//! serve tampered leaves.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use universe_core::{CommitmentRoot, LeafKey, LeafWithProof, SyncMode, UniverseId};

use crate::config::NodeConfig;
use crate::error::{SyncError, SyncResult};
use crate::node::UniverseNode;
use crate::remote::{RemoteConnector, UniverseLeaves, UniverseRemote};

#[derive(Default)]
struct NetworkState {
    nodes: HashMap<String, Weak<UniverseNode>>,
    offline: HashSet<String>,
    fail_next: HashMap<String, u32>,
    tampered: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: HashMap<String, u32>,
}

#[derive(Default)]
pub struct LocalNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl LocalNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a node attached to this network under `host`.
    pub fn spawn_node(self: &Arc<Self>, host: &str, config: NodeConfig) -> Arc<UniverseNode> {
        let node = UniverseNode::new(self.clone(), config);
        self.register(host, &node);
        node
    }

    pub fn register(&self, host: &str, node: &Arc<UniverseNode>) {
        self.state
            .lock()
            .nodes
            .insert(host.to_string(), Arc::downgrade(node));
    }

    pub fn set_offline(&self, host: &str, offline: bool) {
        let mut state = self.state.lock();
        if offline {
            state.offline.insert(host.to_string());
        } else {
            state.offline.remove(host);
        }
    }

    /// Fail the next `count` calls to `host` with a network error.
    pub fn fail_next(&self, host: &str, count: u32) {
        self.state.lock().fail_next.insert(host.to_string(), count);
    }

    /// Serve leaves from `host` with their amounts altered.
    pub fn set_tampered(&self, host: &str, tampered: bool) {
        let mut state = self.state.lock();
        if tampered {
            state.tampered.insert(host.to_string());
        } else {
            state.tampered.remove(host);
        }
    }

    /// Delay every call to `host` by `delay` before it is served.
    pub fn set_delay(&self, host: &str, delay: Duration) {
        let mut state = self.state.lock();
        if delay.is_zero() {
            state.delays.remove(host);
        } else {
            state.delays.insert(host.to_string(), delay);
        }
    }

    /// Calls that reached `host`, including the ones made to fail.
    pub fn calls(&self, host: &str) -> u32 {
        self.state.lock().calls.get(host).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RemoteConnector for LocalNetwork {
    async fn connect(&self, host: &str) -> SyncResult<Arc<dyn UniverseRemote>> {
        if !self.state.lock().nodes.contains_key(host) {
            return Err(SyncError::network(host, "no such host"));
        }
        Ok(Arc::new(LocalRemote {
            host: host.to_string(),
            state: self.state.clone(),
        }))
    }
}

struct LocalRemote {
    host: String,
    state: Arc<Mutex<NetworkState>>,
}

impl LocalRemote {
    async fn reach(&self) -> SyncResult<Arc<UniverseNode>> {
        let host = self.host.as_str();
        let delay = {
            let mut state = self.state.lock();
            *state.calls.entry(host.to_string()).or_default() += 1;
            if state.offline.contains(host) {
                return Err(SyncError::network(host, "host unreachable"));
            }
            if let Some(remaining) = state.fail_next.get_mut(host) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(SyncError::network(host, "connection reset"));
                }
            }
            state.delays.get(host).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state
            .lock()
            .nodes
            .get(host)
            .and_then(Weak::upgrade)
            .ok_or_else(|| SyncError::network(host, "host shut down"))
    }

    fn is_tampered(&self) -> bool {
        self.state.lock().tampered.contains(&self.host)
    }
}

// Errors raised by the serving node reach the caller as remote errors.
fn served<T>(result: Result<T, impl Into<SyncError>>) -> SyncResult<T> {
    result.map_err(|e| {
        let e: SyncError = e.into();
        SyncError::remote(e.class(), e)
    })
}

#[async_trait]
impl UniverseRemote for LocalRemote {
    fn host(&self) -> &str {
        &self.host
    }

    async fn asset_roots(&self) -> SyncResult<BTreeMap<UniverseId, CommitmentRoot>> {
        Ok(self.reach().await?.asset_roots())
    }

    async fn query_root(&self, id: &UniverseId) -> SyncResult<CommitmentRoot> {
        served(self.reach().await?.query_root(id))
    }

    async fn leaf_keys(&self, id: &UniverseId, mode: SyncMode) -> SyncResult<Vec<LeafKey>> {
        served(self.reach().await?.leaf_keys(id, mode))
    }

    async fn fetch_leaves(&self, id: &UniverseId, mode: SyncMode) -> SyncResult<UniverseLeaves> {
        let mut fetched = served(self.reach().await?.leaves(id, mode))?;
        if self.is_tampered() {
            if let Some(first) = fetched.leaves.first_mut() {
                first.leaf.amount = first.leaf.amount.wrapping_add(1);
            }
        }
        Ok(fetched)
    }

    async fn push_leaves(
        &self,
        id: &UniverseId,
        source_root: CommitmentRoot,
        leaves: &[LeafWithProof],
    ) -> SyncResult<CommitmentRoot> {
        served(self.reach().await?.receive_push(id, source_root, leaves.to_vec()))
    }
}
