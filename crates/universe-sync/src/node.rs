//! A universe node: registry, syncer and federation wired together.
//!
//! The node is what transports serve. Local admission goes through the
//! [`LeafVerifier`] and fans out to the federation; inbound pushes and pull
//! syncs write to the registry directly and never trigger onward pushes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use universe_core::{
    AcceptAll, CommitmentRoot, InsertOutcome, IssuanceBatch, LeafEntry, LeafFilter, LeafKey,
    LeafVerifier, LeafWithProof, SyncMode, UniverseError, UniverseId, UniverseLeaf,
    UniverseRegistry, UniverseResult,
};

use crate::config::NodeConfig;
use crate::error::{SyncError, SyncResult};
use crate::federation::{FederationManager, FederationServer};
use crate::remote::{RemoteConnector, UniverseLeaves};
use crate::syncer::{apply_verified, SyncReport, SyncTargets, Syncer};

pub struct UniverseNode {
    registry: Arc<UniverseRegistry>,
    syncer: Syncer,
    federation: Arc<FederationManager>,
    connector: Arc<dyn RemoteConnector>,
    verifier: Arc<dyn LeafVerifier>,
}

impl UniverseNode {
    pub fn new(connector: Arc<dyn RemoteConnector>, config: NodeConfig) -> Arc<Self> {
        Self::with_verifier(connector, config, Arc::new(AcceptAll))
    }

    pub fn with_verifier(
        connector: Arc<dyn RemoteConnector>,
        config: NodeConfig,
        verifier: Arc<dyn LeafVerifier>,
    ) -> Arc<Self> {
        let registry = Arc::new(UniverseRegistry::new());
        Arc::new(Self {
            syncer: Syncer::new(registry.clone(), config.sync),
            federation: Arc::new(FederationManager::new(connector.clone(), config.federation)),
            registry,
            connector,
            verifier,
        })
    }

    pub fn registry(&self) -> &Arc<UniverseRegistry> {
        &self.registry
    }

    pub fn federation(&self) -> &Arc<FederationManager> {
        &self.federation
    }

    // Query surface

    pub fn asset_roots(&self) -> BTreeMap<UniverseId, CommitmentRoot> {
        self.registry.list_roots()
    }

    pub fn query_root(&self, id: &UniverseId) -> UniverseResult<CommitmentRoot> {
        self.registry.query_root(id)
    }

    pub fn leaf_keys(&self, id: &UniverseId, mode: SyncMode) -> UniverseResult<Vec<LeafKey>> {
        let snapshot = self.registry.lookup(id)?.snapshot();
        if snapshot.root().is_empty() {
            return Err(UniverseError::NotFound(*id));
        }
        Ok(snapshot.leaf_keys(mode))
    }

    /// Leaves of `id` admitted by `mode`, with proofs against the root of
    /// the same snapshot.
    pub fn leaves(&self, id: &UniverseId, mode: SyncMode) -> UniverseResult<UniverseLeaves> {
        let snapshot = self.registry.lookup(id)?.snapshot();
        let root = snapshot.root();
        if root.is_empty() {
            return Err(UniverseError::NotFound(*id));
        }
        Ok(UniverseLeaves {
            root,
            leaves: snapshot.fetch_leaves(&LeafFilter::Mode(mode)),
        })
    }

    // Local admission

    /// Admit a locally produced leaf and push it to the federation.
    pub fn admit(&self, key: LeafKey, leaf: UniverseLeaf) -> UniverseResult<InsertOutcome> {
        self.verifier.verify(&key, &leaf)?;
        let (id, outcome) = self.registry.insert(key, leaf)?;
        if outcome.inserted {
            info!(universe = %id, leaf = %key, root = %outcome.root, "admitted leaf");
            self.announce(id, BTreeSet::from([key]));
        }
        Ok(outcome)
    }

    /// Admit every leaf of a finalized issuance batch.
    ///
    /// All leaves are verified before any is inserted. Returns the resulting
    /// root of each touched universe.
    pub fn admit_batch(
        &self,
        batch: IssuanceBatch,
    ) -> UniverseResult<BTreeMap<UniverseId, CommitmentRoot>> {
        let entries = batch.into_leaves()?;
        for entry in &entries {
            self.verifier.verify(&entry.key, &entry.leaf)?;
        }

        let mut by_universe: BTreeMap<UniverseId, Vec<LeafEntry>> = BTreeMap::new();
        for entry in entries {
            by_universe
                .entry(entry.leaf.universe_id())
                .or_default()
                .push(entry);
        }

        let mut roots = BTreeMap::new();
        let mut first_error = None;
        for (id, entries) in by_universe {
            let outcome = self.registry.get_or_create(&id).insert_batch(entries);
            if !outcome.inserted.is_empty() {
                info!(universe = %id, leaves = outcome.inserted.len(), root = %outcome.root, "admitted batch");
                self.announce(id, outcome.inserted.iter().map(|e| e.key).collect());
            }
            roots.insert(id, outcome.root);
            if let Some(e) = outcome.error {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(roots),
        }
    }

    fn announce(&self, id: UniverseId, keys: BTreeSet<LeafKey>) {
        let Ok(tree) = self.registry.lookup(&id) else {
            return;
        };
        let snapshot = tree.snapshot();
        let leaves = snapshot.fetch_leaves(&LeafFilter::Keys(keys));
        self.federation.push_update(id, snapshot.root(), leaves);
    }

    // Replication

    /// Apply leaves a peer pushed to us. Each proof must verify against the
    /// pusher's root; verified leaves are kept even when others fail.
    pub fn receive_push(
        &self,
        id: &UniverseId,
        source_root: CommitmentRoot,
        leaves: Vec<LeafWithProof>,
    ) -> SyncResult<CommitmentRoot> {
        let (outcome, rejected) = apply_verified(&self.registry, id, &source_root, leaves);
        if !outcome.inserted.is_empty() {
            info!(universe = %id, inserted = outcome.inserted.len(), root = %outcome.root, "applied pushed leaves");
        }
        if let Some(e) = outcome.error {
            return Err(e.into());
        }
        if let Some(key) = rejected {
            return Err(SyncError::InvalidProof { universe: *id, key });
        }
        Ok(outcome.root)
    }

    /// Pull-reconcile from `host`.
    pub async fn sync_universe(
        &self,
        host: &str,
        mode: SyncMode,
        targets: &SyncTargets,
    ) -> SyncResult<SyncReport> {
        let remote = self.connector.connect(host).await?;
        self.syncer.sync(remote, mode, targets).await
    }

    /// Pull from every federation member in turn.
    pub async fn sync_federation(&self) -> Vec<(String, SyncResult<SyncReport>)> {
        let mode = self.federation.config().sync_mode;
        let mut results = Vec::new();
        for host in self.federation.hosts() {
            let result = self.sync_universe(&host, mode, &SyncTargets::All).await;
            if let Err(e) = &result {
                warn!(host = %host, "federation sync failed: {}", e);
            }
            results.push((host, result));
        }
        results
    }

    // Federation membership

    /// Add a federation server. Unless disabled, a pull from the new
    /// member starts in the background.
    pub fn add_federation_server(self: &Arc<Self>, host: &str) -> bool {
        let added = self.federation.add_server(host);
        if added && self.federation.config().sync_on_add {
            self.spawn_sync(host.trim().to_string());
        }
        added
    }

    pub fn delete_federation_server(&self, host: &str) -> bool {
        self.federation.delete_server(host)
    }

    pub fn list_federation_servers(&self) -> Vec<FederationServer> {
        self.federation.list_servers()
    }

    fn spawn_sync(self: &Arc<Self>, host: String) {
        let Ok(handle) = Handle::try_current() else {
            debug!(host = %host, "no async runtime, skipping initial sync");
            return;
        };
        let node = Arc::downgrade(self);
        handle.spawn(async move {
            let Some(node) = node.upgrade() else { return };
            let mode = node.federation.config().sync_mode;
            match node.sync_universe(&host, mode, &SyncTargets::All).await {
                Ok(report) => debug!(host = %host, diffs = report.diffs.len(), "initial federation sync done"),
                Err(e) => warn!(host = %host, "initial federation sync failed: {}", e),
            }
        });
    }

    /// Start the periodic federation pull, if an interval is configured.
    ///
    /// The task holds only a weak reference and ends once the node is gone.
    pub fn spawn_periodic_sync(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let period = self.federation.config().sync_interval?;
        let handle = Handle::try_current().ok()?;
        let node: Weak<Self> = Arc::downgrade(self);
        info!(?period, "periodic federation sync enabled");
        Some(handle.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(node) = node.upgrade() else { break };
                node.sync_federation().await;
            }
        }))
    }
}
