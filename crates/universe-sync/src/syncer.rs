//! Pull reconciliation.
//!
//! One sync invocation lists the peer's roots, picks the universes whose
//! root differs from ours, and reconciles each of them independently:
//! fetch leaves, verify every proof against the peer's root, apply the
//! verified leaves, then compare roots. The protocol only ever adds leaves.

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};
use universe_core::{
    BatchOutcome, CommitmentRoot, LeafEntry, LeafKey, LeafWithProof, SyncMode, UniverseError,
    UniverseId, UniverseRegistry,
};

use crate::config::SyncConfig;
use crate::error::{ErrorClass, SyncError, SyncResult};
use crate::remote::UniverseRemote;

/// Universes covered by a sync.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncTargets {
    #[default]
    All,
    Only(BTreeSet<UniverseId>),
}

impl SyncTargets {
    /// An empty list means every universe.
    pub fn from_ids(ids: impl IntoIterator<Item = UniverseId>) -> Self {
        let ids: BTreeSet<_> = ids.into_iter().collect();
        if ids.is_empty() {
            Self::All
        } else {
            Self::Only(ids)
        }
    }

    pub fn includes(&self, id: &UniverseId) -> bool {
        match self {
            Self::All => true,
            Self::Only(ids) => ids.contains(id),
        }
    }
}

/// What reconciling one universe changed locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncDiff {
    pub universe_id: UniverseId,
    /// `None` when this node held no leaves for the universe
    pub old_root: Option<CommitmentRoot>,
    pub new_root: CommitmentRoot,
    /// Leaves inserted by this sync; re-fetched leaves we already had are excluded
    pub new_leaves: Vec<LeafEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub universe_id: UniverseId,
    pub error: SyncError,
}

impl SyncFailure {
    pub fn class(&self) -> ErrorClass {
        self.error.class()
    }
}

/// Outcome of one sync invocation. A universe may appear in both lists when
/// some of its leaves were applied before reconciliation failed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncReport {
    pub diffs: Vec<SyncDiff>,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn diff_for(&self, id: &UniverseId) -> Option<&SyncDiff> {
        self.diffs.iter().find(|d| d.universe_id == *id)
    }

    pub fn failure_for(&self, id: &UniverseId) -> Option<&SyncFailure> {
        self.failures.iter().find(|f| f.universe_id == *id)
    }
}

#[derive(Debug, Default)]
struct Reconciled {
    diff: Option<SyncDiff>,
    error: Option<SyncError>,
}

impl Reconciled {
    fn failed(error: SyncError) -> Self {
        Self {
            diff: None,
            error: Some(error),
        }
    }
}

/// Verify each served leaf against `root` and apply the ones that pass.
///
/// Returns the batch outcome and the first leaf that failed verification.
/// The tree for `id` is only created once there is a verified leaf of that
/// universe to insert.
pub(crate) fn apply_verified(
    registry: &UniverseRegistry,
    id: &UniverseId,
    root: &CommitmentRoot,
    leaves: Vec<LeafWithProof>,
) -> (BatchOutcome, Option<LeafKey>) {
    let mut rejected = None;
    let mut verified = Vec::with_capacity(leaves.len());
    for served in leaves {
        if served.verify(root) {
            verified.push(served.into_entry());
        } else {
            warn!(universe = %id, leaf = %served.key, "dropping leaf with invalid proof");
            rejected.get_or_insert(served.key);
        }
    }

    // Stops at the first foreign leaf, like a batch insert would.
    let mut error = None;
    if let Some(pos) = verified.iter().position(|e| e.leaf.universe_id() != *id) {
        let foreign = &verified[pos];
        error = Some(UniverseError::Validation(format!(
            "leaf {} belongs to universe {}, not {}",
            foreign.key,
            foreign.leaf.universe_id(),
            id
        )));
        verified.truncate(pos);
    }

    if verified.is_empty() {
        let outcome = BatchOutcome {
            root: registry.root_of(id).unwrap_or(CommitmentRoot::EMPTY),
            inserted: Vec::new(),
            error,
        };
        return (outcome, rejected);
    }

    let mut outcome = registry.get_or_create(id).insert_batch(verified);
    if outcome.error.is_none() {
        outcome.error = error;
    }
    (outcome, rejected)
}

pub struct Syncer {
    registry: Arc<UniverseRegistry>,
    config: SyncConfig,
}

impl Syncer {
    pub fn new(registry: Arc<UniverseRegistry>, config: SyncConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Pull-reconcile `targets` from `remote`.
    ///
    /// Fails as a whole only when the peer's root listing cannot be read.
    /// Per-universe failures are collected in the report.
    pub async fn sync(
        &self,
        remote: Arc<dyn UniverseRemote>,
        mode: SyncMode,
        targets: &SyncTargets,
    ) -> SyncResult<SyncReport> {
        let limit = self.config.sync_timeout;
        let deadline = Instant::now() + limit;
        let host = remote.host().to_string();

        let remote_roots = timeout_at(deadline, remote.asset_roots())
            .await
            .map_err(|_| SyncError::Timeout(limit))??;

        let differing: Vec<_> = remote_roots
            .into_iter()
            .filter(|(id, _)| targets.includes(id))
            .filter(|(id, root)| self.registry.root_of(id).as_ref() != Some(root))
            .collect();

        if differing.is_empty() {
            debug!(host = %host, "all universes already in sync");
            return Ok(SyncReport::default());
        }
        info!(host = %host, universes = differing.len(), ?mode, "reconciling universes");

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_universes.max(1)));
        let mut tasks = JoinSet::new();
        let mut pending = BTreeSet::new();
        for (id, listed_root) in differing {
            let registry = self.registry.clone();
            let remote = remote.clone();
            let permits = permits.clone();
            pending.insert(id);
            tasks.spawn(async move {
                let run = async {
                    let _permit = permits.acquire().await.ok();
                    reconcile(&registry, remote.as_ref(), id, listed_root, mode).await
                };
                let reconciled = timeout_at(deadline, run)
                    .await
                    .unwrap_or_else(|_| Reconciled::failed(SyncError::Timeout(limit)));
                (id, reconciled)
            });
        }

        let mut report = SyncReport::default();
        let mut aborted = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, reconciled)) => {
                    pending.remove(&id);
                    if let Some(diff) = reconciled.diff {
                        report.diffs.push(diff);
                    }
                    if let Some(error) = reconciled.error {
                        warn!(host = %host, universe = %id, class = %error.class(), "universe sync failed: {}", error);
                        report.failures.push(SyncFailure {
                            universe_id: id,
                            error,
                        });
                    }
                }
                Err(e) => {
                    error!(host = %host, "universe sync task aborted: {}", e);
                    aborted.get_or_insert_with(|| e.to_string());
                }
            }
        }
        // Universes whose task died never reported back.
        for id in pending {
            let reason = aborted.clone().unwrap_or_else(|| "task lost".to_string());
            report.failures.push(SyncFailure {
                universe_id: id,
                error: SyncError::Aborted(reason),
            });
        }
        report.diffs.sort_by(|a, b| a.universe_id.cmp(&b.universe_id));
        report.failures.sort_by(|a, b| a.universe_id.cmp(&b.universe_id));

        info!(
            host = %host,
            diffs = report.diffs.len(),
            failures = report.failures.len(),
            "sync finished"
        );
        Ok(report)
    }
}

async fn reconcile(
    registry: &UniverseRegistry,
    remote: &dyn UniverseRemote,
    id: UniverseId,
    listed_root: CommitmentRoot,
    mode: SyncMode,
) -> Reconciled {
    let old_root = registry.root_of(&id);
    let fetched = match remote.fetch_leaves(&id, mode).await {
        Ok(fetched) => fetched,
        Err(e) => return Reconciled::failed(e),
    };
    if fetched.root != listed_root {
        debug!(universe = %id, "peer root moved since listing, verifying against the newer root");
    }

    let claimed = fetched.root;
    let fetched_count = fetched.leaves.len() as u64;
    let (outcome, rejected) = apply_verified(registry, &id, &claimed, fetched.leaves);
    let new_root = outcome.root;

    let diff = if outcome.inserted.is_empty() {
        None
    } else {
        info!(universe = %id, inserted = outcome.inserted.len(), root = %new_root, "applied peer leaves");
        Some(SyncDiff {
            universe_id: id,
            old_root,
            new_root,
            new_leaves: outcome.inserted,
        })
    };

    // Roots can only be compared when the peer served its whole tree.
    let covers_tree = mode == SyncMode::Full || fetched_count == claimed.leaf_count;
    let error = if let Some(e) = outcome.error {
        Some(e.into())
    } else if let Some(key) = rejected {
        Some(SyncError::InvalidProof { universe: id, key })
    } else if covers_tree && new_root != claimed {
        Some(SyncError::RootMismatch {
            universe: id,
            local: new_root,
            remote: claimed,
        })
    } else {
        None
    };

    Reconciled { diff, error }
}
