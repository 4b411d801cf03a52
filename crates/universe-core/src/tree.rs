//! Per-universe commitment tree.
//!
//! Wraps a [`mssmt::Tree`] behind a single-writer lock. Readers take a
//! snapshot (a cheap clone of the persistent tree) and never observe a batch
//! that is only partly applied.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

use crate::error::{UniverseError, UniverseResult};
use crate::id::UniverseId;
use crate::leaf::{LeafEntry, LeafKey, SyncMode, UniverseLeaf};
use crate::mssmt::{self, leaf_hash, LeafValue, MerkleProof, NodeHash, ProofNode, Tree};

impl LeafValue for LeafEntry {
    fn sum(&self) -> u64 {
        self.leaf.amount
    }

    fn encode(&self) -> Vec<u8> {
        self.leaf.encode()
    }
}

/// Root commitment of one universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitmentRoot {
    pub hash: NodeHash,
    pub sum: u64,
    pub leaf_count: u64,
}

impl CommitmentRoot {
    /// Root reported for a universe without leaves.
    pub const EMPTY: CommitmentRoot = CommitmentRoot {
        hash: NodeHash::ZERO,
        sum: 0,
        leaf_count: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    fn node(&self) -> ProofNode {
        ProofNode::new(self.hash, self.sum)
    }

    fn of(tree: &Tree<LeafEntry>) -> Self {
        if tree.is_empty() {
            return Self::EMPTY;
        }
        let root = tree.root();
        Self {
            hash: root.hash,
            sum: root.sum,
            leaf_count: tree.leaf_count(),
        }
    }
}

impl Default for CommitmentRoot {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Display for CommitmentRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (sum={}, leaves={})",
            self.hash, self.sum, self.leaf_count
        )
    }
}

/// A leaf as served to peers: with an inclusion proof against the root of
/// the snapshot it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafWithProof {
    pub key: LeafKey,
    pub leaf: UniverseLeaf,
    pub proof: MerkleProof,
}

impl LeafWithProof {
    pub fn verify(&self, root: &CommitmentRoot) -> bool {
        verify_leaf_proof(root, &self.key, &self.leaf, &self.proof)
    }

    pub fn into_entry(self) -> LeafEntry {
        LeafEntry::new(self.key, self.leaf)
    }
}

/// Check a leaf's inclusion proof against a root. Requires no tree state.
pub fn verify_leaf_proof(
    root: &CommitmentRoot,
    key: &LeafKey,
    leaf: &UniverseLeaf,
    proof: &MerkleProof,
) -> bool {
    if root.is_empty() {
        return false;
    }
    let digest = ProofNode::new(leaf_hash(&leaf.encode(), leaf.amount), leaf.amount);
    mssmt::verify_proof(root.node(), &key.tree_path(), digest, proof)
}

/// Which leaves [`CommitmentTree::fetch_leaves`] returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafFilter {
    All,
    /// Only these keys; keys not in the tree are skipped
    Keys(BTreeSet<LeafKey>),
    /// Only leaves of the kinds admitted by the mode
    Mode(SyncMode),
}

impl LeafFilter {
    fn matches(&self, entry: &LeafEntry) -> bool {
        match self {
            Self::All => true,
            Self::Keys(keys) => keys.contains(&entry.key),
            Self::Mode(mode) => mode.admits(entry.leaf.kind),
        }
    }
}

/// Result of a single insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub root: CommitmentRoot,
    /// False when the identical leaf was already committed
    pub inserted: bool,
}

/// Result of a batch insert. The batch stops at the first failing entry;
/// entries applied before it stay committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub root: CommitmentRoot,
    pub inserted: Vec<LeafEntry>,
    pub error: Option<UniverseError>,
}

/// Point-in-time view of a commitment tree.
#[derive(Clone)]
pub struct TreeSnapshot {
    id: UniverseId,
    tree: Tree<LeafEntry>,
}

impl TreeSnapshot {
    pub fn id(&self) -> &UniverseId {
        &self.id
    }

    pub fn root(&self) -> CommitmentRoot {
        CommitmentRoot::of(&self.tree)
    }

    pub fn get(&self, key: &LeafKey) -> Option<&UniverseLeaf> {
        self.tree
            .get(&key.tree_path())
            .filter(|entry| entry.key == *key)
            .map(|entry| &entry.leaf)
    }

    pub fn leaf_keys(&self, mode: SyncMode) -> Vec<LeafKey> {
        self.tree
            .values()
            .into_iter()
            .filter(|entry| mode.admits(entry.leaf.kind))
            .map(|entry| entry.key)
            .collect()
    }

    /// Leaves matching `filter`, each with a proof against [`Self::root`].
    pub fn fetch_leaves(&self, filter: &LeafFilter) -> Vec<LeafWithProof> {
        self.tree
            .values()
            .into_iter()
            .filter(|entry| filter.matches(entry))
            .map(|entry| LeafWithProof {
                key: entry.key,
                leaf: entry.leaf.clone(),
                proof: self.tree.proof(&entry.key.tree_path()),
            })
            .collect()
    }
}

/// The commitment tree of one universe.
pub struct CommitmentTree {
    id: UniverseId,
    tree: RwLock<Tree<LeafEntry>>,
}

impl CommitmentTree {
    pub fn new(id: UniverseId) -> Self {
        Self {
            id,
            tree: RwLock::new(Tree::new()),
        }
    }

    pub fn id(&self) -> &UniverseId {
        &self.id
    }

    pub fn root(&self) -> CommitmentRoot {
        CommitmentRoot::of(&self.tree.read())
    }

    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            id: self.id,
            tree: self.tree.read().clone(),
        }
    }

    pub fn get(&self, key: &LeafKey) -> Option<UniverseLeaf> {
        self.snapshot().get(key).cloned()
    }

    pub fn fetch_leaves(&self, filter: &LeafFilter) -> Vec<LeafWithProof> {
        self.snapshot().fetch_leaves(filter)
    }

    /// Commit `leaf` under `key`.
    ///
    /// Re-inserting a bit-identical leaf is a no-op; a different leaf under
    /// an existing key is a [`UniverseError::Conflict`].
    pub fn insert(&self, key: LeafKey, leaf: UniverseLeaf) -> UniverseResult<InsertOutcome> {
        let mut tree = self.tree.write();
        let inserted = self.insert_locked(&mut tree, key, leaf)?;
        Ok(InsertOutcome {
            root: CommitmentRoot::of(&tree),
            inserted,
        })
    }

    /// Commit several leaves under one writer lock.
    pub fn insert_batch(&self, entries: Vec<LeafEntry>) -> BatchOutcome {
        let mut tree = self.tree.write();
        let mut inserted = Vec::new();
        let mut error = None;
        for entry in entries {
            match self.insert_locked(&mut tree, entry.key, entry.leaf.clone()) {
                Ok(true) => inserted.push(entry),
                Ok(false) => {}
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }
        BatchOutcome {
            root: CommitmentRoot::of(&tree),
            inserted,
            error,
        }
    }

    fn insert_locked(
        &self,
        tree: &mut Tree<LeafEntry>,
        key: LeafKey,
        leaf: UniverseLeaf,
    ) -> UniverseResult<bool> {
        let leaf_universe = leaf.universe_id();
        if leaf_universe != self.id {
            return Err(UniverseError::Validation(format!(
                "leaf {} belongs to universe {}, not {}",
                key, leaf_universe, self.id
            )));
        }

        let path = key.tree_path();
        if let Some(existing) = tree.get(&path) {
            if existing.key == key && existing.leaf == leaf {
                return Ok(false);
            }
            return Err(UniverseError::Conflict {
                universe: self.id,
                key,
            });
        }

        tree.insert(&path, LeafEntry::new(key, leaf)).map_err(|_| {
            UniverseError::Validation(format!("leaf {} overflows universe {} sum", key, self.id))
        })?;
        debug!(universe = %self.id, leaf = %key, "committed leaf");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::{AssetGenesis, AssetType, LeafKind, OutPoint};
    use pretty_assertions::assert_eq;

    fn genesis() -> AssetGenesis {
        AssetGenesis {
            first_prev_out: OutPoint::new([1u8; 32], 0),
            tag: "test".into(),
            meta_hash: [0u8; 32],
            output_index: 0,
            asset_type: AssetType::Normal,
        }
    }

    fn universe() -> UniverseId {
        UniverseId::AssetId(genesis().asset_id())
    }

    fn entry(n: u8, amount: u64, kind: LeafKind) -> LeafEntry {
        LeafEntry::new(
            LeafKey::new(OutPoint::new([n; 32], n as u32), [n; 32]),
            UniverseLeaf {
                genesis: genesis(),
                group_key: None,
                amount,
                kind,
                proof: vec![n; 8],
            },
        )
    }

    #[test]
    fn empty_root_is_zero() {
        let tree = CommitmentTree::new(universe());
        assert_eq!(tree.root(), CommitmentRoot::EMPTY);
        assert_eq!(tree.root().hash, NodeHash::ZERO);
    }

    #[test]
    fn idempotent_insert() {
        let tree = CommitmentTree::new(universe());
        let e = entry(1, 10, LeafKind::Issuance);

        let first = tree.insert(e.key, e.leaf.clone()).unwrap();
        let second = tree.insert(e.key, e.leaf.clone()).unwrap();

        assert!(first.inserted);
        assert!(!second.inserted);
        assert_eq!(first.root, second.root);
        assert_eq!(second.root.leaf_count, 1);
        assert_eq!(second.root.sum, 10);
    }

    #[test]
    fn conflicting_insert_leaves_tree_unchanged() {
        let tree = CommitmentTree::new(universe());
        let e = entry(1, 10, LeafKind::Issuance);
        let root = tree.insert(e.key, e.leaf.clone()).unwrap().root;

        let mut other = e.leaf.clone();
        other.proof = vec![0xff];
        let err = tree.insert(e.key, other).unwrap_err();

        assert_eq!(
            err,
            UniverseError::Conflict {
                universe: universe(),
                key: e.key
            }
        );
        assert_eq!(tree.root(), root);
        assert_eq!(tree.get(&e.key), Some(e.leaf));
    }

    #[test]
    fn rejects_leaf_from_other_universe() {
        let tree = CommitmentTree::new(UniverseId::AssetId(crate::id::AssetId([0u8; 32])));
        let e = entry(1, 10, LeafKind::Issuance);
        assert!(matches!(
            tree.insert(e.key, e.leaf),
            Err(UniverseError::Validation(_))
        ));
        assert!(tree.root().is_empty());
    }

    #[test]
    fn fetched_leaves_verify_against_root() {
        let tree = CommitmentTree::new(universe());
        for n in 1..=3 {
            let e = entry(n, n as u64 * 100, LeafKind::Issuance);
            tree.insert(e.key, e.leaf).unwrap();
        }
        let transfer = entry(4, 1, LeafKind::Transfer);
        tree.insert(transfer.key, transfer.leaf).unwrap();

        let snapshot = tree.snapshot();
        let root = snapshot.root();
        assert_eq!(root.leaf_count, 4);
        assert_eq!(root.sum, 601);

        let all = snapshot.fetch_leaves(&LeafFilter::All);
        assert_eq!(all.len(), 4);
        assert!(all.iter().all(|l| l.verify(&root)));

        let issuance = snapshot.fetch_leaves(&LeafFilter::Mode(SyncMode::IssuanceOnly));
        assert_eq!(issuance.len(), 3);

        let keys = BTreeSet::from([transfer.key]);
        let picked = snapshot.fetch_leaves(&LeafFilter::Keys(keys));
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].key, transfer.key);
    }

    #[test]
    fn tampered_leaf_fails_verification() {
        let tree = CommitmentTree::new(universe());
        let e = entry(1, 10, LeafKind::Issuance);
        tree.insert(e.key, e.leaf).unwrap();
        let root = tree.root();

        let mut served = tree.fetch_leaves(&LeafFilter::All).remove(0);
        assert!(served.verify(&root));

        served.leaf.amount = 11;
        assert!(!served.verify(&root));
        assert!(!verify_leaf_proof(
            &CommitmentRoot::EMPTY,
            &served.key,
            &served.leaf,
            &served.proof
        ));
    }

    #[test]
    fn batch_stops_at_first_error() {
        let tree = CommitmentTree::new(universe());
        let a = entry(1, 1, LeafKind::Issuance);
        tree.insert(a.key, a.leaf.clone()).unwrap();

        let mut conflicting = a.clone();
        conflicting.leaf.proof = vec![0];
        let b = entry(2, 2, LeafKind::Issuance);
        let c = entry(3, 3, LeafKind::Issuance);

        let outcome = tree.insert_batch(vec![b.clone(), a.clone(), conflicting, c]);
        assert_eq!(outcome.inserted, vec![b]);
        assert!(matches!(outcome.error, Some(UniverseError::Conflict { .. })));
        assert_eq!(outcome.root.leaf_count, 2);
        assert_eq!(tree.root(), outcome.root);
    }
}
