//! Universe registry
//!
//! Maps universe identifiers to their commitment trees. Trees are created on
//! first write and never removed. The map lock only guards membership; each
//! tree carries its own writer lock, so writes to different universes never
//! contend.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

use crate::error::{UniverseError, UniverseResult};
use crate::id::UniverseId;
use crate::leaf::{LeafKey, UniverseLeaf};
use crate::tree::{CommitmentRoot, CommitmentTree, InsertOutcome};

#[derive(Default)]
pub struct UniverseRegistry {
    trees: RwLock<HashMap<UniverseId, Arc<CommitmentTree>>>,
}

impl UniverseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing tree for `id`, or a new empty one. Never fails.
    pub fn get_or_create(&self, id: &UniverseId) -> Arc<CommitmentTree> {
        if let Some(tree) = self.trees.read().get(id) {
            return tree.clone();
        }
        let mut trees = self.trees.write();
        trees
            .entry(*id)
            .or_insert_with(|| {
                info!(universe = %id, "created universe");
                Arc::new(CommitmentTree::new(*id))
            })
            .clone()
    }

    pub fn lookup(&self, id: &UniverseId) -> UniverseResult<Arc<CommitmentTree>> {
        self.trees
            .read()
            .get(id)
            .cloned()
            .ok_or(UniverseError::NotFound(*id))
    }

    /// Root of a universe that holds at least one leaf.
    pub fn query_root(&self, id: &UniverseId) -> UniverseResult<CommitmentRoot> {
        let root = self.lookup(id)?.root();
        if root.is_empty() {
            return Err(UniverseError::NotFound(*id));
        }
        Ok(root)
    }

    /// Root of `id`, or `None` if this node holds no leaves for it.
    pub fn root_of(&self, id: &UniverseId) -> Option<CommitmentRoot> {
        self.query_root(id).ok()
    }

    /// Roots of every non-empty universe.
    pub fn list_roots(&self) -> BTreeMap<UniverseId, CommitmentRoot> {
        let trees: Vec<_> = self.trees.read().values().cloned().collect();
        trees
            .into_iter()
            .map(|tree| (*tree.id(), tree.root()))
            .filter(|(_, root)| !root.is_empty())
            .collect()
    }

    pub fn ids(&self) -> Vec<UniverseId> {
        let mut ids: Vec<_> = self.trees.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Route a leaf to the universe it belongs to.
    pub fn insert(&self, key: LeafKey, leaf: UniverseLeaf) -> UniverseResult<(UniverseId, InsertOutcome)> {
        let id = leaf.universe_id();
        let outcome = self.get_or_create(&id).insert(key, leaf)?;
        Ok((id, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{AssetId, GroupKey};
    use crate::leaf::{AssetGenesis, AssetType, LeafKind, OutPoint};

    fn leaf(tag: &str, group_key: Option<GroupKey>) -> UniverseLeaf {
        UniverseLeaf {
            genesis: AssetGenesis {
                first_prev_out: OutPoint::new([7u8; 32], 1),
                tag: tag.into(),
                meta_hash: [0u8; 32],
                output_index: 0,
                asset_type: AssetType::Normal,
            },
            group_key,
            amount: 50,
            kind: LeafKind::Issuance,
            proof: tag.as_bytes().to_vec(),
        }
    }

    fn key(n: u8) -> LeafKey {
        LeafKey::new(OutPoint::new([n; 32], 0), [n; 32])
    }

    #[test]
    fn lookup_unknown_is_not_found() {
        let registry = UniverseRegistry::new();
        let id = UniverseId::AssetId(AssetId([3u8; 32]));
        assert_eq!(registry.lookup(&id).err(), Some(UniverseError::NotFound(id)));
        assert!(registry.query_root(&id).is_err());
    }

    #[test]
    fn get_or_create_returns_same_tree() {
        let registry = UniverseRegistry::new();
        let id = UniverseId::AssetId(AssetId([3u8; 32]));
        let a = registry.get_or_create(&id);
        let b = registry.get_or_create(&id);
        assert!(Arc::ptr_eq(&a, &b));

        // Created but empty: known, yet not listed.
        assert!(registry.lookup(&id).is_ok());
        assert!(registry.list_roots().is_empty());
        assert_eq!(registry.query_root(&id), Err(UniverseError::NotFound(id)));
    }

    #[test]
    fn insert_routes_by_group_key() {
        let registry = UniverseRegistry::new();
        let group = GroupKey::from_slice(&[4u8; 32]).unwrap();

        let (plain_id, _) = registry.insert(key(1), leaf("plain", None)).unwrap();
        let (group_id, _) = registry.insert(key(2), leaf("grouped", Some(group))).unwrap();

        assert_eq!(group_id, UniverseId::GroupKey(group));
        assert!(matches!(plain_id, UniverseId::AssetId(_)));

        let roots = registry.list_roots();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[&group_id], registry.query_root(&group_id).unwrap());
        assert_eq!(registry.ids().len(), 2);
    }
}
