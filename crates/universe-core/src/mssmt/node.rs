//! Node digests and the empty-subtree table.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of levels between the root and a leaf. Keys are 256-bit paths.
pub const TREE_DEPTH: usize = 256;

/// A 32-byte node digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct NodeHash(#[serde(with = "hex::serde")] [u8; 32]);

impl NodeHash {
    pub const ZERO: NodeHash = NodeHash([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeHash({})", self)
    }
}

/// Hash and sum of one node, as carried in proofs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProofNode {
    pub hash: NodeHash,
    pub sum: u64,
}

impl ProofNode {
    pub fn new(hash: NodeHash, sum: u64) -> Self {
        Self { hash, sum }
    }

    /// The node standing in for an empty subtree whose root sits at `level`.
    pub fn empty(level: usize) -> Self {
        Self::new(empty_hash(level), 0)
    }
}

/// `SHA256(value || sum)`
pub fn leaf_hash(value: &[u8], sum: u64) -> NodeHash {
    let mut h = Sha256::new();
    h.update(value);
    h.update(sum.to_be_bytes());
    NodeHash(h.finalize().into())
}

/// Combine two children into their parent. Returns `None` when the sums
/// overflow.
pub fn branch(left: ProofNode, right: ProofNode) -> Option<ProofNode> {
    let sum = left.sum.checked_add(right.sum)?;
    let mut h = Sha256::new();
    h.update(left.hash.0);
    h.update(right.hash.0);
    h.update(sum.to_be_bytes());
    Some(ProofNode::new(NodeHash(h.finalize().into()), sum))
}

lazy_static! {
    // Index is the level of the subtree root: 0 is the tree root,
    // TREE_DEPTH is a single empty leaf.
    static ref EMPTY_HASHES: Vec<NodeHash> = {
        let mut hashes = vec![NodeHash::ZERO; TREE_DEPTH + 1];
        hashes[TREE_DEPTH] = leaf_hash(&[], 0);
        for level in (0..TREE_DEPTH).rev() {
            let child = ProofNode::new(hashes[level + 1], 0);
            hashes[level] = branch(child, child).map(|n| n.hash).unwrap_or_default();
        }
        hashes
    };
}

/// Digest of an empty subtree rooted at `level`.
pub fn empty_hash(level: usize) -> NodeHash {
    EMPTY_HASHES[level.min(TREE_DEPTH)]
}

/// Bit of `path` selecting the child taken below `level` (MSB first).
pub(crate) fn bit_at(path: &[u8; 32], level: usize) -> bool {
    (path[level / 8] >> (7 - (level % 8))) & 1 == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_is_consistent() {
        for level in 0..TREE_DEPTH {
            let child = ProofNode::empty(level + 1);
            assert_eq!(branch(child, child).unwrap().hash, empty_hash(level));
        }
        assert_ne!(empty_hash(0), NodeHash::ZERO);
    }

    #[test]
    fn branch_sums_and_overflow() {
        let a = ProofNode::new(leaf_hash(b"a", 3), 3);
        let b = ProofNode::new(leaf_hash(b"b", 4), 4);
        assert_eq!(branch(a, b).unwrap().sum, 7);
        assert_ne!(branch(a, b).unwrap().hash, branch(b, a).unwrap().hash);

        let big = ProofNode::new(NodeHash::ZERO, u64::MAX);
        assert!(branch(big, a).is_none());
    }

    #[test]
    fn bits_are_msb_first() {
        let mut path = [0u8; 32];
        path[0] = 0b1000_0001;
        path[31] = 0b0000_0001;
        assert!(bit_at(&path, 0));
        assert!(!bit_at(&path, 1));
        assert!(bit_at(&path, 7));
        assert!(bit_at(&path, 255));
        assert!(!bit_at(&path, 254));
    }
}
