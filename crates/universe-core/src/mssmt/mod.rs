//! Merkle-sum sparse tree.
//!
//! Every node carries a digest and the sum of the leaf values beneath it.
//! Leaves live at depth 256 under the path given by their 32-byte key;
//! absent subtrees are represented by precomputed empty digests so the tree
//! only materializes the branches that lead to real leaves.
//!
//! - leaf digest: `SHA256(value || sum)`
//! - branch digest: `SHA256(left || right || left_sum + right_sum)`

mod node;
mod proof;
mod tree;

pub use node::{empty_hash, leaf_hash, NodeHash, ProofNode, TREE_DEPTH};
pub use proof::{CompressedProof, MerkleProof, ProofError};
pub use tree::{LeafValue, SumOverflow, Tree};

/// Check that `leaf` sits at `path` under `root`. Pure; needs no tree.
pub fn verify_proof(root: ProofNode, path: &[u8; 32], leaf: ProofNode, proof: &MerkleProof) -> bool {
    proof.root_from(path, leaf) == Some(root)
}
