//! Inclusion proofs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::node::{bit_at, branch, ProofNode, TREE_DEPTH};

/// Sibling digests from the root down to the leaf, one per level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    nodes: Vec<ProofNode>,
}

impl MerkleProof {
    pub(crate) fn new(nodes: Vec<ProofNode>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[ProofNode] {
        &self.nodes
    }

    /// Recompute the root implied by placing `leaf` at `path`.
    ///
    /// Returns `None` for a malformed proof or when a sum overflows.
    pub fn root_from(&self, path: &[u8; 32], leaf: ProofNode) -> Option<ProofNode> {
        if self.nodes.len() != TREE_DEPTH {
            return None;
        }
        let mut acc = leaf;
        for level in (0..TREE_DEPTH).rev() {
            let sibling = self.nodes[level];
            acc = if bit_at(path, level) {
                branch(sibling, acc)?
            } else {
                branch(acc, sibling)?
            };
        }
        Some(acc)
    }

    /// Drop empty siblings, recording their positions in a bitmap.
    pub fn compress(&self) -> CompressedProof {
        let mut empty_bits = [0u8; TREE_DEPTH / 8];
        let mut nodes = Vec::new();
        for (level, node) in self.nodes.iter().enumerate() {
            if *node == ProofNode::empty(level + 1) {
                empty_bits[level / 8] |= 1 << (7 - (level % 8));
            } else {
                nodes.push(*node);
            }
        }
        CompressedProof {
            empty_bits: empty_bits.to_vec(),
            nodes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofError {
    #[error("empty-sibling bitmap must be {expected} bytes, got {got}")]
    BitmapLength { expected: usize, got: usize },

    #[error("proof carries {got} non-empty siblings, bitmap expects {expected}")]
    NodeCount { expected: usize, got: usize },
}

/// Wire form of a [`MerkleProof`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedProof {
    /// Bit `i` (MSB first) set means the sibling at level `i` is empty
    #[serde(with = "hex::serde")]
    pub empty_bits: Vec<u8>,
    pub nodes: Vec<ProofNode>,
}

impl CompressedProof {
    pub fn decompress(&self) -> Result<MerkleProof, ProofError> {
        if self.empty_bits.len() != TREE_DEPTH / 8 {
            return Err(ProofError::BitmapLength {
                expected: TREE_DEPTH / 8,
                got: self.empty_bits.len(),
            });
        }
        let empty_count: usize = self
            .empty_bits
            .iter()
            .map(|b| b.count_ones() as usize)
            .sum();
        let expected = TREE_DEPTH - empty_count;
        if self.nodes.len() != expected {
            return Err(ProofError::NodeCount {
                expected,
                got: self.nodes.len(),
            });
        }

        let mut remaining = self.nodes.iter();
        let mut nodes = Vec::with_capacity(TREE_DEPTH);
        for level in 0..TREE_DEPTH {
            let is_empty = (self.empty_bits[level / 8] >> (7 - (level % 8))) & 1 == 1;
            let node = if is_empty {
                ProofNode::empty(level + 1)
            } else {
                match remaining.next() {
                    Some(node) => *node,
                    None => {
                        return Err(ProofError::NodeCount {
                            expected,
                            got: self.nodes.len(),
                        })
                    }
                }
            };
            nodes.push(node);
        }
        Ok(MerkleProof::new(nodes))
    }
}
