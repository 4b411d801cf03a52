//! Persistent merkle-sum sparse tree.
//!
//! Nodes are reference counted and never mutated. An insert rebuilds the
//! branches along one root-to-leaf path and shares every other subtree with
//! the previous version, so cloning a tree is a constant-time snapshot.

use std::sync::Arc;

use super::node::{bit_at, branch, leaf_hash, ProofNode, TREE_DEPTH};
use super::proof::MerkleProof;

/// A value stored at a leaf.
pub trait LeafValue: Clone + Send + Sync {
    /// Contribution of this leaf to the tree sum.
    fn sum(&self) -> u64;

    /// Bytes committed into the leaf digest.
    fn encode(&self) -> Vec<u8>;
}

/// Raised when an insert would overflow a branch sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SumOverflow;

#[derive(Clone)]
enum Node<V> {
    Empty,
    Leaf(Arc<LeafNode<V>>),
    Branch(Arc<BranchNode<V>>),
}

struct LeafNode<V> {
    value: V,
    digest: ProofNode,
}

struct BranchNode<V> {
    left: Node<V>,
    right: Node<V>,
    digest: ProofNode,
}

impl<V: LeafValue> Node<V> {
    fn digest(&self, level: usize) -> ProofNode {
        match self {
            Node::Empty => ProofNode::empty(level),
            Node::Leaf(leaf) => leaf.digest,
            Node::Branch(b) => b.digest,
        }
    }

    fn children(&self) -> (Node<V>, Node<V>) {
        match self {
            Node::Branch(b) => (b.left.clone(), b.right.clone()),
            _ => (Node::Empty, Node::Empty),
        }
    }

    /// Parent of `left` and `right`, which sit one level below `level`.
    fn join(left: Node<V>, right: Node<V>, level: usize) -> Result<Node<V>, SumOverflow> {
        if matches!((&left, &right), (Node::Empty, Node::Empty)) {
            return Ok(Node::Empty);
        }
        let digest =
            branch(left.digest(level + 1), right.digest(level + 1)).ok_or(SumOverflow)?;
        Ok(Node::Branch(Arc::new(BranchNode {
            left,
            right,
            digest,
        })))
    }
}

/// Merkle-sum sparse tree over 256-bit paths.
#[derive(Clone)]
pub struct Tree<V> {
    root: Node<V>,
    leaf_count: u64,
}

impl<V: LeafValue> Tree<V> {
    pub fn new() -> Self {
        Self {
            root: Node::Empty,
            leaf_count: 0,
        }
    }

    /// Hash and sum of the root node.
    pub fn root(&self) -> ProofNode {
        self.root.digest(0)
    }

    pub fn leaf_count(&self) -> u64 {
        self.leaf_count
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    pub fn get(&self, path: &[u8; 32]) -> Option<&V> {
        let mut current = &self.root;
        for level in 0..TREE_DEPTH {
            current = match current {
                Node::Branch(b) if bit_at(path, level) => &b.right,
                Node::Branch(b) => &b.left,
                _ => return None,
            };
        }
        match current {
            Node::Leaf(leaf) => Some(&leaf.value),
            _ => None,
        }
    }

    /// Store `value` at `path`, replacing any existing leaf there.
    ///
    /// The tree is left untouched if any sum on the path would overflow.
    pub fn insert(&mut self, path: &[u8; 32], value: V) -> Result<(), SumOverflow> {
        let (siblings, existing) = self.walk(path);

        let digest = ProofNode::new(leaf_hash(&value.encode(), value.sum()), value.sum());
        let mut node = Node::Leaf(Arc::new(LeafNode { value, digest }));
        for level in (0..TREE_DEPTH).rev() {
            let sibling = siblings[level].clone();
            node = if bit_at(path, level) {
                Node::join(sibling, node, level)?
            } else {
                Node::join(node, sibling, level)?
            };
        }

        self.root = node;
        if matches!(existing, Node::Empty) {
            self.leaf_count += 1;
        }
        Ok(())
    }

    /// Inclusion (or non-inclusion) proof for `path` against the current root.
    pub fn proof(&self, path: &[u8; 32]) -> MerkleProof {
        let (siblings, _) = self.walk(path);
        let nodes = siblings
            .iter()
            .enumerate()
            .map(|(level, sibling)| sibling.digest(level + 1))
            .collect();
        MerkleProof::new(nodes)
    }

    /// All stored values in path order.
    pub fn values(&self) -> Vec<&V> {
        let mut out = Vec::with_capacity(self.leaf_count as usize);
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            match node {
                Node::Empty => {}
                Node::Leaf(leaf) => out.push(&leaf.value),
                Node::Branch(b) => {
                    stack.push(&b.right);
                    stack.push(&b.left);
                }
            }
        }
        out
    }

    /// Siblings along `path` indexed by level, plus the node found at the end.
    fn walk(&self, path: &[u8; 32]) -> (Vec<Node<V>>, Node<V>) {
        let mut siblings = Vec::with_capacity(TREE_DEPTH);
        let mut current = self.root.clone();
        for level in 0..TREE_DEPTH {
            let (left, right) = current.children();
            if bit_at(path, level) {
                siblings.push(left);
                current = right;
            } else {
                siblings.push(right);
                current = left;
            }
        }
        (siblings, current)
    }
}

impl<V: LeafValue> Default for Tree<V> {
    fn default() -> Self {
        Self::new()
    }
}
