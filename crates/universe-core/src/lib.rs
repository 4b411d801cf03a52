//! Universe Core
//!
//! Per-asset commitment ledgers ("universes") built on a merkle-sum sparse
//! tree. This crate is synchronous and runtime free; replication between
//! nodes lives in `universe-sync`.
//!
//! # Example
//!
//! ```rust
//! use universe_core::{
//!     AssetGenesis, AssetType, LeafKey, LeafKind, OutPoint, UniverseLeaf, UniverseRegistry,
//! };
//!
//! let registry = UniverseRegistry::new();
//! let leaf = UniverseLeaf {
//!     genesis: AssetGenesis {
//!         first_prev_out: OutPoint::new([1u8; 32], 0),
//!         tag: "gold".into(),
//!         meta_hash: [0u8; 32],
//!         output_index: 0,
//!         asset_type: AssetType::Normal,
//!     },
//!     group_key: None,
//!     amount: 1_000,
//!     kind: LeafKind::Issuance,
//!     proof: vec![0xde, 0xad],
//! };
//! let key = LeafKey::new(OutPoint::new([2u8; 32], 0), [3u8; 32]);
//!
//! let (id, outcome) = registry.insert(key, leaf).unwrap();
//! assert_eq!(outcome.root.sum, 1_000);
//! assert_eq!(registry.query_root(&id).unwrap(), outcome.root);
//! ```

pub mod batch;
pub mod error;
pub mod id;
pub mod leaf;
pub mod mssmt;
pub mod registry;
pub mod tree;
pub mod verify;

pub use batch::{BatchState, IssuanceBatch};
pub use error::{UniverseError, UniverseResult};
pub use id::{AssetId, GroupKey, UniverseId};
pub use leaf::{
    AssetGenesis, AssetType, LeafEntry, LeafKey, LeafKind, OutPoint, SyncMode, UniverseLeaf,
};
pub use mssmt::{CompressedProof, MerkleProof, NodeHash, ProofError, ProofNode};
pub use registry::UniverseRegistry;
pub use tree::{
    verify_leaf_proof, BatchOutcome, CommitmentRoot, CommitmentTree, InsertOutcome, LeafFilter,
    LeafWithProof, TreeSnapshot,
};
pub use verify::{AcceptAll, LeafVerifier};
