//! Seams to peer nodes.
//!
//! [`UniverseRemote`] is the query and push surface a peer exposes; the
//! gRPC client and the in-process test network both implement it.
//! [`RemoteConnector`] turns a host string into a remote.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use universe_core::{CommitmentRoot, LeafKey, LeafWithProof, SyncMode, UniverseId};

use crate::error::SyncResult;

/// Leaves served by a peer, with proofs against `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniverseLeaves {
    pub root: CommitmentRoot,
    pub leaves: Vec<LeafWithProof>,
}

#[async_trait]
pub trait UniverseRemote: Send + Sync {
    fn host(&self) -> &str;

    /// Every non-empty universe the peer holds.
    async fn asset_roots(&self) -> SyncResult<BTreeMap<UniverseId, CommitmentRoot>>;

    async fn query_root(&self, id: &UniverseId) -> SyncResult<CommitmentRoot>;

    async fn leaf_keys(&self, id: &UniverseId, mode: SyncMode) -> SyncResult<Vec<LeafKey>>;

    async fn fetch_leaves(&self, id: &UniverseId, mode: SyncMode) -> SyncResult<UniverseLeaves>;

    /// Hand the peer leaves it should verify against `source_root` and
    /// apply. Returns the peer's root afterwards.
    async fn push_leaves(
        &self,
        id: &UniverseId,
        source_root: CommitmentRoot,
        leaves: &[LeafWithProof],
    ) -> SyncResult<CommitmentRoot>;
}

#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, host: &str) -> SyncResult<Arc<dyn UniverseRemote>>;
}
