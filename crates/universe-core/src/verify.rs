//! Admission checks for locally minted leaves.

use crate::error::UniverseResult;
use crate::leaf::{LeafKey, UniverseLeaf};

/// Attests that a leaf's issuance or transfer proof is valid on chain.
///
/// Consulted once, when a leaf is first admitted locally. Leaves received
/// from peers are checked against the peer's commitment instead.
pub trait LeafVerifier: Send + Sync {
    fn verify(&self, key: &LeafKey, leaf: &UniverseLeaf) -> UniverseResult<()>;
}

/// Verifier that admits every leaf.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl LeafVerifier for AcceptAll {
    fn verify(&self, _key: &LeafKey, _leaf: &UniverseLeaf) -> UniverseResult<()> {
        Ok(())
    }
}
