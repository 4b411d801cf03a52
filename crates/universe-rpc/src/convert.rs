//! Conversions between wire types and domain types.
//!
//! Everything arriving from the wire is validated here; malformed input
//! becomes a [`UniverseError::Validation`].

use std::collections::BTreeMap;
use universe_core::{
    AssetGenesis, AssetType, CommitmentRoot, CompressedProof, GroupKey, LeafEntry, LeafKey,
    LeafKind, LeafWithProof, MerkleProof, NodeHash, OutPoint, ProofNode, SyncMode, UniverseError,
    UniverseId, UniverseLeaf, UniverseResult,
};
use universe_sync::{ErrorClass, FederationServer, PeerStats, SyncDiff, SyncError, SyncFailure};

use crate::proto;

fn invalid(what: impl std::fmt::Display) -> UniverseError {
    UniverseError::Validation(what.to_string())
}

fn bytes32(field: &str, bytes: &[u8]) -> UniverseResult<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| invalid(format!("{} must be 32 bytes, got {}", field, bytes.len())))
}

// Identifiers

pub fn id_to_proto(id: &UniverseId) -> proto::Id {
    let id = match id {
        UniverseId::AssetId(asset_id) => proto::id::Id::AssetId(asset_id.as_bytes().to_vec()),
        UniverseId::GroupKey(key) => proto::id::Id::GroupKey(key.schnorr_bytes().to_vec()),
    };
    proto::Id { id: Some(id) }
}

pub fn id_from_proto(id: Option<proto::Id>) -> UniverseResult<UniverseId> {
    match id.and_then(|id| id.id) {
        Some(proto::id::Id::AssetId(bytes)) => UniverseId::from_parts(Some(&bytes), None),
        Some(proto::id::Id::GroupKey(bytes)) => UniverseId::from_parts(None, Some(&bytes)),
        None => UniverseId::from_parts(None, None),
    }
}

// Roots

pub fn root_to_proto(id: &UniverseId, root: &CommitmentRoot) -> proto::UniverseRoot {
    proto::UniverseRoot {
        id: Some(id_to_proto(id)),
        mssmt_root: Some(proto::MssmtRoot {
            root_hash: root.hash.as_bytes().to_vec(),
            root_sum: root.sum,
        }),
        leaf_count: root.leaf_count,
    }
}

pub fn root_from_proto(
    root: Option<proto::UniverseRoot>,
) -> UniverseResult<(UniverseId, CommitmentRoot)> {
    let root = root.ok_or_else(|| invalid("missing universe root"))?;
    let id = id_from_proto(root.id)?;
    let mssmt = root.mssmt_root.ok_or_else(|| invalid("missing mssmt root"))?;
    let hash = NodeHash::new(bytes32("root hash", &mssmt.root_hash)?);
    Ok((
        id,
        CommitmentRoot {
            hash,
            sum: mssmt.root_sum,
            leaf_count: root.leaf_count,
        },
    ))
}

pub fn roots_to_proto(roots: &BTreeMap<UniverseId, CommitmentRoot>) -> proto::AssetRootResponse {
    proto::AssetRootResponse {
        universe_roots: roots
            .iter()
            .map(|(id, root)| (id.universe_key_hex(), root_to_proto(id, root)))
            .collect(),
    }
}

pub fn roots_from_proto(
    response: proto::AssetRootResponse,
) -> UniverseResult<BTreeMap<UniverseId, CommitmentRoot>> {
    response
        .universe_roots
        .into_values()
        .map(|root| root_from_proto(Some(root)))
        .collect()
}

// Modes and enums

pub fn mode_to_proto(mode: SyncMode) -> i32 {
    match mode {
        SyncMode::IssuanceOnly => proto::UniverseSyncMode::SyncIssuanceOnly as i32,
        SyncMode::Full => proto::UniverseSyncMode::SyncFull as i32,
    }
}

pub fn mode_from_proto(mode: i32) -> UniverseResult<SyncMode> {
    match proto::UniverseSyncMode::try_from(mode) {
        Ok(proto::UniverseSyncMode::SyncIssuanceOnly) => Ok(SyncMode::IssuanceOnly),
        Ok(proto::UniverseSyncMode::SyncFull) => Ok(SyncMode::Full),
        Err(_) => Err(invalid(format!("unknown sync mode {}", mode))),
    }
}

pub fn class_to_proto(class: ErrorClass) -> i32 {
    let class = match class {
        ErrorClass::Validation => proto::ErrorClass::Validation,
        ErrorClass::NotFound => proto::ErrorClass::NotFound,
        ErrorClass::Conflict => proto::ErrorClass::Conflict,
        ErrorClass::Verification => proto::ErrorClass::Verification,
        ErrorClass::Network => proto::ErrorClass::Network,
    };
    class as i32
}

pub fn class_from_proto(class: i32) -> ErrorClass {
    match proto::ErrorClass::try_from(class) {
        Ok(proto::ErrorClass::NotFound) => ErrorClass::NotFound,
        Ok(proto::ErrorClass::Conflict) => ErrorClass::Conflict,
        Ok(proto::ErrorClass::Verification) => ErrorClass::Verification,
        Ok(proto::ErrorClass::Network) => ErrorClass::Network,
        Ok(proto::ErrorClass::Validation) | Err(_) => ErrorClass::Validation,
    }
}

// Keys and leaves

fn outpoint_to_proto(op: &OutPoint) -> proto::OutPoint {
    proto::OutPoint {
        txid: op.txid.to_vec(),
        vout: op.vout,
    }
}

fn outpoint_from_proto(op: Option<proto::OutPoint>) -> UniverseResult<OutPoint> {
    let op = op.ok_or_else(|| invalid("missing outpoint"))?;
    Ok(OutPoint::new(bytes32("txid", &op.txid)?, op.vout))
}

pub fn key_to_proto(key: &LeafKey) -> proto::AssetKey {
    proto::AssetKey {
        op: Some(outpoint_to_proto(&key.outpoint)),
        script_key: key.script_key.to_vec(),
    }
}

pub fn key_from_proto(key: Option<proto::AssetKey>) -> UniverseResult<LeafKey> {
    let key = key.ok_or_else(|| invalid("missing leaf key"))?;
    let op = key.op.ok_or_else(|| invalid("missing leaf key outpoint"))?;
    LeafKey::from_parts(&op.txid, op.vout, &key.script_key)
}

fn genesis_to_proto(genesis: &AssetGenesis) -> proto::GenesisInfo {
    let asset_type = match genesis.asset_type {
        AssetType::Normal => proto::AssetType::Normal,
        AssetType::Collectible => proto::AssetType::Collectible,
    };
    proto::GenesisInfo {
        first_prev_out: Some(outpoint_to_proto(&genesis.first_prev_out)),
        tag: genesis.tag.clone(),
        meta_hash: genesis.meta_hash.to_vec(),
        output_index: genesis.output_index,
        asset_type: asset_type as i32,
    }
}

fn genesis_from_proto(genesis: Option<proto::GenesisInfo>) -> UniverseResult<AssetGenesis> {
    let genesis = genesis.ok_or_else(|| invalid("missing asset genesis"))?;
    let asset_type = match proto::AssetType::try_from(genesis.asset_type) {
        Ok(proto::AssetType::Normal) => AssetType::Normal,
        Ok(proto::AssetType::Collectible) => AssetType::Collectible,
        Err(_) => return Err(invalid(format!("unknown asset type {}", genesis.asset_type))),
    };
    Ok(AssetGenesis {
        first_prev_out: outpoint_from_proto(genesis.first_prev_out)?,
        tag: genesis.tag,
        meta_hash: bytes32("meta hash", &genesis.meta_hash)?,
        output_index: genesis.output_index,
        asset_type,
    })
}

pub fn leaf_to_proto(leaf: &UniverseLeaf) -> proto::AssetLeaf {
    let kind = match leaf.kind {
        LeafKind::Issuance => proto::LeafKind::Issuance,
        LeafKind::Transfer => proto::LeafKind::Transfer,
    };
    proto::AssetLeaf {
        genesis: Some(genesis_to_proto(&leaf.genesis)),
        group_key: leaf
            .group_key
            .map(|key| key.schnorr_bytes().to_vec())
            .unwrap_or_default(),
        amount: leaf.amount,
        kind: kind as i32,
        proof: leaf.proof.clone(),
    }
}

pub fn leaf_from_proto(leaf: Option<proto::AssetLeaf>) -> UniverseResult<UniverseLeaf> {
    let leaf = leaf.ok_or_else(|| invalid("missing leaf"))?;
    let kind = match proto::LeafKind::try_from(leaf.kind) {
        Ok(proto::LeafKind::Issuance) => LeafKind::Issuance,
        Ok(proto::LeafKind::Transfer) => LeafKind::Transfer,
        Err(_) => return Err(invalid(format!("unknown leaf kind {}", leaf.kind))),
    };
    let group_key = if leaf.group_key.is_empty() {
        None
    } else {
        Some(GroupKey::from_slice(&leaf.group_key)?)
    };
    Ok(UniverseLeaf {
        genesis: genesis_from_proto(leaf.genesis)?,
        group_key,
        amount: leaf.amount,
        kind,
        proof: leaf.proof,
    })
}

pub fn entry_to_proto(entry: &LeafEntry) -> proto::AssetLeafEntry {
    proto::AssetLeafEntry {
        key: Some(key_to_proto(&entry.key)),
        leaf: Some(leaf_to_proto(&entry.leaf)),
    }
}

pub fn entry_from_proto(entry: proto::AssetLeafEntry) -> UniverseResult<LeafEntry> {
    Ok(LeafEntry::new(
        key_from_proto(entry.key)?,
        leaf_from_proto(entry.leaf)?,
    ))
}

// Proofs

pub fn proof_to_proto(proof: &MerkleProof) -> proto::MerkleProof {
    let compressed = proof.compress();
    proto::MerkleProof {
        empty_bits: compressed.empty_bits,
        nodes: compressed
            .nodes
            .iter()
            .map(|node| proto::ProofNode {
                hash: node.hash.as_bytes().to_vec(),
                sum: node.sum,
            })
            .collect(),
    }
}

pub fn proof_from_proto(proof: Option<proto::MerkleProof>) -> UniverseResult<MerkleProof> {
    let proof = proof.ok_or_else(|| invalid("missing inclusion proof"))?;
    let nodes = proof
        .nodes
        .into_iter()
        .map(|node| Ok(ProofNode::new(NodeHash::new(bytes32("proof node", &node.hash)?), node.sum)))
        .collect::<UniverseResult<Vec<_>>>()?;
    CompressedProof {
        empty_bits: proof.empty_bits,
        nodes,
    }
    .decompress()
    .map_err(invalid)
}

pub fn leaf_with_proof_to_proto(served: &LeafWithProof) -> proto::LeafWithProof {
    proto::LeafWithProof {
        key: Some(key_to_proto(&served.key)),
        leaf: Some(leaf_to_proto(&served.leaf)),
        proof: Some(proof_to_proto(&served.proof)),
    }
}

pub fn leaf_with_proof_from_proto(served: proto::LeafWithProof) -> UniverseResult<LeafWithProof> {
    Ok(LeafWithProof {
        key: key_from_proto(served.key)?,
        leaf: leaf_from_proto(served.leaf)?,
        proof: proof_from_proto(served.proof)?,
    })
}

// Sync results

pub fn diff_to_proto(diff: &SyncDiff) -> proto::SyncedUniverse {
    proto::SyncedUniverse {
        old_asset_root: diff
            .old_root
            .as_ref()
            .map(|root| root_to_proto(&diff.universe_id, root)),
        new_asset_root: Some(root_to_proto(&diff.universe_id, &diff.new_root)),
        new_asset_leaves: diff.new_leaves.iter().map(entry_to_proto).collect(),
    }
}

pub fn diff_from_proto(diff: proto::SyncedUniverse) -> UniverseResult<SyncDiff> {
    let (universe_id, new_root) = root_from_proto(diff.new_asset_root)?;
    let old_root = match diff.old_asset_root {
        Some(root) => Some(root_from_proto(Some(root))?.1),
        None => None,
    };
    Ok(SyncDiff {
        universe_id,
        old_root,
        new_root,
        new_leaves: diff
            .new_asset_leaves
            .into_iter()
            .map(entry_from_proto)
            .collect::<UniverseResult<_>>()?,
    })
}

pub fn failure_to_proto(failure: &SyncFailure) -> proto::FailedUniverse {
    proto::FailedUniverse {
        id: Some(id_to_proto(&failure.universe_id)),
        class: class_to_proto(failure.class()),
        error: failure.error.to_string(),
    }
}

pub fn failure_from_proto(failure: proto::FailedUniverse) -> UniverseResult<SyncFailure> {
    Ok(SyncFailure {
        universe_id: id_from_proto(failure.id)?,
        error: SyncError::remote(class_from_proto(failure.class), failure.error),
    })
}

// Federation

pub fn server_to_proto(server: &FederationServer) -> proto::UniverseFederationServer {
    proto::UniverseFederationServer {
        host: server.host.clone(),
        push_successes: server.stats.push_successes,
        push_failures: server.stats.push_failures,
        consecutive_failures: server.stats.consecutive_failures,
        last_error: server.stats.last_error.clone().unwrap_or_default(),
    }
}

pub fn server_from_proto(server: proto::UniverseFederationServer) -> FederationServer {
    FederationServer {
        host: server.host,
        stats: PeerStats {
            push_successes: server.push_successes,
            push_failures: server.push_failures,
            consecutive_failures: server.consecutive_failures,
            last_error: (!server.last_error.is_empty()).then_some(server.last_error),
        },
    }
}
