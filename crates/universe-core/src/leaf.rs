//! Universe leaves and leaf keys.
//!
//! A leaf is one issuance or transfer proof committed into a universe. It is
//! addressed by the script key and outpoint of the output it proves, and it
//! contributes its amount to the tree's sum.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{UniverseError, UniverseResult};
use crate::id::{AssetId, GroupKey, UniverseId};

/// Reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    #[serde(with = "hex::serde")]
    pub txid: [u8; 32],
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: [u8; 32], vout: u32) -> Self {
        Self { txid, vout }
    }

    fn write_to(&self, h: &mut Sha256) {
        h.update(self.txid);
        h.update(self.vout.to_be_bytes());
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", hex::encode(self.txid), self.vout)
    }
}

/// Uniquely identifies a leaf within one universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LeafKey {
    pub outpoint: OutPoint,
    /// x-only script key of the minting or transfer output
    #[serde(with = "hex::serde")]
    pub script_key: [u8; 32],
}

impl LeafKey {
    pub fn new(outpoint: OutPoint, script_key: [u8; 32]) -> Self {
        Self {
            outpoint,
            script_key,
        }
    }

    /// Build a key from wire-level parts, validating lengths.
    pub fn from_parts(txid: &[u8], vout: u32, script_key: &[u8]) -> UniverseResult<Self> {
        let txid: [u8; 32] = txid.try_into().map_err(|_| {
            UniverseError::Validation(format!("leaf key txid must be 32 bytes, got {}", txid.len()))
        })?;
        let script_key: [u8; 32] = match script_key.len() {
            32 => script_key.try_into().ok(),
            33 if matches!(script_key[0], 0x02 | 0x03) => script_key[1..].try_into().ok(),
            _ => None,
        }
        .ok_or_else(|| {
            UniverseError::Validation(format!(
                "leaf key script key must be 32 or 33 bytes, got {}",
                script_key.len()
            ))
        })?;
        Ok(Self::new(OutPoint::new(txid, vout), script_key))
    }

    /// Path of this leaf in the sparse tree.
    pub fn tree_path(&self) -> [u8; 32] {
        let mut h = Sha256::new();
        self.outpoint.write_to(&mut h);
        h.update(self.script_key);
        h.finalize().into()
    }
}

impl fmt::Display for LeafKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.outpoint, hex::encode(self.script_key))
    }
}

/// What a leaf proves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafKind {
    Issuance,
    Transfer,
}

/// Which leaves a listing or sync covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Genesis/issuance leaves only
    #[default]
    IssuanceOnly,
    /// Issuance and transfer leaves
    Full,
}

impl SyncMode {
    pub fn admits(self, kind: LeafKind) -> bool {
        match self {
            Self::IssuanceOnly => kind == LeafKind::Issuance,
            Self::Full => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    #[default]
    Normal,
    Collectible,
}

/// Genesis information of an asset. The asset ID is derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetGenesis {
    pub first_prev_out: OutPoint,
    pub tag: String,
    #[serde(with = "hex::serde")]
    pub meta_hash: [u8; 32],
    pub output_index: u32,
    pub asset_type: AssetType,
}

impl AssetGenesis {
    /// `SHA256(first_prev_out || SHA256(tag) || meta_hash || output_index || type)`
    pub fn asset_id(&self) -> AssetId {
        let tag_hash: [u8; 32] = Sha256::digest(self.tag.as_bytes()).into();
        let mut h = Sha256::new();
        self.first_prev_out.write_to(&mut h);
        h.update(tag_hash);
        h.update(self.meta_hash);
        h.update(self.output_index.to_be_bytes());
        h.update([self.asset_type as u8]);
        AssetId(h.finalize().into())
    }
}

/// The value committed at a leaf.
///
/// Leaves are immutable once committed: two leaves under the same key must
/// be bit-identical or the second insert is a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniverseLeaf {
    pub genesis: AssetGenesis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_key: Option<GroupKey>,
    pub amount: u64,
    pub kind: LeafKind,
    /// Opaque issuance or transfer proof
    #[serde(with = "hex::serde")]
    pub proof: Vec<u8>,
}

impl UniverseLeaf {
    /// The universe this leaf belongs to: the group universe when the asset
    /// is grouped, its asset universe otherwise.
    pub fn universe_id(&self) -> UniverseId {
        match self.group_key {
            Some(key) => UniverseId::GroupKey(key),
            None => UniverseId::AssetId(self.genesis.asset_id()),
        }
    }

    /// Canonical bytes committed into the leaf node hash.
    ///
    /// Every variable-length field is length prefixed so distinct leaves can
    /// never share an encoding.
    pub fn encode(&self) -> Vec<u8> {
        let tag = self.genesis.tag.as_bytes();
        let mut out = Vec::with_capacity(128 + tag.len() + self.proof.len());
        out.extend_from_slice(b"leaf:");
        out.push(match self.kind {
            LeafKind::Issuance => 0,
            LeafKind::Transfer => 1,
        });
        out.extend_from_slice(&self.genesis.first_prev_out.txid);
        out.extend_from_slice(&self.genesis.first_prev_out.vout.to_be_bytes());
        out.extend_from_slice(&(tag.len() as u64).to_be_bytes());
        out.extend_from_slice(tag);
        out.extend_from_slice(&self.genesis.meta_hash);
        out.extend_from_slice(&self.genesis.output_index.to_be_bytes());
        out.push(self.genesis.asset_type as u8);
        match &self.group_key {
            Some(key) => {
                out.push(1);
                out.extend_from_slice(key.schnorr_bytes());
            }
            None => out.push(0),
        }
        out.extend_from_slice(&self.amount.to_be_bytes());
        out.extend_from_slice(&(self.proof.len() as u64).to_be_bytes());
        out.extend_from_slice(&self.proof);
        out
    }
}

/// A leaf together with its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafEntry {
    pub key: LeafKey,
    pub leaf: UniverseLeaf,
}

impl LeafEntry {
    pub fn new(key: LeafKey, leaf: UniverseLeaf) -> Self {
        Self { key, leaf }
    }
}
