//! Universe identifiers.
//!
//! A universe is keyed either by a single asset ID or by an asset group key.
//! Group keys are normalized to their 32-byte x-only (schnorr) form, and the
//! universe key for a group is `SHA256` of that serialization.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{UniverseError, UniverseResult};

/// Identifier of a specific, non-reissuable asset.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId(#[serde(with = "hex::serde")] pub [u8; 32]);

impl AssetId {
    pub fn from_slice(bytes: &[u8]) -> UniverseResult<Self> {
        let id: [u8; 32] = bytes.try_into().map_err(|_| {
            UniverseError::Validation(format!("asset id must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(id))
    }

    pub fn from_hex(s: &str) -> UniverseResult<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| UniverseError::Validation(format!("invalid asset id hex: {}", e)))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({})", self)
    }
}

/// Asset group key in x-only (schnorr) serialization.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey(#[serde(with = "hex::serde")] [u8; 32]);

impl GroupKey {
    /// Parse a group key from either its 33-byte compressed encoding or its
    /// 32-byte schnorr encoding. The parity byte of a compressed key is
    /// stripped.
    pub fn from_slice(bytes: &[u8]) -> UniverseResult<Self> {
        match bytes.len() {
            33 => {
                if bytes[0] != 0x02 && bytes[0] != 0x03 {
                    return Err(UniverseError::Validation(format!(
                        "invalid compressed group key prefix 0x{:02x}",
                        bytes[0]
                    )));
                }
                Self::from_slice(&bytes[1..])
            }
            32 => {
                let mut key = [0u8; 32];
                key.copy_from_slice(bytes);
                Ok(Self(key))
            }
            n => Err(UniverseError::Validation(format!(
                "group key must be 32 or 33 bytes, got {}",
                n
            ))),
        }
    }

    pub fn from_hex(s: &str) -> UniverseResult<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| UniverseError::Validation(format!("invalid group key hex: {}", e)))?;
        Self::from_slice(&bytes)
    }

    /// The 32-byte schnorr serialization.
    pub fn schnorr_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupKey({})", self)
    }
}

/// Identifies one universe: exactly one of an asset ID or a group key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniverseId {
    AssetId(AssetId),
    GroupKey(GroupKey),
}

impl UniverseId {
    /// Build an identifier from wire-level optional parts. Exactly one part
    /// must be present.
    pub fn from_parts(asset_id: Option<&[u8]>, group_key: Option<&[u8]>) -> UniverseResult<Self> {
        match (asset_id, group_key) {
            (Some(id), None) => Ok(Self::AssetId(AssetId::from_slice(id)?)),
            (None, Some(key)) => Ok(Self::GroupKey(GroupKey::from_slice(key)?)),
            (None, None) => Err(UniverseError::Validation(
                "universe id has neither asset id nor group key".into(),
            )),
            (Some(_), Some(_)) => Err(UniverseError::Validation(
                "universe id has both asset id and group key".into(),
            )),
        }
    }

    /// The 32-byte key this universe is indexed by.
    pub fn universe_key(&self) -> [u8; 32] {
        match self {
            Self::AssetId(id) => id.0,
            Self::GroupKey(key) => Sha256::digest(key.schnorr_bytes()).into(),
        }
    }

    /// Hex form of [`Self::universe_key`], used as the key of root listings.
    pub fn universe_key_hex(&self) -> String {
        hex::encode(self.universe_key())
    }
}

impl From<AssetId> for UniverseId {
    fn from(id: AssetId) -> Self {
        Self::AssetId(id)
    }
}

impl From<GroupKey> for UniverseId {
    fn from(key: GroupKey) -> Self {
        Self::GroupKey(key)
    }
}

impl fmt::Display for UniverseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AssetId(id) => write!(f, "asset-id/{}", id),
            Self::GroupKey(key) => write!(f, "group-key/{}", key),
        }
    }
}

impl fmt::Debug for UniverseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UniverseId({})", self)
    }
}
