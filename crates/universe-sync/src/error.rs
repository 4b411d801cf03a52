//! Sync and federation errors

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use universe_core::{CommitmentRoot, LeafKey, UniverseError, UniverseId};

/// Coarse classification shared by every error that crosses a node boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Validation,
    NotFound,
    Conflict,
    Verification,
    Network,
}

impl ErrorClass {
    /// Only transport-level failures are worth another attempt.
    pub fn is_retryable(self) -> bool {
        self == ErrorClass::Network
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Verification => "verification",
            Self::Network => "network",
        };
        f.write_str(s)
    }
}

impl From<&UniverseError> for ErrorClass {
    fn from(err: &UniverseError) -> Self {
        match err {
            UniverseError::Validation(_) => Self::Validation,
            UniverseError::NotFound(_) => Self::NotFound,
            UniverseError::Conflict { .. } => Self::Conflict,
            UniverseError::Verification(_) => Self::Verification,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Universe(#[from] UniverseError),

    /// A peer served a leaf whose proof does not match its own root
    #[error("leaf {key} in universe {universe} does not verify against the peer's root")]
    InvalidProof { universe: UniverseId, key: LeafKey },

    /// Local root after applying a peer's leaves differs from the peer's root
    #[error("root mismatch for universe {universe}: local {local}, remote {remote}")]
    RootMismatch {
        universe: UniverseId,
        local: CommitmentRoot,
        remote: CommitmentRoot,
    },

    #[error("network error talking to {host}: {message}")]
    Network { host: String, message: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// An error the peer reported back to us
    #[error("peer rejected request ({class}): {message}")]
    Remote { class: ErrorClass, message: String },

    /// Reconciliation of one universe ended without a result
    #[error("universe sync aborted: {0}")]
    Aborted(String),
}

impl SyncError {
    pub fn network(host: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Network {
            host: host.into(),
            message: message.to_string(),
        }
    }

    /// An error produced on the far side of a connection.
    pub fn remote(class: ErrorClass, message: impl fmt::Display) -> Self {
        Self::Remote {
            class,
            message: message.to_string(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Universe(e) => e.into(),
            Self::InvalidProof { .. } | Self::RootMismatch { .. } => ErrorClass::Verification,
            Self::Network { .. } | Self::Timeout(_) => ErrorClass::Network,
            Self::Remote { class, .. } => *class,
            Self::Aborted(_) => ErrorClass::Validation,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;
    use universe_core::AssetId;

    #[test]
    fn only_network_class_retries() {
        let id = UniverseId::AssetId(AssetId([1u8; 32]));
        assert!(SyncError::network("peer", "connection refused").is_retryable());
        assert!(SyncError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!SyncError::from(UniverseError::NotFound(id)).is_retryable());
        assert!(!SyncError::RootMismatch {
            universe: id,
            local: CommitmentRoot::EMPTY,
            remote: CommitmentRoot::EMPTY,
        }
        .is_retryable());
    }

    #[test]
    fn remote_errors_keep_their_class() {
        let id = UniverseId::AssetId(AssetId([1u8; 32]));
        let local = UniverseError::NotFound(id);
        let wrapped = SyncError::remote((&local).into(), &local);
        assert_eq!(wrapped.class(), ErrorClass::NotFound);
        assert!(wrapped.to_string().contains("universe not found"));

        let down = SyncError::network("a", "down");
        assert!(SyncError::remote(down.class(), &down).is_retryable());
    }
}
