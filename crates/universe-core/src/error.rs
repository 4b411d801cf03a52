//! Universe error types

use thiserror::Error;

use crate::id::UniverseId;
use crate::leaf::LeafKey;

/// Errors raised by commitment trees and the universe registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UniverseError {
    /// Malformed identifier, leaf key or leaf
    #[error("invalid universe data: {0}")]
    Validation(String),

    /// Query against a universe this node does not know
    #[error("universe not found: {0}")]
    NotFound(UniverseId),

    /// Key already committed with different leaf content
    #[error("conflicting leaf for key {key} in universe {universe}")]
    Conflict { universe: UniverseId, key: LeafKey },

    /// Leaf or proof failed verification
    #[error("verification failed: {0}")]
    Verification(String),
}

/// Result type for universe operations
pub type UniverseResult<T> = Result<T, UniverseError>;
