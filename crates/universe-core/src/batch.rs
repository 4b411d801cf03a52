//! Issuance batch lifecycle.
//!
//! The minting workflow drives a batch through its states; only a finalized
//! batch hands its leaves to a universe.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{UniverseError, UniverseResult};
use crate::leaf::LeafEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    #[default]
    Pending,
    Frozen,
    Committed,
    Broadcast,
    Confirmed,
    Finalized,
    Cancelled,
}

impl BatchState {
    /// State reached by advancing normally, if any.
    pub fn next(self) -> Option<BatchState> {
        match self {
            Self::Pending => Some(Self::Frozen),
            Self::Frozen => Some(Self::Committed),
            Self::Committed => Some(Self::Broadcast),
            Self::Broadcast => Some(Self::Confirmed),
            Self::Confirmed => Some(Self::Finalized),
            Self::Finalized | Self::Cancelled => None,
        }
    }

    /// Cancellation is only possible before the batch hits the chain.
    pub fn can_cancel(self) -> bool {
        matches!(self, Self::Pending | Self::Frozen | Self::Committed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Cancelled)
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Frozen => "frozen",
            Self::Committed => "committed",
            Self::Broadcast => "broadcast",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A minting batch and the issuance leaves it will produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceBatch {
    state: BatchState,
    leaves: Vec<LeafEntry>,
}

impl IssuanceBatch {
    pub fn new(leaves: Vec<LeafEntry>) -> Self {
        Self {
            state: BatchState::Pending,
            leaves,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn leaves(&self) -> &[LeafEntry] {
        &self.leaves
    }

    /// Move to `to`, which must be the direct successor of the current state.
    pub fn advance(&mut self, to: BatchState) -> UniverseResult<()> {
        if self.state.next() != Some(to) {
            return Err(UniverseError::Validation(format!(
                "batch cannot move from {} to {}",
                self.state, to
            )));
        }
        self.state = to;
        Ok(())
    }

    pub fn cancel(&mut self) -> UniverseResult<()> {
        if !self.state.can_cancel() {
            return Err(UniverseError::Validation(format!(
                "batch in state {} cannot be cancelled",
                self.state
            )));
        }
        self.state = BatchState::Cancelled;
        Ok(())
    }

    /// Leaves ready for admission. Fails unless the batch is finalized.
    pub fn into_leaves(self) -> UniverseResult<Vec<LeafEntry>> {
        if self.state != BatchState::Finalized {
            return Err(UniverseError::Validation(format!(
                "batch is {}, only finalized batches yield leaves",
                self.state
            )));
        }
        Ok(self.leaves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advance_to(batch: &mut IssuanceBatch, target: BatchState) {
        while batch.state() != target {
            let next = batch.state().next().unwrap();
            batch.advance(next).unwrap();
        }
    }

    #[test]
    fn full_lifecycle() {
        let mut batch = IssuanceBatch::new(Vec::new());
        assert!(batch.clone().into_leaves().is_err());

        advance_to(&mut batch, BatchState::Finalized);
        assert!(batch.state().is_terminal());
        assert!(batch.advance(BatchState::Pending).is_err());
        assert_eq!(batch.into_leaves().unwrap(), Vec::new());
    }

    #[test]
    fn skipping_states_is_rejected() {
        let mut batch = IssuanceBatch::new(Vec::new());
        assert!(batch.advance(BatchState::Committed).is_err());
        assert_eq!(batch.state(), BatchState::Pending);
    }

    #[test]
    fn cancel_only_before_broadcast() {
        for state in [BatchState::Pending, BatchState::Frozen, BatchState::Committed] {
            let mut batch = IssuanceBatch::new(Vec::new());
            advance_to(&mut batch, state);
            batch.cancel().unwrap();
            assert_eq!(batch.state(), BatchState::Cancelled);
            assert!(batch.into_leaves().is_err());
        }

        let mut batch = IssuanceBatch::new(Vec::new());
        advance_to(&mut batch, BatchState::Broadcast);
        assert!(batch.cancel().is_err());
        assert_eq!(batch.state(), BatchState::Broadcast);
    }
}
