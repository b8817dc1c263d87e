//! Sub-blocks: ordered, bounded batches of transactions.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{SubBlockId, Timestamp, TxId, ValidatorId};

/// Lifecycle of a sub-block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubBlockStatus {
    /// Freshly assembled.
    Draft,
    /// Commit validation has started.
    PendingCommit,
    Committed,
    Rejected,
}

impl SubBlockStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Rejected)
    }

    pub fn can_transition_to(&self, next: SubBlockStatus) -> bool {
        use SubBlockStatus::*;
        matches!(
            (self, next),
            (Draft, PendingCommit)
                | (Draft, Rejected)
                | (PendingCommit, Committed)
                | (PendingCommit, Rejected)
        )
    }
}

impl fmt::Display for SubBlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::PendingCommit => "pending_commit",
            Self::Committed => "committed",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// An ordered batch of transaction ids drained from the pool.
///
/// The transaction list is fixed at assembly: there is no mutating accessor,
/// only the status and the validator assignment change afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubBlock {
    id: SubBlockId,
    tx_ids: Vec<TxId>,
    validator: Option<ValidatorId>,
    assembled_at: Timestamp,
    status: SubBlockStatus,
}

impl SubBlock {
    /// Create a new `Draft` sub-block.
    pub fn new(id: SubBlockId, tx_ids: Vec<TxId>, assembled_at: Timestamp) -> Self {
        Self {
            id,
            tx_ids,
            validator: None,
            assembled_at,
            status: SubBlockStatus::Draft,
        }
    }

    pub fn id(&self) -> SubBlockId {
        self.id
    }

    pub fn tx_ids(&self) -> &[TxId] {
        &self.tx_ids
    }

    pub fn len(&self) -> usize {
        self.tx_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx_ids.is_empty()
    }

    pub fn validator(&self) -> Option<&ValidatorId> {
        self.validator.as_ref()
    }

    pub fn assembled_at(&self) -> Timestamp {
        self.assembled_at
    }

    pub fn status(&self) -> SubBlockStatus {
        self.status
    }

    /// Assign the finalizing validator. Returns `false` once terminal.
    pub fn assign_validator(&mut self, validator: ValidatorId) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.validator = Some(validator);
        true
    }

    /// Advance the status. Returns `false` (and leaves the status unchanged)
    /// for an illegal transition.
    pub fn transition(&mut self, next: SubBlockStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }
}
