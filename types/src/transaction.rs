//! Transactions and their pipeline status.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Address, Timestamp, TxId};

/// Where a transaction currently sits in the pipeline.
///
/// Each status maps to exactly one owning stage: Pooled → pool,
/// Batched → an uncommitted sub-block, Committed → ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    /// Submitted, not yet admitted to the pool.
    Pending,
    /// Waiting in the pool.
    Pooled,
    /// Drained into a sub-block awaiting commit.
    Batched,
    /// Durably committed to the ledger.
    Committed,
    /// Permanently discarded (evicted or cleared).
    Rejected,
}

impl TxStatus {
    /// Whether the transaction has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Rejected)
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition_to(&self, next: TxStatus) -> bool {
        use TxStatus::*;
        matches!(
            (self, next),
            (Pending, Pooled)
                | (Pooled, Batched)
                | (Batched, Pooled)
                | (Batched, Committed)
                | (Pending, Rejected)
                | (Pooled, Rejected)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Pooled => "pooled",
            Self::Batched => "batched",
            Self::Committed => "committed",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted transfer between two addresses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub sender: Address,
    pub receiver: Address,
    pub amount: u128,
    /// Opaque application payload; the pipeline never interprets it.
    pub payload: Vec<u8>,
    /// Per-sender sequence number; must strictly increase on commit.
    pub nonce: u64,
    pub created_at: Timestamp,
    pub status: TxStatus,
}

impl Transaction {
    /// Build a new transaction in `Pending` status.
    pub fn new(
        id: impl Into<TxId>,
        sender: impl Into<Address>,
        receiver: impl Into<Address>,
        amount: u128,
        nonce: u64,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
            payload: Vec::new(),
            nonce,
            created_at,
            status: TxStatus::Pending,
        }
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// Whether `address` is the sender or receiver.
    pub fn involves(&self, address: &Address) -> bool {
        &self.sender == address || &self.receiver == address
    }
}
