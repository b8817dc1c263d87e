use meridian_consensus::ConsensusError;
use meridian_mempool::MempoolError;
use meridian_store::StoreError;
use meridian_types::{ErrorCode, SubBlockId, TxId};
use thiserror::Error;

/// Why a commit failed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommitErrorKind {
    #[error(transparent)]
    Mempool(#[from] MempoolError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error("ledger conflict: {0}")]
    LedgerConflict(String),

    #[error("ledger: {0}")]
    Store(StoreError),
}

impl From<StoreError> for CommitErrorKind {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) | StoreError::Duplicate(msg) => Self::LedgerConflict(msg),
            other => Self::Store(other),
        }
    }
}

impl CommitErrorKind {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Mempool(e) => e.code(),
            Self::Consensus(e) => e.code(),
            Self::LedgerConflict(_) => ErrorCode::LedgerConflict,
            Self::Store(e) => e.code(),
        }
    }
}

/// A failed commit, with the transactions that went back to the pool.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("commit of sub-block {sub_block} failed: {kind}")]
pub struct CommitError {
    pub sub_block: SubBlockId,
    #[source]
    pub kind: CommitErrorKind,
    /// Transactions returned to the pool, in their original order. Empty
    /// when the sub-block was never claimed (unknown or already committing).
    pub restored: Vec<TxId>,
}

impl CommitError {
    pub fn code(&self) -> ErrorCode {
        self.kind.code()
    }
}
