use meridian_types::{ErrorCode, SubBlockStatus, TxId, TxStatus};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("duplicate transaction {0}")]
    DuplicateTransaction(TxId),

    #[error("pool is full (capacity {capacity})")]
    PoolFull { capacity: usize },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient pool size: requested {requested}, available {available}")]
    InsufficientPoolSize { requested: usize, available: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("illegal transition for transaction {id}: {from} -> {to}")]
    InvalidTransition { id: TxId, from: TxStatus, to: TxStatus },

    #[error("illegal sub-block transition: {from} -> {to}")]
    InvalidSubBlockTransition {
        from: SubBlockStatus,
        to: SubBlockStatus,
    },
}

impl MempoolError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::DuplicateTransaction(_) => ErrorCode::DuplicateTransaction,
            Self::PoolFull { .. } => ErrorCode::PoolFull,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::InsufficientPoolSize { .. } => ErrorCode::InsufficientPoolSize,
            Self::InvalidParameter(_) => ErrorCode::InvalidParameter,
            Self::InvalidTransition { .. } | Self::InvalidSubBlockTransition { .. } => {
                ErrorCode::InvalidTransition
            }
        }
    }
}
