use meridian_audit::AuditError;
use meridian_consensus::ConsensusError;
use meridian_ledger::CommitError;
use meridian_mempool::MempoolError;
use meridian_store::StoreError;
use meridian_types::{ErrorCode, TxId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("mempool error: {0}")]
    Mempool(#[from] MempoolError),

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("{0}")]
    Commit(#[from] CommitError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("transaction {tx} failed verification: {reason}")]
    VerificationFailed { tx: TxId, reason: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("logging already initialised: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Mempool(e) => e.code(),
            Self::Consensus(e) => e.code(),
            Self::Commit(e) => e.code(),
            Self::Store(e) => e.code(),
            Self::Audit(e) => e.code(),
            Self::VerificationFailed { .. } => ErrorCode::VerificationFailed,
            Self::Config(_) => ErrorCode::Config,
            Self::Metrics(_) | Self::Logging(_) | Self::Io(_) => ErrorCode::Internal,
        }
    }
}
