use meridian_store::StoreError;
use meridian_types::{ErrorCode, ValidatorId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConsensusError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("no eligible validator")]
    NoEligibleValidator,

    #[error("validator {0} not found")]
    ValidatorNotFound(ValidatorId),

    #[error("activity violation by {validator}: {reason}")]
    ActivityViolation {
        validator: ValidatorId,
        reason: String,
    },

    #[error("validator {validator} participation {score:.3} below PoH threshold {threshold:.3}")]
    PohThresholdNotMet {
        validator: ValidatorId,
        score: f64,
        threshold: f64,
    },

    #[error("validator registry: {0}")]
    Registry(#[from] StoreError),
}

impl ConsensusError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidParameter(_) => ErrorCode::InvalidParameter,
            Self::NoEligibleValidator => ErrorCode::NoEligibleValidator,
            Self::ValidatorNotFound(_) => ErrorCode::NotFound,
            Self::ActivityViolation { .. } => ErrorCode::ActivityViolation,
            Self::PohThresholdNotMet { .. } => ErrorCode::PoHThresholdNotMet,
            Self::Registry(e) => e.code(),
        }
    }
}
