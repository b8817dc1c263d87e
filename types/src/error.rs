//! Structured error codes shared across crates.
//!
//! Every crate has its own `thiserror` enum; each maps onto one of these
//! codes so callers can branch on a stable value while showing the
//! human-readable `Display` text.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    DuplicateTransaction,
    PoolFull,
    NotFound,
    InsufficientPoolSize,
    InvalidParameter,
    NoEligibleValidator,
    ActivityViolation,
    #[serde(rename = "poh_threshold_not_met")]
    PoHThresholdNotMet,
    LedgerConflict,
    StorageUnavailable,
    /// A lifecycle transition that correct code never requests.
    InvalidTransition,
    VerificationFailed,
    Config,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateTransaction => "duplicate_transaction",
            Self::PoolFull => "pool_full",
            Self::NotFound => "not_found",
            Self::InsufficientPoolSize => "insufficient_pool_size",
            Self::InvalidParameter => "invalid_parameter",
            Self::NoEligibleValidator => "no_eligible_validator",
            Self::ActivityViolation => "activity_violation",
            Self::PoHThresholdNotMet => "poh_threshold_not_met",
            Self::LedgerConflict => "ledger_conflict",
            Self::StorageUnavailable => "storage_unavailable",
            Self::InvalidTransition => "invalid_transition",
            Self::VerificationFailed => "verification_failed",
            Self::Config => "config",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
