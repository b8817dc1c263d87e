//! Collaborator contracts for the Meridian pipeline.
//!
//! The ledger and the validator registry are owned by other subsystems.
//! The pipeline depends only on these traits; in-memory implementations for
//! tests and development runs live in `meridian-nullables`.

pub mod error;
pub mod ledger;
pub mod registry;

pub use error::StoreError;
pub use ledger::{CommittedSubBlock, Ledger, LedgerSummary, RewardShare};
pub use registry::ValidatorRegistry;
