//! Nullable infrastructure for deterministic testing and development runs.
//!
//! Every external collaborator of the pipeline (clock, ledger, validator
//! registry, audit storage, transaction verifier) sits behind a trait. This
//! crate provides in-memory implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically, including failure injection
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod audit;
pub mod clock;
pub mod ledger;
pub mod registry;
pub mod verifier;

pub use audit::NullAuditSink;
pub use clock::NullClock;
pub use ledger::NullLedger;
pub use registry::NullRegistry;
pub use verifier::NullVerifier;
