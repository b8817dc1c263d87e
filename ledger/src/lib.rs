//! Ledger committer.
//!
//! Takes a Draft sub-block from the assembler, runs the consensus checks,
//! validates its transactions against the ledger and appends it. A failed
//! commit rejects the sub-block and returns every transaction to the pool.
//!
//! ## Module overview
//!
//! - [`committer`]: [`LedgerCommitter`] and [`CommitReceipt`].
//! - [`error`]: Commit error types.

pub mod committer;
pub mod error;

pub use committer::{CommitReceipt, CommitterConfig, LedgerCommitter};
pub use error::{CommitError, CommitErrorKind};
