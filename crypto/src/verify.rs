//! Transaction verification contract.
//!
//! Signature schemes live outside the pipeline. The node only needs a yes/no
//! answer (with a reason) before a transaction may enter the pool.

use meridian_types::Transaction;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("invalid signature for transaction {0}")]
    InvalidSignature(String),

    #[error("malformed transaction {id}: {reason}")]
    Malformed { id: String, reason: String },

    #[error("verifier unavailable: {0}")]
    Unavailable(String),
}

/// Checks a transaction's authenticity before it is pooled.
pub trait TransactionVerifier: Send + Sync {
    fn verify(&self, tx: &Transaction) -> Result<(), VerifyError>;

    /// Human-readable verifier name (for logs).
    fn name(&self) -> &str;
}

/// Structural checks only; used when signatures are checked upstream.
///
/// Rejects empty ids and addresses, and transfers to self.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAll;

impl TransactionVerifier for AcceptAll {
    fn verify(&self, tx: &Transaction) -> Result<(), VerifyError> {
        let malformed = |reason: &str| VerifyError::Malformed {
            id: tx.id.to_string(),
            reason: reason.to_string(),
        };
        if tx.id.as_str().is_empty() {
            return Err(malformed("empty id"));
        }
        if !tx.sender.is_valid() || !tx.receiver.is_valid() {
            return Err(malformed("empty address"));
        }
        if tx.sender == tx.receiver {
            return Err(malformed("sender equals receiver"));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "accept-all"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_types::Timestamp;

    #[test]
    fn accepts_well_formed_transaction() {
        let tx = Transaction::new("t1", "alice", "bob", 1, 1, Timestamp::EPOCH);
        assert!(AcceptAll.verify(&tx).is_ok());
    }

    #[test]
    fn rejects_self_transfer() {
        let tx = Transaction::new("t1", "alice", "alice", 1, 1, Timestamp::EPOCH);
        assert!(matches!(
            AcceptAll.verify(&tx),
            Err(VerifyError::Malformed { .. })
        ));
    }

    #[test]
    fn rejects_empty_id() {
        let tx = Transaction::new("", "alice", "bob", 1, 1, Timestamp::EPOCH);
        assert!(AcceptAll.verify(&tx).is_err());
    }
}
