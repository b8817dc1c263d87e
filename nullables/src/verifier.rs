//! Nullable verifier: accepts everything except ids it was told to reject.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use meridian_crypto::{TransactionVerifier, VerifyError};
use meridian_types::{Transaction, TxId};
use parking_lot::Mutex;

#[derive(Default)]
pub struct NullVerifier {
    rejected: Mutex<HashSet<TxId>>,
    calls: AtomicUsize,
}

impl NullVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail verification for this id from now on.
    pub fn reject(&self, id: impl Into<TxId>) {
        self.rejected.lock().insert(id.into());
    }

    /// Number of `verify` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TransactionVerifier for NullVerifier {
    fn verify(&self, tx: &Transaction) -> Result<(), VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.rejected.lock().contains(&tx.id) {
            return Err(VerifyError::InvalidSignature(tx.id.to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}
