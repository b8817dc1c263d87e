//! Transaction record store: canonical transaction state keyed by id.
//!
//! Pool, assembler, and committer never hold transaction bodies of their
//! own; they refer to transactions by [`TxId`] and read or advance the state
//! here. A transaction's status names the stage that currently owns it, and
//! every status change goes through the lifecycle table in
//! [`TxStatus::can_transition_to`].
//!
//! Records that reach a terminal status are archived: only the id and the
//! final status are kept, which is enough to answer status queries and to
//! refuse id reuse.

use std::collections::HashMap;

use meridian_types::{Transaction, TxId, TxStatus};
use parking_lot::RwLock;

use crate::MempoolError;

#[derive(Default)]
struct Records {
    live: HashMap<TxId, Transaction>,
    archive: HashMap<TxId, TxStatus>,
}

impl Records {
    fn check(&self, id: &TxId, to: TxStatus) -> Result<(), MempoolError> {
        match self.live.get(id) {
            Some(tx) if tx.status.can_transition_to(to) => Ok(()),
            Some(tx) => Err(MempoolError::InvalidTransition {
                id: id.clone(),
                from: tx.status,
                to,
            }),
            None => match self.archive.get(id) {
                Some(&from) => Err(MempoolError::InvalidTransition {
                    id: id.clone(),
                    from,
                    to,
                }),
                None => Err(MempoolError::NotFound(id.to_string())),
            },
        }
    }

    fn apply(&mut self, id: &TxId, to: TxStatus) {
        if to.is_terminal() {
            if self.live.remove(id).is_some() {
                self.archive.insert(id.clone(), to);
            }
        } else if let Some(tx) = self.live.get_mut(id) {
            tx.status = to;
        }
    }
}

/// Arena of transaction records, safe to share across threads.
#[derive(Default)]
pub struct TransactionRecordStore {
    inner: RwLock<Records>,
}

impl TransactionRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new transaction in `Pending` status.
    ///
    /// Fails with [`MempoolError::DuplicateTransaction`] if the id has ever
    /// been seen, including archived ids.
    pub fn insert(&self, mut tx: Transaction) -> Result<(), MempoolError> {
        let mut records = self.inner.write();
        if records.live.contains_key(&tx.id) || records.archive.contains_key(&tx.id) {
            return Err(MempoolError::DuplicateTransaction(tx.id));
        }
        tx.status = TxStatus::Pending;
        records.live.insert(tx.id.clone(), tx);
        Ok(())
    }

    /// Fetch a live (non-archived) transaction.
    pub fn get(&self, id: &TxId) -> Result<Transaction, MempoolError> {
        self.inner
            .read()
            .live
            .get(id)
            .cloned()
            .ok_or_else(|| MempoolError::NotFound(id.to_string()))
    }

    /// Fetch several live transactions, preserving the order of `ids`.
    pub fn get_many(&self, ids: &[TxId]) -> Result<Vec<Transaction>, MempoolError> {
        let records = self.inner.read();
        ids.iter()
            .map(|id| {
                records
                    .live
                    .get(id)
                    .cloned()
                    .ok_or_else(|| MempoolError::NotFound(id.to_string()))
            })
            .collect()
    }

    /// Current status, live or archived.
    pub fn status(&self, id: &TxId) -> Option<TxStatus> {
        let records = self.inner.read();
        records
            .live
            .get(id)
            .map(|tx| tx.status)
            .or_else(|| records.archive.get(id).copied())
    }

    /// Whether the id has ever been registered.
    pub fn contains(&self, id: &TxId) -> bool {
        let records = self.inner.read();
        records.live.contains_key(id) || records.archive.contains_key(id)
    }

    /// Advance one transaction's status.
    pub fn transition(&self, id: &TxId, to: TxStatus) -> Result<(), MempoolError> {
        let mut records = self.inner.write();
        records.check(id, to)?;
        records.apply(id, to);
        Ok(())
    }

    /// Advance every listed transaction, or none of them.
    pub fn transition_all(&self, ids: &[TxId], to: TxStatus) -> Result<(), MempoolError> {
        let mut records = self.inner.write();
        for id in ids {
            records.check(id, to)?;
        }
        for id in ids {
            records.apply(id, to);
        }
        Ok(())
    }

    /// Number of non-terminal records.
    pub fn live_len(&self) -> usize {
        self.inner.read().live.len()
    }

    /// Number of terminal (archived) records.
    pub fn archived_len(&self) -> usize {
        self.inner.read().archive.len()
    }
}
