//! Transaction pool: concurrent FIFO holding area for uncommitted transactions.
//!
//! Every transaction is stamped with an admission sequence number. The queue
//! is a `BTreeMap` ordered by that number, so draining takes the oldest
//! entries and a transaction returned from a rejected sub-block slots back
//! into its original position rather than the tail.
//!
//! A single mutex guards membership and order. Admission, eviction, batch
//! draining and restoration are each one critical section, which is what
//! rules out double insertion and a transaction landing in two sub-blocks.
//! Lock order is pool → record store, never the reverse.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use meridian_types::{Transaction, TxId, TxStatus};
use parking_lot::Mutex;

use crate::{MempoolError, TransactionRecordStore};

/// Default maximum number of pooled transactions.
pub const DEFAULT_POOL_CAPACITY: usize = 10_000;

#[derive(Default)]
struct PoolInner {
    /// Admission sequence → id, oldest first.
    queue: BTreeMap<u64, TxId>,
    /// Pooled id → admission sequence.
    members: HashMap<TxId, u64>,
    /// Drained-but-uncommitted id → admission sequence, kept for restore.
    batched: HashMap<TxId, u64>,
    next_seq: u64,
}

/// Thread-safe transaction pool.
pub struct TransactionPool {
    inner: Mutex<PoolInner>,
    records: Arc<TransactionRecordStore>,
    capacity: usize,
}

impl TransactionPool {
    pub fn new(records: Arc<TransactionRecordStore>, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
            records,
            capacity,
        }
    }

    pub fn with_default_capacity(records: Arc<TransactionRecordStore>) -> Self {
        Self::new(records, DEFAULT_POOL_CAPACITY)
    }

    /// The shared record store backing this pool.
    pub fn records(&self) -> &Arc<TransactionRecordStore> {
        &self.records
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Admit a transaction (Pending → Pooled).
    pub fn add(&self, tx: Transaction) -> Result<(), MempoolError> {
        let mut inner = self.inner.lock();
        if inner.members.contains_key(&tx.id) || self.records.contains(&tx.id) {
            return Err(MempoolError::DuplicateTransaction(tx.id));
        }
        if inner.queue.len() >= self.capacity {
            return Err(MempoolError::PoolFull {
                capacity: self.capacity,
            });
        }

        let id = tx.id.clone();
        self.records.insert(tx)?;
        self.records.transition(&id, TxStatus::Pooled)?;

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.queue.insert(seq, id.clone());
        inner.members.insert(id.clone(), seq);
        tracing::debug!(tx = %id, seq, size = inner.queue.len(), "transaction pooled");
        Ok(())
    }

    /// Evict a pooled transaction. Absent ids are a no-op.
    ///
    /// Returns whether anything was evicted. Evicted transactions become
    /// `Rejected`, so the id cannot be re-added later.
    pub fn remove(&self, id: &TxId) -> bool {
        let mut inner = self.inner.lock();
        let Some(seq) = inner.members.remove(id) else {
            return false;
        };
        inner.queue.remove(&seq);
        if let Err(e) = self.records.transition(id, TxStatus::Rejected) {
            tracing::error!(tx = %id, error = %e, "evicted transaction had inconsistent record");
        }
        tracing::debug!(tx = %id, "transaction evicted from pool");
        true
    }

    /// Fetch a pooled transaction.
    pub fn get(&self, id: &TxId) -> Result<Transaction, MempoolError> {
        let inner = self.inner.lock();
        if !inner.members.contains_key(id) {
            return Err(MempoolError::NotFound(id.to_string()));
        }
        self.records.get(id)
    }

    /// Whether `id` is currently pooled.
    pub fn contains(&self, id: &TxId) -> bool {
        self.inner.lock().members.contains_key(id)
    }

    /// Snapshot of all pooled transactions, oldest first.
    pub fn list(&self) -> Vec<Transaction> {
        let inner = self.inner.lock();
        let ids: Vec<TxId> = inner.queue.values().cloned().collect();
        match self.records.get_many(&ids) {
            Ok(txs) => txs,
            Err(e) => {
                tracing::error!(error = %e, "pool and record store disagree");
                Vec::new()
            }
        }
    }

    /// Snapshot of pooled ids, oldest first.
    pub fn ids(&self) -> Vec<TxId> {
        self.inner.lock().queue.values().cloned().collect()
    }

    pub fn size(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Number of transactions drained into sub-blocks but not yet settled.
    pub fn batched_len(&self) -> usize {
        self.inner.lock().batched.len()
    }

    /// Emergency reset: evict every pooled transaction.
    ///
    /// Batched transactions are untouched; they belong to sub-blocks.
    /// Returns the number discarded.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let ids: Vec<TxId> = inner.queue.values().cloned().collect();
        if let Err(e) = self.records.transition_all(&ids, TxStatus::Rejected) {
            tracing::error!(error = %e, "pool clear found inconsistent records");
            for id in &ids {
                if let Err(e) = self.records.transition(id, TxStatus::Rejected) {
                    tracing::error!(tx = %id, error = %e, "could not reject cleared transaction");
                }
            }
        }
        inner.queue.clear();
        inner.members.clear();
        tracing::warn!(discarded = ids.len(), "transaction pool cleared");
        ids.len()
    }

    /// Atomically drain up to `max` of the oldest transactions (Pooled → Batched).
    ///
    /// Fails with [`MempoolError::InsufficientPoolSize`], draining nothing,
    /// when fewer than `max(min, 1)` transactions are pooled.
    pub fn take_batch(&self, max: usize, min: usize) -> Result<Vec<TxId>, MempoolError> {
        let mut inner = self.inner.lock();
        let available = inner.queue.len();
        if available == 0 || available < min.max(1) {
            return Err(MempoolError::InsufficientPoolSize {
                requested: max,
                available,
            });
        }

        let picked: Vec<(u64, TxId)> = inner
            .queue
            .iter()
            .take(max)
            .map(|(seq, id)| (*seq, id.clone()))
            .collect();
        let ids: Vec<TxId> = picked.iter().map(|(_, id)| id.clone()).collect();
        self.records.transition_all(&ids, TxStatus::Batched)?;

        for (seq, id) in picked {
            inner.queue.remove(&seq);
            inner.members.remove(&id);
            inner.batched.insert(id, seq);
        }
        Ok(ids)
    }

    /// Return batched transactions to the pool at their original positions
    /// (Batched → Pooled).
    ///
    /// Capacity is not checked: admitted work is never dropped. All-or-nothing;
    /// returns the number restored.
    pub fn restore(&self, ids: &[TxId]) -> Result<usize, MempoolError> {
        let mut inner = self.inner.lock();
        for id in ids {
            if !inner.batched.contains_key(id) {
                return Err(MempoolError::NotFound(id.to_string()));
            }
        }
        self.records.transition_all(ids, TxStatus::Pooled)?;
        for id in ids {
            if let Some(seq) = inner.batched.remove(id) {
                inner.queue.insert(seq, id.clone());
                inner.members.insert(id.clone(), seq);
            }
        }
        Ok(ids.len())
    }

    /// Mark batched transactions as durably committed (Batched → Committed).
    pub fn settle_committed(&self, ids: &[TxId]) -> Result<(), MempoolError> {
        let mut inner = self.inner.lock();
        self.records.transition_all(ids, TxStatus::Committed)?;
        for id in ids {
            inner.batched.remove(id);
        }
        Ok(())
    }
}
