//! Sub-block assembler: cuts pooled transactions into Draft sub-blocks.
//!
//! Assembly is a single call to [`TransactionPool::take_batch`], so the
//! select-and-remove step is atomic with respect to concurrent assemblers.
//! Every sub-block created here stays tracked as *pending* until the
//! committer either finalizes it or releases it back to the pool.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use meridian_types::{Clock, SubBlock, SubBlockId, SubBlockStatus, TxId, ValidatorId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{MempoolError, TransactionPool};

/// What to do when the pool holds fewer transactions than requested.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// Batch whatever is available (at least one transaction).
    #[default]
    AllowPartial,
    /// Fail with `InsufficientPoolSize` and drain nothing.
    RequireFull,
}

/// Assembler tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblerConfig {
    /// Hard cap on transactions per sub-block; larger requests are capped.
    pub max_sub_block_size: usize,
    pub policy: BatchPolicy,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_sub_block_size: 256,
            policy: BatchPolicy::AllowPartial,
        }
    }
}

#[derive(Default)]
struct Pending {
    by_seq: BTreeMap<u64, SubBlock>,
    index: HashMap<SubBlockId, u64>,
}

impl Pending {
    fn get_mut(&mut self, id: &SubBlockId) -> Option<&mut SubBlock> {
        let seq = *self.index.get(id)?;
        self.by_seq.get_mut(&seq)
    }

    fn remove(&mut self, id: &SubBlockId) -> Option<SubBlock> {
        let seq = self.index.remove(id)?;
        self.by_seq.remove(&seq)
    }
}

/// Builds sub-blocks from the pool and tracks them until settled.
pub struct SubBlockAssembler {
    pool: Arc<TransactionPool>,
    clock: Arc<dyn Clock>,
    config: AssemblerConfig,
    sequence: AtomicU64,
    pending: Mutex<Pending>,
}

impl SubBlockAssembler {
    pub fn new(pool: Arc<TransactionPool>, clock: Arc<dyn Clock>, config: AssemblerConfig) -> Self {
        Self {
            pool,
            clock,
            config,
            sequence: AtomicU64::new(0),
            pending: Mutex::new(Pending::default()),
        }
    }

    pub fn pool(&self) -> &Arc<TransactionPool> {
        &self.pool
    }

    pub fn config(&self) -> AssemblerConfig {
        self.config
    }

    /// Drain up to `requested` of the oldest pooled transactions into a new
    /// Draft sub-block.
    ///
    /// The request is capped at `max_sub_block_size`. Under
    /// [`BatchPolicy::AllowPartial`] a short pool yields a smaller sub-block;
    /// under [`BatchPolicy::RequireFull`] it fails without draining. An
    /// empty pool always fails with `InsufficientPoolSize`.
    pub fn create_sub_block(&self, requested: usize) -> Result<SubBlock, MempoolError> {
        if requested == 0 {
            return Err(MempoolError::InvalidParameter(
                "requested sub-block size must be at least 1".into(),
            ));
        }
        let max = requested.min(self.config.max_sub_block_size.max(1));
        let min = match self.config.policy {
            BatchPolicy::AllowPartial => 1,
            BatchPolicy::RequireFull => max,
        };
        let tx_ids = self.pool.take_batch(max, min)?;

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let assembled_at = self.clock.now();
        let id = meridian_crypto::sub_block_id(seq, assembled_at, &tx_ids);
        let sub_block = SubBlock::new(id, tx_ids, assembled_at);

        let mut pending = self.pending.lock();
        pending.index.insert(id, seq);
        pending.by_seq.insert(seq, sub_block.clone());
        drop(pending);

        tracing::info!(
            sub_block = %id,
            txs = sub_block.len(),
            requested,
            "sub-block assembled"
        );
        Ok(sub_block)
    }

    /// Sub-blocks assembled but not yet committed or released, oldest first.
    pub fn list_pending(&self) -> Vec<SubBlock> {
        self.pending.lock().by_seq.values().cloned().collect()
    }

    pub fn get_pending(&self, id: &SubBlockId) -> Result<SubBlock, MempoolError> {
        let mut pending = self.pending.lock();
        pending
            .get_mut(id)
            .map(|sb| sb.clone())
            .ok_or_else(|| MempoolError::NotFound(format!("sub-block {id}")))
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().index.len()
    }

    /// Claim a pending Draft sub-block for commit (Draft → PendingCommit).
    ///
    /// Only one caller can claim a given sub-block; a second claim fails
    /// with `InvalidSubBlockTransition`. Returns the tracked copy, which is
    /// the authoritative transaction list.
    pub fn begin_commit(&self, id: &SubBlockId) -> Result<SubBlock, MempoolError> {
        let mut pending = self.pending.lock();
        let sub_block = pending
            .get_mut(id)
            .ok_or_else(|| MempoolError::NotFound(format!("sub-block {id}")))?;
        let from = sub_block.status();
        if !sub_block.transition(SubBlockStatus::PendingCommit) {
            return Err(MempoolError::InvalidSubBlockTransition {
                from,
                to: SubBlockStatus::PendingCommit,
            });
        }
        Ok(sub_block.clone())
    }

    /// Record the validator assigned to a pending sub-block.
    pub fn assign_validator(
        &self,
        id: &SubBlockId,
        validator: ValidatorId,
    ) -> Result<(), MempoolError> {
        let mut pending = self.pending.lock();
        let sub_block = pending
            .get_mut(id)
            .ok_or_else(|| MempoolError::NotFound(format!("sub-block {id}")))?;
        sub_block.assign_validator(validator);
        Ok(())
    }

    /// Settle a committed sub-block: its transactions become Committed and
    /// it stops being tracked. Returns the final sub-block.
    pub fn finalize(&self, id: &SubBlockId) -> Result<SubBlock, MempoolError> {
        let (sub_block, ()) = self.settle(id, SubBlockStatus::Committed, |txs| {
            self.pool.settle_committed(txs)
        })?;
        Ok(sub_block)
    }

    /// Reject a sub-block: its transactions return to the pool in their
    /// original relative order and it stops being tracked.
    pub fn release(&self, id: &SubBlockId) -> Result<SubBlock, MempoolError> {
        let (sub_block, restored) =
            self.settle(id, SubBlockStatus::Rejected, |txs| self.pool.restore(txs))?;
        tracing::info!(sub_block = %id, restored, "sub-block released back to pool");
        Ok(sub_block)
    }

    /// Apply the pool side of a terminal transition, then stop tracking the
    /// sub-block. A failed pool operation leaves it pending.
    fn settle<R>(
        &self,
        id: &SubBlockId,
        to: SubBlockStatus,
        apply: impl FnOnce(&[TxId]) -> Result<R, MempoolError>,
    ) -> Result<(SubBlock, R), MempoolError> {
        let tracked = {
            let mut pending = self.pending.lock();
            let sub_block = pending
                .get_mut(id)
                .ok_or_else(|| MempoolError::NotFound(format!("sub-block {id}")))?;
            if !sub_block.status().can_transition_to(to) {
                return Err(MempoolError::InvalidSubBlockTransition {
                    from: sub_block.status(),
                    to,
                });
            }
            sub_block.clone()
        };
        let out = apply(tracked.tx_ids())?;
        let mut sub_block = self.pending.lock().remove(id).unwrap_or(tracked);
        sub_block.transition(to);
        Ok((sub_block, out))
    }

    /// Transaction ids of every pending sub-block, for invariant checks.
    pub fn pending_tx_ids(&self) -> Vec<TxId> {
        self.pending
            .lock()
            .by_seq
            .values()
            .flat_map(|sb| sb.tx_ids().iter().cloned())
            .collect()
    }
}
