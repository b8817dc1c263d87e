//! Sub-block commit.
//!
//! A commit runs in two phases. The consensus phase (validator resolution,
//! PoH threshold, activity validation) runs without the append lock, so
//! commits of different sub-blocks overlap. The ledger phase (per-transaction
//! validation, reward computation, append) runs under the committer's append
//! lock, which keeps validation and append atomic with respect to each other.
//!
//! There are no retries. Any failure rejects the sub-block and restores its
//! transactions to the pool in their original order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use meridian_audit::{AuditError, AuditEvent, AuditOperation};
use meridian_consensus::{ActivityAction, ActivityDetails, ConsensusEngine, ConsensusError};
use meridian_mempool::SubBlockAssembler;
use meridian_store::{CommittedSubBlock, Ledger, RewardShare, StoreError};
use meridian_types::{
    Address, Clock, SubBlock, SubBlockStatus, Timestamp, Transaction, TxId, TxStatus, ValidatorId,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{CommitError, CommitErrorKind};

const COMMITTER_ACTOR: &str = "committer";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitterConfig {
    /// Reward split among validators for every committed sub-block.
    pub reward_per_sub_block: u128,
    /// Refuse transfers the sender's running balance cannot cover.
    pub enforce_balances: bool,
}

impl Default for CommitterConfig {
    fn default() -> Self {
        Self {
            reward_per_sub_block: 1_000,
            enforce_balances: true,
        }
    }
}

/// Outcome of a successful commit.
#[derive(Clone, Debug, PartialEq)]
pub struct CommitReceipt {
    /// The sub-block in its final, Committed state.
    pub sub_block: SubBlock,
    pub validator: ValidatorId,
    /// Ledger height after the append.
    pub height: u64,
    pub rewards: Vec<RewardShare>,
    pub difficulty: u64,
    pub committed_at: Timestamp,
    /// Assembly-to-commit latency fed into difficulty retuning.
    pub elapsed: Duration,
    /// New difficulty, if this commit triggered a retune that moved it.
    pub retuned_difficulty: Option<u64>,
    /// First audit write that failed during the commit, if any.
    pub audit_warning: Option<AuditError>,
}

pub struct LedgerCommitter {
    assembler: Arc<SubBlockAssembler>,
    engine: Arc<ConsensusEngine>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    config: CommitterConfig,
    append_lock: Mutex<()>,
}

impl LedgerCommitter {
    pub fn new(
        assembler: Arc<SubBlockAssembler>,
        engine: Arc<ConsensusEngine>,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
        config: CommitterConfig,
    ) -> Self {
        Self {
            assembler,
            engine,
            ledger,
            clock,
            config,
            append_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> CommitterConfig {
        self.config
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Commit a pending sub-block.
    ///
    /// The assembler's tracked copy is authoritative for the transaction
    /// list; from `sub_block` only the id and any pre-assigned validator are
    /// used.
    pub fn commit(&self, sub_block: &SubBlock) -> Result<CommitReceipt, CommitError> {
        let id = sub_block.id();
        let span = tracing::info_span!("commit", sub_block = %id, txs = sub_block.len());
        let _enter = span.enter();

        let claimed = self.assembler.begin_commit(&id).map_err(|e| CommitError {
            sub_block: id,
            kind: e.into(),
            restored: Vec::new(),
        })?;
        let preassigned = sub_block.validator().or(claimed.validator()).cloned();

        match self.try_commit(&claimed, preassigned) {
            Ok(receipt) => Ok(receipt),
            Err(kind) => Err(self.reject(&claimed, kind)),
        }
    }

    fn try_commit(
        &self,
        claimed: &SubBlock,
        preassigned: Option<ValidatorId>,
    ) -> Result<CommitReceipt, CommitErrorKind> {
        let id = claimed.id();
        let mut warnings = Vec::new();

        let validator = match preassigned {
            Some(v) => {
                if !self.engine.is_eligible(&v)? {
                    return Err(ConsensusError::ActivityViolation {
                        validator: v,
                        reason: "pre-assigned validator is not eligible".into(),
                    }
                    .into());
                }
                v
            }
            None => {
                let selected = self.engine.select_validator(claimed)?;
                warnings.extend(selected.audit_warning);
                selected.value
            }
        };
        self.assembler.assign_validator(&id, validator.clone())?;

        self.engine.check_poh(&validator)?;
        let activity = self.engine.validate_activity(
            &validator,
            ActivityAction::Commit,
            ActivityDetails::for_sub_block(id),
        )?;
        warnings.extend(activity.audit_warning);

        let transactions = self
            .assembler
            .pool()
            .records()
            .get_many(claimed.tx_ids())?;

        let (height, rewards, difficulty, committed_at) = {
            let _append = self.append_lock.lock();
            self.validate_transactions(&transactions)?;

            let rewards = self
                .engine
                .compute_rewards(&validator, self.config.reward_per_sub_block)?;
            let difficulty = self.engine.difficulty();
            let committed_at = self.clock.now();

            let mut final_block = claimed.clone();
            final_block.assign_validator(validator.clone());
            final_block.transition(SubBlockStatus::Committed);
            let entry = CommittedSubBlock {
                sub_block: final_block,
                transactions: transactions
                    .into_iter()
                    .map(|mut tx| {
                        tx.status = TxStatus::Committed;
                        tx
                    })
                    .collect(),
                validator: validator.clone(),
                rewards: rewards.clone(),
                difficulty,
                committed_at,
            };
            let height = self.ledger.append_sub_block(entry)?;
            (height, rewards, difficulty, committed_at)
        };

        // The ledger now holds the sub-block; nothing below may reject it.
        let final_block = match self.assembler.finalize(&id) {
            Ok(sb) => sb,
            Err(e) => {
                tracing::error!(sub_block = %id, error = %e, "committed sub-block could not be finalized in the assembler");
                let mut sb = claimed.clone();
                sb.assign_validator(validator.clone());
                sb.transition(SubBlockStatus::Committed);
                sb
            }
        };

        match self.engine.on_sub_block_committed(&id, &validator) {
            Ok(credited) => warnings.extend(credited.audit_warning),
            Err(e) => {
                tracing::warn!(sub_block = %id, validator = %validator, error = %e, "post-commit consensus update failed")
            }
        }

        let elapsed = claimed.assembled_at().elapsed_since(committed_at);
        let retune = self.engine.monitor_block_generation(&id, elapsed);
        warnings.extend(retune.audit_warning);

        let audit = self.engine.record_audit(
            AuditEvent::new(AuditOperation::SubBlockCommitted, COMMITTER_ACTOR)
                .after(height)
                .reason(format!(
                    "sub-block {id} with {} transactions by {validator}",
                    final_block.len()
                )),
        );
        warnings.extend(audit.err());

        tracing::info!(
            sub_block = %id,
            validator = %validator,
            height,
            txs = final_block.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "sub-block committed"
        );

        Ok(CommitReceipt {
            sub_block: final_block,
            validator,
            height,
            rewards,
            difficulty,
            committed_at,
            elapsed,
            retuned_difficulty: retune.value,
            audit_warning: warnings.into_iter().next(),
        })
    }

    /// Check every transaction in order against the ledger and the earlier
    /// transactions of the same sub-block. Runs under the append lock.
    fn validate_transactions(&self, transactions: &[Transaction]) -> Result<(), CommitErrorKind> {
        let mut nonces: HashMap<&Address, u64> = HashMap::new();
        let mut balances: HashMap<&Address, u128> = HashMap::new();

        for tx in transactions {
            if self.ledger.contains_transaction(&tx.id)? {
                return Err(CommitErrorKind::LedgerConflict(format!(
                    "transaction {} is already in the ledger",
                    tx.id
                )));
            }

            let last = match nonces.get(&tx.sender) {
                Some(n) => Some(*n),
                None => self.ledger.last_nonce(&tx.sender)?,
            };
            if let Some(last) = last {
                if tx.nonce <= last {
                    return Err(CommitErrorKind::LedgerConflict(format!(
                        "transaction {} nonce {} is not above {} for {}",
                        tx.id, tx.nonce, last, tx.sender
                    )));
                }
            }
            nonces.insert(&tx.sender, tx.nonce);

            if self.config.enforce_balances {
                let available = match balances.get(&tx.sender) {
                    Some(b) => *b,
                    None => self.ledger.balance(&tx.sender)?,
                };
                if available < tx.amount {
                    return Err(CommitErrorKind::LedgerConflict(format!(
                        "transaction {}: {} has {} but sends {}",
                        tx.id, tx.sender, available, tx.amount
                    )));
                }
                balances.insert(&tx.sender, available - tx.amount);
                let received = match balances.get(&tx.receiver) {
                    Some(b) => *b,
                    None => self.ledger.balance(&tx.receiver)?,
                };
                balances.insert(&tx.receiver, received.saturating_add(tx.amount));
            }
        }
        Ok(())
    }

    fn reject(&self, claimed: &SubBlock, kind: CommitErrorKind) -> CommitError {
        let id = claimed.id();
        let restored = match self.assembler.release(&id) {
            Ok(sb) => sb.tx_ids().to_vec(),
            Err(e) => {
                tracing::error!(sub_block = %id, error = %e, "rejected sub-block could not be released");
                Vec::new()
            }
        };
        tracing::warn!(sub_block = %id, code = %kind.code(), reason = %kind, restored = restored.len(), "sub-block rejected");

        if let Err(e) = self.engine.record_audit(
            AuditEvent::new(AuditOperation::SubBlockRejected, COMMITTER_ACTOR)
                .reason(format!("sub-block {id}"))
                .failed(kind.to_string()),
        ) {
            tracing::warn!(sub_block = %id, error = %e, "rejection not audited");
        }

        CommitError {
            sub_block: id,
            kind,
            restored,
        }
    }

    /// Status from the pipeline if it still tracks the id, otherwise from
    /// the ledger.
    pub fn transaction_status(&self, id: &TxId) -> Result<Option<TxStatus>, StoreError> {
        match self.assembler.pool().records().status(id) {
            Some(status) => Ok(Some(status)),
            None => self.ledger.transaction_status(id),
        }
    }

    /// Most recent committed transactions touching `address`, newest first.
    pub fn transaction_history(
        &self,
        address: &Address,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.ledger.history(address, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_audit::{AuditLog, MemoryAuditSink};
    use meridian_consensus::ConsensusConfig;
    use meridian_mempool::{AssemblerConfig, TransactionPool, TransactionRecordStore};
    use meridian_nullables::{NullClock, NullLedger, NullRegistry};
    use meridian_types::{ErrorCode, RewardDistributionMode, ValidatorRecord};

    struct Fixture {
        committer: LedgerCommitter,
        assembler: Arc<SubBlockAssembler>,
        engine: Arc<ConsensusEngine>,
        ledger: Arc<NullLedger>,
        clock: Arc<NullClock>,
    }

    fn fixture(validators: Vec<ValidatorRecord>) -> Fixture {
        let clock = Arc::new(NullClock::new(1_000));
        let records = Arc::new(TransactionRecordStore::new());
        let pool = Arc::new(TransactionPool::with_default_capacity(records));
        let assembler = Arc::new(SubBlockAssembler::new(
            pool,
            clock.clone(),
            AssemblerConfig::default(),
        ));
        let registry = Arc::new(NullRegistry::with_validators(validators));
        let audit = Arc::new(AuditLog::new(Arc::new(MemoryAuditSink::new()), clock.clone()).unwrap());
        let engine = Arc::new(
            ConsensusEngine::new(ConsensusConfig::default(), registry, audit, clock.clone()).unwrap(),
        );
        let ledger = Arc::new(NullLedger::with_balance_checks());
        ledger.credit("alice", 1_000);
        let committer = LedgerCommitter::new(
            assembler.clone(),
            engine.clone(),
            ledger.clone(),
            clock.clone(),
            CommitterConfig::default(),
        );
        Fixture {
            committer,
            assembler,
            engine,
            ledger,
            clock,
        }
    }

    fn one_validator(participation: f64) -> Vec<ValidatorRecord> {
        vec![ValidatorRecord::new("v1", 100, participation)]
    }

    fn submit(f: &Fixture, id: &str, amount: u128, nonce: u64) {
        f.assembler
            .pool()
            .add(Transaction::new(id, "alice", "bob", amount, nonce, f.clock.now()))
            .unwrap();
    }

    #[test]
    fn commit_appends_and_settles() {
        let f = fixture(one_validator(0.9));
        submit(&f, "t1", 100, 1);
        submit(&f, "t2", 50, 2);
        let sb = f.assembler.create_sub_block(10).unwrap();
        f.clock.advance(Duration::from_millis(300));

        let receipt = f.committer.commit(&sb).unwrap();
        assert_eq!(receipt.height, 1);
        assert_eq!(receipt.validator, ValidatorId::new("v1"));
        assert_eq!(receipt.sub_block.status(), SubBlockStatus::Committed);
        assert_eq!(receipt.elapsed, Duration::from_millis(300));
        assert_eq!(receipt.difficulty, 10);
        assert!(receipt.audit_warning.is_none());
        assert_eq!(
            receipt.rewards,
            vec![RewardShare {
                validator: ValidatorId::new("v1"),
                amount: 1_000
            }]
        );

        assert_eq!(f.ledger.height().unwrap(), 1);
        assert_eq!(f.ledger.balance(&Address::new("alice")).unwrap(), 850);
        assert_eq!(f.ledger.balance(&Address::new("bob")).unwrap(), 150);
        assert_eq!(f.ledger.reward_balance(&ValidatorId::new("v1")).unwrap(), 1_000);
        assert_eq!(f.assembler.pending_len(), 0);
        assert!(f.assembler.pool().is_empty());
        assert_eq!(
            f.committer.transaction_status(&TxId::new("t1")).unwrap(),
            Some(TxStatus::Committed)
        );
    }

    #[test]
    fn poh_below_threshold_restores_in_order() {
        let f = fixture(one_validator(0.6));
        f.engine.set_poh_threshold("ops", 0.8).unwrap();
        for (i, id) in ["t1", "t2", "t3"].into_iter().enumerate() {
            submit(&f, id, 1, i as u64 + 1);
        }
        let sb = f.assembler.create_sub_block(10).unwrap();

        let err = f.committer.commit(&sb).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PoHThresholdNotMet);
        assert!(matches!(
            err.kind,
            CommitErrorKind::Consensus(ConsensusError::PohThresholdNotMet { .. })
        ));
        let ids: Vec<TxId> = ["t1", "t2", "t3"].into_iter().map(TxId::new).collect();
        assert_eq!(err.restored, ids);
        assert_eq!(f.assembler.pool().ids(), ids);
        assert_eq!(f.assembler.pending_len(), 0);
        assert_eq!(f.ledger.height().unwrap(), 0);
        assert_eq!(
            f.committer.transaction_status(&ids[0]).unwrap(),
            Some(TxStatus::Pooled)
        );
    }

    #[test]
    fn stale_nonce_is_a_ledger_conflict() {
        let f = fixture(one_validator(0.9));
        submit(&f, "t1", 10, 1);
        let first = f.assembler.create_sub_block(10).unwrap();
        f.committer.commit(&first).unwrap();

        submit(&f, "t2", 10, 1);
        let second = f.assembler.create_sub_block(10).unwrap();
        let err = f.committer.commit(&second).unwrap_err();
        assert_eq!(err.code(), ErrorCode::LedgerConflict);
        assert_eq!(err.restored, vec![TxId::new("t2")]);
        assert_eq!(f.ledger.height().unwrap(), 1);
    }

    #[test]
    fn nonces_must_rise_within_a_sub_block() {
        let f = fixture(one_validator(0.9));
        submit(&f, "t1", 10, 5);
        submit(&f, "t2", 10, 5);
        let sb = f.assembler.create_sub_block(10).unwrap();
        let err = f.committer.commit(&sb).unwrap_err();
        assert!(matches!(err.kind, CommitErrorKind::LedgerConflict(_)));
        assert_eq!(err.restored.len(), 2);
    }

    #[test]
    fn overdraft_is_rejected_when_balances_enforced() {
        let f = fixture(one_validator(0.9));
        submit(&f, "t1", 600, 1);
        submit(&f, "t2", 600, 2);
        let sb = f.assembler.create_sub_block(10).unwrap();
        let err = f.committer.commit(&sb).unwrap_err();
        assert_eq!(err.code(), ErrorCode::LedgerConflict);
        assert_eq!(f.ledger.balance(&Address::new("alice")).unwrap(), 1_000);
    }

    #[test]
    fn second_commit_of_same_sub_block_fails_without_restoring() {
        let f = fixture(one_validator(0.9));
        submit(&f, "t1", 10, 1);
        let sb = f.assembler.create_sub_block(10).unwrap();
        f.committer.commit(&sb).unwrap();

        let err = f.committer.commit(&sb).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(err.restored.is_empty());
        assert_eq!(f.ledger.height().unwrap(), 1);
    }

    #[test]
    fn unknown_sub_block_is_not_found() {
        let f = fixture(one_validator(0.9));
        let ghost = SubBlock::new(
            meridian_types::SubBlockId::new([9; 32]),
            vec![TxId::new("ghost")],
            Timestamp::from_millis(1),
        );
        let err = f.committer.commit(&ghost).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(err.restored.is_empty());
    }

    #[test]
    fn no_validators_rejects_and_audits() {
        let f = fixture(Vec::new());
        submit(&f, "t1", 10, 1);
        let sb = f.assembler.create_sub_block(10).unwrap();
        let err = f.committer.commit(&sb).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoEligibleValidator);
        assert_eq!(f.assembler.pool().size(), 1);

        let rejected = f
            .engine
            .audit_log()
            .entries_for(AuditOperation::SubBlockRejected)
            .unwrap();
        assert_eq!(rejected.len(), 1);
        assert!(!rejected[0].outcome.is_success());
    }

    #[test]
    fn commit_is_audited() {
        let f = fixture(one_validator(0.9));
        submit(&f, "t1", 10, 1);
        let sb = f.assembler.create_sub_block(10).unwrap();
        f.committer.commit(&sb).unwrap();
        let committed = f
            .engine
            .audit_log()
            .entries_for(AuditOperation::SubBlockCommitted)
            .unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].after.as_deref(), Some("1"));
    }

    #[test]
    fn ineligible_preassigned_validator_is_refused() {
        let f = fixture(vec![
            ValidatorRecord::new("v1", 100, 0.9),
            ValidatorRecord::new("v2", 100, 0.9),
        ]);
        f.engine.set_blacklisted("ops", &ValidatorId::new("v2"), true).unwrap();
        submit(&f, "t1", 10, 1);
        let mut sb = f.assembler.create_sub_block(10).unwrap();
        sb.assign_validator(ValidatorId::new("v2"));

        let err = f.committer.commit(&sb).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ActivityViolation);
        assert_eq!(err.restored, vec![TxId::new("t1")]);
    }

    #[test]
    fn equal_split_pays_every_eligible_validator() {
        let f = fixture(vec![
            ValidatorRecord::new("v1", 100, 0.9),
            ValidatorRecord::new("v2", 100, 0.9),
        ]);
        f.engine
            .set_reward_distribution_mode("ops", RewardDistributionMode::EqualSplit);
        submit(&f, "t1", 10, 1);
        let sb = f.assembler.create_sub_block(10).unwrap();
        let receipt = f.committer.commit(&sb).unwrap();
        let total: u128 = receipt.rewards.iter().map(|r| r.amount).sum();
        assert_eq!(total, 1_000);
        assert_eq!(receipt.rewards.len(), 2);
    }

    #[test]
    fn unavailable_ledger_restores_transactions() {
        let f = fixture(one_validator(0.9));
        submit(&f, "t1", 10, 1);
        let sb = f.assembler.create_sub_block(10).unwrap();
        f.ledger.set_unavailable(true);
        let err = f.committer.commit(&sb).unwrap_err();
        assert_eq!(err.code(), ErrorCode::StorageUnavailable);
        assert_eq!(f.assembler.pool().ids(), vec![TxId::new("t1")]);
    }
}
