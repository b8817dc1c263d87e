//! The Meridian node facade.
//!
//! [`MeridianNode`] owns one instance of every pipeline stage and exposes
//! the operations a presentation layer needs: transaction submission, pool
//! inspection, sub-block assembly and commit, consensus administration, and
//! ledger queries. External collaborators are injected through
//! [`Collaborators`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use meridian_audit::{
    AuditLog, AuditLogEntry, AuditOperation, AuditSink, Audited, JsonlAuditSink, MemoryAuditSink,
};
use meridian_consensus::{ActivityAction, ActivityDetails, ActivityRecord, ConsensusEngine};
use meridian_crypto::{AcceptAll, TransactionVerifier};
use meridian_ledger::{CommitReceipt, CommitterConfig, LedgerCommitter};
use meridian_mempool::{
    AssemblerConfig, MempoolError, SubBlockAssembler, TransactionPool, TransactionRecordStore,
};
use meridian_nullables::{NullLedger, NullRegistry};
use meridian_store::{Ledger, ValidatorRegistry};
use meridian_types::{
    Address, Clock, ConsensusParams, ParticipationStatus, RewardDistributionMode, SubBlock,
    SubBlockId, SystemClock, Transaction, TxId, TxStatus, ValidatorId, ValidatorRecord,
    ValidatorSelectionMode,
};

use crate::{tracing_spans, NodeConfig, NodeError, NodeMetrics};

/// The external systems the pipeline talks to.
pub struct Collaborators {
    pub ledger: Arc<dyn Ledger>,
    pub registry: Arc<dyn ValidatorRegistry>,
    pub verifier: Arc<dyn TransactionVerifier>,
    pub audit_sink: Arc<dyn AuditSink>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// In-memory ledger and registry seeded from the config's genesis
    /// sections, structural verification only, and the wall clock.
    ///
    /// The audit sink is a JSONL file when `audit_log_path` is set.
    pub fn in_memory(config: &NodeConfig) -> Result<Self, NodeError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let ledger = if config.enforce_balances {
            NullLedger::with_balance_checks()
        } else {
            NullLedger::new()
        };
        for account in &config.genesis_accounts {
            ledger.credit(account.address.as_str(), u128::from(account.balance));
        }

        let now = clock.now();
        let registry = NullRegistry::with_validators(config.validators.iter().map(|v| {
            ValidatorRecord::new(v.id.as_str(), u128::from(v.stake), v.participation)
                .with_last_active(now)
        }));

        let audit_sink: Arc<dyn AuditSink> = match &config.audit_log_path {
            Some(path) => Arc::new(JsonlAuditSink::open(path.clone())?),
            None => Arc::new(MemoryAuditSink::new()),
        };

        Ok(Self {
            ledger: Arc::new(ledger),
            registry: Arc::new(registry),
            verifier: Arc::new(AcceptAll),
            audit_sink,
            clock,
        })
    }
}

pub struct MeridianNode {
    config: NodeConfig,
    pool: Arc<TransactionPool>,
    assembler: Arc<SubBlockAssembler>,
    engine: Arc<ConsensusEngine>,
    committer: LedgerCommitter,
    verifier: Arc<dyn TransactionVerifier>,
    metrics: Option<NodeMetrics>,
    cycles: AtomicU64,
}

impl MeridianNode {
    pub fn new(config: NodeConfig, collaborators: Collaborators) -> Result<Self, NodeError> {
        config.validate()?;
        let Collaborators {
            ledger,
            registry,
            verifier,
            audit_sink,
            clock,
        } = collaborators;

        let records = Arc::new(TransactionRecordStore::new());
        let pool = Arc::new(TransactionPool::new(records, config.pool_capacity));
        let assembler = Arc::new(SubBlockAssembler::new(
            pool.clone(),
            clock.clone(),
            AssemblerConfig {
                max_sub_block_size: config.max_sub_block_size,
                policy: config.batch_policy,
            },
        ));
        let audit = Arc::new(AuditLog::new(audit_sink, clock.clone())?);
        let engine = Arc::new(ConsensusEngine::new(
            config.consensus.clone(),
            registry,
            audit,
            clock.clone(),
        )?);
        let committer = LedgerCommitter::new(
            assembler.clone(),
            engine.clone(),
            ledger,
            clock,
            CommitterConfig {
                reward_per_sub_block: u128::from(config.reward_per_sub_block),
                enforce_balances: config.enforce_balances,
            },
        );
        let metrics = if config.enable_metrics {
            Some(NodeMetrics::new()?)
        } else {
            None
        };

        tracing::info!(
            pool_capacity = config.pool_capacity,
            max_sub_block_size = config.max_sub_block_size,
            validators = config.validators.len(),
            selection = %engine.validator_selection_mode(),
            rewards = %engine.reward_distribution_mode(),
            "meridian node initialised"
        );

        let node = Self {
            config,
            pool,
            assembler,
            engine,
            committer,
            verifier,
            metrics,
            cycles: AtomicU64::new(0),
        };
        node.refresh_gauges();
        Ok(node)
    }

    /// A node backed by [`Collaborators::in_memory`].
    pub fn in_memory(config: NodeConfig) -> Result<Self, NodeError> {
        let collaborators = Collaborators::in_memory(&config)?;
        Self::new(config, collaborators)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<ConsensusEngine> {
        &self.engine
    }

    pub fn assembler(&self) -> &Arc<SubBlockAssembler> {
        &self.assembler
    }

    pub fn committer(&self) -> &LedgerCommitter {
        &self.committer
    }

    pub fn metrics(&self) -> Option<&NodeMetrics> {
        self.metrics.as_ref()
    }

    // ── Pool ────────────────────────────────────────────────────────────

    /// Verify a transaction and admit it to the pool.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<(), NodeError> {
        let span = tracing_spans::submit_span(&tx.id);
        let _enter = span.enter();

        if let Err(e) = self.verifier.verify(&tx) {
            tracing::warn!(tx = %tx.id, verifier = self.verifier.name(), reason = %e, "transaction failed verification");
            self.count(|m| m.transactions_rejected.inc());
            return Err(NodeError::VerificationFailed {
                tx: tx.id,
                reason: e.to_string(),
            });
        }
        match self.pool.add(tx) {
            Ok(()) => {
                self.count(|m| m.transactions_submitted.inc());
                self.refresh_gauges();
                Ok(())
            }
            Err(e) => {
                self.count(|m| m.transactions_rejected.inc());
                Err(e.into())
            }
        }
    }

    /// Drop a pooled transaction. Removing an absent id is a no-op.
    pub fn remove_transaction(&self, id: &TxId) -> bool {
        let removed = self.pool.remove(id);
        self.refresh_gauges();
        removed
    }

    pub fn get_transaction(&self, id: &TxId) -> Result<Transaction, NodeError> {
        Ok(self.pool.get(id)?)
    }

    /// Pooled transactions in admission order.
    pub fn list_transactions(&self) -> Vec<Transaction> {
        self.pool.list()
    }

    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }

    /// Reject every pooled transaction. Returns how many were dropped.
    pub fn clear_pool(&self) -> usize {
        let cleared = self.pool.clear();
        self.refresh_gauges();
        cleared
    }

    // ── Sub-blocks ──────────────────────────────────────────────────────

    pub fn create_sub_block(&self, size: usize) -> Result<SubBlock, NodeError> {
        let span = tracing_spans::assemble_span(size);
        let _enter = span.enter();

        let sub_block = self.assembler.create_sub_block(size)?;
        self.count(|m| m.sub_blocks_assembled.inc());
        self.refresh_gauges();
        Ok(sub_block)
    }

    /// Sub-blocks awaiting commit, oldest first.
    pub fn list_pending_sub_blocks(&self) -> Vec<SubBlock> {
        self.assembler.list_pending()
    }

    pub fn commit_sub_block(&self, id: &SubBlockId) -> Result<CommitReceipt, NodeError> {
        let span = tracing_spans::commit_span(id);
        let _enter = span.enter();

        let sub_block = self.assembler.get_pending(id)?;
        let result = self.committer.commit(&sub_block);
        match &result {
            Ok(receipt) => self.count(|m| {
                m.sub_blocks_committed.inc();
                m.commit_latency_ms.observe(receipt.elapsed.as_secs_f64() * 1_000.0);
            }),
            Err(_) => self.count(|m| m.sub_blocks_rejected.inc()),
        }
        self.refresh_gauges();
        Ok(result?)
    }

    /// One assemble → commit cycle with the configured batch size.
    ///
    /// Returns `Ok(None)` when the pool had nothing to batch.
    pub fn run_cycle(&self) -> Result<Option<CommitReceipt>, NodeError> {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed);
        let span = tracing_spans::pipeline_cycle_span(cycle);
        let _enter = span.enter();

        let sub_block = match self.create_sub_block(self.config.default_batch_size) {
            Ok(sb) => sb,
            Err(NodeError::Mempool(MempoolError::InsufficientPoolSize { .. })) => {
                tracing::trace!(pool = self.pool_size(), "nothing to batch");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        self.commit_sub_block(&sub_block.id()).map(Some)
    }

    // ── Consensus administration ────────────────────────────────────────

    pub fn consensus_params(&self) -> ConsensusParams {
        self.engine.params()
    }

    pub fn adjust_difficulty(
        &self,
        actor: &str,
        level: u64,
        reason: &str,
    ) -> Result<Audited<u64>, NodeError> {
        let prev = self.engine.adjust_difficulty(actor, level, reason)?;
        self.refresh_gauges();
        Ok(prev)
    }

    pub fn difficulty(&self) -> u64 {
        self.engine.difficulty()
    }

    /// Feed an externally measured assembly-to-commit latency.
    pub fn monitor_block_generation(
        &self,
        sub_block: &SubBlockId,
        elapsed: Duration,
    ) -> Audited<Option<u64>> {
        let retuned = self.engine.monitor_block_generation(sub_block, elapsed);
        self.refresh_gauges();
        retuned
    }

    pub fn enable_audit(&self, actor: &str) -> Audited<bool> {
        self.engine.enable_audit(actor)
    }

    pub fn disable_audit(&self, actor: &str) -> Audited<bool> {
        self.engine.disable_audit(actor)
    }

    pub fn audit_enabled(&self) -> bool {
        self.engine.audit_enabled()
    }

    pub fn set_reward_distribution_mode(
        &self,
        actor: &str,
        mode: RewardDistributionMode,
    ) -> Audited<RewardDistributionMode> {
        self.engine.set_reward_distribution_mode(actor, mode)
    }

    pub fn reward_distribution_mode(&self) -> RewardDistributionMode {
        self.engine.reward_distribution_mode()
    }

    pub fn set_validator_selection_mode(
        &self,
        actor: &str,
        mode: ValidatorSelectionMode,
    ) -> Audited<ValidatorSelectionMode> {
        self.engine.set_validator_selection_mode(actor, mode)
    }

    pub fn validator_selection_mode(&self) -> ValidatorSelectionMode {
        self.engine.validator_selection_mode()
    }

    pub fn track_participation(
        &self,
        validator: &ValidatorId,
        status: ParticipationStatus,
    ) -> Result<Audited<f64>, NodeError> {
        Ok(self.engine.track_participation(validator, status)?)
    }

    /// Pick the validator for a pending sub-block and record the assignment
    /// on it, so a later commit re-validates that validator instead of
    /// selecting again.
    pub fn select_validator(&self, id: &SubBlockId) -> Result<Audited<ValidatorId>, NodeError> {
        let sub_block = self.assembler.get_pending(id)?;
        let selected = self.engine.select_validator(&sub_block)?;
        self.assembler.assign_validator(id, selected.value.clone())?;
        Ok(selected)
    }

    pub fn validate_activity(
        &self,
        validator: &ValidatorId,
        action: ActivityAction,
        details: ActivityDetails,
    ) -> Result<Audited<()>, NodeError> {
        Ok(self.engine.validate_activity(validator, action, details)?)
    }

    pub fn set_poh_threshold(&self, actor: &str, threshold: f64) -> Result<Audited<f64>, NodeError> {
        Ok(self.engine.set_poh_threshold(actor, threshold)?)
    }

    pub fn poh_threshold(&self) -> f64 {
        self.engine.poh_threshold()
    }

    pub fn enable_dynamic_stake_adjustment(&self, actor: &str) -> Result<Audited<bool>, NodeError> {
        Ok(self.engine.enable_dynamic_stake_adjustment(actor)?)
    }

    pub fn disable_dynamic_stake_adjustment(&self, actor: &str) -> Audited<bool> {
        self.engine.disable_dynamic_stake_adjustment(actor)
    }

    pub fn set_blacklisted(
        &self,
        actor: &str,
        validator: &ValidatorId,
        blacklisted: bool,
    ) -> Result<Audited<bool>, NodeError> {
        Ok(self.engine.set_blacklisted(actor, validator, blacklisted)?)
    }

    pub fn effective_weight(&self, validator: &ValidatorId) -> Result<u128, NodeError> {
        Ok(self.engine.effective_weight(validator)?)
    }

    pub fn audit_entries(&self) -> Result<Vec<AuditLogEntry>, NodeError> {
        Ok(self.engine.audit_log().entries()?)
    }

    pub fn audit_entries_for(
        &self,
        operation: AuditOperation,
    ) -> Result<Vec<AuditLogEntry>, NodeError> {
        Ok(self.engine.audit_log().entries_for(operation)?)
    }

    /// Most recent activity validations, newest first.
    pub fn activity_log(&self, limit: usize) -> Vec<ActivityRecord> {
        self.engine.activity_log(limit)
    }

    // ── Ledger queries ──────────────────────────────────────────────────

    pub fn transaction_status(&self, id: &TxId) -> Result<Option<TxStatus>, NodeError> {
        Ok(self.committer.transaction_status(id)?)
    }

    pub fn transaction_history(
        &self,
        address: &Address,
        limit: usize,
    ) -> Result<Vec<Transaction>, NodeError> {
        Ok(self.committer.transaction_history(address, limit)?)
    }

    pub fn ledger_height(&self) -> Result<u64, NodeError> {
        Ok(self.committer.ledger().height()?)
    }

    // ── Metrics ─────────────────────────────────────────────────────────

    fn count(&self, f: impl FnOnce(&NodeMetrics)) {
        if let Some(m) = &self.metrics {
            f(m);
        }
    }

    fn refresh_gauges(&self) {
        let Some(m) = &self.metrics else {
            return;
        };
        m.pool_size.set(self.pool.size() as i64);
        m.pending_sub_blocks.set(self.assembler.pending_len() as i64);
        m.difficulty.set(self.engine.difficulty() as i64);
        match self.committer.ledger().height() {
            Ok(h) => m.ledger_height.set(h as i64),
            Err(e) => tracing::debug!(error = %e, "ledger height unavailable for metrics"),
        }
    }
}
