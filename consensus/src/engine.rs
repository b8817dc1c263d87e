//! Consensus engine: owns the consensus parameters and every decision
//! derived from them.
//!
//! Administrative operations take an `actor` that ends up in the audit
//! entry. Mutating operations return [`Audited`]: the operation itself has
//! succeeded, but `audit_warning` is set when its audit entry could not be
//! stored.
//!
//! Locking: the params lock is held only across a read or a single
//! read-modify-write; a retune computes its new level under that write lock
//! from the level it replaces. Participation updates are serialized by their
//! own mutex, the only lock held while calling the validator registry. No
//! lock is held while calling the audit log.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use meridian_audit::{AuditError, AuditEvent, AuditLog, AuditOperation, Audited};
use meridian_store::{RewardShare, StoreError, ValidatorRegistry};
use meridian_types::{
    Clock, ConsensusParams, DifficultyBounds, ParticipationStatus, RewardDistributionMode,
    SubBlock, SubBlockId, Timestamp, ValidatorId, ValidatorRecord, ValidatorSelectionMode,
};
use parking_lot::{Mutex, RwLock};

use crate::activity::{
    ActivityAction, ActivityDetails, ActivityLog, ActivityRecord, Assignments, RateLimiter,
};
use crate::difficulty::{DifficultyPolicy, MovingAverageRetarget, TimingWindow};
use crate::participation::next_score;
use crate::rewards;
use crate::selection::{
    best_scoring, stake_weighted, Candidate, HybridPolicy, ParticipationWeightedStake,
    RoundRobinCursor,
};
use crate::stake::{effective_weight, StakeWeights};
use crate::{ConsensusConfig, ConsensusError};

/// Actor recorded for decisions the engine makes on its own.
pub const SYSTEM_ACTOR: &str = "consensus";

/// Reason recorded for automatic difficulty changes.
pub const RETUNE_REASON: &str = "automatic retune";

const ASSIGNMENT_CAPACITY: usize = 4_096;

pub struct ConsensusEngine {
    config: ConsensusConfig,
    params: RwLock<ConsensusParams>,
    registry: Arc<dyn ValidatorRegistry>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    difficulty_policy: Box<dyn DifficultyPolicy>,
    hybrid_policy: Box<dyn HybridPolicy>,
    timing: Mutex<TimingWindow>,
    round_robin: Mutex<RoundRobinCursor>,
    hybrid_ties: Mutex<RoundRobinCursor>,
    limiter: Mutex<RateLimiter>,
    activity: Mutex<ActivityLog>,
    assignments: Mutex<Assignments>,
    weights: RwLock<StakeWeights>,
    participation: Mutex<()>,
}

impl ConsensusEngine {
    pub fn new(
        config: ConsensusConfig,
        registry: Arc<dyn ValidatorRegistry>,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConsensusError> {
        config.validate()?;
        let engine = Self {
            params: RwLock::new(config.params.clone()),
            difficulty_policy: Box::new(MovingAverageRetarget::new(
                config.target_block_time_ms,
                config.max_retune_step_pct,
            )),
            hybrid_policy: Box::new(ParticipationWeightedStake),
            timing: Mutex::new(TimingWindow::new(config.timing_window, config.retune_interval)),
            round_robin: Mutex::new(RoundRobinCursor::default()),
            hybrid_ties: Mutex::new(RoundRobinCursor::default()),
            limiter: Mutex::new(RateLimiter::new(
                config.rate_window(),
                config.max_actions_per_window,
            )),
            activity: Mutex::new(ActivityLog::new(config.activity_log_capacity)),
            assignments: Mutex::new(Assignments::new(ASSIGNMENT_CAPACITY)),
            weights: RwLock::new(StakeWeights::new()),
            participation: Mutex::new(()),
            config,
            registry,
            audit,
            clock,
        };
        if engine.params.read().dynamic_stake {
            engine.rebuild_weights()?;
        }
        Ok(engine)
    }

    pub fn with_difficulty_policy(mut self, policy: impl DifficultyPolicy + 'static) -> Self {
        self.difficulty_policy = Box::new(policy);
        self
    }

    pub fn with_hybrid_policy(mut self, policy: impl HybridPolicy + 'static) -> Self {
        self.hybrid_policy = Box::new(policy);
        self
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Snapshot of the current parameters.
    pub fn params(&self) -> ConsensusParams {
        self.params.read().clone()
    }

    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    // ── Difficulty ──────────────────────────────────────────────────────

    pub fn difficulty(&self) -> u64 {
        self.params.read().difficulty
    }

    pub fn difficulty_bounds(&self) -> DifficultyBounds {
        self.config.difficulty_bounds
    }

    /// Set the difficulty level. Returns the previous level.
    pub fn adjust_difficulty(
        &self,
        actor: &str,
        new_level: u64,
        reason: &str,
    ) -> Result<Audited<u64>, ConsensusError> {
        let bounds = self.config.difficulty_bounds;
        if !bounds.contains(new_level) {
            return Err(ConsensusError::InvalidParameter(format!(
                "difficulty {new_level} outside {}..={}",
                bounds.min, bounds.max
            )));
        }
        Ok(self.update(actor, AuditOperation::DifficultyAdjusted, Some(reason), false, |p| {
            let prev = p.difficulty;
            p.difficulty = new_level;
            (prev, new_level)
        }))
    }

    /// Feed one assembly-to-commit latency sample.
    ///
    /// Returns the new level when this sample triggered a retune that moved
    /// the difficulty.
    pub fn monitor_block_generation(
        &self,
        sub_block: &SubBlockId,
        elapsed: Duration,
    ) -> Audited<Option<u64>> {
        let samples = {
            let mut timing = self.timing.lock();
            if !timing.record(elapsed) {
                tracing::debug!(sub_block = %sub_block, elapsed_ms = elapsed.as_millis() as u64, "timing sample recorded");
                return Audited::clean(None);
            }
            timing.samples()
        };

        let (current, next) = {
            let mut params = self.params.write();
            let current = params.difficulty;
            let next = self
                .difficulty_policy
                .retarget(current, &samples, self.config.difficulty_bounds);
            params.difficulty = next;
            (current, next)
        };
        if next == current {
            tracing::debug!(difficulty = current, policy = self.difficulty_policy.name(), "retune kept difficulty");
            return Audited::clean(None);
        }
        let audit = self.announce(
            SYSTEM_ACTOR,
            AuditOperation::DifficultyAdjusted,
            Some(RETUNE_REASON),
            false,
            current,
            next,
        );
        Audited::new(Some(next), audit)
    }

    // ── Audit toggle ────────────────────────────────────────────────────

    pub fn enable_audit(&self, actor: &str) -> Audited<bool> {
        self.set_audit(actor, true)
    }

    pub fn disable_audit(&self, actor: &str) -> Audited<bool> {
        self.set_audit(actor, false)
    }

    pub fn audit_enabled(&self) -> bool {
        self.params.read().audit_enabled
    }

    fn set_audit(&self, actor: &str, enabled: bool) -> Audited<bool> {
        // Toggles are recorded even when turning auditing off.
        self.update(actor, AuditOperation::AuditToggled, None, true, |p| {
            let prev = p.audit_enabled;
            p.audit_enabled = enabled;
            (prev, enabled)
        })
    }

    // ── Modes and thresholds ────────────────────────────────────────────

    pub fn set_reward_distribution_mode(
        &self,
        actor: &str,
        mode: RewardDistributionMode,
    ) -> Audited<RewardDistributionMode> {
        self.update(actor, AuditOperation::RewardModeChanged, None, false, |p| {
            let prev = p.reward_mode;
            p.reward_mode = mode;
            (prev, mode)
        })
    }

    pub fn reward_distribution_mode(&self) -> RewardDistributionMode {
        self.params.read().reward_mode
    }

    pub fn set_validator_selection_mode(
        &self,
        actor: &str,
        mode: ValidatorSelectionMode,
    ) -> Audited<ValidatorSelectionMode> {
        self.update(actor, AuditOperation::SelectionModeChanged, None, false, |p| {
            let prev = p.selection_mode;
            p.selection_mode = mode;
            (prev, mode)
        })
    }

    pub fn validator_selection_mode(&self) -> ValidatorSelectionMode {
        self.params.read().selection_mode
    }

    pub fn set_poh_threshold(
        &self,
        actor: &str,
        threshold: f64,
    ) -> Result<Audited<f64>, ConsensusError> {
        if !ConsensusParams::is_valid_threshold(threshold) {
            return Err(ConsensusError::InvalidParameter(format!(
                "PoH threshold {threshold} not in [0, 1]"
            )));
        }
        Ok(self.update(actor, AuditOperation::PohThresholdChanged, None, false, |p| {
            let prev = p.poh_threshold;
            p.poh_threshold = threshold;
            (prev, threshold)
        }))
    }

    pub fn poh_threshold(&self) -> f64 {
        self.params.read().poh_threshold
    }

    /// Participation score of `validator` if it meets the PoH threshold.
    pub fn check_poh(&self, validator: &ValidatorId) -> Result<f64, ConsensusError> {
        let record = self.lookup(validator)?;
        let threshold = self.poh_threshold();
        if record.participation < threshold {
            return Err(ConsensusError::PohThresholdNotMet {
                validator: validator.clone(),
                score: record.participation,
                threshold,
            });
        }
        Ok(record.participation)
    }

    // ── Dynamic stake ───────────────────────────────────────────────────

    pub fn enable_dynamic_stake_adjustment(
        &self,
        actor: &str,
    ) -> Result<Audited<bool>, ConsensusError> {
        self.rebuild_weights()?;
        Ok(self.update(actor, AuditOperation::DynamicStakeToggled, None, false, |p| {
            let prev = p.dynamic_stake;
            p.dynamic_stake = true;
            (prev, true)
        }))
    }

    pub fn disable_dynamic_stake_adjustment(&self, actor: &str) -> Audited<bool> {
        self.update(actor, AuditOperation::DynamicStakeToggled, None, false, |p| {
            let prev = p.dynamic_stake;
            p.dynamic_stake = false;
            (prev, false)
        })
    }

    /// Selection weight of one validator under the current stake mode.
    pub fn effective_weight(&self, validator: &ValidatorId) -> Result<u128, ConsensusError> {
        let record = self.lookup(validator)?;
        let dynamic = self.params.read().dynamic_stake;
        Ok(self.weight_of(&record, dynamic))
    }

    fn rebuild_weights(&self) -> Result<u128, ConsensusError> {
        let records = self.registry.validators()?;
        let mut weights = self.weights.write();
        weights.rebuild(&records, self.config.stake_floor);
        Ok(weights.total())
    }

    fn weight_of(&self, record: &ValidatorRecord, dynamic: bool) -> u128 {
        if !dynamic {
            return record.stake;
        }
        self.weights
            .read()
            .weight(&record.id)
            .unwrap_or_else(|| effective_weight(record.stake, record.participation, self.config.stake_floor))
    }

    // ── Participation ───────────────────────────────────────────────────

    /// Update a validator's participation score. Returns the new score.
    pub fn track_participation(
        &self,
        validator: &ValidatorId,
        status: ParticipationStatus,
    ) -> Result<Audited<f64>, ConsensusError> {
        let (record, score) = {
            let _serial = self.participation.lock();
            let record = self.lookup(validator)?;
            let score = next_score(record.participation, status, self.config.participation_alpha);
            let last_active = match status {
                ParticipationStatus::Participated => Some(self.clock.now()),
                ParticipationStatus::Missed => None,
            };
            self.registry
                .update_participation(validator, score, last_active)?;
            (record, score)
        };

        tracing::debug!(validator = %validator, ?status, from = record.participation, to = score, "participation updated");
        let audit = self.record_audit(
            AuditEvent::new(AuditOperation::ParticipationTracked, validator.as_str())
                .change(Score(record.participation), Score(score))
                .reason(match status {
                    ParticipationStatus::Participated => "participated",
                    ParticipationStatus::Missed => "missed",
                }),
        );
        Ok(Audited::new(score, audit))
    }

    pub fn set_blacklisted(
        &self,
        actor: &str,
        validator: &ValidatorId,
        blacklisted: bool,
    ) -> Result<Audited<bool>, ConsensusError> {
        let record = self.lookup(validator)?;
        self.registry.set_blacklisted(validator, blacklisted)?;
        tracing::info!(validator = %validator, blacklisted, actor, "validator blacklist flag changed");
        let audit = self.record_audit(
            AuditEvent::new(AuditOperation::ValidatorBlacklisted, actor)
                .change(record.blacklisted, blacklisted)
                .reason(format!("validator {validator}")),
        );
        Ok(Audited::new(record.blacklisted, audit))
    }

    // ── Selection ───────────────────────────────────────────────────────

    /// Validators currently allowed to finalize sub-blocks, sorted by id.
    pub fn eligible_validators(&self) -> Result<Vec<Candidate>, ConsensusError> {
        let records = self.registry.validators()?;
        let now = self.clock.now();
        let dynamic = self.params.read().dynamic_stake;
        let mut candidates: Vec<Candidate> = records
            .iter()
            .filter(|r| self.record_eligible(r, now))
            .map(|r| Candidate {
                id: r.id.clone(),
                weight: self.weight_of(r, dynamic),
                participation: r.participation,
            })
            .collect();
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(candidates)
    }

    pub fn is_eligible(&self, validator: &ValidatorId) -> Result<bool, ConsensusError> {
        let record = self.lookup(validator)?;
        Ok(self.record_eligible(&record, self.clock.now()))
    }

    fn record_eligible(&self, record: &ValidatorRecord, now: Timestamp) -> bool {
        if record.blacklisted || record.participation < self.config.min_participation {
            return false;
        }
        match self.config.activity_window() {
            Some(window) => record.last_active.is_within(window, now),
            None => true,
        }
    }

    /// Assign a validator to finalize `sub_block` under the active mode.
    pub fn select_validator(&self, sub_block: &SubBlock) -> Result<Audited<ValidatorId>, ConsensusError> {
        let candidates = self.eligible_validators()?;
        let mode = self.validator_selection_mode();
        let chosen = match mode {
            ValidatorSelectionMode::StakeWeighted => {
                let seed = meridian_crypto::selection_seed(&sub_block.id());
                stake_weighted(&candidates, seed).map(|c| c.id.clone())
            }
            ValidatorSelectionMode::RoundRobin => self
                .round_robin
                .lock()
                .advance(candidates.len())
                .map(|i| candidates[i].id.clone()),
            ValidatorSelectionMode::Hybrid => {
                let best = best_scoring(&candidates, self.hybrid_policy.as_ref());
                self.hybrid_ties
                    .lock()
                    .advance(best.len())
                    .map(|i| best[i].id.clone())
            }
        };
        let Some(chosen) = chosen else {
            tracing::warn!(sub_block = %sub_block.id(), %mode, candidates = candidates.len(), "no eligible validator");
            return Err(ConsensusError::NoEligibleValidator);
        };

        self.assignments.lock().assign(sub_block.id(), chosen.clone());
        tracing::info!(sub_block = %sub_block.id(), validator = %chosen, %mode, "validator selected");
        let audit = self.record_audit(
            AuditEvent::new(AuditOperation::ValidatorSelected, SYSTEM_ACTOR)
                .after(&chosen)
                .reason(format!("sub-block {} via {mode}", sub_block.id())),
        );
        Ok(Audited::new(chosen, audit))
    }

    /// Validator previously assigned to `sub_block`, if still remembered.
    pub fn assignment(&self, sub_block: &SubBlockId) -> Option<ValidatorId> {
        self.assignments.lock().get(sub_block).cloned()
    }

    // ── Activity ────────────────────────────────────────────────────────

    /// Check that `validator` may perform `action` now.
    ///
    /// Both outcomes land in the activity log. A violation is an error.
    pub fn validate_activity(
        &self,
        validator: &ValidatorId,
        action: ActivityAction,
        details: ActivityDetails,
    ) -> Result<Audited<()>, ConsensusError> {
        let now = self.clock.now();
        let violation = self.activity_violation(validator, &details, now)?;

        let event = AuditEvent::new(AuditOperation::ActivityValidated, validator.as_str())
            .reason(format!("{action}: {details}"));
        self.activity.lock().push(ActivityRecord {
            at: now,
            validator: validator.clone(),
            action,
            details,
            violation: violation.clone(),
        });

        match violation {
            None => Ok(Audited::new((), self.record_audit(event))),
            Some(reason) => {
                tracing::warn!(validator = %validator, %action, %reason, "activity violation");
                if let Err(e) = self.record_audit(event.failed(reason.clone())) {
                    tracing::warn!(validator = %validator, error = %e, "activity violation not audited");
                }
                Err(ConsensusError::ActivityViolation {
                    validator: validator.clone(),
                    reason,
                })
            }
        }
    }

    fn activity_violation(
        &self,
        validator: &ValidatorId,
        details: &ActivityDetails,
        now: Timestamp,
    ) -> Result<Option<String>, ConsensusError> {
        let record = match self.registry.get(validator) {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => return Ok(Some("unknown validator".into())),
            Err(e) => return Err(e.into()),
        };
        if record.blacklisted {
            return Ok(Some("validator is blacklisted".into()));
        }
        if let Some(id) = &details.sub_block {
            if let Some(assigned) = self.assignments.lock().get(id) {
                if assigned != validator {
                    return Ok(Some(format!("sub-block {id} is assigned to {assigned}")));
                }
            }
        }
        if !self.limiter.lock().try_acquire(validator, now) {
            return Ok(Some(format!(
                "more than {} actions within {} ms",
                self.config.max_actions_per_window, self.config.rate_window_ms
            )));
        }
        Ok(None)
    }

    /// Most recent activity outcomes, newest first.
    pub fn activity_log(&self, limit: usize) -> Vec<ActivityRecord> {
        self.activity.lock().recent(limit)
    }

    // ── Commit feedback and rewards ─────────────────────────────────────

    /// Credit the proposer of a committed sub-block and, with dynamic stake
    /// on, recompute every effective weight. Returns the proposer's new score.
    pub fn on_sub_block_committed(
        &self,
        sub_block: &SubBlockId,
        proposer: &ValidatorId,
    ) -> Result<Audited<f64>, ConsensusError> {
        let credited = self.track_participation(proposer, ParticipationStatus::Participated)?;
        let mut warning = credited.audit_warning;

        self.limiter.lock().cleanup(self.clock.now());

        if self.params.read().dynamic_stake {
            let before = self.weights.read().total();
            let after = self.rebuild_weights()?;
            tracing::debug!(sub_block = %sub_block, before, after, "stake weights rebalanced");
            let audit = self.record_audit(
                AuditEvent::new(AuditOperation::StakeRebalanced, SYSTEM_ACTOR)
                    .change(before, after)
                    .reason(format!("after sub-block {sub_block}")),
            );
            warning = warning.or(audit.err());
        }
        Ok(Audited {
            value: credited.value,
            audit_warning: warning,
        })
    }

    /// Split `amount` for a sub-block finalized by `proposer`.
    pub fn compute_rewards(
        &self,
        proposer: &ValidatorId,
        amount: u128,
    ) -> Result<Vec<RewardShare>, ConsensusError> {
        let mode = self.reward_distribution_mode();
        let candidates = match mode {
            RewardDistributionMode::ProposerOnly => Vec::new(),
            _ => self.eligible_validators()?,
        };
        Ok(rewards::distribute(mode, proposer, &candidates, amount))
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    fn lookup(&self, validator: &ValidatorId) -> Result<ValidatorRecord, ConsensusError> {
        self.registry.get(validator).map_err(|e| match e {
            StoreError::NotFound(_) => ConsensusError::ValidatorNotFound(validator.clone()),
            other => other.into(),
        })
    }

    /// Append an audit entry if auditing is enabled.
    pub fn record_audit(&self, event: AuditEvent) -> Result<(), AuditError> {
        if !self.audit_enabled() {
            return Ok(());
        }
        self.audit.record(event).map(|_| ())
    }

    /// Apply a parameter change and audit it. Returns the previous value.
    fn update<T: fmt::Display + Copy>(
        &self,
        actor: &str,
        operation: AuditOperation,
        reason: Option<&str>,
        always_audit: bool,
        apply: impl FnOnce(&mut ConsensusParams) -> (T, T),
    ) -> Audited<T> {
        let (prev, next) = {
            let mut params = self.params.write();
            apply(&mut *params)
        };
        let audit = self.announce(actor, operation, reason, always_audit, prev, next);
        Audited::new(prev, audit)
    }

    /// Log and audit a parameter change that has already been applied.
    fn announce<T: fmt::Display>(
        &self,
        actor: &str,
        operation: AuditOperation,
        reason: Option<&str>,
        always_audit: bool,
        prev: T,
        next: T,
    ) -> Result<(), AuditError> {
        tracing::info!(%operation, actor, from = %prev, to = %next, reason = reason.unwrap_or(""), "consensus parameter changed");

        let mut event = AuditEvent::new(operation, actor).change(prev, next);
        if let Some(reason) = reason {
            event = event.reason(reason);
        }
        if always_audit {
            self.audit.record(event).map(|_| ())
        } else {
            self.record_audit(event)
        }
    }
}

/// Participation score rendered for audit entries.
struct Score(f64);

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_audit::MemoryAuditSink;
    use meridian_nullables::{NullAuditSink, NullClock, NullRegistry};
    use meridian_types::{SubBlockStatus, TxId};

    struct Fixture {
        engine: ConsensusEngine,
        registry: Arc<NullRegistry>,
        clock: Arc<NullClock>,
    }

    fn fixture_with(config: ConsensusConfig, validators: Vec<ValidatorRecord>) -> Fixture {
        let clock = Arc::new(NullClock::new(1_000));
        let registry = Arc::new(NullRegistry::with_validators(validators));
        let audit = Arc::new(AuditLog::new(Arc::new(MemoryAuditSink::new()), clock.clone()).unwrap());
        let engine = ConsensusEngine::new(config, registry.clone(), audit, clock.clone()).unwrap();
        Fixture {
            engine,
            registry,
            clock,
        }
    }

    fn abc() -> Vec<ValidatorRecord> {
        vec![
            ValidatorRecord::new("c", 300, 0.9),
            ValidatorRecord::new("a", 100, 0.9),
            ValidatorRecord::new("b", 200, 0.9),
        ]
    }

    fn sub_block(byte: u8) -> SubBlock {
        SubBlock::new(
            SubBlockId::new([byte; 32]),
            vec![TxId::new(format!("tx-{byte}"))],
            Timestamp::from_millis(1_000),
        )
    }

    fn vid(id: &str) -> ValidatorId {
        ValidatorId::new(id)
    }

    #[test]
    fn adjust_difficulty_writes_one_audit_entry() {
        let f = fixture_with(ConsensusConfig::default(), abc());
        let before = f.engine.audit_log().len();

        let res = f.engine.adjust_difficulty("ops", 5, "load spike").unwrap();
        assert_eq!(res.value, 10);
        assert!(!res.is_degraded());
        assert_eq!(f.engine.difficulty(), 5);

        let entries = f.engine.audit_log().entries().unwrap();
        assert_eq!(entries.len() as u64, before + 1);
        let last = entries.last().unwrap();
        assert_eq!(last.operation, AuditOperation::DifficultyAdjusted);
        assert_eq!(last.before.as_deref(), Some("10"));
        assert_eq!(last.after.as_deref(), Some("5"));
        assert_eq!(last.reason.as_deref(), Some("load spike"));
        assert_eq!(last.actor, "ops");
    }

    #[test]
    fn adjust_difficulty_out_of_bounds_changes_nothing() {
        let f = fixture_with(ConsensusConfig::default(), abc());
        let err = f.engine.adjust_difficulty("ops", 0, "x").unwrap_err();
        assert_eq!(err.code(), meridian_types::ErrorCode::InvalidParameter);
        assert!(f.engine.adjust_difficulty("ops", 1_001, "x").is_err());
        assert_eq!(f.engine.difficulty(), 10);
        assert!(f.engine.audit_log().is_empty());
    }

    #[test]
    fn disabled_audit_skips_entries_but_toggle_is_recorded() {
        let f = fixture_with(ConsensusConfig::default(), abc());
        f.engine.disable_audit("ops");
        f.engine.adjust_difficulty("ops", 7, "quiet").unwrap();
        f.engine.enable_audit("ops");

        let ops: Vec<AuditOperation> = f
            .engine
            .audit_log()
            .entries()
            .unwrap()
            .iter()
            .map(|e| e.operation)
            .collect();
        assert_eq!(ops, vec![AuditOperation::AuditToggled, AuditOperation::AuditToggled]);
    }

    #[test]
    fn audit_sink_failure_degrades_but_applies() {
        let clock = Arc::new(NullClock::new(0));
        let sink = Arc::new(NullAuditSink::new());
        sink.set_failing(true);
        let audit = Arc::new(AuditLog::new(sink, clock.clone()).unwrap());
        let engine = ConsensusEngine::new(
            ConsensusConfig::default(),
            Arc::new(NullRegistry::with_validators(abc())),
            audit,
            clock,
        )
        .unwrap();

        let res = engine.adjust_difficulty("ops", 20, "x").unwrap();
        assert!(res.is_degraded());
        assert_eq!(engine.difficulty(), 20);
    }

    #[test]
    fn round_robin_cycles_in_id_order() {
        let f = fixture_with(ConsensusConfig::default(), abc());
        f.engine.set_validator_selection_mode("ops", ValidatorSelectionMode::RoundRobin);
        let picks: Vec<String> = (0..4)
            .map(|i| f.engine.select_validator(&sub_block(i)).unwrap().value.to_string())
            .collect();
        assert_eq!(picks, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn stake_weighted_is_deterministic_per_sub_block() {
        let f = fixture_with(ConsensusConfig::default(), abc());
        let sb = sub_block(9);
        let first = f.engine.select_validator(&sb).unwrap().value;
        for _ in 0..5 {
            assert_eq!(f.engine.select_validator(&sb).unwrap().value, first);
        }
        assert_eq!(f.engine.assignment(&sb.id()), Some(first));
    }

    #[test]
    fn stake_weighted_skips_zero_stake() {
        let f = fixture_with(
            ConsensusConfig::default(),
            vec![ValidatorRecord::new("a", 0, 1.0), ValidatorRecord::new("b", 50, 1.0)],
        );
        for i in 0..20 {
            assert_eq!(f.engine.select_validator(&sub_block(i)).unwrap().value, vid("b"));
        }
    }

    #[test]
    fn hybrid_prefers_score_and_rotates_ties() {
        let f = fixture_with(
            ConsensusConfig::default(),
            vec![
                ValidatorRecord::new("a", 100, 0.5),
                ValidatorRecord::new("b", 50, 1.0),
                ValidatorRecord::new("c", 40, 1.0),
            ],
        );
        f.engine.set_validator_selection_mode("ops", ValidatorSelectionMode::Hybrid);
        let picks: Vec<String> = (0..3)
            .map(|i| f.engine.select_validator(&sub_block(i)).unwrap().value.to_string())
            .collect();
        assert_eq!(picks, vec!["a", "b", "a"]);
    }

    #[test]
    fn ineligible_validators_are_never_selected() {
        let mut config = ConsensusConfig::default();
        config.min_participation = 0.5;
        config.activity_window_ms = Some(10_000);
        let f = fixture_with(
            config,
            vec![
                ValidatorRecord::new("idle", 100, 0.9),
                ValidatorRecord::new("low", 100, 0.2).with_last_active(Timestamp::from_millis(1_000)),
                ValidatorRecord::new("ok", 1, 0.9).with_last_active(Timestamp::from_millis(5_000)),
            ],
        );
        // "idle" and "low" were last seen more than 10s ago.
        f.clock.set(12_000);
        assert!(!f.engine.is_eligible(&vid("idle")).unwrap());
        for i in 0..10 {
            assert_eq!(f.engine.select_validator(&sub_block(i)).unwrap().value, vid("ok"));
        }

        f.engine.set_blacklisted("ops", &vid("ok"), true).unwrap();
        let err = f.engine.select_validator(&sub_block(0)).unwrap_err();
        assert_eq!(err, ConsensusError::NoEligibleValidator);
    }

    #[test]
    fn empty_registry_has_no_eligible_validator() {
        let f = fixture_with(ConsensusConfig::default(), Vec::new());
        assert_eq!(
            f.engine.select_validator(&sub_block(0)).unwrap_err(),
            ConsensusError::NoEligibleValidator
        );
    }

    #[test]
    fn track_participation_updates_registry() {
        let f = fixture_with(ConsensusConfig::default(), abc());
        f.clock.set(9_000);
        let score = f
            .engine
            .track_participation(&vid("a"), ParticipationStatus::Missed)
            .unwrap()
            .value;
        assert!((score - 0.72).abs() < 1e-9);
        let rec = f.registry.get(&vid("a")).unwrap();
        assert!((rec.participation - 0.72).abs() < 1e-9);
        assert_eq!(rec.last_active, Timestamp::EPOCH);

        f.engine
            .track_participation(&vid("a"), ParticipationStatus::Participated)
            .unwrap();
        assert_eq!(
            f.registry.get(&vid("a")).unwrap().last_active,
            Timestamp::from_millis(9_000)
        );
    }

    #[test]
    fn track_participation_unknown_validator() {
        let f = fixture_with(ConsensusConfig::default(), abc());
        let err = f
            .engine
            .track_participation(&vid("ghost"), ParticipationStatus::Participated)
            .unwrap_err();
        assert_eq!(err, ConsensusError::ValidatorNotFound(vid("ghost")));
    }

    #[test]
    fn poh_threshold_checks() {
        let f = fixture_with(
            ConsensusConfig::default(),
            vec![ValidatorRecord::new("v", 10, 0.6)],
        );
        f.engine.set_poh_threshold("ops", 0.8).unwrap();
        let err = f.engine.check_poh(&vid("v")).unwrap_err();
        assert_eq!(err.code(), meridian_types::ErrorCode::PoHThresholdNotMet);
        f.engine.set_poh_threshold("ops", 0.6).unwrap();
        assert_eq!(f.engine.check_poh(&vid("v")).unwrap(), 0.6);

        assert!(f.engine.set_poh_threshold("ops", 1.5).is_err());
        assert!(f.engine.set_poh_threshold("ops", f64::NAN).is_err());
        assert_eq!(f.engine.poh_threshold(), 0.6);
    }

    #[test]
    fn activity_rejects_wrong_validator_for_assignment() {
        let f = fixture_with(ConsensusConfig::default(), abc());
        f.engine.set_validator_selection_mode("ops", ValidatorSelectionMode::RoundRobin);
        let sb = sub_block(1);
        let assigned = f.engine.select_validator(&sb).unwrap().value;
        assert_eq!(assigned, vid("a"));

        let err = f
            .engine
            .validate_activity(&vid("b"), ActivityAction::Commit, ActivityDetails::for_sub_block(sb.id()))
            .unwrap_err();
        assert_eq!(err.code(), meridian_types::ErrorCode::ActivityViolation);
        f.engine
            .validate_activity(&vid("a"), ActivityAction::Commit, ActivityDetails::for_sub_block(sb.id()))
            .unwrap();

        let log = f.engine.activity_log(10);
        assert_eq!(log.len(), 2);
        assert!(log[0].accepted());
        assert!(!log[1].accepted());
    }

    #[test]
    fn activity_rate_limit_and_unknown_validator() {
        let mut config = ConsensusConfig::default();
        config.max_actions_per_window = 2;
        config.rate_window_ms = 1_000;
        let f = fixture_with(config, abc());
        let details = ActivityDetails::default().with_note("attest");

        f.engine.validate_activity(&vid("a"), ActivityAction::Attest, details.clone()).unwrap();
        f.engine.validate_activity(&vid("a"), ActivityAction::Attest, details.clone()).unwrap();
        assert!(f.engine.validate_activity(&vid("a"), ActivityAction::Attest, details.clone()).is_err());
        f.clock.advance(Duration::from_millis(1_001));
        f.engine.validate_activity(&vid("a"), ActivityAction::Attest, details.clone()).unwrap();

        assert!(matches!(
            f.engine.validate_activity(&vid("ghost"), ActivityAction::Propose, details),
            Err(ConsensusError::ActivityViolation { .. })
        ));
    }

    #[test]
    fn violation_is_reported_when_audit_write_fails() {
        let clock = Arc::new(NullClock::new(0));
        let sink = Arc::new(NullAuditSink::new());
        let audit = Arc::new(AuditLog::new(sink.clone(), clock.clone()).unwrap());
        let engine = ConsensusEngine::new(
            ConsensusConfig::default(),
            Arc::new(NullRegistry::with_validators(abc())),
            audit,
            clock,
        )
        .unwrap();
        sink.set_failing(true);

        let err = engine
            .validate_activity(&vid("ghost"), ActivityAction::Commit, ActivityDetails::default())
            .unwrap_err();
        assert_eq!(err.code(), meridian_types::ErrorCode::ActivityViolation);
        assert!(!engine.activity_log(1)[0].accepted());
        assert!(engine.audit_log().is_empty());
    }

    #[test]
    fn dynamic_stake_rebalances_after_commit() {
        let f = fixture_with(
            ConsensusConfig::default(),
            vec![ValidatorRecord::new("a", 1_000, 0.5), ValidatorRecord::new("b", 1_000, 0.0)],
        );
        assert_eq!(f.engine.effective_weight(&vid("a")).unwrap(), 1_000);
        f.engine.enable_dynamic_stake_adjustment("ops").unwrap();
        assert_eq!(f.engine.effective_weight(&vid("a")).unwrap(), 500);
        assert_eq!(f.engine.effective_weight(&vid("b")).unwrap(), 100);

        let score = f
            .engine
            .on_sub_block_committed(&SubBlockId::new([1; 32]), &vid("a"))
            .unwrap()
            .value;
        assert!((score - 0.6).abs() < 1e-9);
        assert_eq!(f.engine.effective_weight(&vid("a")).unwrap(), 600);

        f.engine.disable_dynamic_stake_adjustment("ops");
        assert_eq!(f.engine.effective_weight(&vid("a")).unwrap(), 1_000);
        assert_eq!(
            f.engine
                .audit_log()
                .entries_for(AuditOperation::StakeRebalanced)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn rewards_follow_mode() {
        let f = fixture_with(ConsensusConfig::default(), abc());
        let shares = f.engine.compute_rewards(&vid("b"), 1_000).unwrap();
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].validator, vid("b"));

        f.engine
            .set_reward_distribution_mode("ops", RewardDistributionMode::StakeWeighted);
        assert_eq!(f.engine.reward_distribution_mode(), RewardDistributionMode::StakeWeighted);
        let amounts: Vec<u128> = f
            .engine
            .compute_rewards(&vid("b"), 600)
            .unwrap()
            .iter()
            .map(|s| s.amount)
            .collect();
        assert_eq!(amounts, vec![100, 200, 300]);
    }

    #[test]
    fn retune_runs_every_interval() {
        let mut config = ConsensusConfig::default();
        config.target_block_time_ms = 1_000;
        config.timing_window = 4;
        config.retune_interval = 2;
        let f = fixture_with(config, abc());
        let id = SubBlockId::new([1; 32]);

        assert_eq!(f.engine.monitor_block_generation(&id, Duration::from_millis(2_000)).value, None);
        let retuned = f.engine.monitor_block_generation(&id, Duration::from_millis(2_000));
        assert_eq!(retuned.value, Some(8));
        assert_eq!(f.engine.difficulty(), 8);

        let last = f.engine.audit_log().entries().unwrap().pop().unwrap();
        assert_eq!(last.reason.as_deref(), Some(RETUNE_REASON));
        assert_eq!(last.actor, SYSTEM_ACTOR);
    }

    /// Pauses inside the first retarget until released, then adds one.
    struct GatedRetarget {
        entered: Mutex<Option<std::sync::mpsc::Sender<u64>>>,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl DifficultyPolicy for GatedRetarget {
        fn name(&self) -> &str {
            "gated"
        }

        fn retarget(&self, current: u64, _samples_ms: &[u64], _bounds: DifficultyBounds) -> u64 {
            if let Some(entered) = self.entered.lock().take() {
                let _ = entered.send(current);
                let _ = self.release.lock().recv();
            }
            current + 1
        }
    }

    #[test]
    fn retune_never_overwrites_a_concurrent_admin_change() {
        let mut config = ConsensusConfig::default();
        config.timing_window = 1;
        config.retune_interval = 1;
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let Fixture { engine, .. } = fixture_with(config, abc());
        let engine = engine.with_difficulty_policy(GatedRetarget {
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(release_rx),
        });
        let id = SubBlockId::new([1; 32]);

        std::thread::scope(|s| {
            let retune = s.spawn(|| engine.monitor_block_generation(&id, Duration::from_millis(50)));
            assert_eq!(entered_rx.recv().unwrap(), 10);
            let admin = s.spawn(|| engine.adjust_difficulty("ops", 5, "load spike").unwrap());
            release_tx.send(()).unwrap();
            assert_eq!(retune.join().unwrap().value, Some(11));
            // The admin change lands after the retune and sees its result.
            assert_eq!(admin.join().unwrap().value, 11);
        });
        assert_eq!(engine.difficulty(), 5);

        let changes: Vec<(String, String)> = engine
            .audit_log()
            .entries_for(AuditOperation::DifficultyAdjusted)
            .unwrap()
            .into_iter()
            .map(|e| (e.before.unwrap_or_default(), e.after.unwrap_or_default()))
            .collect();
        assert_eq!(changes.len(), 2);
        assert!(changes.contains(&("10".into(), "11".into())));
        assert!(changes.contains(&("11".into(), "5".into())));
    }

    /// Registry whose reads are slow enough for concurrent updates to overlap.
    struct SlowRegistry(NullRegistry);

    impl ValidatorRegistry for SlowRegistry {
        fn validators(&self) -> Result<Vec<ValidatorRecord>, StoreError> {
            self.0.validators()
        }

        fn get(&self, id: &ValidatorId) -> Result<ValidatorRecord, StoreError> {
            std::thread::sleep(Duration::from_millis(2));
            self.0.get(id)
        }

        fn update_participation(
            &self,
            id: &ValidatorId,
            score: f64,
            last_active: Option<Timestamp>,
        ) -> Result<(), StoreError> {
            self.0.update_participation(id, score, last_active)
        }

        fn set_blacklisted(&self, id: &ValidatorId, blacklisted: bool) -> Result<(), StoreError> {
            self.0.set_blacklisted(id, blacklisted)
        }
    }

    #[test]
    fn concurrent_credits_are_not_lost() {
        let clock = Arc::new(NullClock::new(1_000));
        let registry = Arc::new(SlowRegistry(NullRegistry::with_validators(vec![
            ValidatorRecord::new("v", 100, 0.5),
        ])));
        let audit = Arc::new(AuditLog::new(Arc::new(MemoryAuditSink::new()), clock.clone()).unwrap());
        let engine =
            ConsensusEngine::new(ConsensusConfig::default(), registry.clone(), audit, clock).unwrap();

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    engine
                        .track_participation(&vid("v"), ParticipationStatus::Participated)
                        .unwrap();
                });
            }
        });

        // Each credit closes 20% of the gap to 1.0.
        let expected = 1.0 - 0.5 * 0.8f64.powi(8);
        let score = registry.get(&vid("v")).unwrap().participation;
        assert!((score - expected).abs() < 1e-9, "score {score}, expected {expected}");
    }

    #[test]
    fn sub_block_status_is_untouched_by_selection() {
        let f = fixture_with(ConsensusConfig::default(), abc());
        let sb = sub_block(3);
        f.engine.select_validator(&sb).unwrap();
        assert_eq!(sb.status(), SubBlockStatus::Draft);
    }
}
