//! Audit entry types.

use std::fmt;

use meridian_types::Timestamp;
use serde::{Deserialize, Serialize};

/// What kind of decision an entry records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    DifficultyAdjusted,
    AuditToggled,
    RewardModeChanged,
    SelectionModeChanged,
    PohThresholdChanged,
    DynamicStakeToggled,
    ParticipationTracked,
    ValidatorSelected,
    ValidatorBlacklisted,
    ActivityValidated,
    StakeRebalanced,
    SubBlockCommitted,
    SubBlockRejected,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DifficultyAdjusted => "difficulty_adjusted",
            Self::AuditToggled => "audit_toggled",
            Self::RewardModeChanged => "reward_mode_changed",
            Self::SelectionModeChanged => "selection_mode_changed",
            Self::PohThresholdChanged => "poh_threshold_changed",
            Self::DynamicStakeToggled => "dynamic_stake_toggled",
            Self::ParticipationTracked => "participation_tracked",
            Self::ValidatorSelected => "validator_selected",
            Self::ValidatorBlacklisted => "validator_blacklisted",
            Self::ActivityValidated => "activity_validated",
            Self::StakeRebalanced => "stake_rebalanced",
            Self::SubBlockCommitted => "sub_block_committed",
            Self::SubBlockRejected => "sub_block_rejected",
        }
    }
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "reason", rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure(String),
}

impl AuditOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// A sequenced, timestamped audit record. Never mutated after append.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub sequence: u64,
    pub timestamp: Timestamp,
    pub operation: AuditOperation,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub outcome: AuditOutcome,
}

/// An entry before the log assigns its sequence number and timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditEvent {
    pub operation: AuditOperation,
    pub actor: String,
    pub before: Option<String>,
    pub after: Option<String>,
    pub reason: Option<String>,
    pub outcome: AuditOutcome,
}

impl AuditEvent {
    pub fn new(operation: AuditOperation, actor: impl Into<String>) -> Self {
        Self {
            operation,
            actor: actor.into(),
            before: None,
            after: None,
            reason: None,
            outcome: AuditOutcome::Success,
        }
    }

    /// Record the old and new value of whatever changed.
    pub fn change(mut self, before: impl fmt::Display, after: impl fmt::Display) -> Self {
        self.before = Some(before.to_string());
        self.after = Some(after.to_string());
        self
    }

    /// Record a resulting value that has no meaningful predecessor.
    pub fn after(mut self, after: impl fmt::Display) -> Self {
        self.after = Some(after.to_string());
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        self.outcome = AuditOutcome::Failure(reason.into());
        self
    }

    pub(crate) fn into_entry(self, sequence: u64, timestamp: Timestamp) -> AuditLogEntry {
        AuditLogEntry {
            sequence,
            timestamp,
            operation: self.operation,
            actor: self.actor,
            before: self.before,
            after: self.after,
            reason: self.reason,
            outcome: self.outcome,
        }
    }
}
