//! Consensus parameters: the single mutable record owned by the consensus engine.
//!
//! Modes are closed enums: every handler matches exhaustively, so adding a
//! mode is a compile error until each handler covers it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Policy for assigning the validator that finalizes a sub-block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorSelectionMode {
    /// Pick proportionally to (effective) stake.
    StakeWeighted,
    /// Cycle deterministically through eligible validators.
    RoundRobin,
    /// Score by stake and participation; round-robin among ties.
    Hybrid,
}

impl ValidatorSelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StakeWeighted => "stake_weighted",
            Self::RoundRobin => "round_robin",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for ValidatorSelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy for splitting the per-sub-block reward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardDistributionMode {
    /// The finalizing validator receives the whole reward.
    ProposerOnly,
    /// Every eligible validator receives an equal share.
    EqualSplit,
    /// Shares proportional to effective stake.
    StakeWeighted,
    /// Shares proportional to participation score.
    ParticipationWeighted,
}

impl RewardDistributionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProposerOnly => "proposer_only",
            Self::EqualSplit => "equal_split",
            Self::StakeWeighted => "stake_weighted",
            Self::ParticipationWeighted => "participation_weighted",
        }
    }
}

impl fmt::Display for RewardDistributionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive valid range for the difficulty level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyBounds {
    pub min: u64,
    pub max: u64,
}

impl DifficultyBounds {
    pub fn contains(&self, level: u64) -> bool {
        level >= self.min && level <= self.max
    }

    pub fn clamp(&self, level: u64) -> u64 {
        level.clamp(self.min, self.max)
    }
}

impl Default for DifficultyBounds {
    fn default() -> Self {
        Self { min: 1, max: 1_000 }
    }
}

/// Process-wide consensus parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Current difficulty level.
    pub difficulty: u64,
    /// Minimum participation score a proposer needs, in `[0, 1]`.
    pub poh_threshold: f64,
    pub selection_mode: ValidatorSelectionMode,
    pub reward_mode: RewardDistributionMode,
    /// Recompute stake weights from participation after every commit.
    pub dynamic_stake: bool,
    /// Append state-changing operations to the audit log.
    pub audit_enabled: bool,
}

impl ConsensusParams {
    /// Whether `threshold` is a valid PoH threshold.
    pub fn is_valid_threshold(threshold: f64) -> bool {
        threshold.is_finite() && (0.0..=1.0).contains(&threshold)
    }
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            difficulty: 10,
            poh_threshold: 0.5,
            selection_mode: ValidatorSelectionMode::StakeWeighted,
            reward_mode: RewardDistributionMode::ProposerOnly,
            dynamic_stake: false,
            audit_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_validation() {
        assert!(ConsensusParams::is_valid_threshold(0.0));
        assert!(ConsensusParams::is_valid_threshold(1.0));
        assert!(!ConsensusParams::is_valid_threshold(1.01));
        assert!(!ConsensusParams::is_valid_threshold(-0.1));
        assert!(!ConsensusParams::is_valid_threshold(f64::NAN));
    }

    #[test]
    fn bounds_clamp() {
        let b = DifficultyBounds { min: 2, max: 8 };
        assert_eq!(b.clamp(0), 2);
        assert_eq!(b.clamp(5), 5);
        assert_eq!(b.clamp(99), 8);
        assert!(b.contains(8));
        assert!(!b.contains(9));
    }

    #[test]
    fn modes_serialize_as_snake_case() {
        let json = serde_json::to_string(&ValidatorSelectionMode::RoundRobin).unwrap();
        assert_eq!(json, "\"round_robin\"");
        let mode: RewardDistributionMode = serde_json::from_str("\"equal_split\"").unwrap();
        assert_eq!(mode, RewardDistributionMode::EqualSplit);
    }
}
