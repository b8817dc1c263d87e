//! Consensus tuning, loaded as the `[consensus]` section of the node config.

use std::time::Duration;

use meridian_types::{ConsensusParams, DifficultyBounds};
use serde::{Deserialize, Serialize};

use crate::ConsensusError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Parameters the engine starts with.
    #[serde(default)]
    pub params: ConsensusParams,

    #[serde(default)]
    pub difficulty_bounds: DifficultyBounds,

    /// Desired assembly-to-commit latency.
    #[serde(default = "default_target_block_time_ms")]
    pub target_block_time_ms: u64,

    /// Number of timing samples kept for retuning.
    #[serde(default = "default_timing_window")]
    pub timing_window: usize,

    /// Retune after this many new samples.
    #[serde(default = "default_retune_interval")]
    pub retune_interval: usize,

    /// Largest difficulty change per retune, in percent of the current level.
    #[serde(default = "default_max_retune_step_pct")]
    pub max_retune_step_pct: u64,

    /// EMA smoothing factor for participation scores.
    #[serde(default = "default_participation_alpha")]
    pub participation_alpha: f64,

    /// Validators scoring below this are not selectable.
    #[serde(default)]
    pub min_participation: f64,

    /// Validators idle for longer than this are not selectable. Unset
    /// disables the check.
    #[serde(default)]
    pub activity_window_ms: Option<u64>,

    #[serde(default = "default_rate_window_ms")]
    pub rate_window_ms: u64,

    /// Actions one validator may perform within `rate_window_ms`.
    #[serde(default = "default_max_actions_per_window")]
    pub max_actions_per_window: u32,

    /// Lowest participation multiplier used by dynamic stake weighting.
    #[serde(default = "default_stake_floor")]
    pub stake_floor: f64,

    /// Entries kept in the in-memory activity log.
    #[serde(default = "default_activity_log_capacity")]
    pub activity_log_capacity: usize,
}

fn default_target_block_time_ms() -> u64 {
    2_000
}
fn default_timing_window() -> usize {
    16
}
fn default_retune_interval() -> usize {
    8
}
fn default_max_retune_step_pct() -> u64 {
    25
}
fn default_participation_alpha() -> f64 {
    0.2
}
fn default_rate_window_ms() -> u64 {
    1_000
}
fn default_max_actions_per_window() -> u32 {
    100
}
fn default_stake_floor() -> f64 {
    0.1
}
fn default_activity_log_capacity() -> usize {
    1_024
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            params: ConsensusParams::default(),
            difficulty_bounds: DifficultyBounds::default(),
            target_block_time_ms: default_target_block_time_ms(),
            timing_window: default_timing_window(),
            retune_interval: default_retune_interval(),
            max_retune_step_pct: default_max_retune_step_pct(),
            participation_alpha: default_participation_alpha(),
            min_participation: 0.0,
            activity_window_ms: None,
            rate_window_ms: default_rate_window_ms(),
            max_actions_per_window: default_max_actions_per_window(),
            stake_floor: default_stake_floor(),
            activity_log_capacity: default_activity_log_capacity(),
        }
    }
}

impl ConsensusConfig {
    pub fn activity_window(&self) -> Option<Duration> {
        self.activity_window_ms.map(Duration::from_millis)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }

    pub fn validate(&self) -> Result<(), ConsensusError> {
        let invalid = |msg: String| Err(ConsensusError::InvalidParameter(msg));
        let b = self.difficulty_bounds;
        if b.min == 0 || b.min > b.max {
            return invalid(format!("difficulty bounds {}..={} are empty or start at 0", b.min, b.max));
        }
        if !b.contains(self.params.difficulty) {
            return invalid(format!(
                "initial difficulty {} outside {}..={}",
                self.params.difficulty, b.min, b.max
            ));
        }
        if !ConsensusParams::is_valid_threshold(self.params.poh_threshold) {
            return invalid(format!("poh_threshold {} not in [0, 1]", self.params.poh_threshold));
        }
        if self.target_block_time_ms == 0 {
            return invalid("target_block_time_ms must be positive".into());
        }
        if self.retune_interval == 0 || self.timing_window < self.retune_interval {
            return invalid(format!(
                "retune_interval {} must be in 1..=timing_window ({})",
                self.retune_interval, self.timing_window
            ));
        }
        if !(self.participation_alpha > 0.0 && self.participation_alpha <= 1.0) {
            return invalid(format!(
                "participation_alpha {} not in (0, 1]",
                self.participation_alpha
            ));
        }
        for (name, v) in [
            ("min_participation", self.min_participation),
            ("stake_floor", self.stake_floor),
        ] {
            if !ConsensusParams::is_valid_threshold(v) {
                return invalid(format!("{name} {v} not in [0, 1]"));
            }
        }
        if self.max_actions_per_window == 0 || self.rate_window_ms == 0 {
            return invalid("rate limit window and action count must be positive".into());
        }
        Ok(())
    }
}
