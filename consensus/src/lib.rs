//! Consensus: decides who finalizes each sub-block and under which rules.
//!
//! The hybrid protocol combines:
//! - time-based difficulty retuning from observed sub-block latency,
//! - a proof-of-history participation threshold for proposers,
//! - stake-weighted, round-robin or hybrid validator assignment,
//! - optional dynamic stake weighting by participation,
//! - configurable reward distribution.
//!
//! ## Module overview
//!
//! - [`engine`]: [`ConsensusEngine`], the owner of [`ConsensusParams`](meridian_types::ConsensusParams).
//! - [`config`]: Tuning loaded from the `[consensus]` config section.
//! - [`difficulty`]: Timing window and the pluggable retune policy.
//! - [`selection`]: Stake-weighted, round-robin and hybrid strategies.
//! - [`participation`]: EMA participation scoring.
//! - [`activity`]: Rate limiting, assignments and the activity log.
//! - [`stake`]: Effective (participation-scaled) stake weights.
//! - [`rewards`]: Reward splitting per distribution mode.
//! - [`error`]: Consensus error types.

pub mod activity;
pub mod config;
pub mod difficulty;
pub mod engine;
pub mod error;
pub mod participation;
pub mod rewards;
pub mod selection;
pub mod stake;

pub use activity::{ActivityAction, ActivityDetails, ActivityRecord};
pub use config::ConsensusConfig;
pub use difficulty::{DifficultyPolicy, MovingAverageRetarget, TimingWindow};
pub use engine::{ConsensusEngine, RETUNE_REASON, SYSTEM_ACTOR};
pub use error::ConsensusError;
pub use selection::{Candidate, HybridPolicy, ParticipationWeightedStake};
pub use stake::StakeWeights;
