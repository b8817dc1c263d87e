//! Fundamental types for the Meridian sub-block pipeline.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! identifiers, addresses, timestamps, transactions, sub-blocks, consensus
//! parameters, validator records, and the structured error codes.

pub mod address;
pub mod error;
pub mod ids;
pub mod params;
pub mod sub_block;
pub mod time;
pub mod transaction;
pub mod validator;

pub use address::Address;
pub use error::ErrorCode;
pub use ids::{SubBlockId, TxId, ValidatorId};
pub use params::{ConsensusParams, DifficultyBounds, RewardDistributionMode, ValidatorSelectionMode};
pub use sub_block::{SubBlock, SubBlockStatus};
pub use time::{Clock, SystemClock, Timestamp};
pub use transaction::{Transaction, TxStatus};
pub use validator::{ParticipationStatus, ValidatorRecord};
