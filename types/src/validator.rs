//! Validator records as exposed by the validator registry.

use serde::{Deserialize, Serialize};

use crate::{Timestamp, ValidatorId};

/// Stake and liveness data for one validator.
///
/// The registry owns stake custody; consensus only reads `stake` and writes
/// the participation and activity fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidatorRecord {
    pub id: ValidatorId,
    pub stake: u128,
    /// Rolling participation score in `[0, 1]`.
    pub participation: f64,
    pub last_active: Timestamp,
    #[serde(default)]
    pub blacklisted: bool,
}

impl ValidatorRecord {
    pub fn new(id: impl Into<ValidatorId>, stake: u128, participation: f64) -> Self {
        Self {
            id: id.into(),
            stake,
            participation: participation.clamp(0.0, 1.0),
            last_active: Timestamp::EPOCH,
            blacklisted: false,
        }
    }

    pub fn with_last_active(mut self, at: Timestamp) -> Self {
        self.last_active = at;
        self
    }
}

/// Observed behaviour fed into participation tracking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipationStatus {
    /// The validator did its duty (proposed, attested, committed).
    Participated,
    /// The validator was expected to act and did not.
    Missed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participation_is_clamped() {
        assert_eq!(ValidatorRecord::new("v", 1, 1.7).participation, 1.0);
        assert_eq!(ValidatorRecord::new("v", 1, -2.0).participation, 0.0);
    }
}
