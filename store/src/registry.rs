//! Validator registry contract: the stake and identity source.

use meridian_types::{Timestamp, ValidatorId, ValidatorRecord};

use crate::StoreError;

/// Read/write access to validator records.
///
/// Consensus reads stake for selection and writes participation and
/// activity; stake itself is never modified through this trait.
pub trait ValidatorRegistry: Send + Sync {
    /// All registered validators, in any order.
    fn validators(&self) -> Result<Vec<ValidatorRecord>, StoreError>;

    fn get(&self, id: &ValidatorId) -> Result<ValidatorRecord, StoreError>;

    /// Store a new participation score, and the activity time when the
    /// validator was just seen doing its duty.
    fn update_participation(
        &self,
        id: &ValidatorId,
        score: f64,
        last_active: Option<Timestamp>,
    ) -> Result<(), StoreError>;

    fn set_blacklisted(&self, id: &ValidatorId, blacklisted: bool) -> Result<(), StoreError>;

    fn contains(&self, id: &ValidatorId) -> Result<bool, StoreError> {
        match self.get(id) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
