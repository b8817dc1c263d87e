//! Nullable validator registry: thread-safe in-memory validator records.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use meridian_store::{StoreError, ValidatorRegistry};
use meridian_types::{Timestamp, ValidatorId, ValidatorRecord};
use parking_lot::Mutex;

#[derive(Default)]
pub struct NullRegistry {
    validators: Mutex<BTreeMap<ValidatorId, ValidatorRecord>>,
    unavailable: AtomicBool,
}

impl NullRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validators(records: impl IntoIterator<Item = ValidatorRecord>) -> Self {
        let registry = Self::new();
        for r in records {
            registry.insert(r);
        }
        registry
    }

    /// Add or replace a validator.
    pub fn insert(&self, record: ValidatorRecord) {
        self.validators.lock().insert(record.id.clone(), record);
    }

    /// While set, every call fails with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("null registry set to fail".into()));
        }
        Ok(())
    }
}

impl ValidatorRegistry for NullRegistry {
    fn validators(&self) -> Result<Vec<ValidatorRecord>, StoreError> {
        self.check()?;
        Ok(self.validators.lock().values().cloned().collect())
    }

    fn get(&self, id: &ValidatorId) -> Result<ValidatorRecord, StoreError> {
        self.check()?;
        self.validators
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn update_participation(
        &self,
        id: &ValidatorId,
        score: f64,
        last_active: Option<Timestamp>,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut validators = self.validators.lock();
        let record = validators
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.participation = score.clamp(0.0, 1.0);
        if let Some(at) = last_active {
            record.last_active = at;
        }
        Ok(())
    }

    fn set_blacklisted(&self, id: &ValidatorId, blacklisted: bool) -> Result<(), StoreError> {
        self.check()?;
        let mut validators = self.validators.lock();
        let record = validators
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.blacklisted = blacklisted;
        Ok(())
    }
}
