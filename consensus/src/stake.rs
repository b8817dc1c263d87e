//! Effective stake weights.
//!
//! With dynamic stake on, a validator's selection weight is its stake
//! scaled by participation, floored so an unlucky validator never drops to
//! zero. The cache is rebuilt after every commit.

use std::collections::HashMap;

use meridian_types::{ValidatorId, ValidatorRecord};

const PPM: u128 = 1_000_000;

/// `stake × max(participation, floor)`, computed in parts per million.
pub fn effective_weight(stake: u128, participation: f64, floor: f64) -> u128 {
    let factor = participation.max(floor).clamp(0.0, 1.0);
    let ppm = (factor * PPM as f64).round() as u128;
    match stake.checked_mul(ppm) {
        Some(v) => v / PPM,
        None => (stake / PPM).saturating_mul(ppm),
    }
}

/// Cached effective weights, keyed by validator.
#[derive(Debug, Default, Clone)]
pub struct StakeWeights {
    weights: HashMap<ValidatorId, u128>,
    total: u128,
}

impl StakeWeights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute every weight from fresh registry records.
    pub fn rebuild(&mut self, records: &[ValidatorRecord], floor: f64) {
        self.weights.clear();
        self.total = 0;
        for r in records {
            let w = effective_weight(r.stake, r.participation, floor);
            self.total = self.total.saturating_add(w);
            self.weights.insert(r.id.clone(), w);
        }
    }

    pub fn weight(&self, id: &ValidatorId) -> Option<u128> {
        self.weights.get(id).copied()
    }

    pub fn total(&self) -> u128 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}
