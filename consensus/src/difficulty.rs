//! Difficulty retuning from observed assembly-to-commit latency.
//!
//! Samples go into a bounded [`TimingWindow`]. Every `retune_interval`
//! samples the engine asks its [`DifficultyPolicy`] for a new level. The
//! default policy is integer-only, so two nodes fed the same sample history
//! always land on the same difficulty.

use std::collections::VecDeque;
use std::time::Duration;

use meridian_types::DifficultyBounds;

/// Computes the next difficulty from a window of timing samples.
pub trait DifficultyPolicy: Send + Sync {
    fn name(&self) -> &str;

    /// Next level given the current one and the samples in the window
    /// (oldest first, in milliseconds). Must return a value inside `bounds`.
    fn retarget(&self, current: u64, samples_ms: &[u64], bounds: DifficultyBounds) -> u64;
}

/// Scale difficulty by `target / average`, limited to a percentage step.
///
/// Slow sub-blocks (average above target) lower difficulty, fast ones
/// raise it. A move is always at least one level when the ratio asks for
/// any change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MovingAverageRetarget {
    pub target_ms: u64,
    pub max_step_pct: u64,
}

impl MovingAverageRetarget {
    pub fn new(target_ms: u64, max_step_pct: u64) -> Self {
        Self {
            target_ms: target_ms.max(1),
            max_step_pct,
        }
    }
}

impl DifficultyPolicy for MovingAverageRetarget {
    fn name(&self) -> &str {
        "moving_average"
    }

    fn retarget(&self, current: u64, samples_ms: &[u64], bounds: DifficultyBounds) -> u64 {
        if samples_ms.is_empty() {
            return bounds.clamp(current);
        }
        let sum: u128 = samples_ms.iter().map(|&s| s as u128).sum();
        let avg = (sum / samples_ms.len() as u128).max(1);

        let ideal = (current as u128 * self.target_ms as u128 / avg).min(u64::MAX as u128) as u64;
        let max_delta = (current.saturating_mul(self.max_step_pct) / 100).max(1);
        let lo = current.saturating_sub(max_delta);
        let hi = current.saturating_add(max_delta);
        bounds.clamp(ideal.clamp(lo, hi))
    }
}

/// Rolling window of timing samples.
#[derive(Debug)]
pub struct TimingWindow {
    samples: VecDeque<u64>,
    capacity: usize,
    retune_interval: usize,
    since_retune: usize,
}

impl TimingWindow {
    pub fn new(capacity: usize, retune_interval: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            retune_interval: retune_interval.clamp(1, capacity),
            since_retune: 0,
        }
    }

    /// Add a sample. Returns `true` when a retune is due.
    pub fn record(&mut self, elapsed: Duration) -> bool {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(elapsed.as_millis().min(u64::MAX as u128) as u64);
        self.since_retune += 1;
        if self.since_retune >= self.retune_interval && self.samples.len() >= self.retune_interval {
            self.since_retune = 0;
            return true;
        }
        false
    }

    pub fn samples(&self) -> Vec<u64> {
        self.samples.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Average of the window in milliseconds, if any samples exist.
    pub fn average_ms(&self) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u128 = self.samples.iter().map(|&s| s as u128).sum();
        Some((sum / self.samples.len() as u128) as u64)
    }
}
