//! Validator activity tracking.
//!
//! Three pieces of bookkeeping, each bounded:
//! - [`RateLimiter`]: sliding-window action counts per validator.
//! - [`Assignments`]: which validator each recent sub-block was given to.
//! - [`ActivityLog`]: the most recent validation outcomes, for inspection.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

use meridian_types::{SubBlockId, Timestamp, ValidatorId};
use serde::{Deserialize, Serialize};

/// What a validator is trying to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Propose,
    Attest,
    Commit,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Propose => "propose",
            Self::Attest => "attest",
            Self::Commit => "commit",
        }
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context attached to an action.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityDetails {
    /// Sub-block the action concerns, checked against the assignment.
    pub sub_block: Option<SubBlockId>,
    pub note: Option<String>,
}

impl ActivityDetails {
    pub fn for_sub_block(id: SubBlockId) -> Self {
        Self {
            sub_block: Some(id),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl fmt::Display for ActivityDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.sub_block, &self.note) {
            (Some(id), Some(note)) => write!(f, "sub-block {id}: {note}"),
            (Some(id), None) => write!(f, "sub-block {id}"),
            (None, Some(note)) => f.write_str(note),
            (None, None) => f.write_str("-"),
        }
    }
}

/// One validated action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub at: Timestamp,
    pub validator: ValidatorId,
    pub action: ActivityAction,
    pub details: ActivityDetails,
    /// `None` if accepted, otherwise the violation.
    pub violation: Option<String>,
}

impl ActivityRecord {
    pub fn accepted(&self) -> bool {
        self.violation.is_none()
    }
}

/// Sliding-window rate limiter keyed by validator.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_actions: u32,
    events: HashMap<ValidatorId, VecDeque<Timestamp>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_actions: u32) -> Self {
        Self {
            window,
            max_actions,
            events: HashMap::new(),
        }
    }

    /// Count an action at `now` if the validator is under its limit.
    /// Returns `false`, counting nothing, when the limit is reached.
    pub fn try_acquire(&mut self, validator: &ValidatorId, now: Timestamp) -> bool {
        let window = self.window;
        let events = self.events.entry(validator.clone()).or_default();
        while let Some(front) = events.front() {
            if front.is_within(window, now) {
                break;
            }
            events.pop_front();
        }
        if events.len() >= self.max_actions as usize {
            return false;
        }
        events.push_back(now);
        true
    }

    /// Drop validators with no actions inside the window.
    pub fn cleanup(&mut self, now: Timestamp) {
        let window = self.window;
        self.events
            .retain(|_, q| q.back().is_some_and(|t| t.is_within(window, now)));
    }

    pub fn tracked(&self) -> usize {
        self.events.len()
    }
}

/// Bounded map of sub-block → assigned validator, oldest evicted first.
#[derive(Debug)]
pub struct Assignments {
    map: HashMap<SubBlockId, ValidatorId>,
    order: VecDeque<SubBlockId>,
    capacity: usize,
}

impl Assignments {
    pub fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn assign(&mut self, sub_block: SubBlockId, validator: ValidatorId) {
        if self.map.insert(sub_block, validator).is_none() {
            if self.order.len() >= self.capacity {
                if let Some(evicted) = self.order.pop_front() {
                    self.map.remove(&evicted);
                }
            }
            self.order.push_back(sub_block);
        }
    }

    pub fn get(&self, sub_block: &SubBlockId) -> Option<&ValidatorId> {
        self.map.get(sub_block)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Bounded FIFO of recent activity outcomes.
#[derive(Debug)]
pub struct ActivityLog {
    records: VecDeque<ActivityRecord>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1_024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, record: ActivityRecord) {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Up to `limit` most recent records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ActivityRecord> {
        self.records.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
