//! The audit log front: sequencing, timestamps and degraded-mode handling.
//!
//! A failed write never fails the operation being audited. The caller gets
//! the error back as a value (usually folded into [`Audited`]) and a `warn!`
//! is emitted; sequence numbers are only consumed by successful appends.

use std::sync::Arc;

use meridian_types::Clock;
use parking_lot::Mutex;

use crate::{AuditError, AuditEvent, AuditLogEntry, AuditOperation, AuditSink};

/// Result of a mutating operation whose audit write may have failed.
#[derive(Clone, Debug, PartialEq)]
pub struct Audited<T> {
    pub value: T,
    /// Set when the operation succeeded but its audit entry was not stored.
    pub audit_warning: Option<AuditError>,
}

impl<T> Audited<T> {
    pub fn clean(value: T) -> Self {
        Self {
            value,
            audit_warning: None,
        }
    }

    pub fn new(value: T, audit: Result<(), AuditError>) -> Self {
        Self {
            value,
            audit_warning: audit.err(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.audit_warning.is_some()
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Audited<U> {
        Audited {
            value: f(self.value),
            audit_warning: self.audit_warning,
        }
    }
}

pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    next_sequence: Mutex<u64>,
}

impl AuditLog {
    /// Wrap a sink, continuing the sequence after any entries it already holds.
    ///
    /// Fails when the existing entries cannot be read: restarting at zero
    /// would reuse sequence numbers.
    pub fn new(sink: Arc<dyn AuditSink>, clock: Arc<dyn Clock>) -> Result<Self, AuditError> {
        let next = sink
            .entries()?
            .last()
            .map_or(0, |e| e.sequence + 1);
        Ok(Self {
            sink,
            clock,
            next_sequence: Mutex::new(next),
        })
    }

    /// Stamp and append an event. Returns the assigned sequence number.
    pub fn record(&self, event: AuditEvent) -> Result<u64, AuditError> {
        let mut next = self.next_sequence.lock();
        let sequence = *next;
        let operation = event.operation;
        let entry = event.into_entry(sequence, self.clock.now());
        match self.sink.append(&entry) {
            Ok(()) => {
                *next += 1;
                tracing::debug!(sequence, operation = %operation, actor = %entry.actor, "audit entry recorded");
                Ok(sequence)
            }
            Err(e) => {
                tracing::warn!(operation = %operation, error = %e, "audit write failed");
                Err(match e {
                    AuditError::StorageUnavailable(_) => e,
                    other => AuditError::StorageUnavailable(other.to_string()),
                })
            }
        }
    }

    pub fn entries(&self) -> Result<Vec<AuditLogEntry>, AuditError> {
        self.sink.entries()
    }

    pub fn entries_for(&self, operation: AuditOperation) -> Result<Vec<AuditLogEntry>, AuditError> {
        Ok(self
            .sink
            .entries()?
            .into_iter()
            .filter(|e| e.operation == operation)
            .collect())
    }

    /// Number of entries successfully recorded, including any the sink held
    /// before this log was opened.
    pub fn len(&self) -> u64 {
        *self.next_sequence.lock()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
