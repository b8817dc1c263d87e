//! Nullable audit sink: in-memory storage that can be switched off.

use std::sync::atomic::{AtomicBool, Ordering};

use meridian_audit::{AuditError, AuditLogEntry, AuditSink, MemoryAuditSink};

#[derive(Default)]
pub struct NullAuditSink {
    inner: MemoryAuditSink,
    failing: AtomicBool,
}

impl NullAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every append fails with `StorageUnavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl AuditSink for NullAuditSink {
    fn append(&self, entry: &AuditLogEntry) -> Result<(), AuditError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditError::StorageUnavailable("null sink set to fail".into()));
        }
        self.inner.append(entry)
    }

    fn entries(&self) -> Result<Vec<AuditLogEntry>, AuditError> {
        self.inner.entries()
    }
}
