//! Audit log: append-only record of every consensus-affecting decision.
//!
//! ## Module overview
//!
//! - [`entry`]: Entry, operation and outcome types, plus the [`AuditEvent`]
//!   builder callers fill in before the log stamps it.
//! - [`sink`]: Storage backends: in-memory and newline-delimited JSON.
//! - [`log`]: [`AuditLog`], which sequences entries and degrades to a
//!   warning when the sink is unavailable.
//! - [`error`]: Audit error types.

pub mod entry;
pub mod error;
pub mod log;
pub mod sink;

pub use entry::{AuditEvent, AuditLogEntry, AuditOperation, AuditOutcome};
pub use error::AuditError;
pub use log::{AuditLog, Audited};
pub use sink::{AuditSink, JsonlAuditSink, MemoryAuditSink};
