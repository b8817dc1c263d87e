//! Audit log over a JSONL file: sequence numbers survive a restart.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;

use meridian_audit::{AuditEvent, AuditLog, AuditOperation, AuditOutcome, JsonlAuditSink};
use meridian_types::SystemClock;

#[test]
fn sequence_continues_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");

    {
        let log = AuditLog::new(
            Arc::new(JsonlAuditSink::open(&path).unwrap()),
            Arc::new(SystemClock),
        )
        .unwrap();
        log.record(
            AuditEvent::new(AuditOperation::DifficultyAdjusted, "ops")
                .change(10, 5)
                .reason("load spike"),
        )
        .unwrap();
        log.record(AuditEvent::new(AuditOperation::AuditToggled, "ops").change(true, false))
            .unwrap();
    }

    let log = AuditLog::new(
        Arc::new(JsonlAuditSink::open(&path).unwrap()),
        Arc::new(SystemClock),
    )
    .unwrap();
    assert_eq!(log.len(), 2);
    let seq = log
        .record(AuditEvent::new(AuditOperation::SubBlockRejected, "committer").failed("ledger conflict"))
        .unwrap();
    assert_eq!(seq, 2);

    let entries = log.entries().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].reason.as_deref(), Some("load spike"));
    assert_eq!(entries[0].before.as_deref(), Some("10"));
    assert_eq!(entries[0].after.as_deref(), Some("5"));
    assert_eq!(
        entries[2].outcome,
        AuditOutcome::Failure("ledger conflict".into())
    );
}

#[test]
fn torn_write_does_not_restart_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let open = || {
        AuditLog::new(
            Arc::new(JsonlAuditSink::open(&path).unwrap()),
            Arc::new(SystemClock),
        )
        .unwrap()
    };

    {
        let log = open();
        for _ in 0..3 {
            log.record(AuditEvent::new(AuditOperation::AuditToggled, "ops"))
                .unwrap();
        }
    }
    // Crash mid-append.
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(br#"{"sequence":3,"#).unwrap();
    drop(file);

    let log = open();
    assert_eq!(log.len(), 3);
    let seq = log
        .record(AuditEvent::new(AuditOperation::DifficultyAdjusted, "ops").change(10, 5))
        .unwrap();
    assert_eq!(seq, 3);

    let sequences: Vec<u64> = log.entries().unwrap().iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3]);
}
