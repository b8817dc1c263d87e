//! Audit storage backends.

use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::{AuditError, AuditLogEntry};

/// Append-only storage for audit entries.
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: &AuditLogEntry) -> Result<(), AuditError>;

    /// Every stored entry in append order.
    fn entries(&self) -> Result<Vec<AuditLogEntry>, AuditError>;
}

/// Keeps entries in process memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, entry: &AuditLogEntry) -> Result<(), AuditError> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }

    fn entries(&self) -> Result<Vec<AuditLogEntry>, AuditError> {
        Ok(self.entries.lock().clone())
    }
}

/// One JSON object per line, appended to a file.
pub struct JsonlAuditSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlAuditSink {
    /// Open (creating parent directories) without truncating existing entries.
    ///
    /// A trailing line left without its newline by an interrupted write is
    /// cut off, so the next append starts on a fresh line.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        repair_torn_tail(&path)?;
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, entry: &AuditLogEntry) -> Result<(), AuditError> {
        let encoded =
            serde_json::to_string(entry).map_err(|e| AuditError::Encoding(e.to_string()))?;
        let _guard = self.lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut line = encoded.into_bytes();
        line.push(b'\n');
        file.write_all(&line)?;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<AuditLogEntry>, AuditError> {
        let _guard = self.lock.lock();
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        // Only newline-terminated lines are complete entries.
        let complete = match raw.rfind('\n') {
            Some(end) => &raw[..=end],
            None => "",
        };
        if complete.len() < raw.len() {
            tracing::warn!(
                path = %self.path.display(),
                bytes = raw.len() - complete.len(),
                "ignoring unterminated trailing audit line"
            );
        }
        let mut entries = Vec::new();
        for line in complete.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str(line)
                .map_err(|e| AuditError::Encoding(e.to_string()))?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

/// Truncate the file back to its last newline.
fn repair_torn_tail(path: &Path) -> Result<(), AuditError> {
    let mut file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let mut raw = Vec::new();
    file.read_to_end(&mut raw)?;
    if raw.is_empty() || raw.ends_with(b"\n") {
        return Ok(());
    }
    let keep = raw.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
    tracing::warn!(
        path = %path.display(),
        dropped = raw.len() - keep,
        "truncating torn audit line"
    );
    file.set_len(keep as u64)?;
    Ok(())
}
