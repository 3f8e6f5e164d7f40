//! JSON-lines file implementation of `AuditWriter`.
//!
//! Each `AuditEvent` is appended to the file as one compact JSON line and
//! flushed before `write` returns. Opening an existing file resumes its
//! chain, after checking that the chain is intact.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use tactus_contracts::{
    error::{TactusError, TactusResult},
    execution::AuditRecord,
};
use tactus_core::traits::AuditWriter;

use crate::{
    chain::{first_broken_link, ChainHead},
    event::AuditEvent,
};

struct JsonlState {
    file: File,
    head: ChainHead,
}

/// An append-only audit writer backed by a `.jsonl` file.
pub struct JsonlAuditWriter {
    run_id: String,
    path: PathBuf,
    state: Mutex<JsonlState>,
}

fn io_error(path: &Path, what: &str, e: impl std::fmt::Display) -> TactusError {
    TactusError::AuditWriteFailed {
        reason: format!("failed to {} audit file '{}': {}", what, path.display(), e),
    }
}

/// Read every event from a JSON-lines audit file. Blank lines are skipped.
pub fn read_events(path: &Path) -> TactusResult<Vec<AuditEvent>> {
    let file = File::open(path).map_err(|e| io_error(path, "open", e))?;
    let mut events = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| io_error(path, "read", e))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: AuditEvent = serde_json::from_str(&line).map_err(|e| TactusError::AuditWriteFailed {
            reason: format!("line {} of '{}' is not an audit event: {}", n + 1, path.display(), e),
        })?;
        events.push(event);
    }
    Ok(events)
}

impl JsonlAuditWriter {
    /// Open (or create) `path` for appending events of `run_id`.
    ///
    /// Returns `TactusError::AuditWriteFailed` if an existing file's chain is
    /// broken; appending to a tampered log would launder it.
    pub fn open(path: impl Into<PathBuf>, run_id: impl Into<String>) -> TactusResult<Self> {
        let path = path.into();
        let head = if path.exists() {
            let events = read_events(&path)?;
            if let Some(seq) = first_broken_link(&events) {
                return Err(TactusError::AuditWriteFailed {
                    reason: format!("existing audit file '{}' is broken at sequence {}", path.display(), seq),
                });
            }
            debug!(path = %path.display(), events = events.len(), "resuming audit chain");
            events.last().map_or_else(ChainHead::genesis, ChainHead::after)
        } else {
            ChainHead::genesis()
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_error(&path, "open", e))?;

        Ok(Self {
            run_id: run_id.into(),
            path,
            state: Mutex::new(JsonlState { file, head }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> TactusResult<MutexGuard<'_, JsonlState>> {
        self.state.lock().map_err(|e| TactusError::AuditWriteFailed {
            reason: format!("audit file lock poisoned: {}", e),
        })
    }
}

impl AuditWriter for JsonlAuditWriter {
    fn write(&self, record: &AuditRecord) -> TactusResult<()> {
        let mut state = self.lock()?;
        let event = state.head.link(&self.run_id, record)?;
        let line = serde_json::to_string(&event).map_err(|e| TactusError::AuditWriteFailed {
            reason: format!("event is not serializable: {}", e),
        })?;

        writeln!(state.file, "{}", line).map_err(|e| io_error(&self.path, "append to", e))?;
        state.file.flush().map_err(|e| io_error(&self.path, "flush", e))?;
        state.head.advance(&event);
        Ok(())
    }

    fn finalize(&self, run_id: &str) -> TactusResult<()> {
        let state = self.lock()?;
        state.file.sync_all().map_err(|e| io_error(&self.path, "sync", e))?;
        info!(
            run_id = %run_id,
            path = %self.path.display(),
            next_sequence = state.head.sequence,
            terminal_hash = %state.head.last_hash,
            "audit file finalized"
        );
        Ok(())
    }
}
