//! The in-memory trace log.
//!
//! `InMemoryAuditWriter` keeps all events in a `Vec` behind a `Mutex`. Clones
//! share the same chain, so a caller can hand one clone to the executor and
//! keep another to export or verify the log afterwards.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::info;

use tactus_contracts::{
    error::{TactusError, TactusResult},
    execution::AuditRecord,
};
use tactus_core::traits::AuditWriter;

use crate::{
    chain::{verify_chain, ChainHead},
    event::{AuditEvent, AuditLog},
};

// ── Chain state ──────────────────────────────────────────────────────────────

pub(crate) struct InMemoryState {
    pub(crate) events: Vec<AuditEvent>,
    pub(crate) head: ChainHead,
    pub(crate) finalized: bool,
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Append-only trace log held in memory and chained with SHA-256.
#[derive(Clone)]
pub struct InMemoryAuditWriter {
    run_id: String,
    pub(crate) state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryAuditWriter {
    pub fn new(run_id: impl Into<String>) -> Self {
        let state = InMemoryState {
            events: Vec::new(),
            head: ChainHead::genesis(),
            finalized: false,
        };
        Self {
            run_id: run_id.into(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> TactusResult<MutexGuard<'_, InMemoryState>> {
        self.state.lock().map_err(|e| TactusError::AuditWriteFailed {
            reason: format!("audit state lock poisoned: {}", e),
        })
    }

    /// Snapshot the chain as a sealed `AuditLog`.
    pub fn export_log(&self) -> TactusResult<AuditLog> {
        let state = self.lock()?;
        let terminal_hash = state.events.last().map(|e| e.this_hash.clone()).unwrap_or_default();

        Ok(AuditLog {
            run_id: self.run_id.clone(),
            events: state.events.clone(),
            finalized_at: Utc::now(),
            terminal_hash,
        })
    }

    /// All records written so far, in order.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.lock()
            .map(|s| s.events.iter().map(|e| e.record.clone()).collect())
            .unwrap_or_default()
    }

    pub fn is_finalized(&self) -> bool {
        self.lock().map(|s| s.finalized).unwrap_or(false)
    }

    /// True when every link in the chain still verifies.
    pub fn verify_integrity(&self) -> bool {
        self.lock().map(|s| verify_chain(&s.events)).unwrap_or(false)
    }
}

// ── Trace sink ───────────────────────────────────────────────────────────────

impl AuditWriter for InMemoryAuditWriter {
    /// Append one record to the hash chain.
    ///
    /// Writing after `finalize` is refused: a sealed log never grows.
    fn write(&self, record: &AuditRecord) -> TactusResult<()> {
        let mut state = self.lock()?;
        if state.finalized {
            return Err(TactusError::AuditWriteFailed {
                reason: format!("audit log for run '{}' is already finalized", self.run_id),
            });
        }

        let event = state.head.link(&self.run_id, record)?;
        state.head.advance(&event);
        state.events.push(event);
        Ok(())
    }

    fn finalize(&self, run_id: &str) -> TactusResult<()> {
        let mut state = self.lock()?;
        state.finalized = true;

        info!(
            run_id = %run_id,
            event_count = state.events.len(),
            terminal_hash = %state.head.last_hash,
            "audit log finalized"
        );

        Ok(())
    }
}
