//! Chained audit events and the sealed per-run log.
//!
//! Each `AuditEvent` carries one `AuditRecord` plus a small `EventIndex`
//! lifted out of it (record kind, intent, attempt, outcome) so a JSON-lines
//! file can be filtered without decoding every trace. The index is derived
//! data: chain verification recomputes it and treats a mismatch as a broken
//! link, the same as a bad hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tactus_contracts::execution::{ActionTrace, AuditRecord, ExecutionSummary, FailureReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Trace,
    Summary,
}

/// Searchable fields copied from the wrapped record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventIndex {
    pub kind: RecordKind,
    /// Set for traces only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Attempt success, or for a summary, a run that was not cut short.
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    /// When the attempt finished or the run was summarized.
    pub recorded_at: DateTime<Utc>,
}

impl EventIndex {
    pub fn of(record: &AuditRecord) -> Self {
        match record {
            AuditRecord::Trace(t) => Self {
                kind: RecordKind::Trace,
                intent_id: Some(t.intent_id.clone()),
                attempt: Some(t.attempt),
                success: t.success,
                failure_reason: t.failure_reason,
                recorded_at: t.finished_at,
            },
            AuditRecord::Summary(s) => Self {
                kind: RecordKind::Summary,
                intent_id: None,
                attempt: None,
                success: !s.aborted_early,
                failure_reason: None,
                recorded_at: s.timestamp,
            },
        }
    }
}

/// One link of the SHA-256 chain.
///
/// Editing the record invalidates `this_hash` and every later `prev_hash`;
/// editing the index no longer matches the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Position in the chain, starting at 0.
    pub sequence: u64,

    /// The run that wrote this event. A resumed file holds several runs.
    pub run_id: String,

    pub index: EventIndex,

    pub record: AuditRecord,

    /// SHA-256 hash (hex) of the previous event, or `GENESIS_HASH`.
    pub prev_hash: String,

    /// SHA-256 hash (hex) over (run_id, sequence, prev_hash, record).
    pub this_hash: String,
}

impl AuditEvent {
    pub const GENESIS_HASH: &'static str = "0000000000000000000000000000000000000000000000000000000000000000";

    /// Whether the stored index still describes the record.
    pub fn index_matches(&self) -> bool {
        self.index == EventIndex::of(&self.record)
    }

    pub fn trace(&self) -> Option<&ActionTrace> {
        match &self.record {
            AuditRecord::Trace(t) => Some(t),
            AuditRecord::Summary(_) => None,
        }
    }
}

/// The events one run wrote, sealed when the run finalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub run_id: String,
    pub events: Vec<AuditEvent>,
    pub finalized_at: DateTime<Utc>,
    /// `this_hash` of the last event; empty for an empty log.
    pub terminal_hash: String,
}

impl AuditLog {
    /// Number of per-attempt trace records in the log.
    pub fn trace_count(&self) -> usize {
        self.events.iter().filter(|e| e.index.kind == RecordKind::Trace).count()
    }

    /// Every attempt made for `intent_id`, in order.
    pub fn attempts_for<'a>(&'a self, intent_id: &'a str) -> impl Iterator<Item = &'a ActionTrace> + 'a {
        self.events
            .iter()
            .filter(move |e| e.index.intent_id.as_deref() == Some(intent_id))
            .filter_map(AuditEvent::trace)
    }

    /// `(intent_id, reason)` for every failed or skipped attempt, in order.
    pub fn failures(&self) -> Vec<(&str, FailureReason)> {
        self.events
            .iter()
            .filter_map(|e| Some((e.index.intent_id.as_deref()?, e.index.failure_reason?)))
            .collect()
    }

    /// The run's closing summary, if it was written.
    pub fn summary(&self) -> Option<&ExecutionSummary> {
        self.events.iter().rev().find_map(|e| match &e.record {
            AuditRecord::Summary(s) if s.run_id == self.run_id => Some(s),
            _ => None,
        })
    }
}
