//! # tactus-audit
//!
//! Immutable, append-only, SHA-256 hash-chained trace log for the TACTUS
//! engine.
//!
//! ## Overview
//!
//! Every attempt the executor makes is recorded as an `ActionTrace`, and
//! every run closes with an `ExecutionSummary`. Each record is wrapped in an
//! `AuditEvent` that links to the previous event via its SHA-256 hash and
//! carries an index of the record's kind, intent, attempt, and outcome.
//! Tampering with any event breaks the chain and is detected by
//! `verify_chain`.
//!
//! Two writers are provided:
//!
//! - [`InMemoryAuditWriter`] for tests and dry runs
//! - [`JsonlAuditWriter`] appending one JSON line per event to a file
//!
//! ```rust,ignore
//! use tactus_audit::InMemoryAuditWriter;
//! use tactus_core::traits::AuditWriter;
//!
//! let writer = InMemoryAuditWriter::new("run-001");
//! writer.write(&record)?;
//! writer.finalize("run-001")?;
//!
//! assert!(writer.verify_integrity());
//! let log = writer.export_log()?;
//! ```

pub mod chain;
pub mod event;
pub mod jsonl;
pub mod memory;

pub use chain::{first_broken_link, hash_event, verify_chain};
pub use event::{AuditEvent, AuditLog, EventIndex, RecordKind};
pub use jsonl::{read_events, JsonlAuditWriter};
pub use memory::InMemoryAuditWriter;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use tactus_contracts::{
        execution::{ActionTrace, AuditRecord, ExecutionSummary, FailureReason, GateState, InputEvent},
        intent::{ActionIntent, ActionType, Target},
    };
    use tactus_core::traits::AuditWriter;

    use super::{read_events, verify_chain, AuditEvent, InMemoryAuditWriter, JsonlAuditWriter, RecordKind};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn make_trace(intent_id: &str, attempt: u32) -> AuditRecord {
        let now = Utc::now();
        AuditRecord::Trace(ActionTrace {
            intent_id: intent_id.to_string(),
            attempt,
            intent: ActionIntent::new(intent_id, ActionType::Move, Target::point(5.0, 5.0)),
            profile_id: "default".to_string(),
            profile_version: 1,
            dry_run: false,
            timing: BTreeMap::from([("reaction".to_string(), 180.0)]),
            motion: BTreeMap::new(),
            path: vec![],
            events: vec![InputEvent::Move { x: 5.0, y: 5.0 }],
            gate_state: GateState::VerifiedOk,
            success: true,
            failure_reason: None,
            message: String::new(),
            snapshot_before: None,
            snapshot_after: None,
            started_at: now,
            finished_at: now,
        })
    }

    fn make_failed_trace(intent_id: &str, attempt: u32, reason: FailureReason) -> AuditRecord {
        let mut record = make_trace(intent_id, attempt);
        if let AuditRecord::Trace(t) = &mut record {
            t.success = false;
            t.failure_reason = Some(reason);
            t.gate_state = GateState::VerifiedFail;
        }
        record
    }

    fn make_summary(run_id: &str) -> AuditRecord {
        AuditRecord::Summary(ExecutionSummary {
            run_id: run_id.to_string(),
            profile_id: "default".to_string(),
            results: vec![],
            submitted: 1,
            attempted: 1,
            succeeded: 1,
            skipped: 0,
            failed: 0,
            aborted_early: false,
            abort_reason: None,
            hard_stop: false,
            idle_actions: 0,
            dry_run: false,
            timestamp: Utc::now(),
        })
    }

    fn temp_path() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("tactus-audit-{}.jsonl", uuid::Uuid::new_v4()))
    }

    // ── In-memory writer ──────────────────────────────────────────────────────

    #[test]
    fn test_hash_chain_integrity() {
        let writer = InMemoryAuditWriter::new("run-integrity");
        writer.write(&make_trace("a", 1)).unwrap();
        writer.write(&make_trace("a", 2)).unwrap();
        writer.write(&make_summary("run-integrity")).unwrap();

        assert!(writer.verify_integrity(), "chain must be valid after sequential writes");
    }

    #[test]
    fn test_tamper_detection() {
        let writer = InMemoryAuditWriter::new("run-tamper");
        writer.write(&make_trace("a", 1)).unwrap();
        writer.write(&make_trace("b", 1)).unwrap();

        {
            let mut state = writer.state.lock().unwrap();
            if let AuditRecord::Trace(trace) = &mut state.events[0].record {
                trace.timing.insert("reaction".to_string(), 1.0);
            }
        }

        assert!(!writer.verify_integrity(), "chain must detect tampering with a stored event");
        let log = writer.export_log().unwrap();
        assert_eq!(super::first_broken_link(&log.events), Some(0));
    }

    #[test]
    fn test_genesis_and_sequence() {
        let writer = InMemoryAuditWriter::new("run-seq");
        for i in 0..3 {
            writer.write(&make_trace("a", i + 1)).unwrap();
        }

        let log = writer.export_log().unwrap();
        assert_eq!(log.events[0].prev_hash, AuditEvent::GENESIS_HASH);
        for (idx, event) in log.events.iter().enumerate() {
            assert_eq!(event.sequence, idx as u64);
        }
        assert_eq!(log.terminal_hash, log.events[2].this_hash);
        assert_eq!(log.trace_count(), 3);
    }

    #[test]
    fn test_finalized_log_refuses_writes() {
        let writer = InMemoryAuditWriter::new("run-final");
        writer.write(&make_summary("run-final")).unwrap();
        writer.finalize("run-final").unwrap();

        assert!(writer.is_finalized());
        assert!(writer.write(&make_trace("late", 1)).is_err());
        assert_eq!(writer.records().len(), 1);
    }

    #[test]
    fn test_verify_empty() {
        let writer = InMemoryAuditWriter::new("run-empty");
        assert!(writer.verify_integrity());
        assert!(verify_chain(&[]));
    }

    // ── JSON-lines writer ─────────────────────────────────────────────────────

    #[test]
    fn test_jsonl_round_trip_and_resume() {
        let path = temp_path();
        {
            let writer = JsonlAuditWriter::open(&path, "run-file").unwrap();
            writer.write(&make_trace("a", 1)).unwrap();
            writer.write(&make_summary("run-file")).unwrap();
            writer.finalize("run-file").unwrap();
        }
        {
            // A second run appends to the same chain.
            let writer = JsonlAuditWriter::open(&path, "run-file-2").unwrap();
            writer.write(&make_trace("b", 1)).unwrap();
        }

        let events = read_events(&path).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].sequence, 2);
        assert_eq!(events[2].run_id, "run-file-2");
        assert!(verify_chain(&events));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_jsonl_refuses_broken_file() {
        let path = temp_path();
        {
            let writer = JsonlAuditWriter::open(&path, "run-bad").unwrap();
            writer.write(&make_trace("a", 1)).unwrap();
            writer.write(&make_trace("a", 2)).unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        let tampered = contents.replacen("\"attempt\":1", "\"attempt\":7", 1);
        assert_ne!(contents, tampered);
        std::fs::write(&path, tampered).unwrap();

        assert!(JsonlAuditWriter::open(&path, "run-bad").is_err());
        let _ = std::fs::remove_file(&path);
    }

    // ── Event index ───────────────────────────────────────────────────────────

    #[test]
    fn test_index_describes_each_record() {
        let writer = InMemoryAuditWriter::new("run-index");
        writer.write(&make_failed_trace("bank", 1, FailureReason::ExecutionMiss)).unwrap();
        writer.write(&make_trace("bank", 2)).unwrap();
        writer.write(&make_summary("run-index")).unwrap();

        let log = writer.export_log().unwrap();
        let first = &log.events[0].index;
        assert_eq!(first.kind, RecordKind::Trace);
        assert_eq!(first.intent_id.as_deref(), Some("bank"));
        assert_eq!(first.attempt, Some(1));
        assert!(!first.success);
        assert_eq!(first.failure_reason, Some(FailureReason::ExecutionMiss));

        let last = &log.events[2].index;
        assert_eq!(last.kind, RecordKind::Summary);
        assert!(last.intent_id.is_none() && last.success);

        let attempts: Vec<u32> = log.attempts_for("bank").map(|t| t.attempt).collect();
        assert_eq!(attempts, vec![1, 2]);
        assert_eq!(log.failures(), vec![("bank", FailureReason::ExecutionMiss)]);
        assert_eq!(log.summary().map(|s| s.run_id.as_str()), Some("run-index"));
        assert_eq!(log.trace_count(), 2);
    }

    /// Rewriting only the index, e.g. to hide a failure, breaks the chain
    /// even though every hash still verifies.
    #[test]
    fn test_edited_index_is_detected() {
        let writer = InMemoryAuditWriter::new("run-index-tamper");
        writer.write(&make_trace("a", 1)).unwrap();
        writer.write(&make_failed_trace("b", 1, FailureReason::UiDrift)).unwrap();

        {
            let mut state = writer.state.lock().unwrap();
            state.events[1].index.success = true;
            state.events[1].index.failure_reason = None;
        }

        assert!(!writer.verify_integrity());
        let log = writer.export_log().unwrap();
        assert_eq!(super::first_broken_link(&log.events), Some(1));
    }

    #[test]
    fn test_summary_of_another_run_is_not_this_logs() {
        let writer = InMemoryAuditWriter::new("run-mine");
        writer.write(&make_summary("run-other")).unwrap();
        assert!(writer.export_log().unwrap().summary().is_none());
    }
}
