//! Hashing and verification for the trace chain.
//!
//! Hash input layout (bytes, in order):
//!   1. run_id as UTF-8 bytes
//!   2. sequence as 8-byte little-endian
//!   3. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   4. compact JSON of the record
//!
//! The event index is not hashed; it is checked against the record instead.

use sha2::{Digest, Sha256};

use tactus_contracts::{
    error::{TactusError, TactusResult},
    execution::AuditRecord,
};

use crate::event::{AuditEvent, EventIndex};

/// SHA-256 of one chained event.
///
/// The hash commits to the event's position (`sequence`), its run
/// (`run_id`), its link to the previous event (`prev_hash`), and the full
/// record. Returns a lowercase 64-character hex string.
pub fn hash_event(run_id: &str, sequence: u64, record: &AuditRecord, prev_hash: &str) -> TactusResult<String> {
    let record_json = serde_json::to_vec(record).map_err(|e| TactusError::AuditWriteFailed {
        reason: format!("record is not serializable: {}", e),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(run_id.as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&record_json);

    Ok(hex::encode(hasher.finalize()))
}

/// Return the sequence number of the first event that breaks the chain.
///
/// An event breaks the chain when its `prev_hash` does not equal the
/// preceding event's `this_hash` (or `GENESIS_HASH` for the first one), when
/// its stored `this_hash` differs from the recomputed value, when its index
/// no longer matches its record, or when its sequence number is out of
/// order.
pub fn first_broken_link(events: &[AuditEvent]) -> Option<u64> {
    let mut expected_prev = AuditEvent::GENESIS_HASH.to_string();

    for (idx, event) in events.iter().enumerate() {
        if event.sequence != idx as u64 || event.prev_hash != expected_prev || !event.index_matches() {
            return Some(event.sequence);
        }
        match hash_event(&event.run_id, event.sequence, &event.record, &event.prev_hash) {
            Ok(recomputed) if recomputed == event.this_hash => {}
            _ => return Some(event.sequence),
        }
        expected_prev = event.this_hash.clone();
    }

    None
}

/// Verify the integrity of a hash chain. An empty chain is valid.
pub fn verify_chain(events: &[AuditEvent]) -> bool {
    first_broken_link(events).is_none()
}

/// The tip of a chain being appended to.
#[derive(Debug, Clone)]
pub(crate) struct ChainHead {
    /// The next sequence number to assign.
    pub(crate) sequence: u64,
    /// The `this_hash` of the last event, or `GENESIS_HASH`.
    pub(crate) last_hash: String,
}

impl ChainHead {
    pub(crate) fn genesis() -> Self {
        Self {
            sequence: 0,
            last_hash: AuditEvent::GENESIS_HASH.to_string(),
        }
    }

    /// Resume after `last`, the final event of an existing chain.
    pub(crate) fn after(last: &AuditEvent) -> Self {
        Self {
            sequence: last.sequence + 1,
            last_hash: last.this_hash.clone(),
        }
    }

    /// Build the next event without advancing; call `advance` once the event
    /// has been persisted.
    pub(crate) fn link(&self, run_id: &str, record: &AuditRecord) -> TactusResult<AuditEvent> {
        let this_hash = hash_event(run_id, self.sequence, record, &self.last_hash)?;
        Ok(AuditEvent {
            sequence: self.sequence,
            run_id: run_id.to_string(),
            index: EventIndex::of(record),
            record: record.clone(),
            prev_hash: self.last_hash.clone(),
            this_hash,
        })
    }

    pub(crate) fn advance(&mut self, event: &AuditEvent) {
        self.sequence = event.sequence + 1;
        self.last_hash = event.this_hash.clone();
    }
}
