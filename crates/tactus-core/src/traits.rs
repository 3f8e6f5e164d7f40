//! Core trait definitions for the TACTUS execution pipeline.
//!
//! These six traits are the seams between the engine and the outside world:
//!
//! - `InputSink`        — where primitive mouse/keyboard events go
//! - `SnapshotProvider` — where fresh perceived state comes from
//! - `PolicyEngine`     — trusted gate evaluated before any input is planned
//! - `Approver`         — the human who grants `RequireApproval` verdicts
//! - `AuditWriter`      — trusted sink recording every attempt immutably
//! - `Clock`            — wall or virtual time, and the only way to wait
//!
//! The executor wires them together. Nothing reaches the `InputSink` unless
//! the policy engine returned `Allow` (or an approver granted a
//! `RequireApproval`) and every pre-action gate passed.

use chrono::{DateTime, Utc};

use tactus_contracts::{
    error::TactusResult,
    execution::{AuditRecord, CameraInput, ModifierHold},
    geometry::PathPoint,
    intent::MouseButton,
    policy::{ApprovalRequest, PolicyContext, PolicyVerdict},
    snapshot::Snapshot,
};

/// Destination for primitive input events.
///
/// Real OS injection lives outside this workspace. Every method either
/// delivers the event or returns `TactusError::SinkUnavailable`; the executor
/// treats any error as a hard stop for the batch.
pub trait InputSink: Send + Sync {
    fn move_to(&self, x: f64, y: f64) -> TactusResult<()>;

    /// Press and release `button`, holding it down for `down_ms` and waiting
    /// `up_ms` after release.
    fn click(&self, button: MouseButton, down_ms: f64, up_ms: f64) -> TactusResult<()>;

    /// Press, follow `path`, release.
    fn drag(&self, path: &[PathPoint]) -> TactusResult<()>;

    /// Type `text`, one key every `per_char_delay_ms`. Each key goes down
    /// `overlap_ms` before the previous one comes up. `modifier`, if given,
    /// is held for the whole run.
    fn type_text(
        &self,
        text: &str,
        per_char_delay_ms: f64,
        overlap_ms: f64,
        modifier: Option<&ModifierHold>,
    ) -> TactusResult<()>;

    /// Press and release one named key.
    fn key(&self, key: &str, hold_ms: f64) -> TactusResult<()>;

    /// Scroll by `amount` wheel ticks; negative scrolls up.
    fn scroll(&self, amount: i32) -> TactusResult<()>;

    fn camera(&self, input: &CameraInput) -> TactusResult<()>;
}

/// Source of fresh snapshots.
///
/// The executor asks for a new snapshot after every action and before every
/// re-check; it never reuses one across a wait.
pub trait SnapshotProvider: Send + Sync {
    fn snapshot(&self) -> TactusResult<Snapshot>;
}

/// The action policy: the first gate in the pipeline.
///
/// Implementations are **trusted** and must be fast. A `Deny` is terminal for
/// the intent and is never retried.
pub trait PolicyEngine: Send + Sync {
    /// Decide whether the described action may run.
    ///
    /// An `Allow` counts toward any rate limit the engine enforces. The
    /// executor asks once per intent, before any gate runs; retries of the
    /// same intent are not re-evaluated.
    fn evaluate(&self, ctx: &PolicyContext) -> TactusResult<PolicyVerdict>;

    /// Extra panic keywords contributed by the policy.
    fn denylist(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Grants or refuses actions the policy marked `RequireApproval`.
///
/// Asked at most once per intent, after the policy and before any gate.
/// A refusal ends the intent as `AwaitingApproval`.
pub trait Approver: Send + Sync {
    fn approve(&self, request: &ApprovalRequest) -> TactusResult<bool>;
}

/// The audit writer: the immutable execution record.
///
/// Every attempt produces exactly one trace record, and every run ends with
/// one summary record. A failed write is fatal and is returned as
/// `TactusError::AuditWriteFailed`.
pub trait AuditWriter: Send + Sync {
    /// Append one record. Records are never modified or deleted.
    fn write(&self, record: &AuditRecord) -> TactusResult<()>;

    /// Seal the log for `run_id` once the summary has been written.
    fn finalize(&self, run_id: &str) -> TactusResult<()>;
}

/// Time source. All waiting in the engine goes through `sleep`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Block for `ms` milliseconds (or, for a virtual clock, advance by it).
    fn sleep(&self, ms: f64);
}
