//! Execution results, primitive input events, and audit records.
//!
//! `ExecutionResult` is what the executor returns to the caller for each
//! intent. `ActionTrace` is what gets written to the audit log, one per
//! attempt. `ExecutionSummary` closes every batch run.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    geometry::PathPoint,
    intent::{ActionIntent, MouseButton},
    snapshot::SnapshotRef,
};

/// Why an intent did not complete successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// A precondition failed: focus lost, panic trigger, failed double check.
    GatingAbort,
    /// Input was issued but verification saw no expected change.
    ExecutionMiss,
    /// An unexpected UI or modal change followed the action.
    UiDrift,
    /// The action policy refused the action type or its rate.
    PolicyDenied,
    /// Deliberate no-op: a cue or confidence gate was not met in time.
    Skipped,
    /// The input sink failed; the run must stop.
    SinkFailure,
    /// The global abort signal fired.
    Interrupted,
    /// The policy requires an approval that was not granted.
    AwaitingApproval,
}

impl FailureReason {
    /// Only misses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureReason::ExecutionMiss)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::GatingAbort => "gating_abort",
            FailureReason::ExecutionMiss => "execution_miss",
            FailureReason::UiDrift => "ui_drift",
            FailureReason::PolicyDenied => "policy_denied",
            FailureReason::Skipped => "skipped",
            FailureReason::SinkFailure => "sink_failure",
            FailureReason::Interrupted => "interrupted",
            FailureReason::AwaitingApproval => "awaiting_approval",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one intent, after any retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub intent_id: String,
    pub success: bool,
    pub failure_reason: Option<FailureReason>,
    /// Human-readable explanation; empty on success.
    pub message: String,
    /// Free-form diagnostics such as `attempts` or `dry_run`.
    pub details: BTreeMap<String, serde_json::Value>,
}

impl ExecutionResult {
    pub fn succeeded(intent_id: impl Into<String>) -> Self {
        Self {
            intent_id: intent_id.into(),
            success: true,
            failure_reason: None,
            message: String::new(),
            details: BTreeMap::new(),
        }
    }

    pub fn failed(intent_id: impl Into<String>, reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            intent_id: intent_id.into(),
            success: false,
            failure_reason: Some(reason),
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn is_skipped(&self) -> bool {
        self.failure_reason == Some(FailureReason::Skipped)
    }
}

/// Camera input as handed to the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CameraInput {
    Drag { path: Vec<PathPoint> },
    Key { key: String, hold_ms: f64 },
}

/// A modifier key held down around a run of typed characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierHold {
    pub key: String,
    /// How long the modifier is down before the first character.
    pub lead_ms: f64,
}

/// One primitive input call, exactly as issued (or, in dry-run, as it would
/// have been issued) to the `InputSink`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InputEvent {
    Move { x: f64, y: f64 },
    Click { button: MouseButton, down_ms: f64, up_ms: f64 },
    Drag { path: Vec<PathPoint> },
    Type {
        text: String,
        per_char_delay_ms: f64,
        /// Key rollover: each key goes down this long before the previous
        /// one is released.
        #[serde(default)]
        overlap_ms: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        modifier: Option<ModifierHold>,
    },
    /// A single named key (`backspace`, a tab hotkey) pressed for `hold_ms`.
    Key { key: String, hold_ms: f64 },
    Scroll { amount: i32 },
    Camera { input: CameraInput },
}

/// Position of an intent in the gating state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Pending,
    GatedOk,
    GatedAbort,
    Executing,
    VerifiedOk,
    VerifiedFail,
}

/// An immutable audit record of one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionTrace {
    pub intent_id: String,
    /// 1-based attempt number; retries share the `intent_id`.
    pub attempt: u32,
    pub intent: ActionIntent,
    pub profile_id: String,
    pub profile_version: u32,
    pub dry_run: bool,
    /// Sampled delays actually used, keyed by purpose (ms).
    pub timing: BTreeMap<String, f64>,
    /// Sampled motion parameters actually used.
    pub motion: BTreeMap<String, f64>,
    /// The cursor path followed, including overshoot and corrections.
    pub path: Vec<PathPoint>,
    pub events: Vec<InputEvent>,
    pub gate_state: GateState,
    pub success: bool,
    pub failure_reason: Option<FailureReason>,
    pub message: String,
    pub snapshot_before: Option<SnapshotRef>,
    pub snapshot_after: Option<SnapshotRef>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// The closing record of one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub run_id: String,
    pub profile_id: String,
    /// Results in execution order.
    pub results: Vec<ExecutionResult>,
    /// Intents handed to the loop.
    pub submitted: usize,
    /// Intents that reached the executor.
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub aborted_early: bool,
    pub abort_reason: Option<String>,
    /// Set when a resource failure ended the run.
    pub hard_stop: bool,
    /// Unprompted idle actions slipped in between intents.
    #[serde(default)]
    pub idle_actions: u32,
    pub dry_run: bool,
    pub timestamp: DateTime<Utc>,
}

/// Anything the audit log stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum AuditRecord {
    Trace(ActionTrace),
    Summary(ExecutionSummary),
}
