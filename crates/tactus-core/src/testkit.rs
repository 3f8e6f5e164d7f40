//! Mock collaborators shared by the executor and loop tests.
//!
//! Every mock keeps its observable state behind `Arc<Mutex<_>>` so a test can
//! clone a handle before boxing the mock into the executor.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};

use tactus_contracts::{
    error::{TactusError, TactusResult},
    execution::{ActionTrace, AuditRecord, ExecutionSummary, InputEvent},
    geometry::Region,
    intent::{ActionIntent, ActionType, Target},
    policy::{PolicyContext, PolicyVerdict},
    profile::{Distribution, HumanizationProfile},
    snapshot::Snapshot,
};

use crate::{
    clock::ManualClock,
    executor::ActionExecutor,
    session::Session,
    sink::RecordingSink,
    traits::{AuditWriter, PolicyEngine, SnapshotProvider},
};

// ── Policy ───────────────────────────────────────────────────────────────────

pub struct MockPolicy {
    pub verdict: PolicyVerdict,
    pub denylist: Vec<String>,
    /// Action labels denied regardless of `verdict`.
    pub blocked_labels: Vec<String>,
    pub calls: Arc<Mutex<u32>>,
}

impl MockPolicy {
    pub fn allow() -> Self {
        Self {
            verdict: PolicyVerdict::Allow,
            denylist: Vec::new(),
            blocked_labels: Vec::new(),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn require_approval(reason: &str) -> Self {
        Self {
            verdict: PolicyVerdict::RequireApproval {
                reason: reason.to_string(),
                approver_role: "operator".to_string(),
            },
            ..Self::allow()
        }
    }

    pub fn deny(reason: &str) -> Self {
        Self {
            verdict: PolicyVerdict::Deny {
                reason: reason.to_string(),
            },
            ..Self::allow()
        }
    }
}

impl PolicyEngine for MockPolicy {
    fn evaluate(&self, ctx: &PolicyContext) -> TactusResult<PolicyVerdict> {
        *self.calls.lock().unwrap() += 1;
        if let Some(label) = ctx.action_label.as_deref() {
            if self.blocked_labels.iter().any(|b| b == label) {
                return Ok(PolicyVerdict::Deny {
                    reason: format!("{} is blocked", label),
                });
            }
        }
        Ok(self.verdict.clone())
    }

    fn denylist(&self) -> Vec<String> {
        self.denylist.clone()
    }
}

// ── Audit ────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockAudit {
    pub records: Arc<Mutex<Vec<AuditRecord>>>,
    pub finalized: Arc<Mutex<Vec<String>>>,
    pub fail: bool,
}

impl MockAudit {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn traces(&self) -> Vec<ActionTrace> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| match r {
                AuditRecord::Trace(t) => Some(t.clone()),
                AuditRecord::Summary(_) => None,
            })
            .collect()
    }

    pub fn summaries(&self) -> Vec<ExecutionSummary> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| match r {
                AuditRecord::Summary(s) => Some(s.clone()),
                AuditRecord::Trace(_) => None,
            })
            .collect()
    }
}

impl AuditWriter for MockAudit {
    fn write(&self, record: &AuditRecord) -> TactusResult<()> {
        if self.fail {
            return Err(TactusError::AuditWriteFailed {
                reason: "disk full".to_string(),
            });
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn finalize(&self, run_id: &str) -> TactusResult<()> {
        self.finalized.lock().unwrap().push(run_id.to_string());
        Ok(())
    }
}

// ── Snapshots ────────────────────────────────────────────────────────────────

/// Returns queued snapshots in order, then repeats the last one forever.
#[derive(Clone)]
pub struct SequenceSnapshots {
    queue: Arc<Mutex<VecDeque<Snapshot>>>,
    last: Arc<Mutex<Snapshot>>,
}

impl SequenceSnapshots {
    pub fn new(snapshots: Vec<Snapshot>) -> Self {
        let last = snapshots.last().cloned().unwrap_or_else(snapshot);
        Self {
            queue: Arc::new(Mutex::new(snapshots.into())),
            last: Arc::new(Mutex::new(last)),
        }
    }

    pub fn repeating(s: Snapshot) -> Self {
        Self::new(vec![s])
    }
}

impl SnapshotProvider for SequenceSnapshots {
    fn snapshot(&self) -> TactusResult<Snapshot> {
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(s) => {
                *self.last.lock().unwrap() = s.clone();
                Ok(s)
            }
            None => Ok(self.last.lock().unwrap().clone()),
        }
    }
}

/// Shows `after` once the watched sink has delivered `clicks` clicks.
pub struct AfterClicks {
    pub sink: RecordingSink,
    pub clicks: usize,
    pub before: Snapshot,
    pub after: Snapshot,
}

impl SnapshotProvider for AfterClicks {
    fn snapshot(&self) -> TactusResult<Snapshot> {
        let seen = self
            .sink
            .events()
            .iter()
            .filter(|e| matches!(e, InputEvent::Click { .. }))
            .count();
        Ok(if seen >= self.clicks {
            self.after.clone()
        } else {
            self.before.clone()
        })
    }
}

pub struct NoSnapshots;

impl SnapshotProvider for NoSnapshots {
    fn snapshot(&self) -> TactusResult<Snapshot> {
        Err(TactusError::SnapshotUnavailable {
            reason: "capture device lost".to_string(),
        })
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// A focused 800×600 client with nothing open.
pub fn snapshot() -> Snapshot {
    Snapshot::focused(t0(), Region::new(0.0, 0.0, 800.0, 600.0))
}

/// The default profile, seeded, with misclicks and typos switched off so
/// click counts and typed text are predictable.
pub fn profile(seed: u64) -> Arc<HumanizationProfile> {
    let mut p = HumanizationProfile::named("test");
    p.seed = Some(seed);
    p.errors.misclick_rate = 0.0;
    p.typing.typo_rate = 0.0;
    Arc::new(p)
}

/// A profile whose every delay is zero, for runs on the real clock.
pub fn instant_profile(seed: u64) -> Arc<HumanizationProfile> {
    let zero = Distribution::fixed(0.0);
    let mut p = HumanizationProfile::named("instant");
    p.seed = Some(seed);
    p.errors.misclick_rate = 0.0;
    p.typing.typo_rate = 0.0;
    let t = &mut p.timing;
    for d in [
        &mut t.reaction,
        &mut t.hover_dwell,
        &mut t.click_down_up,
        &mut t.confirmation_dwell,
        &mut t.settle,
        &mut t.inter_action,
        &mut t.confirmation_pause,
        &mut t.correction_delay,
        &mut t.drag_hesitation,
        &mut t.drag_hold,
        &mut t.key_delay,
        &mut t.scroll_pause,
        &mut t.interrupt_pause,
        &mut t.occlusion_wait,
        &mut t.release,
        &mut t.long_press,
        &mut t.double_click_gap,
        &mut p.typing.backspace,
        &mut p.typing.key_overlap,
        &mut p.typing.modifier_lead,
        &mut p.idle.edge_pause,
    ] {
        *d = zero;
    }
    p.session.rest = zero;
    p.device.polling_jitter = zero;
    p.device.frame_time_variance = zero;
    p.motion.step_interval_ms = 0.0;
    Arc::new(p)
}

pub fn click(id: &str, x: f64, y: f64) -> ActionIntent {
    ActionIntent::new(id, ActionType::Click, Target::point(x, y))
}

pub fn session(profile: Arc<HumanizationProfile>, clock: &ManualClock) -> Session {
    Session::new(profile, Arc::new(clock.clone()))
}

/// Handles kept by a test after the mocks are boxed into an executor.
pub struct Harness {
    pub sink: RecordingSink,
    pub audit: MockAudit,
    pub clock: ManualClock,
    pub policy_calls: Arc<Mutex<u32>>,
}

/// Build an executor around a recording sink, the given snapshot provider
/// and policy, and a recording audit writer.
pub fn harness(snapshots: Box<dyn SnapshotProvider>, policy: MockPolicy) -> (ActionExecutor, Harness) {
    harness_with_sink(RecordingSink::new(), snapshots, policy)
}

pub fn harness_with_sink(
    sink: RecordingSink,
    snapshots: Box<dyn SnapshotProvider>,
    policy: MockPolicy,
) -> (ActionExecutor, Harness) {
    let audit = MockAudit::default();
    let handles = Harness {
        sink: sink.clone(),
        audit: audit.clone(),
        clock: ManualClock::starting_at(t0()),
        policy_calls: Arc::clone(&policy.calls),
    };
    let executor = ActionExecutor::new(Box::new(sink), snapshots, Box::new(policy), Box::new(audit));
    (executor, handles)
}
