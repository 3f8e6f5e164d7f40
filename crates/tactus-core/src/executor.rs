//! The TACTUS executor: one intent, end to end.
//!
//! The executor enforces the execution model:
//!
//!   Validate → Policy (→ Approval) → Pre-gate → [ Attempt → Post-gate → Retry? ]* → Result
//!
//! The safety invariant is absolute: nothing reaches the `InputSink` unless
//! `PolicyEngine::evaluate()` returned `Allow` (or `RequireApproval` and the
//! approver granted it) AND every pre-action gate passed. Every attempt is written to the audit log before the next one
//! starts; an attempt that cannot be audited stops the run.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use tactus_contracts::{
    error::{TactusError, TactusResult},
    execution::{
        ActionTrace, AuditRecord, CameraInput, ExecutionResult, ExecutionSummary, FailureReason, GateState,
        InputEvent,
    },
    geometry::{PathPoint, Point, Region},
    intent::{ActionIntent, ActionType, CameraRequest, MouseButton, Target},
    policy::{ApprovalRequest, PolicyContext, PolicyVerdict},
    profile::HumanizationProfile,
    snapshot::{Snapshot, SnapshotRef},
};
use tactus_gate::{validate_intent, ConfirmKind, GateConfig, GateContext, GatingEngine, PostGate, PreGate};
use tactus_humanize::{
    errors::plan_click,
    keyboard::{plan_typing, Keystroke, TypingPlan},
    motion::{aim_point, apply_overshoot, apply_tremor, camera_drag, generate_drag_path, generate_path, Overshoot},
    timing::{
        sample_cadence, sample_delay, sample_dwell, sample_reaction_delay, sample_scroll_ticks, Cadence, Delay,
        DwellKind,
    },
    SessionRng,
};

use crate::{
    retry::{RetryDecision, RetryPolicy, RetryState},
    session::Session,
    sink::dispatch,
    traits::{Approver, AuditWriter, InputSink, PolicyEngine, SnapshotProvider},
};

/// Result detail set when the rest of the batch must not run.
pub const HALTS_BATCH: &str = "halts_batch";
/// Result detail set when a resource failure ended the run.
pub const HARD_STOP: &str = "hard_stop";

/// What one attempt sampled and did, accumulated while it runs.
#[derive(Debug)]
struct AttemptLog {
    attempt: u32,
    timing: BTreeMap<String, f64>,
    motion: BTreeMap<String, f64>,
    path: Vec<PathPoint>,
    events: Vec<InputEvent>,
    gate_state: GateState,
    misclicks: u32,
    started_at: DateTime<Utc>,
}

impl AttemptLog {
    fn new(attempt: u32, started_at: DateTime<Utc>) -> Self {
        Self {
            attempt,
            timing: BTreeMap::new(),
            motion: BTreeMap::new(),
            path: Vec::new(),
            events: Vec::new(),
            gate_state: GateState::Pending,
            misclicks: 0,
            started_at,
        }
    }

    /// Repeated keys accumulate.
    fn time(&mut self, key: &str, ms: f64) {
        *self.timing.entry(key.to_string()).or_insert(0.0) += ms;
    }

    fn motion(&mut self, key: &str, value: f64) {
        *self.motion.entry(key.to_string()).or_insert(0.0) += value;
    }
}

/// How an attempt, or the gates in front of it, ended.
#[derive(Debug, Clone)]
struct Outcome {
    failure: Option<FailureReason>,
    message: String,
    halts: bool,
    hard_stop: bool,
}

impl Outcome {
    fn success() -> Self {
        Self {
            failure: None,
            message: String::new(),
            halts: false,
            hard_stop: false,
        }
    }

    fn fail(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            failure: Some(reason),
            message: message.into(),
            halts: false,
            hard_stop: false,
        }
    }

    fn halting(mut self) -> Self {
        self.halts = true;
        self
    }

    fn hard(mut self) -> Self {
        self.halts = true;
        self.hard_stop = true;
        self
    }

    /// Classify a runtime error raised mid-intent. Errors that are not
    /// execution outcomes (audit failures, configuration) are returned as-is.
    fn from_error(err: TactusError) -> TactusResult<Self> {
        match err {
            TactusError::Interrupted => Ok(Self::fail(FailureReason::Interrupted, "interrupt signal received").halting()),
            TactusError::SinkUnavailable { reason } => Ok(Self::fail(
                FailureReason::SinkFailure,
                format!("input sink unavailable: {}", reason),
            )
            .hard()),
            TactusError::SnapshotUnavailable { reason } => Ok(Self::fail(
                FailureReason::GatingAbort,
                format!("snapshot unavailable: {}", reason),
            )
            .hard()),
            other => Err(other),
        }
    }
}

enum Gated {
    Passed(Snapshot),
    Stopped { outcome: Outcome, seen: SnapshotRef },
}

struct AttemptEnd {
    outcome: Outcome,
    after: Option<Snapshot>,
}

/// Where an action aims, and the hit area around that point if one is known.
#[derive(Debug, Clone, Copy)]
struct Aim {
    point: Point,
    hit_area: Option<Region>,
}

/// The central executor that turns intents into humanized input.
///
/// The executor owns the trusted components (policy, audit) and the
/// untrusted edges (sink, snapshot provider), and enforces the pipeline
/// ordering on every call to `execute()`. All per-run state lives in the
/// `Session` passed in, so one executor can serve many sessions in turn.
pub struct ActionExecutor {
    sink: Box<dyn InputSink>,
    snapshots: Box<dyn SnapshotProvider>,
    policy: Box<dyn PolicyEngine>,
    approver: Option<Box<dyn Approver>>,
    audit: Box<dyn AuditWriter>,
    gate: GatingEngine,
    retry: RetryPolicy,
}

impl ActionExecutor {
    /// Create an executor with default gating and retry parameters. The
    /// policy's denylist is added to the gate's panic keywords.
    pub fn new(
        sink: Box<dyn InputSink>,
        snapshots: Box<dyn SnapshotProvider>,
        policy: Box<dyn PolicyEngine>,
        audit: Box<dyn AuditWriter>,
    ) -> Self {
        let gate = GatingEngine::default().with_keywords(policy.denylist());
        Self {
            sink,
            snapshots,
            policy,
            approver: None,
            audit,
            gate,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_gate_config(mut self, config: GateConfig) -> Self {
        self.gate = GatingEngine::new(config).with_keywords(self.policy.denylist());
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Route `RequireApproval` verdicts to `approver`. Without one, every
    /// such intent ends as `AwaitingApproval`.
    pub fn with_approver(mut self, approver: Box<dyn Approver>) -> Self {
        self.approver = Some(approver);
        self
    }

    pub fn gate(&self) -> &GatingEngine {
        &self.gate
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// A fresh snapshot from the provider.
    pub fn snapshot(&self) -> TactusResult<Snapshot> {
        self.snapshots.snapshot()
    }

    /// Append the closing summary and seal the log.
    pub fn record_summary(&self, summary: &ExecutionSummary) -> TactusResult<()> {
        self.audit.write(&AuditRecord::Summary(summary.clone()))?;
        self.audit.finalize(&summary.run_id)
    }

    /// Execute one intent against `snapshot`, retrying misses.
    ///
    /// # Pipeline
    ///
    /// 1. Refuse a second concurrent execution of the same `intent_id`
    /// 2. Validate the intent; unusable intents become `GatingAbort`
    /// 3. Call `policy.evaluate()`; `Deny` becomes `PolicyDenied`, never retried.
    ///    `RequireApproval` asks the approver; without a grant the intent ends
    ///    as `AwaitingApproval` and halts the batch
    /// 4. Run the pre-action gates, including focus recovery, panic pauses,
    ///    and confirmation re-checks on fresh snapshots
    /// 5. Per attempt: reaction delay, target resolution, error model, motion
    ///    path, input, settle, fresh snapshot, post-action gate
    /// 6. Write one trace per attempt; retry `ExecutionMiss` within budget
    ///
    /// # Errors
    ///
    /// Returns `Err` only for `IntentInFlight`, policy engine errors, and
    /// audit write failures. Every other outcome, including sink failures and
    /// interrupts, is classified into the returned `ExecutionResult`.
    pub fn execute(
        &self,
        session: &mut Session,
        intent: &ActionIntent,
        snapshot: Snapshot,
    ) -> TactusResult<ExecutionResult> {
        session.begin(&intent.intent_id)?;
        let result = self.run_intent(session, intent, snapshot);
        session.finish(&intent.intent_id);
        result
    }

    fn run_intent(
        &self,
        session: &mut Session,
        intent: &ActionIntent,
        snapshot: Snapshot,
    ) -> TactusResult<ExecutionResult> {
        // The profile is pinned for the whole intent.
        let profile = Arc::clone(session.profile());
        let intent_id = intent.intent_id.as_str();
        let mut log = AttemptLog::new(1, session.now());
        let before = snapshot.reference();

        debug!(
            intent_id,
            action = %intent.action_type,
            profile = %profile.profile_id,
            dry_run = session.is_dry_run(),
            "executor intent starting"
        );

        // ── Step 1: Intent validation ────────────────────────────────────────
        let problems = validate_intent(intent);
        if !problems.is_empty() {
            let reason = TactusError::InvalidIntent {
                intent_id: intent_id.to_string(),
                reason: problems.join("; "),
            };
            warn!(intent_id, reason = %reason, "intent rejected");
            log.gate_state = GateState::GatedAbort;
            let outcome = Outcome::fail(FailureReason::GatingAbort, reason.to_string());
            self.record(session, intent, &profile, log, before, None, &outcome)?;
            return Ok(self.result(session, intent_id, &outcome, 1, 0));
        }

        // ── Step 2: Policy evaluation ────────────────────────────────────────
        //
        // The first trust gate. No input is planned until Allow.
        let policy_ctx = PolicyContext {
            session_id: session.session_id().to_string(),
            intent_id: intent_id.to_string(),
            action_type: intent.action_type,
            action_label: intent.payload.action_label.clone(),
            now: session.now(),
        };
        let stopped = match self.policy.evaluate(&policy_ctx)? {
            PolicyVerdict::Allow => None,
            PolicyVerdict::Deny { reason } => {
                warn!(intent_id, reason = %reason, "policy denied action");
                Some(Outcome::fail(FailureReason::PolicyDenied, format!("policy denied: {}", reason)))
            }
            PolicyVerdict::RequireApproval { reason, approver_role } => {
                let request = ApprovalRequest {
                    session_id: policy_ctx.session_id.clone(),
                    intent_id: intent_id.to_string(),
                    action_type: intent.action_type,
                    action_label: policy_ctx.action_label.clone(),
                    reason,
                    approver_role,
                };
                let granted = match &self.approver {
                    Some(approver) => approver.approve(&request)?,
                    None => false,
                };
                if granted {
                    info!(intent_id, role = %request.approver_role, "action approved");
                    None
                } else {
                    warn!(intent_id, role = %request.approver_role, reason = %request.reason, "action awaiting approval");
                    Some(
                        Outcome::fail(
                            FailureReason::AwaitingApproval,
                            format!("awaiting approval from {}: {}", request.approver_role, request.reason),
                        )
                        .halting(),
                    )
                }
            }
        };
        if let Some(outcome) = stopped {
            log.gate_state = GateState::GatedAbort;
            self.record(session, intent, &profile, log, before, None, &outcome)?;
            return Ok(self.result(session, intent_id, &outcome, 1, 0));
        }

        // ── Step 3: Pre-action gates ─────────────────────────────────────────
        let current = match self.pre_gate(session, intent, &profile, snapshot, &mut log) {
            Ok(Gated::Passed(current)) => current,
            Ok(Gated::Stopped { outcome, seen }) => {
                log.gate_state = GateState::GatedAbort;
                self.record(session, intent, &profile, log, seen, None, &outcome)?;
                return Ok(self.result(session, intent_id, &outcome, 1, 0));
            }
            Err(err) => {
                let outcome = Outcome::from_error(err)?;
                warn!(intent_id, reason = %outcome.message, "intent stopped before input");
                self.record(session, intent, &profile, log, before, None, &outcome)?;
                return Ok(self.result(session, intent_id, &outcome, 1, 0));
            }
        };
        log.gate_state = GateState::GatedOk;

        // ── Step 4: Attempts ─────────────────────────────────────────────────
        self.attempts(session, intent, &profile, current, log)
    }

    fn pre_gate(
        &self,
        session: &mut Session,
        intent: &ActionIntent,
        profile: &HumanizationProfile,
        snapshot: Snapshot,
        log: &mut AttemptLog,
    ) -> TactusResult<Gated> {
        let intent_id = intent.intent_id.as_str();
        let gates = &profile.gates;
        let check_soft_hover =
            intent.payload.expected_hover_text.is_some() && session.rng_mut().chance(gates.hover_check_probability);
        let mut ctx = GateContext {
            require_focus_default: gates.require_focus,
            focus_recovery: gates.focus_recovery,
            interrupts_enabled: gates.interrupts_enabled,
            check_soft_hover,
            ..GateContext::new(session.now())
        };
        let max_panics = self.gate.config().max_panic_pauses;
        let mut panics = 0u32;
        let mut confirming: Option<ConfirmKind> = None;
        let mut current = snapshot;

        loop {
            ctx.now = session.now();
            match self.gate.pre_check(intent, &current, &ctx) {
                PreGate::Proceed => return Ok(Gated::Passed(current)),

                PreGate::RecoverFocus => {
                    info!(intent_id, "client unfocused, issuing focus recovery click");
                    self.recover_focus(session, intent, profile, &current, log)?;
                    ctx.focus_recovery = false;
                    current = self.snapshots.snapshot()?;
                }

                PreGate::Panic { reason } => {
                    if panics >= max_panics {
                        warn!(intent_id, reason = %reason, pauses = panics, "panic persisted, aborting batch");
                        let outcome = Outcome::fail(
                            FailureReason::GatingAbort,
                            format!("panic persisted after {} pauses: {}", panics, reason),
                        )
                        .halting();
                        return Ok(Gated::Stopped {
                            outcome,
                            seen: current.reference(),
                        });
                    }
                    panics += 1;
                    let pause = sample_delay(profile, Delay::InterruptPause, session.rng_mut());
                    warn!(intent_id, reason = %reason, pause = panics, pause_ms = pause, "panic trigger, pausing");
                    log.time(Delay::InterruptPause.key(), pause);
                    session.pause(pause)?;
                    current = self.snapshots.snapshot()?;
                }

                PreGate::Confirm { kind } => {
                    let pause = sample_delay(profile, Delay::ConfirmationPause, session.rng_mut());
                    let dwell = sample_dwell(profile, DwellKind::Confirmation, session.rng_mut());
                    debug!(intent_id, kind = kind.as_str(), pause_ms = pause + dwell, "confirmation re-check");
                    log.time(Delay::ConfirmationPause.key(), pause);
                    log.time(DwellKind::Confirmation.key(), dwell);
                    session.pause(pause + dwell)?;
                    current = self.snapshots.snapshot()?;
                    ctx.mark_confirmed(kind);
                    confirming = Some(kind);
                }

                PreGate::Skip { reason } => {
                    let outcome = if confirming == Some(ConfirmKind::Irreversible) {
                        Outcome::fail(
                            FailureReason::GatingAbort,
                            format!("irreversible action not reconfirmed: {}", reason),
                        )
                    } else {
                        Outcome::fail(FailureReason::Skipped, reason)
                    };
                    info!(intent_id, reason = %outcome.message, "intent not executed");
                    return Ok(Gated::Stopped {
                        outcome,
                        seen: current.reference(),
                    });
                }

                PreGate::Abort { reason } => {
                    warn!(intent_id, reason = %reason, "pre-action gate aborted intent");
                    return Ok(Gated::Stopped {
                        outcome: Outcome::fail(FailureReason::GatingAbort, reason),
                        seen: current.reference(),
                    });
                }
            }
        }
    }

    /// Click the centre of the client to regain focus.
    ///
    /// Recovery is its own action with its own trace; `log` is restarted
    /// afterwards so trace windows never overlap. Delays already sampled for
    /// the intent carry over.
    fn recover_focus(
        &self,
        session: &mut Session,
        intent: &ActionIntent,
        profile: &HumanizationProfile,
        snapshot: &Snapshot,
        log: &mut AttemptLog,
    ) -> TactusResult<()> {
        let center = snapshot.client.bounds.center();
        let mut recovery = ActionIntent::new(
            format!("{}-focus-recovery", intent.intent_id),
            ActionType::Click,
            Target::point(center.x, center.y),
        );
        recovery.gating.require_focus = Some(false);

        let mut rlog = AttemptLog::new(1, session.now());
        rlog.gate_state = GateState::Executing;
        let bounds = client_bounds(snapshot);
        let delivered = self
            .move_cursor(session, profile, center, bounds.as_ref(), &mut rlog)
            .and_then(|()| self.press(session, profile, MouseButton::Left, false, None, &mut rlog));

        if let Err(err) = delivered {
            rlog.gate_state = GateState::VerifiedFail;
            let outcome = Outcome::fail(FailureReason::GatingAbort, format!("focus recovery failed: {}", err));
            self.record(session, &recovery, profile, rlog, snapshot.reference(), None, &outcome)?;
            return Err(err);
        }
        rlog.gate_state = GateState::VerifiedOk;
        self.record(session, &recovery, profile, rlog, snapshot.reference(), None, &Outcome::success())?;

        let carried = std::mem::take(&mut log.timing);
        *log = AttemptLog::new(log.attempt, session.now());
        log.timing = carried;
        Ok(())
    }

    fn attempts(
        &self,
        session: &mut Session,
        intent: &ActionIntent,
        profile: &HumanizationProfile,
        mut before: Snapshot,
        first: AttemptLog,
    ) -> TactusResult<ExecutionResult> {
        let intent_id = intent.intent_id.as_str();
        let retry = self.retry.for_intent(intent);
        let mut state = RetryState::first();
        let mut log = first;
        let mut misclicks = 0;

        loop {
            let before_ref = before.reference();
            let (outcome, after) = match self.attempt(session, intent, profile, &before, &state, &mut log) {
                Ok(AttemptEnd { outcome, after }) => (outcome, after),
                Err(err) => (Outcome::from_error(err)?, None),
            };
            misclicks += log.misclicks;
            let attempt = log.attempt;
            let after_ref = after.as_ref().map(Snapshot::reference);
            self.record(session, intent, profile, log, before_ref, after_ref, &outcome)?;

            match outcome.failure {
                None => {
                    debug!(intent_id, attempt, "intent verified");
                    return Ok(self.result(session, intent_id, &outcome, attempt, misclicks));
                }
                Some(FailureReason::ExecutionMiss) => {
                    match retry.next(&state, FailureReason::ExecutionMiss, session.rng_mut()) {
                        RetryDecision::Retry(next) => {
                            info!(intent_id, attempt = next.attempt, reason = %outcome.message, "retrying missed action");
                            state = next;
                            log = AttemptLog::new(state.attempt, session.now());
                            log.gate_state = GateState::GatedOk;
                            if let Some(after) = after {
                                before = after;
                            }
                        }
                        RetryDecision::GiveUp { reason } => {
                            warn!(intent_id, attempt, reason = %reason, "retry budget exhausted");
                            let outcome = Outcome {
                                message: format!("{} ({})", outcome.message, reason),
                                ..outcome
                            };
                            return Ok(self.result(session, intent_id, &outcome, attempt, misclicks));
                        }
                    }
                }
                Some(reason) => {
                    warn!(intent_id, attempt, reason = %reason, message = %outcome.message, "intent failed");
                    return Ok(self.result(session, intent_id, &outcome, attempt, misclicks));
                }
            }
        }
    }

    fn attempt(
        &self,
        session: &mut Session,
        intent: &ActionIntent,
        profile: &HumanizationProfile,
        before: &Snapshot,
        state: &RetryState,
        log: &mut AttemptLog,
    ) -> TactusResult<AttemptEnd> {
        log.gate_state = GateState::Executing;
        if state.next_backoff_ms > 0.0 {
            log.time("retry_backoff", state.next_backoff_ms);
            session.pause(state.next_backoff_ms)?;
        }

        // ── Reaction ─────────────────────────────────────────────────────────
        let reaction = match intent.payload.reaction_ms {
            Some(ms) => ms.max(0.0),
            None => sample_reaction_delay(intent.action_type, profile, session.rng_mut()),
        };
        log.time("reaction", reaction);
        session.pause(reaction)?;

        // ── Target resolution ────────────────────────────────────────────────
        let aim = match resolve_target(intent, before, state.reaim, session.rng_mut()) {
            Ok(aim) => aim,
            Err(reason) => {
                log.gate_state = GateState::VerifiedFail;
                return Ok(AttemptEnd {
                    outcome: Outcome::fail(FailureReason::ExecutionMiss, reason),
                    after: None,
                });
            }
        };
        let bounds = client_bounds(before);

        // ── Input ────────────────────────────────────────────────────────────
        self.perform(session, intent, profile, aim, bounds.as_ref(), log)?;

        // ── Verification ─────────────────────────────────────────────────────
        let settle = sample_dwell(profile, DwellKind::Settle, session.rng_mut());
        log.time(DwellKind::Settle.key(), settle);
        session.pause(settle)?;

        let mut after = self.snapshots.snapshot()?;
        let mut verdict = self.gate.post_check(intent, before, &after);
        if let PostGate::Occluded { element_id } = verdict.clone() {
            let wait = sample_delay(profile, Delay::OcclusionWait, session.rng_mut());
            debug!(intent_id = %intent.intent_id, element_id = %element_id, wait_ms = wait, "target occluded, re-checking");
            log.time(Delay::OcclusionWait.key(), wait);
            session.pause(wait)?;
            after = self.snapshots.snapshot()?;
            verdict = self.gate.post_check(intent, before, &after);
        }

        let outcome = match verdict {
            PostGate::Verified => {
                log.gate_state = GateState::VerifiedOk;
                Outcome::success()
            }
            PostGate::UiDrift { reason } => {
                log.gate_state = GateState::VerifiedFail;
                Outcome::fail(FailureReason::UiDrift, reason).halting()
            }
            PostGate::Occluded { element_id } => {
                log.gate_state = GateState::VerifiedFail;
                Outcome::fail(
                    FailureReason::ExecutionMiss,
                    format!("target '{}' still occluded", element_id),
                )
            }
            PostGate::Miss { reason } => {
                log.gate_state = GateState::VerifiedFail;
                Outcome::fail(FailureReason::ExecutionMiss, reason)
            }
        };
        Ok(AttemptEnd {
            outcome,
            after: Some(after),
        })
    }

    fn perform(
        &self,
        session: &mut Session,
        intent: &ActionIntent,
        profile: &HumanizationProfile,
        aim: Option<Aim>,
        bounds: Option<&Region>,
        log: &mut AttemptLog,
    ) -> TactusResult<()> {
        match intent.action_type {
            ActionType::Move => match aim {
                Some(aim) => self.move_cursor(session, profile, aim.point, bounds, log),
                None => Ok(()),
            },
            ActionType::Click => match aim {
                Some(aim) => self.click(session, intent, profile, aim, bounds, log),
                None => Ok(()),
            },
            ActionType::Drag => self.drag(session, intent, profile, aim, bounds, log),
            ActionType::Type => self.type_text(session, intent, profile, aim, bounds, log),
            ActionType::Scroll => self.scroll(session, intent, profile, aim, bounds, log),
            ActionType::Camera => self.camera(session, intent, profile, aim, bounds, log),
        }
    }

    /// Deliver one event, or log it in dry-run. Either way the event is
    /// recorded, so dry-run traces match live ones.
    fn emit(&self, session: &Session, log: &mut AttemptLog, event: InputEvent) -> TactusResult<()> {
        session.check_interrupt()?;
        if session.is_dry_run() {
            debug!(?event, "dry run: input suppressed");
        } else {
            dispatch(self.sink.as_ref(), &event)?;
        }
        log.events.push(event);
        Ok(())
    }

    /// Walk the cursor to `to` along a humanized path.
    fn move_cursor(
        &self,
        session: &mut Session,
        profile: &HumanizationProfile,
        to: Point,
        bounds: Option<&Region>,
        log: &mut AttemptLog,
    ) -> TactusResult<()> {
        let from = session.cursor();
        let rng = session.rng_mut();
        let path = generate_path(from, to, bounds, profile, rng);
        let Overshoot {
            mut path,
            overshoot_px,
            corrections,
        } = apply_overshoot(path, profile, rng);
        let tremor = apply_tremor(&mut path, profile, rng);

        if let Some(px) = overshoot_px {
            log.motion("overshoot_px", px);
            log.motion("overshoot_corrections", f64::from(corrections));
        }
        log.motion("tremor_points", tremor as f64);
        log.motion("path_points", path.len() as f64);

        let mut elapsed = 0.0;
        for p in path.iter().skip(1) {
            session.pause(p.t_ms - elapsed)?;
            elapsed = p.t_ms;
            self.emit(session, log, InputEvent::Move { x: p.x, y: p.y })?;
            session.set_cursor(p.point());
        }
        log.time("movement", elapsed);
        log.path.extend(path);
        Ok(())
    }

    /// One button press. The hold comes from the long-press dwell, the
    /// intent's cadence, or the click dwell, in that order.
    fn press(
        &self,
        session: &mut Session,
        profile: &HumanizationProfile,
        button: MouseButton,
        long_press: bool,
        cadence: Option<Cadence>,
        log: &mut AttemptLog,
    ) -> TactusResult<()> {
        let (kind, down_ms) = match (long_press, cadence) {
            (true, _) => (
                DwellKind::LongPress,
                sample_dwell(profile, DwellKind::LongPress, session.rng_mut()),
            ),
            (false, Some(c)) => (DwellKind::ClickDownUp, c.press_ms()),
            (false, None) => (
                DwellKind::ClickDownUp,
                sample_dwell(profile, DwellKind::ClickDownUp, session.rng_mut()),
            ),
        };
        let up_ms = sample_dwell(profile, DwellKind::Release, session.rng_mut());
        log.time(kind.key(), down_ms);
        log.time(DwellKind::Release.key(), up_ms);
        self.emit(session, log, InputEvent::Click { button, down_ms, up_ms })
    }

    fn click(
        &self,
        session: &mut Session,
        intent: &ActionIntent,
        profile: &HumanizationProfile,
        aim: Aim,
        bounds: Option<&Region>,
        log: &mut AttemptLog,
    ) -> TactusResult<()> {
        let payload = &intent.payload;
        let button = payload.button.unwrap_or_default();
        let cadence = match payload.cadence_context.as_deref() {
            Some(context) => {
                let cadence = sample_cadence(profile, context, session.rng_mut());
                match cadence {
                    Some(c) => log.time("cadence", c.cadence_ms),
                    None => debug!(intent_id = %intent.intent_id, context, "unknown click cadence"),
                }
                cadence
            }
            None => None,
        };
        let plan = plan_click(aim.point, aim.hit_area.as_ref(), profile, session.rng_mut());

        self.move_cursor(session, profile, plan.aim, bounds, log)?;
        let hover = match cadence {
            Some(c) => c.hover_ms(),
            None => sample_dwell(profile, DwellKind::Hover, session.rng_mut()),
        };
        log.time(DwellKind::Hover.key(), hover);
        session.pause(hover)?;

        let presses = payload.click_count.unwrap_or(1).max(1);
        for n in 0..presses {
            if n > 0 {
                let gap = match cadence {
                    Some(c) => c.gap_ms(),
                    None => sample_delay(profile, Delay::DoubleClickGap, session.rng_mut()),
                };
                log.time(Delay::DoubleClickGap.key(), gap);
                session.pause(gap)?;
            }
            self.press(session, profile, button, payload.long_press, cadence, log)?;
        }
        if presses > 1 {
            log.motion("click_count", f64::from(presses));
        }

        if plan.misclick {
            log.misclicks += 1;
            log.motion("misclick_offset_px", plan.offset_px);
            debug!(
                intent_id = %intent.intent_id,
                offset_px = plan.offset_px,
                corrected = plan.correct,
                "near-miss click"
            );
            if plan.correct {
                let delay = sample_delay(profile, Delay::CorrectionDelay, session.rng_mut());
                log.time(Delay::CorrectionDelay.key(), delay);
                session.pause(delay)?;
                self.move_cursor(session, profile, plan.target, bounds, log)?;
                self.press(session, profile, button, false, None, log)?;
            }
        }
        Ok(())
    }

    fn drag(
        &self,
        session: &mut Session,
        intent: &ActionIntent,
        profile: &HumanizationProfile,
        aim: Option<Aim>,
        bounds: Option<&Region>,
        log: &mut AttemptLog,
    ) -> TactusResult<()> {
        let start = intent.payload.drag_start.unwrap_or_else(|| session.cursor());
        let end = intent
            .payload
            .drag_end
            .or(aim.map(|a| a.point))
            .unwrap_or_else(|| session.cursor());

        if start.distance_to(&session.cursor()) > 0.5 {
            self.move_cursor(session, profile, start, bounds, log)?;
        }

        let plan = generate_drag_path(start, end, bounds, profile, session.rng_mut());
        log.time(Delay::DragHesitation.key(), plan.hesitation_ms);
        session.pause(plan.hesitation_ms)?;

        // The button stays down on the end point for the sampled hold.
        let mut path = plan.path;
        if let Some(last) = path.last().copied() {
            path.push(PathPoint::new(last.x, last.y, last.t_ms + plan.hold_ms));
        }
        log.time(Delay::DragHold.key(), plan.hold_ms);
        log.motion("drag_end_offset_x", plan.end_offset.0);
        log.motion("drag_end_offset_y", plan.end_offset.1);
        log.motion("path_points", path.len() as f64);

        self.emit(session, log, InputEvent::Drag { path: path.clone() })?;
        log.path.extend(path);
        session.set_cursor(end);
        Ok(())
    }

    /// Type in bursts of a few characters with a short hesitation between
    /// bursts, or press the intent's named key. A target, if given, is
    /// clicked first.
    fn type_text(
        &self,
        session: &mut Session,
        intent: &ActionIntent,
        profile: &HumanizationProfile,
        aim: Option<Aim>,
        bounds: Option<&Region>,
        log: &mut AttemptLog,
    ) -> TactusResult<()> {
        if let Some(aim) = aim {
            self.click(session, intent, profile, aim, bounds, log)?;
        }
        if let Some(key) = intent.payload.key.as_deref() {
            let hold_ms = sample_dwell(profile, DwellKind::ClickDownUp, session.rng_mut());
            log.time("key_hold", hold_ms);
            return self.emit(
                session,
                log,
                InputEvent::Key {
                    key: key.to_string(),
                    hold_ms,
                },
            );
        }

        let text = intent.payload.text.as_deref().unwrap_or_default();
        let TypingPlan { strokes, bursts, typos } = plan_typing(text, profile, session.rng_mut());
        for stroke in strokes {
            match stroke {
                Keystroke::Pause { key, ms } => {
                    log.time(key, ms);
                    session.pause(ms)?;
                }
                Keystroke::Chars {
                    text,
                    per_char_delay_ms,
                    overlap_ms,
                    modifier,
                } => {
                    log.time(Delay::KeyDelay.key(), per_char_delay_ms * text.chars().count() as f64);
                    log.time(Delay::KeyOverlap.key(), overlap_ms);
                    if let Some(m) = &modifier {
                        log.time(Delay::ModifierLead.key(), m.lead_ms);
                    }
                    self.emit(
                        session,
                        log,
                        InputEvent::Type {
                            text,
                            per_char_delay_ms,
                            overlap_ms,
                            modifier,
                        },
                    )?;
                }
                Keystroke::Backspace { hold_ms } => {
                    log.time(Delay::Backspace.key(), hold_ms);
                    self.emit(
                        session,
                        log,
                        InputEvent::Key {
                            key: "backspace".to_string(),
                            hold_ms,
                        },
                    )?;
                }
            }
        }
        log.motion("typing_bursts", f64::from(bursts));
        if typos > 0 {
            log.motion("typos", f64::from(typos));
        }
        Ok(())
    }

    /// Scroll in gestures of a few ticks each, pausing between gestures.
    fn scroll(
        &self,
        session: &mut Session,
        intent: &ActionIntent,
        profile: &HumanizationProfile,
        aim: Option<Aim>,
        bounds: Option<&Region>,
        log: &mut AttemptLog,
    ) -> TactusResult<()> {
        if let Some(aim) = aim {
            self.move_cursor(session, profile, aim.point, bounds, log)?;
        }
        let amount = intent.payload.scroll_amount.unwrap_or(0);
        let direction = amount.signum();
        let mut remaining = amount.unsigned_abs();
        let mut gestures = 0u32;
        while remaining > 0 {
            if gestures > 0 {
                let pause = sample_delay(profile, Delay::ScrollPause, session.rng_mut());
                log.time(Delay::ScrollPause.key(), pause);
                session.pause(pause)?;
            }
            let ticks = sample_scroll_ticks(profile, session.rng_mut()).min(remaining);
            self.emit(
                session,
                log,
                InputEvent::Scroll {
                    amount: direction * ticks as i32,
                },
            )?;
            remaining -= ticks;
            gestures += 1;
        }
        log.motion("scroll_gestures", f64::from(gestures));
        Ok(())
    }

    fn camera(
        &self,
        session: &mut Session,
        intent: &ActionIntent,
        profile: &HumanizationProfile,
        aim: Option<Aim>,
        bounds: Option<&Region>,
        log: &mut AttemptLog,
    ) -> TactusResult<()> {
        match &intent.payload.camera {
            Some(CameraRequest::Key { key, hold_ms }) => {
                let hold = match hold_ms {
                    Some(ms) => ms.max(0.0) * session.rng_mut().uniform(0.9, 1.1),
                    None => sample_delay(profile, Delay::DragHold, session.rng_mut()),
                };
                log.time("camera_hold", hold);
                self.emit(
                    session,
                    log,
                    InputEvent::Camera {
                        input: CameraInput::Key {
                            key: key.clone(),
                            hold_ms: hold,
                        },
                    },
                )
            }
            request => {
                let yaw_deg = match request {
                    Some(CameraRequest::Rotate { yaw_deg }) => *yaw_deg,
                    _ => 0.0,
                };
                if let Some(aim) = aim {
                    self.move_cursor(session, profile, aim.point, bounds, log)?;
                }
                let origin = session.cursor();
                let plan = camera_drag(origin, yaw_deg, profile, session.rng_mut());
                for (key, value) in plan.motion_fields() {
                    log.motion(&key, value);
                }
                let end = plan.path.last().map_or(origin, PathPoint::point);
                self.emit(
                    session,
                    log,
                    InputEvent::Camera {
                        input: CameraInput::Drag {
                            path: plan.path.clone(),
                        },
                    },
                )?;
                log.path.extend(plan.path);
                session.set_cursor(end);
                Ok(())
            }
        }
    }

    /// Write the trace for one finished attempt.
    fn record(
        &self,
        session: &Session,
        intent: &ActionIntent,
        profile: &HumanizationProfile,
        log: AttemptLog,
        before: SnapshotRef,
        after: Option<SnapshotRef>,
        outcome: &Outcome,
    ) -> TactusResult<()> {
        let trace = ActionTrace {
            intent_id: intent.intent_id.clone(),
            attempt: log.attempt,
            intent: intent.clone(),
            profile_id: profile.profile_id.clone(),
            profile_version: profile.version,
            dry_run: session.is_dry_run(),
            timing: log.timing,
            motion: log.motion,
            path: log.path,
            events: log.events,
            gate_state: log.gate_state,
            success: outcome.failure.is_none(),
            failure_reason: outcome.failure,
            message: outcome.message.clone(),
            snapshot_before: Some(before),
            snapshot_after: after,
            started_at: log.started_at,
            finished_at: session.now(),
        };
        debug!(
            intent_id = %trace.intent_id,
            attempt = trace.attempt,
            events = trace.events.len(),
            gate_state = ?trace.gate_state,
            "writing trace"
        );
        self.audit.write(&AuditRecord::Trace(trace))
    }

    fn result(
        &self,
        session: &Session,
        intent_id: &str,
        outcome: &Outcome,
        attempts: u32,
        misclicks: u32,
    ) -> ExecutionResult {
        let base = match outcome.failure {
            None => ExecutionResult::succeeded(intent_id),
            Some(reason) => ExecutionResult::failed(intent_id, reason, outcome.message.clone()),
        };
        let mut result = base
            .with_detail("attempts", attempts)
            .with_detail("dry_run", session.is_dry_run());
        if misclicks > 0 {
            result = result.with_detail("misclicks", misclicks);
        }
        if outcome.halts {
            result = result.with_detail(HALTS_BATCH, true);
        }
        if outcome.hard_stop {
            result = result.with_detail(HARD_STOP, true);
        }
        result
    }
}

/// Client bounds usable for edge avoidance, if perception reported any.
fn client_bounds(snapshot: &Snapshot) -> Option<Region> {
    let b = snapshot.client.bounds;
    (b.width > 0.0 && b.height > 0.0).then_some(b)
}

/// Resolve the intent's target against `snapshot`, applying any retry nudge.
///
/// `Ok(None)` means the action has no positional target. A missing element
/// is a miss, so a later attempt can find it on a fresh snapshot.
fn resolve_target(
    intent: &ActionIntent,
    snapshot: &Snapshot,
    reaim: Option<(f64, f64)>,
    rng: &mut SessionRng,
) -> Result<Option<Aim>, String> {
    let bias = intent.payload.target_bias.as_deref();
    let aim = match &intent.target {
        Target::Point { x, y } => Aim {
            point: Point::new(*x, *y),
            hit_area: None,
        },
        Target::Region { x, y, width, height } => {
            let region = Region::new(*x, *y, *width, *height);
            Aim {
                point: aim_point(&region, bias, rng),
                hit_area: Some(region),
            }
        }
        Target::Element { element_id } => {
            let element = snapshot
                .element(element_id)
                .ok_or_else(|| format!("element '{}' not found", element_id))?;
            Aim {
                point: aim_point(&element.bounds, bias, rng),
                hit_area: Some(element.bounds),
            }
        }
        Target::None => return Ok(None),
    };
    Ok(Some(match reaim {
        Some((dx, dy)) => Aim {
            point: aim.point.offset(dx, dy),
            ..aim
        },
        None => aim,
    }))
}
