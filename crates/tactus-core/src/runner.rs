//! The execution loop: a batch of intents, in order, with human pacing.
//!
//! The loop owns everything between intents: order variability inside
//! order groups, the `max_actions` cap, inter-action pacing with fatigue and
//! cue spacing, burst/rest rhythm, the occasional idle action after a
//! pause, and fail-fast on batch-halting results.
//! Every run ends with one summary record and a finalized audit log, whether
//! it completed, halted, or was interrupted.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use tactus_contracts::{
    error::{TactusError, TactusResult},
    execution::{ExecutionResult, ExecutionSummary},
    intent::{ActionIntent, ActionType, CameraRequest, Target},
    profile::HumanizationProfile,
};
use tactus_humanize::{
    idle::{plan_idle, should_idle, IdleAction},
    timing::{cue_spacing_ms, sample_inter_action_delay, sample_session_rhythm},
    SessionRng,
};

use crate::{
    clock::SystemClock,
    executor::{ActionExecutor, HALTS_BATCH, HARD_STOP},
    session::Session,
};

/// Why a run stopped before the end of its batch.
struct Stop {
    reason: String,
    hard: bool,
}

impl Stop {
    fn soft(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            hard: false,
        }
    }

    fn hard(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            hard: true,
        }
    }

    /// Map a runtime error raised between intents. Audit and configuration
    /// errors are not stops; they propagate.
    fn from_error(err: TactusError) -> TactusResult<Self> {
        match err {
            TactusError::Interrupted => Ok(Self::soft("interrupted")),
            TactusError::SnapshotUnavailable { reason } => Ok(Self::hard(format!("snapshot unavailable: {}", reason))),
            TactusError::SinkUnavailable { reason } => Ok(Self::hard(format!("input sink unavailable: {}", reason))),
            other => Err(other),
        }
    }

    /// The stop a batch-halting result causes, if it halts.
    fn from_result(intent_id: &str, result: &ExecutionResult) -> Option<Self> {
        if !flag(result, HALTS_BATCH) {
            return None;
        }
        let reason = format!(
            "halted by {}: {}",
            intent_id,
            result.failure_reason.map_or("failure", |r| r.as_str())
        );
        let reason = if result.message.is_empty() {
            reason
        } else {
            format!("{} ({})", reason, result.message)
        };
        warn!(intent_id, reason = %reason, "batch halted");
        Some(Self {
            reason,
            hard: flag(result, HARD_STOP),
        })
    }
}

/// Sequential batch runner over one `ActionExecutor`.
pub struct ExecutionLoop<'e> {
    executor: &'e ActionExecutor,
    run_id: Option<String>,
}

impl<'e> ExecutionLoop<'e> {
    pub fn new(executor: &'e ActionExecutor) -> Self {
        Self { executor, run_id: None }
    }

    /// Use `run_id` instead of a fresh UUID, e.g. to match the id an audit
    /// writer was opened with.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Run `intents` in order (subject to order-group shuffling) and return
    /// the summary, which is also appended to the audit log.
    ///
    /// # Errors
    ///
    /// Only audit failures and other non-execution errors are returned; a
    /// halted or interrupted run is a normal summary with `aborted_early`.
    pub fn run(
        &self,
        session: &mut Session,
        intents: &[ActionIntent],
        max_actions: Option<usize>,
    ) -> TactusResult<ExecutionSummary> {
        let run_id = self.run_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let profile = Arc::clone(session.profile());
        let cap = max_actions.unwrap_or(intents.len()).min(intents.len());
        let planned = plan_order(&intents[..cap], &profile, session.rng_mut());

        info!(
            run_id = %run_id,
            session_id = session.session_id(),
            profile = %profile.profile_id,
            submitted = intents.len(),
            planned = planned.len(),
            dry_run = session.is_dry_run(),
            "run starting"
        );

        let mut results: Vec<ExecutionResult> = Vec::with_capacity(planned.len());
        let mut stop: Option<Stop> = None;
        let idle_before = session.state().idle_actions;

        for (idx, intent) in planned.iter().enumerate() {
            if session.abort_flag().is_triggered() {
                stop = Some(Stop::soft("interrupted"));
                break;
            }

            if idx > 0 {
                match self.pace(session).and_then(|_| self.idle(session)) {
                    Ok(None) => {}
                    Ok(Some(halt)) => {
                        stop = Some(halt);
                        break;
                    }
                    Err(err) => {
                        stop = Some(Stop::from_error(err)?);
                        break;
                    }
                }
            }

            let snapshot = match self.executor.snapshot() {
                Ok(s) => s,
                Err(err) => {
                    stop = Some(Stop::from_error(err)?);
                    break;
                }
            };

            let result = self.executor.execute(session, intent, snapshot)?;
            if result.success {
                session.record_action();
            }
            stop = Stop::from_result(&intent.intent_id, &result);
            results.push(result);
            if stop.is_some() {
                break;
            }
        }

        let idle_actions = session.state().idle_actions.saturating_sub(idle_before);
        let mut summary = summarize(run_id, &profile, intents.len(), results, stop, session);
        summary.idle_actions = idle_actions;
        info!(
            run_id = %summary.run_id,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            idle_actions = summary.idle_actions,
            aborted_early = summary.aborted_early,
            "run finished"
        );
        self.executor.record_summary(&summary)?;
        Ok(summary)
    }

    /// Wait between two intents: inter-action delay with fatigue, cue
    /// spacing, a rest at the end of each burst, and the profile's cooldown.
    fn pace(&self, session: &mut Session) -> TactusResult<f64> {
        let profile = Arc::clone(session.profile());
        let cues = self.executor.snapshot()?.cues;

        let state = session.state().clone();
        let base = sample_inter_action_delay(&profile, &state, session.rng_mut());
        let mut delay = base + cue_spacing_ms(base, &cues);

        let remaining = match state.burst_remaining {
            Some(n) => n,
            // The run's first intent already opened the first burst.
            None => sample_session_rhythm(&profile, session.rng_mut()).burst_len - 1,
        };
        let remaining = if remaining == 0 {
            let rhythm = sample_session_rhythm(&profile, session.rng_mut());
            debug!(rest_ms = rhythm.rest_ms, next_burst = rhythm.burst_len, "burst finished, resting");
            delay += rhythm.rest_ms;
            session.state_mut().rests_taken += 1;
            rhythm.burst_len
        } else {
            remaining
        };
        session.state_mut().burst_remaining = Some(remaining.saturating_sub(1));

        if let Some(cooldown) = profile.session.cooldown_ms {
            delay += cooldown.max(0.0);
        }
        debug!(delay_ms = delay, "pacing before next intent");
        session.pause(delay)?;
        Ok(delay)
    }

    /// After a pause, maybe perform one idle action. It goes through the
    /// executor like any intent, so policy and gates apply, but its result
    /// stays out of the summary. A refused or skipped idle action is only
    /// logged; one that halts the batch stops the run.
    fn idle(&self, session: &mut Session) -> TactusResult<Option<Stop>> {
        let profile = Arc::clone(session.profile());
        if !should_idle(&profile, session.rng_mut()) {
            return Ok(None);
        }
        let snapshot = self.executor.snapshot()?;
        let b = snapshot.client.bounds;
        let bounds = (b.width > 0.0 && b.height > 0.0).then_some(b);
        let action = plan_idle(&profile, bounds.as_ref(), session.rng_mut());

        let state = session.state_mut();
        state.idle_actions += 1;
        let intent = idle_intent(state.idle_actions, &action);
        debug!(intent_id = %intent.intent_id, kind = action.kind().as_str(), "idle action");

        let result = self.executor.execute(session, &intent, snapshot)?;
        if let Some(halt) = Stop::from_result(&intent.intent_id, &result) {
            return Ok(Some(halt));
        }
        if !result.success {
            debug!(
                intent_id = %intent.intent_id,
                reason = result.failure_reason.map_or("skipped", |r| r.as_str()),
                "idle action not performed"
            );
            return Ok(None);
        }
        if let IdleAction::Hover { linger_ms, .. } = action {
            session.pause(linger_ms)?;
        }
        Ok(None)
    }
}

/// The intent that carries out `action`, labelled `idle_<kind>`.
fn idle_intent(n: u32, action: &IdleAction) -> ActionIntent {
    let id = format!("idle-{}", n);
    let mut intent = match action {
        IdleAction::Hover { point, .. } => ActionIntent::new(id, ActionType::Move, Target::point(point.x, point.y)),
        IdleAction::CameraGlance { yaw_deg } => {
            let mut i = ActionIntent::new(id, ActionType::Camera, Target::None);
            i.payload.camera = Some(CameraRequest::Rotate { yaw_deg: *yaw_deg });
            i
        }
        IdleAction::InventoryCheck { key } => {
            let mut i = ActionIntent::new(id, ActionType::Type, Target::None);
            i.payload.key = Some(key.clone());
            i
        }
    };
    intent.payload.action_label = Some(format!("idle_{}", action.kind().as_str()));
    intent
}

fn flag(result: &ExecutionResult, key: &str) -> bool {
    result.details.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

fn summarize(
    run_id: String,
    profile: &HumanizationProfile,
    submitted: usize,
    results: Vec<ExecutionResult>,
    stop: Option<Stop>,
    session: &Session,
) -> ExecutionSummary {
    let succeeded = results.iter().filter(|r| r.success).count();
    let skipped = results.iter().filter(|r| r.is_skipped()).count();
    let failed = results.len() - succeeded - skipped;
    let (aborted_early, abort_reason, hard_stop) = match stop {
        Some(s) => (true, Some(s.reason), s.hard),
        None => (false, None, false),
    };
    ExecutionSummary {
        run_id,
        profile_id: profile.profile_id.clone(),
        attempted: results.len(),
        results,
        submitted,
        succeeded,
        skipped,
        failed,
        aborted_early,
        abort_reason,
        hard_stop,
        idle_actions: 0,
        dry_run: session.is_dry_run(),
        timestamp: session.now(),
    }
}

/// Order the intents for execution.
///
/// Only contiguous runs of intents sharing an `order_group` are ever
/// reordered, each with probability `order_variability`. Everything else
/// keeps its position.
pub fn plan_order<'a>(
    intents: &'a [ActionIntent],
    profile: &HumanizationProfile,
    rng: &mut SessionRng,
) -> Vec<&'a ActionIntent> {
    let mut planned: Vec<&ActionIntent> = intents.iter().collect();
    let mut start = 0;
    while start < planned.len() {
        let group = planned[start].gating.order_group.clone();
        let mut end = start + 1;
        if group.is_some() {
            while end < planned.len() && planned[end].gating.order_group == group {
                end += 1;
            }
        }
        if end - start > 1 && rng.chance(profile.session.order_variability) {
            rng.shuffle(&mut planned[start..end]);
            debug!(group = ?group, size = end - start, "order group shuffled");
        }
        start = end;
    }
    planned
}

/// Run a batch on the wall clock with a fresh session.
///
/// `seed` overrides the profile's seed; with neither, the session is seeded
/// from OS entropy.
pub fn run_loop(
    executor: &ActionExecutor,
    intents: &[ActionIntent],
    profile: Arc<HumanizationProfile>,
    max_actions: Option<usize>,
    seed: Option<u64>,
    dry_run: bool,
) -> TactusResult<ExecutionSummary> {
    let mut session = Session::new(profile, Arc::new(SystemClock)).with_dry_run(dry_run);
    if let Some(seed) = seed {
        session = session.with_seed(seed);
    }
    ExecutionLoop::new(executor).run(&mut session, intents, max_actions)
}
