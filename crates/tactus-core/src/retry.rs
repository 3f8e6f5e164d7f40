//! Bounded retry for missed actions.
//!
//! The controller is a pure function over an explicit `RetryState`: given
//! the state after an attempt and the failure that attempt produced, `next`
//! decides whether to try again, how long to back off, and how far to nudge
//! the aim point. Only `ExecutionMiss` is ever retried.

use serde::{Deserialize, Serialize};
use tracing::debug;

use tactus_contracts::{execution::FailureReason, intent::ActionIntent};
use tactus_humanize::SessionRng;

/// Backoff schedule between attempts, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// `ms` plus a uniform jitter in `[0, jitter_ms)`.
    Fixed { ms: f64, jitter_ms: f64 },
    /// `base_ms × n`, capped at `max_ms`.
    Linear { base_ms: f64, max_ms: f64 },
    /// `base_ms × 2^(n-1)`, capped at `max_ms`.
    Exponential { base_ms: f64, max_ms: f64 },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Linear {
            base_ms: 120.0,
            max_ms: 800.0,
        }
    }
}

impl Backoff {
    /// Delay before retry number `n` (1-based).
    fn delay_ms(&self, n: u32, rng: &mut SessionRng) -> f64 {
        let n = n.max(1);
        match *self {
            Backoff::Fixed { ms, jitter_ms } => ms.max(0.0) + rng.uniform(0.0, jitter_ms.max(0.0)),
            Backoff::Linear { base_ms, max_ms } => (base_ms * n as f64).min(max_ms).max(0.0),
            Backoff::Exponential { base_ms, max_ms } => {
                let factor = 2f64.powi(n.saturating_sub(1).min(30) as i32);
                (base_ms * factor).min(max_ms).max(0.0)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `2` means at most three attempts.
    pub max_retries: u32,
    pub backoff: Backoff,
    /// Largest positional nudge applied to the aim point on a retry.
    pub reaim_offset_px: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Backoff::default(),
            reaim_offset_px: 3.0,
        }
    }
}

/// Where an intent stands in its retry budget.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryState {
    /// The attempt about to run (or just run), starting at 1.
    pub attempt: u32,
    pub last_failure: Option<FailureReason>,
    /// Wait before this attempt; zero for the first.
    pub next_backoff_ms: f64,
    /// Aim nudge for this attempt, in pixels.
    pub reaim: Option<(f64, f64)>,
}

impl RetryState {
    pub fn first() -> Self {
        Self {
            attempt: 1,
            last_failure: None,
            next_backoff_ms: 0.0,
            reaim: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Retry(RetryState),
    GiveUp { reason: String },
}

impl RetryPolicy {
    /// This policy with the intent's `max_retries` override applied.
    pub fn for_intent(&self, intent: &ActionIntent) -> RetryPolicy {
        RetryPolicy {
            max_retries: intent.payload.max_retries.unwrap_or(self.max_retries),
            ..self.clone()
        }
    }

    /// Decide what follows `state`'s attempt failing with `failure`.
    pub fn next(&self, state: &RetryState, failure: FailureReason, rng: &mut SessionRng) -> RetryDecision {
        if !failure.is_retryable() {
            return RetryDecision::GiveUp {
                reason: format!("{} is not retryable", failure),
            };
        }
        if state.attempt > self.max_retries {
            return RetryDecision::GiveUp {
                reason: format!("gave up after {} attempts", state.attempt),
            };
        }

        let next_backoff_ms = self.backoff.delay_ms(state.attempt, rng);
        let reaim = if self.reaim_offset_px > 0.0 {
            let angle = rng.uniform(0.0, std::f64::consts::TAU);
            let magnitude = self.reaim_offset_px * rng.uniform(0.5, 1.0);
            Some((angle.cos() * magnitude, angle.sin() * magnitude))
        } else {
            None
        };

        debug!(
            attempt = state.attempt + 1,
            backoff_ms = next_backoff_ms,
            "scheduling retry"
        );
        RetryDecision::Retry(RetryState {
            attempt: state.attempt + 1,
            last_failure: Some(failure),
            next_backoff_ms,
            reaim,
        })
    }
}

#[cfg(test)]
mod tests {
    use tactus_contracts::intent::{ActionType, Target};

    use super::*;

    fn exhaust(policy: &RetryPolicy, rng: &mut SessionRng) -> Vec<RetryState> {
        let mut states = vec![RetryState::first()];
        loop {
            let last = states.last().cloned().unwrap_or_else(RetryState::first);
            match policy.next(&last, FailureReason::ExecutionMiss, rng) {
                RetryDecision::Retry(s) => states.push(s),
                RetryDecision::GiveUp { .. } => return states,
            }
        }
    }

    /// Two retries mean three attempts in total.
    #[test]
    fn default_budget_allows_three_attempts() {
        let mut rng = SessionRng::seeded(1);
        let states = exhaust(&RetryPolicy::default(), &mut rng);
        assert_eq!(states.iter().map(|s| s.attempt).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(states[1].next_backoff_ms, 120.0);
        assert_eq!(states[2].next_backoff_ms, 240.0);
        assert_eq!(states[2].last_failure, Some(FailureReason::ExecutionMiss));
    }

    #[test]
    fn non_retryable_failures_give_up_immediately() {
        let mut rng = SessionRng::seeded(1);
        let policy = RetryPolicy::default();
        for failure in [
            FailureReason::PolicyDenied,
            FailureReason::GatingAbort,
            FailureReason::UiDrift,
            FailureReason::Skipped,
            FailureReason::SinkFailure,
            FailureReason::Interrupted,
        ] {
            assert!(matches!(
                policy.next(&RetryState::first(), failure, &mut rng),
                RetryDecision::GiveUp { .. }
            ));
        }
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let mut rng = SessionRng::seeded(1);
        let policy = RetryPolicy {
            max_retries: 6,
            backoff: Backoff::Exponential {
                base_ms: 100.0,
                max_ms: 500.0,
            },
            reaim_offset_px: 0.0,
        };
        let delays: Vec<f64> = exhaust(&policy, &mut rng).iter().skip(1).map(|s| s.next_backoff_ms).collect();
        assert_eq!(delays, vec![100.0, 200.0, 400.0, 500.0, 500.0, 500.0]);
    }

    #[test]
    fn fixed_backoff_jitter_and_reaim_stay_in_bounds() {
        let mut rng = SessionRng::seeded(3);
        let policy = RetryPolicy {
            max_retries: 1,
            backoff: Backoff::Fixed {
                ms: 200.0,
                jitter_ms: 50.0,
            },
            reaim_offset_px: 4.0,
        };
        for _ in 0..200 {
            match policy.next(&RetryState::first(), FailureReason::ExecutionMiss, &mut rng) {
                RetryDecision::Retry(s) => {
                    assert!((200.0..250.0).contains(&s.next_backoff_ms));
                    let (dx, dy) = s.reaim.unwrap();
                    let m = dx.hypot(dy);
                    assert!((2.0 - 1e-9..=4.0 + 1e-9).contains(&m), "reaim {m}");
                }
                other => panic!("expected retry, got {other:?}"),
            }
        }
    }

    #[test]
    fn intent_override_replaces_budget() {
        let mut intent = ActionIntent::new("a1", ActionType::Click, Target::point(1.0, 1.0));
        intent.payload.max_retries = Some(0);
        let policy = RetryPolicy::default().for_intent(&intent);
        let mut rng = SessionRng::seeded(1);
        assert!(matches!(
            policy.next(&RetryState::first(), FailureReason::ExecutionMiss, &mut rng),
            RetryDecision::GiveUp { .. }
        ));
    }
}
