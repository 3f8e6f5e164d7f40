//! Timing model: reaction delays, dwells, pacing, and session rhythm.
//!
//! Every delay is a clamped normal draw from a `Distribution` in the active
//! profile. Negative draws are floored to zero before clamping, and a
//! distribution with zero spread returns its clamped mean without touching
//! the generator.

use serde::{Deserialize, Serialize};

use tactus_contracts::{
    intent::ActionType,
    profile::{Distribution, HumanizationProfile},
    snapshot::Cues,
};

use crate::rng::SessionRng;

/// Dwell categories sampled independently of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DwellKind {
    /// Hovering over the target before pressing.
    Hover,
    /// Time between button down and button up.
    ClickDownUp,
    /// Looking at a result before confirming it.
    Confirmation,
    /// Pause after the input lands, before the next look.
    Settle,
    /// Wait after the button comes back up.
    Release,
    /// Button hold of a long press.
    LongPress,
}

impl DwellKind {
    pub fn key(&self) -> &'static str {
        match self {
            DwellKind::Hover => "hover_dwell",
            DwellKind::ClickDownUp => "click_down_up",
            DwellKind::Confirmation => "confirmation_dwell",
            DwellKind::Settle => "settle",
            DwellKind::Release => "release_dwell",
            DwellKind::LongPress => "long_press",
        }
    }
}

/// Single-purpose delays used by the executor and loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    ConfirmationPause,
    CorrectionDelay,
    DragHesitation,
    DragHold,
    KeyDelay,
    ScrollPause,
    InterruptPause,
    OcclusionWait,
    PollingJitter,
    FrameTimeVariance,
    DoubleClickGap,
    Backspace,
    KeyOverlap,
    ModifierLead,
    EdgePause,
}

impl Delay {
    pub fn key(&self) -> &'static str {
        match self {
            Delay::ConfirmationPause => "confirmation_pause",
            Delay::CorrectionDelay => "correction_delay",
            Delay::DragHesitation => "drag_hesitation",
            Delay::DragHold => "drag_hold",
            Delay::KeyDelay => "key_delay",
            Delay::ScrollPause => "scroll_pause",
            Delay::InterruptPause => "interrupt_pause",
            Delay::OcclusionWait => "occlusion_wait",
            Delay::PollingJitter => "polling_jitter",
            Delay::FrameTimeVariance => "frame_time_variance",
            Delay::DoubleClickGap => "double_click_gap",
            Delay::Backspace => "backspace",
            Delay::KeyOverlap => "key_overlap",
            Delay::ModifierLead => "modifier_lead",
            Delay::EdgePause => "edge_pause",
        }
    }

    fn distribution<'a>(&self, profile: &'a HumanizationProfile) -> &'a Distribution {
        let t = &profile.timing;
        match self {
            Delay::ConfirmationPause => &t.confirmation_pause,
            Delay::CorrectionDelay => &t.correction_delay,
            Delay::DragHesitation => &t.drag_hesitation,
            Delay::DragHold => &t.drag_hold,
            Delay::KeyDelay => &t.key_delay,
            Delay::ScrollPause => &t.scroll_pause,
            Delay::InterruptPause => &t.interrupt_pause,
            Delay::OcclusionWait => &t.occlusion_wait,
            Delay::PollingJitter => &profile.device.polling_jitter,
            Delay::FrameTimeVariance => &profile.device.frame_time_variance,
            Delay::DoubleClickGap => &t.double_click_gap,
            Delay::Backspace => &profile.typing.backspace,
            Delay::KeyOverlap => &profile.typing.key_overlap,
            Delay::ModifierLead => &profile.typing.modifier_lead,
            Delay::EdgePause => &profile.idle.edge_pause,
        }
    }
}

/// Per-session counters that drive fatigue drift and burst pacing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub actions_completed: u64,
    /// Actions left in the current burst; `None` until the first rhythm draw.
    pub burst_remaining: Option<u32>,
    pub rests_taken: u32,
    #[serde(default)]
    pub idle_actions: u32,
}

/// One burst of activity followed by a longer rest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rhythm {
    pub burst_len: u32,
    pub rest_ms: f64,
}

/// Clamp into `[min, max]` without panicking on an inverted range.
fn clamp_to(value: f64, dist: &Distribution) -> f64 {
    value.max(dist.min).min(dist.max)
}

/// Draw one value from a clamped normal distribution.
pub fn sample(dist: &Distribution, rng: &mut SessionRng) -> f64 {
    if dist.stdev <= 0.0 {
        return clamp_to(dist.mean.max(0.0), dist);
    }
    let raw = rng.gaussian(dist.mean, dist.stdev).max(0.0);
    clamp_to(raw, dist)
}

/// Reaction multiplier per action type: pointer presses are quicker, typing
/// and camera work take a moment longer to start.
pub fn reaction_factor(action_type: ActionType) -> f64 {
    match action_type {
        ActionType::Click | ActionType::Drag => 0.9,
        ActionType::Type | ActionType::Camera => 1.2,
        ActionType::Move | ActionType::Scroll => 1.0,
    }
}

pub fn sample_reaction_delay(action_type: ActionType, profile: &HumanizationProfile, rng: &mut SessionRng) -> f64 {
    let dist = &profile.timing.reaction;
    clamp_to(sample(dist, rng) * reaction_factor(action_type), dist)
}

pub fn sample_dwell(profile: &HumanizationProfile, kind: DwellKind, rng: &mut SessionRng) -> f64 {
    let t = &profile.timing;
    let dist = match kind {
        DwellKind::Hover => &t.hover_dwell,
        DwellKind::ClickDownUp => &t.click_down_up,
        DwellKind::Confirmation => &t.confirmation_dwell,
        DwellKind::Settle => &t.settle,
        DwellKind::Release => &t.release,
        DwellKind::LongPress => &t.long_press,
    };
    sample(dist, rng)
}

/// One draw from a named click rhythm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cadence {
    pub cadence_ms: f64,
}

impl Cadence {
    pub fn hover_ms(&self) -> f64 {
        (self.cadence_ms * 0.5).max(20.0)
    }

    pub fn press_ms(&self) -> f64 {
        (self.cadence_ms * 0.7).max(20.0)
    }

    pub fn gap_ms(&self) -> f64 {
        (self.cadence_ms * 0.6).max(40.0)
    }
}

/// Sample the cadence named `context`; `None` if the profile has no such
/// context.
pub fn sample_cadence(profile: &HumanizationProfile, context: &str, rng: &mut SessionRng) -> Option<Cadence> {
    let dist = profile.timing.click_cadence.get(context)?;
    Some(Cadence {
        cadence_ms: sample(dist, rng),
    })
}

pub fn sample_delay(profile: &HumanizationProfile, delay: Delay, rng: &mut SessionRng) -> f64 {
    sample(delay.distribution(profile), rng)
}

/// The inter-action mean multiplier after `actions_completed` actions.
///
/// Starts at 1, grows linearly with `fatigue_drift_rate`, and never exceeds
/// `fatigue_cap`. Non-decreasing in the action count.
pub fn fatigue_multiplier(profile: &HumanizationProfile, state: &SessionState) -> f64 {
    let s = &profile.session;
    let cap = s.fatigue_cap.max(1.0);
    let drift = 1.0 + s.fatigue_drift_rate.max(0.0) * state.actions_completed as f64;
    drift.min(cap)
}

pub fn sample_inter_action_delay(profile: &HumanizationProfile, state: &SessionState, rng: &mut SessionRng) -> f64 {
    let base = profile.timing.inter_action;
    let drifted = Distribution {
        mean: base.mean * fatigue_multiplier(profile, state),
        ..base
    };
    sample(&drifted, rng)
}

pub fn sample_session_rhythm(profile: &HumanizationProfile, rng: &mut SessionRng) -> Rhythm {
    let burst = sample(&profile.session.burst_len, rng).round().max(1.0);
    let rest_ms = sample(&profile.session.rest, rng);
    Rhythm {
        burst_len: burst as u32,
        rest_ms,
    }
}

/// Characters typed before a short hesitation.
pub fn sample_typing_burst(profile: &HumanizationProfile, rng: &mut SessionRng) -> usize {
    sample(&profile.session.typing_burst_chars, rng).round().max(1.0) as usize
}

/// Wheel ticks issued per scroll gesture.
pub fn sample_scroll_ticks(profile: &HumanizationProfile, rng: &mut SessionRng) -> u32 {
    sample(&profile.session.scroll_ticks, rng).round().max(1.0) as u32
}

/// Extra spacing demanded by visible cues.
///
/// An animation that is still `active` or in `cooldown` stretches the pause
/// by half again.
pub fn cue_spacing_ms(base_ms: f64, cues: &Cues) -> f64 {
    match cues.animation_state.as_str() {
        "active" | "cooldown" => base_ms * 0.5,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn profile() -> HumanizationProfile {
        HumanizationProfile::named("test")
    }

    #[test]
    fn ten_thousand_draws_stay_in_bounds() {
        let p = profile();
        let mut rng = SessionRng::seeded(42);
        let dists = [
            p.timing.reaction,
            p.timing.hover_dwell,
            p.timing.click_down_up,
            p.timing.inter_action,
            p.session.rest,
            p.device.polling_jitter,
        ];
        for dist in dists {
            for _ in 0..10_000 {
                let v = sample(&dist, &mut rng);
                assert!(v >= dist.min && v <= dist.max, "{v} outside [{}, {}]", dist.min, dist.max);
            }
        }
    }

    #[test]
    fn zero_spread_is_deterministic_and_consumes_nothing() {
        let mut a = SessionRng::seeded(5);
        let mut b = SessionRng::seeded(5);
        assert_eq!(sample(&Distribution::fixed(40.0), &mut a), 40.0);
        // Mean outside the bounds still clamps.
        assert_eq!(sample(&Distribution::new(900.0, 0.0, 10.0, 50.0), &mut a), 50.0);
        assert_eq!(a.unit(), b.unit());
    }

    #[test]
    fn negative_draws_floor_before_clamp() {
        let dist = Distribution::new(-500.0, 1.0, 0.0, 100.0);
        let mut rng = SessionRng::seeded(8);
        for _ in 0..100 {
            assert_eq!(sample(&dist, &mut rng), 0.0);
        }
    }

    #[test]
    fn reaction_multiplier_keeps_bounds() {
        let mut p = profile();
        p.timing.reaction = Distribution::new(490.0, 5.0, 80.0, 500.0);
        let mut rng = SessionRng::seeded(11);
        for _ in 0..1_000 {
            let v = sample_reaction_delay(ActionType::Type, &p, &mut rng);
            assert!(v <= 500.0);
        }
        assert_eq!(reaction_factor(ActionType::Click), 0.9);
        assert_eq!(reaction_factor(ActionType::Camera), 1.2);
    }

    #[test]
    fn fatigue_is_monotone_and_capped() {
        let p = profile();
        let mut last = 0.0;
        for n in 0..500 {
            let state = SessionState {
                actions_completed: n,
                ..SessionState::default()
            };
            let m = fatigue_multiplier(&p, &state);
            assert!(m >= last);
            assert!(m <= p.session.fatigue_cap);
            last = m;
        }
        assert_eq!(last, p.session.fatigue_cap);
    }

    #[test]
    fn fatigued_delay_still_clamped() {
        let p = profile();
        let state = SessionState {
            actions_completed: 10_000,
            ..SessionState::default()
        };
        let mut rng = SessionRng::seeded(2);
        for _ in 0..1_000 {
            let v = sample_inter_action_delay(&p, &state, &mut rng);
            assert!(v >= p.timing.inter_action.min && v <= p.timing.inter_action.max);
        }
    }

    #[test]
    fn rhythm_has_at_least_one_action() {
        let mut p = profile();
        p.session.burst_len = Distribution::new(0.0, 0.0, 0.0, 0.0);
        let mut rng = SessionRng::seeded(0);
        let r = sample_session_rhythm(&p, &mut rng);
        assert_eq!(r.burst_len, 1);
        assert!(r.rest_ms >= p.session.rest.min);
    }

    #[test]
    fn animation_cues_extend_spacing() {
        let mut cues = Cues::default();
        assert_eq!(cue_spacing_ms(200.0, &cues), 0.0);
        cues.animation_state = "cooldown".to_string();
        assert_eq!(cue_spacing_ms(200.0, &cues), 100.0);
    }

    #[test]
    fn dwell_kinds_have_distinct_keys() {
        let keys = [
            DwellKind::Hover.key(),
            DwellKind::ClickDownUp.key(),
            DwellKind::Confirmation.key(),
            DwellKind::Settle.key(),
            DwellKind::Release.key(),
            DwellKind::LongPress.key(),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn cadence_scales_hover_press_and_gap() {
        let mut p = profile();
        p.timing
            .click_cadence
            .insert("steady".to_string(), Distribution::fixed(100.0));
        let mut rng = SessionRng::seeded(3);

        let c = sample_cadence(&p, "steady", &mut rng).unwrap();
        assert_eq!(c.hover_ms(), 50.0);
        assert_eq!(c.press_ms(), 70.0);
        assert_eq!(c.gap_ms(), 60.0);
        assert!(sample_cadence(&p, "unknown", &mut rng).is_none());

        // Floors hold for very quick rhythms.
        let quick = Cadence { cadence_ms: 10.0 };
        assert_eq!((quick.hover_ms(), quick.press_ms(), quick.gap_ms()), (20.0, 20.0, 40.0));
    }

    #[test]
    fn default_cadences_stay_in_bounds() {
        let p = profile();
        let mut rng = SessionRng::seeded(8);
        for _ in 0..1_000 {
            let c = sample_cadence(&p, "banking", &mut rng).unwrap();
            assert!((40.0..=220.0).contains(&c.cadence_ms));
        }
    }

    proptest! {
        #[test]
        fn sample_always_within_bounds(
            mean in -1_000.0f64..5_000.0,
            stdev in 0.0f64..2_000.0,
            min in 0.0f64..1_000.0,
            width in 0.0f64..3_000.0,
            seed in any::<u64>(),
        ) {
            let dist = Distribution::new(mean, stdev, min, min + width);
            let mut rng = SessionRng::seeded(seed);
            for _ in 0..32 {
                let v = sample(&dist, &mut rng);
                prop_assert!(v >= dist.min && v <= dist.max);
            }
        }
    }
}
