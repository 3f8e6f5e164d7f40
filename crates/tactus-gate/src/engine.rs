//! The gating engine: pre-action validation and post-action verification.
//!
//! `GatingEngine` is pure: it inspects an intent and a snapshot and returns a
//! verdict. Waiting, re-fetching snapshots, and recovery clicks are the
//! executor's job. Pre-action checks run in a fixed order and the first one
//! that fails decides the verdict:
//!
//! 1. **Focus**: the client must be focused unless the intent opts out.
//! 2. **Panic**: a denylisted chat keyword or an unexpected interface/modal.
//! 3. **Cues**: required cues, interface, and hover text must be present.
//! 4. **Confidence**: low-confidence intents need one confirmation.
//! 5. **Irreversible**: destructive actions need one confirmation.
//!
//! Post-action checks run in order too: UI drift, then occlusion, then the
//! intent's stated expectations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use tactus_contracts::{
    intent::{ActionIntent, Target},
    snapshot::Snapshot,
};

use crate::matcher::{find_keyword, hover_matches, hover_similarity};

/// Static gating parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Intents below this confidence need a confirmation re-check.
    pub confidence_threshold: f64,
    /// Minimum hover similarity that counts as a match.
    pub hover_match_threshold: f64,
    /// Interrupt pauses before a panic becomes an abort.
    pub max_panic_pauses: u32,
    pub panic_keywords: Vec<String>,
    /// Interfaces that may be open without counting as an interruption.
    pub safe_interfaces: Vec<String>,
    /// Action labels that are treated as irreversible.
    pub irreversible_labels: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        let strings = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect();
        Self {
            confidence_threshold: 0.6,
            hover_match_threshold: 0.8,
            max_panic_pauses: 3,
            panic_keywords: strings(&["trade", "duel", "stake", "accept"]),
            safe_interfaces: strings(&["none", "inventory", "skills"]),
            irreversible_labels: strings(&["drop", "alch", "trade", "trade-confirm"]),
        }
    }
}

/// Why an intent is waiting on a confirmation re-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmKind {
    LowConfidence,
    Irreversible,
}

impl ConfirmKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmKind::LowConfidence => "low_confidence",
            ConfirmKind::Irreversible => "irreversible",
        }
    }
}

/// Per-evaluation inputs that vary between calls.
#[derive(Debug, Clone)]
pub struct GateContext {
    /// Profile default for intents that do not set `require_focus`.
    pub require_focus_default: bool,
    /// Whether an unfocused client may be recovered with a click.
    pub focus_recovery: bool,
    pub interrupts_enabled: bool,
    /// Whether the soft `expected_hover_text` is checked this time.
    pub check_soft_hover: bool,
    pub confidence_confirmed: bool,
    pub irreversible_confirmed: bool,
    pub now: DateTime<Utc>,
}

impl GateContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            require_focus_default: true,
            focus_recovery: true,
            interrupts_enabled: true,
            check_soft_hover: false,
            confidence_confirmed: false,
            irreversible_confirmed: false,
            now,
        }
    }

    pub fn mark_confirmed(&mut self, kind: ConfirmKind) {
        match kind {
            ConfirmKind::LowConfidence => self.confidence_confirmed = true,
            ConfirmKind::Irreversible => self.irreversible_confirmed = true,
        }
    }
}

/// Verdict of the pre-action checks.
#[derive(Debug, Clone, PartialEq)]
pub enum PreGate {
    Proceed,
    /// The client is unfocused and may be recovered with a click.
    RecoverFocus,
    /// Pause and re-evaluate on a fresh snapshot.
    Panic { reason: String },
    /// Pause, re-fetch, and check again before acting.
    Confirm { kind: ConfirmKind },
    /// Deliberately do nothing.
    Skip { reason: String },
    Abort { reason: String },
}

/// Verdict of the post-action checks.
#[derive(Debug, Clone, PartialEq)]
pub enum PostGate {
    Verified,
    /// The UI changed in a way the intent did not ask for.
    UiDrift { reason: String },
    /// The target element is covered; wait and re-check once.
    Occluded { element_id: String },
    /// The action landed but its expected effect is missing.
    Miss { reason: String },
}

/// The gating engine. Cheap to clone and free of interior state.
#[derive(Debug, Clone, Default)]
pub struct GatingEngine {
    config: GateConfig,
    extra_keywords: Vec<String>,
}

impl GatingEngine {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            extra_keywords: Vec::new(),
        }
    }

    /// Add panic keywords, e.g. from the action policy's denylist.
    pub fn with_keywords(mut self, keywords: impl IntoIterator<Item = String>) -> Self {
        self.extra_keywords.extend(keywords);
        self
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// True when the intent is destructive and needs a second confirmation.
    pub fn is_irreversible(&self, intent: &ActionIntent) -> bool {
        if intent.gating.irreversible == Some(true) {
            return true;
        }
        intent.payload.action_label.as_deref().is_some_and(|label| {
            self.config
                .irreversible_labels
                .iter()
                .any(|l| l.eq_ignore_ascii_case(label))
        })
    }

    /// Run the pre-action checks in precedence order.
    pub fn pre_check(&self, intent: &ActionIntent, snapshot: &Snapshot, ctx: &GateContext) -> PreGate {
        let verdict = self.evaluate_pre(intent, snapshot, ctx);
        debug!(intent_id = %intent.intent_id, ?verdict, "pre-action gate");
        verdict
    }

    fn evaluate_pre(&self, intent: &ActionIntent, snapshot: &Snapshot, ctx: &GateContext) -> PreGate {
        // ── Step 1: focus ────────────────────────────────────────────────────
        let require_focus = intent.gating.require_focus.unwrap_or(ctx.require_focus_default);
        if require_focus && !snapshot.client.focused {
            return if ctx.focus_recovery {
                PreGate::RecoverFocus
            } else {
                PreGate::Abort {
                    reason: "client not focused".to_string(),
                }
            };
        }

        // ── Step 2: panic triggers ───────────────────────────────────────────
        if ctx.interrupts_enabled {
            if let Some(reason) = self.panic_reason(intent, snapshot) {
                return PreGate::Panic { reason };
            }
        }

        // ── Step 3: cues, interface, hover ───────────────────────────────────
        if let Some(reason) = self.unmet_requirement(intent, snapshot, ctx) {
            let deadline_passed = intent.gating.deadline.is_some_and(|d| ctx.now > d);
            return if deadline_passed {
                PreGate::Abort {
                    reason: format!("{} (deadline passed)", reason),
                }
            } else {
                PreGate::Skip { reason }
            };
        }

        // ── Step 4: confidence ───────────────────────────────────────────────
        if intent.confidence < self.config.confidence_threshold && !ctx.confidence_confirmed {
            return PreGate::Confirm {
                kind: ConfirmKind::LowConfidence,
            };
        }

        // ── Step 5: irreversible guard ───────────────────────────────────────
        if self.is_irreversible(intent) && !ctx.irreversible_confirmed {
            return PreGate::Confirm {
                kind: ConfirmKind::Irreversible,
            };
        }

        PreGate::Proceed
    }

    /// Return the reason to pause, if the snapshot shows an interruption.
    pub fn panic_reason(&self, intent: &ActionIntent, snapshot: &Snapshot) -> Option<String> {
        let keywords: Vec<String> = self
            .config
            .panic_keywords
            .iter()
            .chain(&self.extra_keywords)
            .chain(&intent.gating.abort_conditions)
            .cloned()
            .collect();
        if let Some(keyword) = find_keyword(&snapshot.chat, &keywords) {
            return Some(format!("panic keyword '{}' in chat", keyword));
        }

        let open = snapshot.ui.open_interface.as_str();
        let wanted = intent.gating.require_open_interface.as_deref() == Some(open);
        let safe = self.config.safe_interfaces.iter().any(|s| s.eq_ignore_ascii_case(open));
        if !safe && !wanted {
            return Some(format!("unexpected interface '{}' open", open));
        }

        let modal = snapshot.cues.modal_state.to_lowercase();
        if !matches!(modal.as_str(), "none" | "" | "unknown") {
            return Some(format!("unexpected modal '{}'", snapshot.cues.modal_state));
        }
        None
    }

    fn unmet_requirement(&self, intent: &ActionIntent, snapshot: &Snapshot, ctx: &GateContext) -> Option<String> {
        for cue in intent.state_cues() {
            let unmet = match cue.split_once('=') {
                Some((name, value)) => {
                    let actual = snapshot.cues.get(name.trim()).unwrap_or("");
                    !actual.eq_ignore_ascii_case(value.trim())
                }
                None => {
                    let actual = snapshot.cues.get(cue.trim()).unwrap_or("").to_lowercase();
                    matches!(actual.as_str(), "" | "none" | "unknown")
                }
            };
            if unmet {
                return Some(format!("missing cue '{}'", cue));
            }
        }

        if let Some(wanted) = &intent.gating.require_open_interface {
            if &snapshot.ui.open_interface != wanted {
                return Some(format!(
                    "interface '{}' required, '{}' open",
                    wanted, snapshot.ui.open_interface
                ));
            }
        }

        let threshold = self.config.hover_match_threshold;
        if let Some(wanted) = intent.required_hover_text() {
            if !hover_matches(wanted, &snapshot.ui.hover_text, threshold) {
                return Some(format!(
                    "hover text '{}' does not match '{}' (score {:.2})",
                    snapshot.ui.hover_text,
                    wanted,
                    hover_similarity(wanted, &snapshot.ui.hover_text)
                ));
            }
        }

        if ctx.check_soft_hover {
            if let Some(wanted) = &intent.payload.expected_hover_text {
                if !hover_matches(wanted, &snapshot.ui.hover_text, threshold) {
                    return Some(format!(
                        "expected hover text '{}' not shown (saw '{}')",
                        wanted, snapshot.ui.hover_text
                    ));
                }
            }
        }
        None
    }

    /// Compare the snapshots taken around an action.
    pub fn post_check(&self, intent: &ActionIntent, before: &Snapshot, after: &Snapshot) -> PostGate {
        let verdict = self.evaluate_post(intent, before, after);
        debug!(intent_id = %intent.intent_id, ?verdict, "post-action gate");
        verdict
    }

    fn evaluate_post(&self, intent: &ActionIntent, before: &Snapshot, after: &Snapshot) -> PostGate {
        let expected_interface = intent.gating.expect_open_interface.as_deref();

        // ── UI drift ─────────────────────────────────────────────────────────
        if before.ui.open_interface != after.ui.open_interface
            && expected_interface != Some(after.ui.open_interface.as_str())
        {
            return PostGate::UiDrift {
                reason: format!(
                    "open interface changed from '{}' to '{}'",
                    before.ui.open_interface, after.ui.open_interface
                ),
            };
        }
        if before.cues.modal_state != after.cues.modal_state {
            return PostGate::UiDrift {
                reason: format!(
                    "modal state changed from '{}' to '{}'",
                    before.cues.modal_state, after.cues.modal_state
                ),
            };
        }

        // ── Occlusion ────────────────────────────────────────────────────────
        if let Some(element_id) = self.occluded_target(intent, after) {
            return PostGate::Occluded { element_id };
        }

        // ── Expectations ─────────────────────────────────────────────────────
        if let Some(expected) = expected_interface {
            if after.ui.open_interface != expected {
                return PostGate::Miss {
                    reason: format!("expected interface '{}' not open", expected),
                };
            }
        }
        if let Some(expected) = &intent.gating.expect_cursor_state {
            if &after.ui.cursor_state != expected {
                return PostGate::Miss {
                    reason: format!(
                        "expected cursor state '{}', saw '{}'",
                        expected, after.ui.cursor_state
                    ),
                };
            }
        }

        PostGate::Verified
    }

    /// The intent's target element, if the snapshot reports it occluded.
    pub fn occluded_target(&self, intent: &ActionIntent, snapshot: &Snapshot) -> Option<String> {
        match &intent.target {
            Target::Element { element_id } => snapshot
                .element(element_id)
                .filter(|e| e.is_occluded())
                .map(|e| e.id.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use tactus_contracts::{
        geometry::Region,
        intent::ActionType,
        snapshot::UiElement,
    };

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap()
    }

    fn snap() -> Snapshot {
        Snapshot::focused(now(), Region::new(0.0, 0.0, 800.0, 600.0))
    }

    fn click() -> ActionIntent {
        ActionIntent::new("c1", ActionType::Click, Target::point(100.0, 100.0))
    }

    fn gate() -> GatingEngine {
        GatingEngine::default()
    }

    // ── Pre-action ───────────────────────────────────────────────────────────

    #[test]
    fn clean_snapshot_proceeds() {
        assert_eq!(gate().pre_check(&click(), &snap(), &GateContext::new(now())), PreGate::Proceed);
    }

    #[test]
    fn unfocused_client_recovers_or_aborts() {
        let mut s = snap();
        s.client.focused = false;
        let mut ctx = GateContext::new(now());
        assert_eq!(gate().pre_check(&click(), &s, &ctx), PreGate::RecoverFocus);

        ctx.focus_recovery = false;
        assert!(matches!(gate().pre_check(&click(), &s, &ctx), PreGate::Abort { .. }));

        let mut opted_out = click();
        opted_out.gating.require_focus = Some(false);
        assert_eq!(gate().pre_check(&opted_out, &s, &ctx), PreGate::Proceed);
    }

    #[test]
    fn focus_outranks_panic() {
        let mut s = snap();
        s.client.focused = false;
        s.chat.push("Someone wishes to duel with you".to_string());
        assert_eq!(gate().pre_check(&click(), &s, &GateContext::new(now())), PreGate::RecoverFocus);
    }

    #[test]
    fn chat_keywords_and_abort_conditions_panic() {
        let mut s = snap();
        s.chat.push("Player wishes to trade with you.".to_string());
        assert!(matches!(
            gate().pre_check(&click(), &s, &GateContext::new(now())),
            PreGate::Panic { .. }
        ));

        let mut s = snap();
        s.chat.push("You have been reported".to_string());
        let mut intent = click();
        assert_eq!(gate().pre_check(&intent, &s, &GateContext::new(now())), PreGate::Proceed);
        intent.gating.abort_conditions.push("reported".to_string());
        assert!(matches!(
            gate().pre_check(&intent, &s, &GateContext::new(now())),
            PreGate::Panic { .. }
        ));

        let policy_gate = gate().with_keywords(vec!["reported".to_string()]);
        assert!(matches!(
            policy_gate.pre_check(&click(), &s, &GateContext::new(now())),
            PreGate::Panic { .. }
        ));
    }

    #[test]
    fn unexpected_interface_panics_unless_required() {
        let mut s = snap();
        s.ui.open_interface = "bank".to_string();
        let ctx = GateContext::new(now());
        assert!(matches!(gate().pre_check(&click(), &s, &ctx), PreGate::Panic { .. }));

        let mut intent = click();
        intent.gating.require_open_interface = Some("bank".to_string());
        assert_eq!(gate().pre_check(&intent, &s, &ctx), PreGate::Proceed);

        let mut ctx = ctx;
        ctx.interrupts_enabled = false;
        assert_eq!(gate().pre_check(&click(), &s, &ctx), PreGate::Proceed);
    }

    #[test]
    fn hover_mismatch_skips_then_aborts_after_deadline() {
        let mut s = snap();
        s.ui.hover_text = "Talk-to Guide".to_string();
        let mut intent = click();
        intent.required_cues.push("hover_text:Chop down Tree".to_string());

        let ctx = GateContext::new(now());
        assert!(matches!(gate().pre_check(&intent, &s, &ctx), PreGate::Skip { .. }));

        intent.gating.deadline = Some(now() - TimeDelta::seconds(1));
        assert!(matches!(gate().pre_check(&intent, &s, &ctx), PreGate::Abort { .. }));

        s.ui.hover_text = "Chop down Tree".to_string();
        assert_eq!(gate().pre_check(&intent, &s, &ctx), PreGate::Proceed);
    }

    #[test]
    fn state_cues_presence_and_equality() {
        let mut s = snap();
        let mut intent = click();
        intent.required_cues = vec!["tree_highlight".to_string(), "animation_state=idle".to_string()];
        let ctx = GateContext::new(now());
        assert!(matches!(gate().pre_check(&intent, &s, &ctx), PreGate::Skip { .. }));

        s.cues.extra.insert("tree_highlight".to_string(), "on".to_string());
        assert!(matches!(gate().pre_check(&intent, &s, &ctx), PreGate::Skip { .. }));

        s.cues.animation_state = "Idle".to_string();
        assert_eq!(gate().pre_check(&intent, &s, &ctx), PreGate::Proceed);
    }

    #[test]
    fn soft_hover_only_when_rolled() {
        let mut s = snap();
        s.ui.hover_text = "Walk here".to_string();
        let mut intent = click();
        intent.payload.expected_hover_text = Some("Bank Bank booth".to_string());

        let mut ctx = GateContext::new(now());
        assert_eq!(gate().pre_check(&intent, &s, &ctx), PreGate::Proceed);
        ctx.check_soft_hover = true;
        assert!(matches!(gate().pre_check(&intent, &s, &ctx), PreGate::Skip { .. }));
    }

    #[test]
    fn confidence_then_irreversible_confirmations() {
        let mut intent = click();
        intent.confidence = 0.4;
        intent.payload.action_label = Some("drop".to_string());
        let mut ctx = GateContext::new(now());

        assert_eq!(
            gate().pre_check(&intent, &snap(), &ctx),
            PreGate::Confirm {
                kind: ConfirmKind::LowConfidence
            }
        );
        ctx.mark_confirmed(ConfirmKind::LowConfidence);
        assert_eq!(
            gate().pre_check(&intent, &snap(), &ctx),
            PreGate::Confirm {
                kind: ConfirmKind::Irreversible
            }
        );
        ctx.mark_confirmed(ConfirmKind::Irreversible);
        assert_eq!(gate().pre_check(&intent, &snap(), &ctx), PreGate::Proceed);
    }

    // ── Post-action ──────────────────────────────────────────────────────────

    #[test]
    fn interface_change_is_drift_unless_expected() {
        let before = snap();
        let mut after = snap();
        after.ui.open_interface = "bank".to_string();

        let mut intent = click();
        assert!(matches!(gate().post_check(&intent, &before, &after), PostGate::UiDrift { .. }));

        intent.gating.expect_open_interface = Some("bank".to_string());
        assert_eq!(gate().post_check(&intent, &before, &after), PostGate::Verified);
    }

    #[test]
    fn modal_change_is_drift() {
        let before = snap();
        let mut after = snap();
        after.cues.modal_state = "level_up".to_string();
        assert!(matches!(gate().post_check(&click(), &before, &after), PostGate::UiDrift { .. }));
    }

    #[test]
    fn occluded_element_reported() {
        let mut after = snap();
        after.ui.elements.push(UiElement {
            id: "tree-1".to_string(),
            bounds: Region::new(10.0, 10.0, 20.0, 20.0),
            state: "occluded_by_player".to_string(),
        });
        let intent = ActionIntent::new("c2", ActionType::Click, Target::element("tree-1"));
        assert_eq!(
            gate().post_check(&intent, &snap(), &after),
            PostGate::Occluded {
                element_id: "tree-1".to_string()
            }
        );
    }

    #[test]
    fn unmet_expectations_are_misses() {
        let mut intent = click();
        intent.gating.expect_open_interface = Some("bank".to_string());
        assert!(matches!(gate().post_check(&intent, &snap(), &snap()), PostGate::Miss { .. }));

        let mut intent = click();
        intent.gating.expect_cursor_state = Some("attack".to_string());
        assert!(matches!(gate().post_check(&intent, &snap(), &snap()), PostGate::Miss { .. }));
    }
}
