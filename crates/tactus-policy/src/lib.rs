//! # tactus-policy
//!
//! A TOML-driven, deny-by-default action policy for the TACTUS engine.
//!
//! ## Overview
//!
//! This crate provides [`TomlPolicyEngine`], which implements the
//! [`PolicyEngine`](tactus_core::traits::PolicyEngine) trait. Only listed
//! action types may run, labelled intents can be blocked outright, and
//! rolling-window rate limits cap how often actions fire. A denial is
//! terminal for the intent. An optional `[approval]` section holds unsafe
//! action types back until someone in the named role signs off.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use tactus_policy::engine::TomlPolicyEngine;
//!
//! let policy = TomlPolicyEngine::from_file(Path::new("config/policy.toml"))?;
//! // Pass `policy` to `tactus_core::ActionExecutor::new(...)`.
//! ```

pub mod engine;
pub mod rule;

pub use engine::TomlPolicyEngine;
pub use rule::{ApprovalPolicy, PolicyConfig, RateLimit};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    use tactus_contracts::{
        error::TactusError,
        intent::ActionType,
        policy::{PolicyContext, PolicyVerdict},
    };
    use tactus_core::traits::PolicyEngine;

    use crate::{PolicyConfig, RateLimit, TomlPolicyEngine};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn ctx(action_type: ActionType, label: Option<&str>, now: DateTime<Utc>) -> PolicyContext {
        session_ctx("session-1", action_type, label, now)
    }

    fn session_ctx(session: &str, action_type: ActionType, label: Option<&str>, now: DateTime<Utc>) -> PolicyContext {
        PolicyContext {
            session_id: session.to_string(),
            intent_id: "intent-1".to_string(),
            action_type,
            action_label: label.map(str::to_string),
            now,
        }
    }

    fn assert_denied(verdict: PolicyVerdict, needle: &str) {
        match verdict {
            PolicyVerdict::Deny { reason } => {
                assert!(reason.contains(needle), "expected '{needle}' in reason, got: {reason}");
            }
            other => panic!("expected Deny, got {:?}", other),
        }
    }

    // ── 1. deny-by-default ────────────────────────────────────────────────────

    /// An empty policy allows nothing.
    #[test]
    fn test_deny_by_default() {
        let engine = TomlPolicyEngine::from_toml_str("").unwrap();
        for action_type in ActionType::ALL {
            let verdict = engine.evaluate(&ctx(action_type, None, t0())).unwrap();
            assert_denied(verdict, "denied by default");
        }
    }

    // ── 2. allowed types ──────────────────────────────────────────────────────

    #[test]
    fn test_allowed_action_types() {
        let engine = TomlPolicyEngine::from_toml_str(r#"allowed_actions = ["move", "click"]"#).unwrap();
        assert_eq!(engine.evaluate(&ctx(ActionType::Click, None, t0())).unwrap(), PolicyVerdict::Allow);
        assert_denied(engine.evaluate(&ctx(ActionType::Drag, None, t0())).unwrap(), "'drag'");
    }

    // ── 3. blocked labels ─────────────────────────────────────────────────────

    #[test]
    fn test_blocked_label_case_insensitive() {
        let engine = TomlPolicyEngine::from_toml_str(
            r#"
            allowed_actions = ["click"]
            blocked_labels = ["trade"]
            "#,
        )
        .unwrap();
        assert_denied(
            engine.evaluate(&ctx(ActionType::Click, Some("Trade"), t0())).unwrap(),
            "blocked",
        );
        assert_eq!(
            engine.evaluate(&ctx(ActionType::Click, Some("drop"), t0())).unwrap(),
            PolicyVerdict::Allow
        );
    }

    // ── 4. rolling rate window ────────────────────────────────────────────────

    #[test]
    fn test_rate_limit_rolling_window() {
        let engine = TomlPolicyEngine::from_toml_str(
            r#"
            allowed_actions = ["click", "move"]

            [[rate_limits]]
            id = "clicks"
            action = "click"
            max_actions = 2
            window_secs = 60
            "#,
        )
        .unwrap();

        let click = |secs: i64| engine.evaluate(&ctx(ActionType::Click, None, t0() + TimeDelta::seconds(secs)));

        assert_eq!(click(0).unwrap(), PolicyVerdict::Allow);
        assert_eq!(click(10).unwrap(), PolicyVerdict::Allow);
        assert_denied(click(30).unwrap(), "rate limit 'clicks'");

        // Moves are not counted by the click limit.
        assert_eq!(
            engine.evaluate(&ctx(ActionType::Move, None, t0() + TimeDelta::seconds(30))).unwrap(),
            PolicyVerdict::Allow
        );

        // The first click leaves the window after 60 seconds.
        assert_eq!(click(61).unwrap(), PolicyVerdict::Allow);
        assert_denied(click(62).unwrap(), "rate limit");
    }

    /// A denial must not consume a slot in any window.
    #[test]
    fn test_denied_actions_are_not_counted() {
        let engine = TomlPolicyEngine::from_toml_str(
            r#"
            allowed_actions = ["click"]

            [[rate_limits]]
            id = "any"
            max_actions = 1
            window_secs = 10
            "#,
        )
        .unwrap();

        assert_eq!(engine.evaluate(&ctx(ActionType::Click, None, t0())).unwrap(), PolicyVerdict::Allow);
        for s in 1..5 {
            let verdict = engine
                .evaluate(&ctx(ActionType::Click, None, t0() + TimeDelta::seconds(s)))
                .unwrap();
            assert!(matches!(verdict, PolicyVerdict::Deny { .. }));
        }
        assert_eq!(
            engine
                .evaluate(&ctx(ActionType::Click, None, t0() + TimeDelta::seconds(11)))
                .unwrap(),
            PolicyVerdict::Allow
        );
    }

    // ── 5. denylist and config errors ─────────────────────────────────────────

    #[test]
    fn test_denylist_is_exposed() {
        let engine = TomlPolicyEngine::from_toml_str(r#"denylist = ["report"]"#).unwrap();
        assert_eq!(engine.denylist(), vec!["report".to_string()]);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = TomlPolicyEngine::from_toml_str("allowed_actions = [\"teleport\"]").unwrap_err();
        assert!(matches!(err, TactusError::ConfigError { .. }));

        let err = TomlPolicyEngine::from_toml_str(
            r#"
            [[rate_limits]]
            id = "zero"
            max_actions = 1
            window_secs = 0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("zero-length window"));
    }

    // ── 6. window arithmetic and growth ───────────────────────────────────────

    #[test]
    fn test_overlong_window_is_config_error() {
        let err = TomlPolicyEngine::from_toml_str(&format!(
            r#"
            [[rate_limits]]
            id = "forever"
            max_actions = 1
            window_secs = {}
            "#,
            i64::MAX
        ))
        .unwrap_err();
        assert!(matches!(err, TactusError::ConfigError { .. }));
        assert!(err.to_string().contains("too long"));
    }

    /// A window too long for the clock, set up without the TOML loader,
    /// counts everything instead of panicking.
    #[test]
    fn test_overlong_window_built_directly_never_expires() {
        let engine = TomlPolicyEngine::new(PolicyConfig {
            allowed_actions: vec![ActionType::Click],
            rate_limits: vec![RateLimit {
                id: "forever".to_string(),
                action: "*".to_string(),
                max_actions: 1,
                window_secs: u64::MAX,
            }],
            ..PolicyConfig::default()
        });
        assert_eq!(engine.evaluate(&ctx(ActionType::Click, None, t0())).unwrap(), PolicyVerdict::Allow);
        let much_later = t0() + TimeDelta::days(3_650);
        assert_denied(
            engine.evaluate(&ctx(ActionType::Click, None, much_later)).unwrap(),
            "rate limit 'forever'",
        );
    }

    /// Sessions that stop acting do not leave windows behind forever.
    #[test]
    fn test_stale_windows_are_pruned() {
        let engine = TomlPolicyEngine::from_toml_str(
            r#"
            allowed_actions = ["click"]

            [[rate_limits]]
            id = "clicks"
            max_actions = 5
            window_secs = 10
            "#,
        )
        .unwrap();

        for n in 0..50 {
            let session = format!("session-{n}");
            let verdict = engine
                .evaluate(&session_ctx(&session, ActionType::Click, None, t0()))
                .unwrap();
            assert_eq!(verdict, PolicyVerdict::Allow);
        }
        assert_eq!(engine.tracked_windows(), 50);

        let later = t0() + TimeDelta::seconds(11);
        engine
            .evaluate(&session_ctx("session-new", ActionType::Click, None, later))
            .unwrap();
        assert_eq!(engine.tracked_windows(), 1);
    }

    // ── 7. approval ───────────────────────────────────────────────────────────

    const APPROVAL: &str = r#"
        allowed_actions = ["click", "type", "drag", "camera"]

        [approval]
        require_approval = true
        auto_approve_actions = ["camera"]
        approver_role = "supervisor"

        [[rate_limits]]
        id = "typing"
        action = "type"
        max_actions = 1
        window_secs = 60
    "#;

    #[test]
    fn test_approval_is_off_by_default() {
        let engine = TomlPolicyEngine::from_toml_str(r#"allowed_actions = ["type", "drag"]"#).unwrap();
        assert!(!engine.config().approval.require_approval);
        assert_eq!(engine.evaluate(&ctx(ActionType::Type, None, t0())).unwrap(), PolicyVerdict::Allow);
        assert_eq!(engine.evaluate(&ctx(ActionType::Drag, None, t0())).unwrap(), PolicyVerdict::Allow);
    }

    #[test]
    fn test_unsafe_actions_require_approval() {
        let engine = TomlPolicyEngine::from_toml_str(APPROVAL).unwrap();
        assert_eq!(
            engine.evaluate(&ctx(ActionType::Drag, None, t0())).unwrap(),
            PolicyVerdict::RequireApproval {
                reason: "'drag' actions need approval".to_string(),
                approver_role: "supervisor".to_string(),
            }
        );
        // Safe by default, and exempted.
        assert_eq!(engine.evaluate(&ctx(ActionType::Click, None, t0())).unwrap(), PolicyVerdict::Allow);
        assert_eq!(engine.evaluate(&ctx(ActionType::Camera, None, t0())).unwrap(), PolicyVerdict::Allow);
    }

    /// Approval never overrides a denial, and a pending approval still uses
    /// up its rate slot.
    #[test]
    fn test_approval_comes_after_denials_and_is_counted() {
        let engine = TomlPolicyEngine::from_toml_str(APPROVAL).unwrap();
        let typing = |secs: i64| engine.evaluate(&ctx(ActionType::Type, None, t0() + TimeDelta::seconds(secs)));

        assert!(matches!(typing(0).unwrap(), PolicyVerdict::RequireApproval { .. }));
        assert_denied(typing(1).unwrap(), "rate limit 'typing'");
        assert_denied(
            engine.evaluate(&ctx(ActionType::Scroll, None, t0())).unwrap(),
            "denied by default",
        );
    }
}
