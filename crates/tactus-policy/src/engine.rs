//! TOML-driven action policy engine.
//!
//! `TomlPolicyEngine` loads a `PolicyConfig` from a TOML string or file and
//! implements the `PolicyEngine` trait from tactus-core.
//!
//! Evaluation algorithm:
//!
//! 1. The action type must be listed in `allowed_actions`, otherwise `Deny`
//!    (deny-by-default).
//! 2. An intent whose `action_label` is in `blocked_labels` → `Deny`.
//! 3. Every matching rate limit is checked against its rolling window,
//!    measured on the session clock. A full window → `Deny`.
//! 4. An action type the `[approval]` section marks unsafe →
//!    `RequireApproval`, still counted in its windows.
//! 5. Otherwise `Allow`, and the action is counted in every matching window.
//!
//! Each evaluation first drops timestamps that have left their window, and
//! windows left empty, for every session. Windows are measured on the
//! caller's session clock, so sessions sharing an engine should share a
//! clock too.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use tactus_contracts::{
    error::{TactusError, TactusResult},
    policy::{PolicyContext, PolicyVerdict},
};
use tactus_core::traits::PolicyEngine;

use crate::rule::{PolicyConfig, RateLimit};

type Windows = HashMap<(String, String), VecDeque<DateTime<Utc>>>;

/// Timestamps at or before this instant are outside `limit`'s window. A
/// window too long to subtract reaches back to the start of time.
fn horizon(limit: &RateLimit, now: DateTime<Utc>) -> DateTime<Utc> {
    limit
        .window()
        .and_then(|w| now.checked_sub_signed(w))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// A `PolicyEngine` implementation that reads its rules from TOML.
///
/// ```rust,ignore
/// use tactus_policy::engine::TomlPolicyEngine;
///
/// let engine = TomlPolicyEngine::from_file(Path::new("config/policy.toml"))?;
/// ```
#[derive(Debug)]
pub struct TomlPolicyEngine {
    config: PolicyConfig,
    /// Allowed-action timestamps per (session, rate limit id).
    windows: Mutex<Windows>,
}

impl TomlPolicyEngine {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Parse `s` as TOML and build a `TomlPolicyEngine`.
    ///
    /// Returns `TactusError::ConfigError` if the TOML is malformed or does
    /// not match the expected `PolicyConfig` schema.
    pub fn from_toml_str(s: &str) -> TactusResult<Self> {
        let config: PolicyConfig = toml::from_str(s).map_err(|e| TactusError::ConfigError {
            reason: format!("failed to parse policy TOML: {}", e),
        })?;
        for limit in &config.rate_limits {
            if limit.window_secs == 0 {
                return Err(TactusError::ConfigError {
                    reason: format!("rate limit '{}' has a zero-length window", limit.id),
                });
            }
            if limit.window().is_none() {
                return Err(TactusError::ConfigError {
                    reason: format!(
                        "rate limit '{}' window of {}s is too long",
                        limit.id, limit.window_secs
                    ),
                });
            }
        }
        Ok(Self::new(config))
    }

    /// Read the file at `path` and parse it as TOML policy configuration.
    pub fn from_file(path: &Path) -> TactusResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| TactusError::ConfigError {
            reason: format!("failed to read policy file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Number of (session, rate limit) windows currently holding timestamps.
    pub fn tracked_windows(&self) -> usize {
        self.windows.lock().map_or(0, |w| w.len())
    }

    /// Drop expired timestamps everywhere, then every window left empty.
    fn prune(&self, windows: &mut Windows, now: DateTime<Utc>) {
        let before = windows.len();
        windows.retain(|(_, id), window| {
            let Some(limit) = self.config.rate_limits.iter().find(|l| &l.id == id) else {
                return false;
            };
            let horizon = horizon(limit, now);
            while window.front().is_some_and(|t| *t <= horizon) {
                window.pop_front();
            }
            !window.is_empty()
        });
        if windows.len() < before {
            debug!(dropped = before - windows.len(), "stale rate windows pruned");
        }
    }
}

impl PolicyEngine for TomlPolicyEngine {
    fn evaluate(&self, ctx: &PolicyContext) -> TactusResult<PolicyVerdict> {
        debug!(
            session_id = %ctx.session_id,
            intent_id = %ctx.intent_id,
            action_type = %ctx.action_type,
            "evaluating policy"
        );

        if !self.config.allows_type(ctx.action_type) {
            warn!(intent_id = %ctx.intent_id, action_type = %ctx.action_type, "action type not allowed; denying by default");
            return Ok(PolicyVerdict::Deny {
                reason: format!("denied by default: action type '{}' is not allowed", ctx.action_type),
            });
        }

        if let Some(label) = ctx.action_label.as_deref() {
            if self.config.blocks_label(label) {
                warn!(intent_id = %ctx.intent_id, label, "blocked action label");
                return Ok(PolicyVerdict::Deny {
                    reason: format!("action label '{}' is blocked by policy", label),
                });
            }
        }

        let mut windows = self.windows.lock().map_err(|e| TactusError::ConfigError {
            reason: format!("policy rate window lock poisoned: {}", e),
        })?;
        self.prune(&mut windows, ctx.now);

        let matching: Vec<_> = self
            .config
            .rate_limits
            .iter()
            .filter(|l| l.matches(ctx.action_type))
            .collect();

        // Check every window before counting in any of them, so a denial
        // leaves all windows untouched.
        for limit in &matching {
            let key = (ctx.session_id.clone(), limit.id.clone());
            let count = windows.get(&key).map_or(0, VecDeque::len);
            if count >= limit.max_actions as usize {
                warn!(
                    intent_id = %ctx.intent_id,
                    limit = %limit.id,
                    count,
                    "rate limit reached"
                );
                return Ok(PolicyVerdict::Deny {
                    reason: format!(
                        "rate limit '{}' reached: {} actions in {}s",
                        limit.id, limit.max_actions, limit.window_secs
                    ),
                });
            }
        }

        for limit in matching {
            windows
                .entry((ctx.session_id.clone(), limit.id.clone()))
                .or_default()
                .push_back(ctx.now);
        }

        let approval = &self.config.approval;
        if approval.needs_approval(ctx.action_type) {
            debug!(intent_id = %ctx.intent_id, role = %approval.approver_role, "approval required");
            return Ok(PolicyVerdict::RequireApproval {
                reason: format!("'{}' actions need approval", ctx.action_type),
                approver_role: approval.approver_role.clone(),
            });
        }

        Ok(PolicyVerdict::Allow)
    }

    fn denylist(&self) -> Vec<String> {
        self.config.denylist.clone()
    }
}
